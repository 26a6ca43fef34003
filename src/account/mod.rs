mod registry;

pub use registry::AccountRegistry;

use std::fmt;

/// One configured mailbox: endpoint plus credentials. Never mutated after startup.
#[derive(Clone, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub host: String,
    pub port: u16,
    /// Implicit TLS on connect
    pub tls: bool,
    /// Verify the server certificate chain (off by default)
    pub strict_tls: bool,
    pub user: String,
    pub(crate) password: String,
}

impl Account {
    #[cfg(test)]
    pub fn new(
        id: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            port,
            tls: true,
            strict_tls: false,
            user: user.into(),
            password: password.into(),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("strict_tls", &self.strict_tls)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}
