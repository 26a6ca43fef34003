use serde::Serialize;
use std::fmt;

/// Connection lifecycle of one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    /// Logged in; equivalent to authenticated
    Ready,
    /// Reconnect limit reached, no automatic retries until a manual reconnect
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Ready => "ready",
            SessionState::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
