use anyhow::Result;
use std::env;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

const KEYRING_SERVICE: &str = "mailsift";
const ENV_PASSWORD_PREFIX: &str = "MAILSIFT_PASSWORD_";

/// Resolves the IMAP secret for one account.
///
/// Lookup order: `MAILSIFT_PASSWORD_<ID>` environment variable, OS keyring,
/// then a private file in the config directory.
pub struct CredentialStore {
    account_id: String,
    user: String,
    password_file: PathBuf,
}

impl CredentialStore {
    pub fn new(account_id: &str, user: &str) -> Self {
        let password_file = crate::config::Config::config_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(format!(".password_{}", safe_name(account_id)));

        Self {
            account_id: account_id.to_string(),
            user: user.to_string(),
            password_file,
        }
    }

    /// Environment variable consulted for this account
    pub fn env_var_name(&self) -> String {
        format!(
            "{}{}",
            ENV_PASSWORD_PREFIX,
            safe_name(&self.account_id).to_uppercase()
        )
    }

    fn env_password(&self) -> Option<String> {
        env::var(self.env_var_name())
            .ok()
            .filter(|s| !s.is_empty())
    }

    fn keyring_key(&self) -> String {
        format!("imap:{}", self.user)
    }

    fn keyring_get(&self) -> Option<String> {
        let entry = keyring::Entry::new(KEYRING_SERVICE, &self.keyring_key()).ok()?;
        entry.get_password().ok()
    }

    fn keyring_set(&self, password: &str) -> bool {
        if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &self.keyring_key()) {
            entry.set_password(password).is_ok()
        } else {
            false
        }
    }

    fn file_get(&self) -> Option<String> {
        fs::read_to_string(&self.password_file)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Write password to file fallback (with restricted permissions)
    fn file_set(&self, password: &str) -> Result<()> {
        if let Some(parent) = self.password_file.parent() {
            fs::create_dir_all(parent)?;
        }

        #[cfg(unix)]
        {
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&self.password_file)?;
            file.write_all(password.as_bytes())?;
        }

        #[cfg(not(unix))]
        {
            fs::write(&self.password_file, password)?;
        }

        Ok(())
    }

    pub fn get_password(&self) -> Result<String> {
        if let Some(pwd) = self.env_password() {
            return Ok(pwd);
        }

        if let Some(pwd) = self.keyring_get() {
            return Ok(pwd);
        }

        if let Some(pwd) = self.file_get() {
            return Ok(pwd);
        }

        anyhow::bail!(
            "Password not found for account '{}'. Set {} or run 'mailsift set-password {}'.",
            self.account_id,
            self.env_var_name(),
            self.account_id
        )
    }

    pub fn set_password(&self, password: &str) -> Result<()> {
        if self.keyring_set(password) && self.keyring_get().is_some() {
            return Ok(());
        }

        eprintln!("Note: Keyring unavailable, using file-based storage.");
        self.file_set(password)
    }
}

fn safe_name(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_name_is_sanitized() {
        let store = CredentialStore::new("sales-eu.1", "sales@example.com");
        assert_eq!(store.env_var_name(), "MAILSIFT_PASSWORD_SALES_EU_1");
    }

    #[test]
    fn test_env_password_wins() {
        let store = CredentialStore::new("credtest_env_only", "nobody@example.com");
        // SAFETY: single test touching this unique variable name
        unsafe { env::set_var(store.env_var_name(), "from-env") };
        assert_eq!(store.get_password().unwrap(), "from-env");
        unsafe { env::remove_var(store.env_var_name()) };
    }
}
