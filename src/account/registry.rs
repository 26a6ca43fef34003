use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::Config;
use crate::credentials::CredentialStore;

use super::Account;

/// Ordered, read-only set of accounts loaded once at startup.
#[derive(Debug, Default)]
pub struct AccountRegistry {
    accounts: Vec<Arc<Account>>,
}

impl AccountRegistry {
    pub fn new(accounts: Vec<Account>) -> Result<Self> {
        let mut seen = HashSet::new();
        for account in &accounts {
            if account.id.trim().is_empty() {
                anyhow::bail!("Account id must not be empty");
            }
            if !seen.insert(account.id.as_str()) {
                anyhow::bail!("Duplicate account id '{}'", account.id);
            }
        }

        Ok(Self {
            accounts: accounts.into_iter().map(Arc::new).collect(),
        })
    }

    /// Build the registry from configuration, resolving each account's secret.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut accounts = Vec::with_capacity(config.accounts.len());

        for account_config in &config.accounts {
            let password = match &account_config.password {
                Some(password) => password.clone(),
                None => CredentialStore::new(&account_config.id, &account_config.user)
                    .get_password()?,
            };

            accounts.push(Account {
                id: account_config.id.clone(),
                host: account_config.host.clone(),
                port: account_config.port,
                tls: account_config.tls,
                strict_tls: account_config.strict_tls,
                user: account_config.user.clone(),
                password,
            });
        }

        if accounts.is_empty() {
            anyhow::bail!("No accounts configured");
        }

        Self::new(accounts)
    }

    pub fn get(&self, account_id: &str) -> Option<&Arc<Account>> {
        self.accounts.iter().find(|a| a.id == account_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Account>> {
        self.accounts.iter()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }
}
