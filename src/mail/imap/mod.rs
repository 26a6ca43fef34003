//! IMAP protocol adapter.
//!
//! This module is split into:
//! - `mod.rs` - The connector/session seam used by the session workers
//! - `client.rs` - async-imap backed implementation
//! - `tls.rs` - Stream setup and the relaxed certificate verifier

mod client;
mod tls;

use async_trait::async_trait;
use chrono::NaiveDate;
use std::time::Duration;

use crate::account::Account;

pub use client::ImapConnector;

/// Header block and partial text section of one message, as fetched for the list view.
#[derive(Debug, Clone, Default)]
pub struct RawPreview {
    pub uid: u32,
    pub header: Vec<u8>,
    pub text: Vec<u8>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum MailboxError {
    /// Socket, TLS or login failure; the session is unusable afterwards
    #[error("transport error: {0}")]
    Transport(String),
    /// Server answered NO/BAD or sent something unparseable
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
}

impl MailboxError {
    /// Whether the session must be discarded and re-established.
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            MailboxError::Transport(_) | MailboxError::Timeout(_)
        )
    }
}

impl From<async_imap::error::Error> for MailboxError {
    fn from(err: async_imap::error::Error) -> Self {
        use async_imap::error::Error;
        match err {
            Error::Io(e) => MailboxError::Transport(e.to_string()),
            Error::ConnectionLost => MailboxError::Transport("connection lost".to_string()),
            Error::No(msg) => MailboxError::Protocol(format!("NO {}", msg)),
            Error::Bad(msg) => MailboxError::Protocol(format!("BAD {}", msg)),
            other => MailboxError::Protocol(other.to_string()),
        }
    }
}

/// Opens authenticated sessions for an account.
#[async_trait]
pub trait MailboxConnector: Send + Sync + 'static {
    type Session: MailboxSession;

    /// Connect and log in with the account's single credential.
    async fn connect(&self, account: &Account) -> Result<Self::Session, MailboxError>;
}

/// One authenticated protocol session. Operations must not be interleaved.
#[async_trait]
pub trait MailboxSession: Send + 'static {
    async fn open_inbox(&mut self) -> Result<(), MailboxError>;

    /// UIDs of messages received on or after `since`.
    async fn search_since(&mut self, since: NaiveDate) -> Result<Vec<u32>, MailboxError>;

    /// UIDs matching exactly `uid` (empty when absent).
    async fn search_uid(&mut self, uid: u32) -> Result<Vec<u32>, MailboxError>;

    /// Header block plus the first `preview_bytes` of the text section, per UID.
    async fn fetch_previews(
        &mut self,
        uids: &[u32],
        preview_bytes: usize,
    ) -> Result<Vec<RawPreview>, MailboxError>;

    /// Full message source. `Ok(None)` when the server returned no body.
    async fn fetch_full(&mut self, uid: u32) -> Result<Option<Vec<u8>>, MailboxError>;

    async fn logout(&mut self) -> Result<(), MailboxError>;
}

/// `1,5,9` style UID set for UID FETCH.
pub(crate) fn uid_set(uids: &[u32]) -> String {
    uids.iter()
        .map(|u| u.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// IMAP SEARCH date, e.g. `01-Jan-2024`.
pub(crate) fn imap_date(date: NaiveDate) -> String {
    date.format("%d-%b-%Y").to_string()
}
