use serde::Serialize;
use std::fmt;

use crate::mail::{MailboxError, ParseError};

/// Failure of an on-demand session operation, reported to the caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    #[error("unknown account '{0}'")]
    UnknownAccount(String),
    #[error("no active session for account")]
    NoSession,
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("Failed to reconnect to email server: {0}")]
    Reconnect(MailboxError),
    #[error("failed to open inbox: {0}")]
    Inbox(MailboxError),
    #[error("search failed: {0}")]
    Search(MailboxError),
    #[error("email with UID {0} not found")]
    NotFound(u32),
    #[error("failed to parse email: {0}")]
    Parse(#[from] ParseError),
    #[error("failed to fetch email: {0}")]
    Fetch(MailboxError),
    #[error("session closed")]
    SessionClosed,
}

/// Stable failure class, part of the `email-content-error` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Configuration,
    Transport,
    Protocol,
    NotFound,
    Parse,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Transport => "transport",
            ErrorKind::Protocol => "protocol",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Parse => "parse",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::UnknownAccount(_) => ErrorKind::Configuration,
            SessionError::NoSession
            | SessionError::NotAuthenticated
            | SessionError::Reconnect(_)
            | SessionError::Fetch(_)
            | SessionError::SessionClosed => ErrorKind::Transport,
            SessionError::Inbox(_) | SessionError::Search(_) => ErrorKind::Protocol,
            SessionError::NotFound(_) => ErrorKind::NotFound,
            SessionError::Parse(_) => ErrorKind::Parse,
        }
    }

    /// The underlying mailbox error, when it means the session is gone.
    pub(crate) fn lost_connection(&self) -> Option<&MailboxError> {
        match self {
            SessionError::Inbox(e) | SessionError::Search(e) | SessionError::Fetch(e)
                if e.is_connection_lost() =>
            {
                Some(e)
            }
            _ => None,
        }
    }
}
