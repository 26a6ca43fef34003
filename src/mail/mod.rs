pub mod imap;
pub mod parser;
pub mod types;

pub use imap::{ImapConnector, MailboxConnector, MailboxError, MailboxSession};
pub use parser::ParseError;
pub use types::{HeaderFields, HeaderSummary, MessageContent, MessageSummary};
