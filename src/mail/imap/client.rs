//! async-imap backed connector and session.

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::StreamExt;

use super::tls::{BoxedStream, open_stream};
use super::{MailboxConnector, MailboxError, MailboxSession, RawPreview, imap_date, uid_set};
use crate::account::Account;

type Session = async_imap::Session<BoxedStream>;

/// Connects to real IMAP servers over TCP/TLS.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImapConnector;

#[async_trait]
impl MailboxConnector for ImapConnector {
    type Session = ImapClient;

    async fn connect(&self, account: &Account) -> Result<ImapClient, MailboxError> {
        let stream = open_stream(account).await?;
        let client = async_imap::Client::new(stream);

        let session = client
            .login(&account.user, &account.password)
            .await
            .map_err(|e| MailboxError::Transport(format!("login failed: {}", e.0)))?;

        tracing::info!(account = %account.id, "Connected to IMAP server {}", account.host);
        Ok(ImapClient { session })
    }
}

/// An authenticated IMAP session.
#[derive(Debug)]
pub struct ImapClient {
    session: Session,
}

#[async_trait]
impl MailboxSession for ImapClient {
    async fn open_inbox(&mut self) -> Result<(), MailboxError> {
        let mailbox = self.session.select("INBOX").await?;
        tracing::debug!("INBOX selected, {} messages", mailbox.exists);
        Ok(())
    }

    async fn search_since(&mut self, since: NaiveDate) -> Result<Vec<u32>, MailboxError> {
        let query = format!("SINCE {}", imap_date(since));
        let mut uids: Vec<u32> = self.session.uid_search(&query).await?.into_iter().collect();
        uids.sort_unstable();
        Ok(uids)
    }

    async fn search_uid(&mut self, uid: u32) -> Result<Vec<u32>, MailboxError> {
        let query = format!("UID {}", uid);
        let mut uids: Vec<u32> = self.session.uid_search(&query).await?.into_iter().collect();
        uids.sort_unstable();
        Ok(uids)
    }

    async fn fetch_previews(
        &mut self,
        uids: &[u32],
        preview_bytes: usize,
    ) -> Result<Vec<RawPreview>, MailboxError> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }

        let query = format!(
            "(UID BODY.PEEK[HEADER] BODY.PEEK[TEXT]<0.{}>)",
            preview_bytes
        );
        let mut stream = self.session.uid_fetch(uid_set(uids), &query).await?;

        let mut previews = Vec::with_capacity(uids.len());
        while let Some(result) = stream.next().await {
            let fetch = result?;
            let Some(uid) = fetch.uid else {
                tracing::debug!("Skipping FETCH response without UID");
                continue;
            };
            previews.push(RawPreview {
                uid,
                header: fetch.header().map(<[u8]>::to_vec).unwrap_or_default(),
                text: fetch.text().map(<[u8]>::to_vec).unwrap_or_default(),
            });
        }

        Ok(previews)
    }

    async fn fetch_full(&mut self, uid: u32) -> Result<Option<Vec<u8>>, MailboxError> {
        let mut stream = self
            .session
            .uid_fetch(uid.to_string(), "(UID BODY.PEEK[])")
            .await?;

        let mut body = None;
        while let Some(result) = stream.next().await {
            let fetch = result?;
            if fetch.uid == Some(uid) || body.is_none() {
                if let Some(raw) = fetch.body() {
                    body = Some(raw.to_vec());
                }
            }
        }

        Ok(body)
    }

    async fn logout(&mut self) -> Result<(), MailboxError> {
        self.session.logout().await?;
        Ok(())
    }
}
