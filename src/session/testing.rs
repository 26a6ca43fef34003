//! In-memory mailbox and recording sinks for session tests.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::account::{Account, AccountRegistry};
use crate::notify::{Alert, Notifier};
use crate::mail::imap::RawPreview;
use crate::mail::{MailboxConnector, MailboxError, MailboxSession};

pub fn raw_message(subject: &str, from: &str, body: &str) -> Vec<u8> {
    format!(
        "From: {from}\r\nTo: sales@example.com\r\nSubject: {subject}\r\n\
         Date: Mon, 1 Jan 2024 12:00:00 +0000\r\nMessage-ID: <msg@example.com>\r\n\r\n{body}"
    )
    .into_bytes()
}

#[derive(Default)]
struct MailboxState {
    messages: BTreeMap<u32, Vec<u8>>,
    /// Remaining connect attempts that fail; `u32::MAX` means always
    failing_connects: u32,
    /// Next search fails with a transport error
    drop_next_search: bool,
    /// Next `UID SEARCH UID n` fails with this error
    uid_search_failure: Option<MailboxError>,
    /// Next full fetch fails with this error
    full_fetch_failure: Option<MailboxError>,
    /// Per-account LOGOUT stall
    logout_delays: HashMap<String, Duration>,
    log: Vec<String>,
}

/// Shared fake server. Clones observe the same state.
#[derive(Clone, Default)]
pub struct FakeMailbox {
    state: Arc<Mutex<MailboxState>>,
}

impl FakeMailbox {
    pub fn with_message(self, uid: u32, raw: Vec<u8>) -> Self {
        self.put(uid, raw);
        self
    }

    pub fn put(&self, uid: u32, raw: Vec<u8>) {
        self.state.lock().unwrap().messages.insert(uid, raw);
    }

    pub fn fail_connects(&self, count: u32) {
        self.state.lock().unwrap().failing_connects = count;
    }

    pub fn drop_next_search(&self) {
        self.state.lock().unwrap().drop_next_search = true;
    }

    pub fn fail_next_uid_search(&self, error: MailboxError) {
        self.state.lock().unwrap().uid_search_failure = Some(error);
    }

    pub fn fail_next_full_fetch(&self, error: MailboxError) {
        self.state.lock().unwrap().full_fetch_failure = Some(error);
    }

    pub fn stall_logout(&self, account_id: &str, delay: Duration) {
        self.state
            .lock()
            .unwrap()
            .logout_delays
            .insert(account_id.to_string(), delay);
    }

    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.log().iter().filter(|e| *e == entry).count()
    }

    fn record(&self, entry: &str) {
        self.state.lock().unwrap().log.push(entry.to_string());
    }
}

pub struct FakeConnector {
    pub mailbox: FakeMailbox,
}

#[async_trait]
impl MailboxConnector for FakeConnector {
    type Session = FakeSession;

    async fn connect(&self, account: &Account) -> Result<FakeSession, MailboxError> {
        let refused = {
            let mut state = self.mailbox.state.lock().unwrap();
            state.log.push("connect".into());
            if state.failing_connects > 0 {
                if state.failing_connects != u32::MAX {
                    state.failing_connects -= 1;
                }
                true
            } else {
                false
            }
        };

        if refused {
            return Err(MailboxError::Transport("connection refused".into()));
        }
        Ok(FakeSession {
            account_id: account.id.clone(),
            mailbox: self.mailbox.clone(),
        })
    }
}

pub struct FakeSession {
    account_id: String,
    mailbox: FakeMailbox,
}

#[async_trait]
impl MailboxSession for FakeSession {
    async fn open_inbox(&mut self) -> Result<(), MailboxError> {
        self.mailbox.record("select");
        Ok(())
    }

    async fn search_since(&mut self, _since: NaiveDate) -> Result<Vec<u32>, MailboxError> {
        let mut state = self.mailbox.state.lock().unwrap();
        if std::mem::take(&mut state.drop_next_search) {
            state.log.push("search:dropped".into());
            return Err(MailboxError::Transport("connection reset".into()));
        }
        state.log.push("search".into());
        Ok(state.messages.keys().copied().collect())
    }

    async fn search_uid(&mut self, uid: u32) -> Result<Vec<u32>, MailboxError> {
        let mut state = self.mailbox.state.lock().unwrap();
        if let Some(error) = state.uid_search_failure.take() {
            return Err(error);
        }
        Ok(state.messages.keys().copied().filter(|u| *u == uid).collect())
    }

    async fn fetch_previews(
        &mut self,
        uids: &[u32],
        preview_bytes: usize,
    ) -> Result<Vec<RawPreview>, MailboxError> {
        let state = self.mailbox.state.lock().unwrap();
        Ok(uids
            .iter()
            .filter_map(|uid| state.messages.get(uid).map(|raw| (*uid, raw)))
            .map(|(uid, raw)| {
                let split = raw
                    .windows(4)
                    .position(|w| w == b"\r\n\r\n")
                    .map(|p| p + 4)
                    .unwrap_or(raw.len());
                let mut text = raw[split..].to_vec();
                text.truncate(preview_bytes);
                RawPreview {
                    uid,
                    header: raw[..split].to_vec(),
                    text,
                }
            })
            .collect())
    }

    async fn fetch_full(&mut self, uid: u32) -> Result<Option<Vec<u8>>, MailboxError> {
        let mut state = self.mailbox.state.lock().unwrap();
        if let Some(error) = state.full_fetch_failure.take() {
            return Err(error);
        }
        Ok(state.messages.get(&uid).cloned())
    }

    async fn logout(&mut self) -> Result<(), MailboxError> {
        let delay = {
            let mut state = self.mailbox.state.lock().unwrap();
            state.log.push("logout".into());
            state.logout_delays.get(&self.account_id).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingNotifier {
    pub fn count(&self) -> usize {
        self.alerts.lock().unwrap().len()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }

    /// Let spawned dispatch tasks finish.
    pub async fn settle(&self) {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, alert: &Alert) -> bool {
        self.alerts.lock().unwrap().push(alert.clone());
        true
    }

    async fn test_connection(&self) -> bool {
        true
    }
}

pub fn registry(ids: &[&str]) -> AccountRegistry {
    let accounts = ids
        .iter()
        .map(|id| Account::new(*id, "imap.example.com", 993, format!("{id}@example.com"), "secret"))
        .collect();
    AccountRegistry::new(accounts).unwrap()
}
