//! Public face of the session layer: one worker per account, addressed by id.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, oneshot};

use super::error::SessionError;
use super::events::{SessionEvent, deliver};
use super::pipeline::Pipeline;
use super::state::SessionState;
use super::worker::{ClassifiedMessage, WorkerCommand, WorkerHandle, WorkerSettings, spawn_worker};
use crate::account::AccountRegistry;
use crate::classify::Category;
use crate::constants::{EVENT_CHANNEL_CAPACITY, WORKER_SHUTDOWN_TIMEOUT_SECS};
use crate::mail::{HeaderSummary, MailboxConnector, MessageSummary};
use crate::notify::Dispatcher;
use crate::reply::{GeneratedReply, ReplyGenerator};

/// Result of `generate_reply`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyResult {
    pub account_id: String,
    pub uid: u32,
    pub headers: HeaderSummary,
    pub classification: Category,
    pub reply: GeneratedReply,
}

pub struct SessionManager<C: MailboxConnector> {
    registry: Arc<AccountRegistry>,
    connector: Arc<C>,
    pipeline: Arc<Pipeline>,
    replies: Arc<dyn ReplyGenerator>,
    settings: WorkerSettings,
    event_tx: mpsc::Sender<SessionEvent>,
    workers: Mutex<HashMap<String, WorkerHandle>>,
}

impl<C: MailboxConnector> SessionManager<C> {
    /// Build the manager and the receiving end of its event stream.
    pub fn new(
        registry: AccountRegistry,
        connector: C,
        dispatcher: Dispatcher,
        replies: Arc<dyn ReplyGenerator>,
        settings: WorkerSettings,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let manager = Self {
            registry: Arc::new(registry),
            connector: Arc::new(connector),
            pipeline: Arc::new(Pipeline::new(dispatcher)),
            replies,
            settings,
            event_tx,
            workers: Mutex::new(HashMap::new()),
        };
        (manager, event_rx)
    }

    fn spawn(&self, account_id: &str) -> Result<WorkerHandle, SessionError> {
        let account = self
            .registry
            .get(account_id)
            .ok_or_else(|| SessionError::UnknownAccount(account_id.to_string()))?;

        Ok(spawn_worker(
            Arc::clone(account),
            Arc::clone(&self.connector),
            Arc::clone(&self.pipeline),
            self.settings.clone(),
            self.event_tx.clone(),
        ))
    }

    /// Start a worker for every account that does not already have a live one.
    pub async fn connect_all(&self) {
        let mut workers = self.workers.lock().await;

        for account in self.registry.iter() {
            if let Some(handle) = workers.get(&account.id)
                && !handle.join.is_finished()
            {
                tracing::debug!(account = %account.id, "Worker already running");
                continue;
            }

            match self.spawn(&account.id) {
                Ok(handle) => {
                    workers.insert(account.id.clone(), handle);
                }
                Err(e) => tracing::error!(account = %account.id, "Failed to start worker: {}", e),
            }
        }
    }

    /// Stop every worker, closing sessions and timers. Bounded per worker.
    pub async fn disconnect_all(&self) {
        let handles: Vec<_> = self.workers.lock().await.drain().collect();

        for (_, handle) in &handles {
            handle.cancel.cancel();
        }
        for (account_id, handle) in handles {
            shutdown_worker(&account_id, handle).await;
        }
        tracing::info!("All sessions disconnected");
    }

    /// Tear down the account's worker and start a fresh one.
    pub async fn reconnect(&self, account_id: &str) -> Result<(), SessionError> {
        if self.registry.get(account_id).is_none() {
            return Err(SessionError::UnknownAccount(account_id.to_string()));
        }

        // Other accounts must not wait on this teardown, so the map is only
        // locked to take the handle out and to put the new one in.
        let previous = self.workers.lock().await.remove(account_id);
        if let Some(handle) = previous {
            handle.cancel.cancel();
            shutdown_worker(account_id, handle).await;
        }

        tracing::info!(account = account_id, "Manual reconnect");
        let handle = self.spawn(account_id)?;
        let displaced = self
            .workers
            .lock()
            .await
            .insert(account_id.to_string(), handle);

        // A concurrent connect or reconnect started one meanwhile
        if let Some(stale) = displaced {
            stale.cancel.cancel();
            shutdown_worker(account_id, stale).await;
        }
        Ok(())
    }

    #[cfg(test)]
    pub async fn state(&self, account_id: &str) -> Option<SessionState> {
        let workers = self.workers.lock().await;
        workers.get(account_id).map(|h| *h.state.borrow())
    }

    /// State of every registered account, in registry order.
    pub async fn states(&self) -> Vec<(String, SessionState)> {
        let workers = self.workers.lock().await;
        self.registry
            .iter()
            .map(|account| {
                let state = workers
                    .get(&account.id)
                    .map(|h| *h.state.borrow())
                    .unwrap_or_default();
                (account.id.clone(), state)
            })
            .collect()
    }

    async fn request<T>(
        &self,
        account_id: &str,
        command: impl FnOnce(oneshot::Sender<Result<T, SessionError>>) -> WorkerCommand,
    ) -> Result<T, SessionError> {
        if self.registry.get(account_id).is_none() {
            return Err(SessionError::UnknownAccount(account_id.to_string()));
        }

        let cmd_tx = {
            let workers = self.workers.lock().await;
            workers
                .get(account_id)
                .map(|h| h.cmd_tx.clone())
                .ok_or(SessionError::NoSession)?
        };

        let (tx, rx) = oneshot::channel();
        cmd_tx
            .send(command(tx))
            .await
            .map_err(|_| SessionError::SessionClosed)?;
        rx.await.map_err(|_| SessionError::SessionClosed)?
    }

    /// Fetch and classify the trailing window. Always emits `emails-list`,
    /// empty on failure.
    pub async fn fetch_list(&self, account_id: &str) -> Result<Vec<MessageSummary>, SessionError> {
        let result = self
            .request(account_id, |respond_to| WorkerCommand::FetchList { respond_to })
            .await;

        let emails = match &result {
            Ok(emails) => emails.clone(),
            Err(e) => {
                tracing::warn!(account = account_id, "List fetch failed: {}", e);
                Vec::new()
            }
        };
        deliver(
            &self.event_tx,
            SessionEvent::EmailsList {
                account_id: account_id.to_string(),
                emails,
            },
        )
        .await;
        result
    }

    /// Fetch one message in full. Emits `email-content` or `email-content-error`.
    pub async fn fetch_one(&self, account_id: &str, uid: u32) -> Result<ClassifiedMessage, SessionError> {
        let result = self
            .request(account_id, |respond_to| WorkerCommand::FetchOne { uid, respond_to })
            .await;

        let event = match &result {
            Ok(message) => SessionEvent::EmailContent {
                account_id: account_id.to_string(),
                uid,
                content: message.content.clone(),
                classification: message.classification,
            },
            Err(e) => {
                tracing::warn!(account = account_id, uid, "Fetch failed: {}", e);
                SessionEvent::content_error(account_id, uid, e)
            }
        };
        deliver(&self.event_tx, event).await;
        result
    }

    /// Classify a message and draft a reply. Requires a ready session.
    pub async fn generate_reply(&self, account_id: &str, uid: u32) -> Result<ReplyResult, SessionError> {
        let message = self
            .request(account_id, |respond_to| WorkerCommand::FetchForReply {
                uid,
                respond_to,
            })
            .await?;

        let reply = self
            .replies
            .generate(&message.content, message.classification)
            .await;

        Ok(ReplyResult {
            account_id: account_id.to_string(),
            uid,
            headers: HeaderSummary::from(&message.content),
            classification: message.classification,
            reply,
        })
    }
}

async fn shutdown_worker(account_id: &str, mut handle: WorkerHandle) {
    let limit = Duration::from_secs(WORKER_SHUTDOWN_TIMEOUT_SECS);
    if tokio::time::timeout(limit, &mut handle.join).await.is_err() {
        tracing::warn!(account = account_id, "Worker did not stop in {:?}, aborting", limit);
        handle.join.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::RetryConfig;
    use crate::mail::MailboxError;
    use crate::reply::{ReplySource, TemplateReplies};
    use crate::session::error::ErrorKind;
    use crate::session::testing::{
        FakeConnector, FakeMailbox, RecordingNotifier, raw_message, registry,
    };

    const INTERESTED: (&str, &str) = ("Re: proposal", "This sounds good, tell me more");

    fn settings() -> WorkerSettings {
        WorkerSettings {
            reconnect: RetryConfig::new(3, Duration::from_secs(10), Duration::from_secs(300)),
            ..WorkerSettings::default()
        }
    }

    struct Harness {
        manager: SessionManager<FakeConnector>,
        events: mpsc::Receiver<SessionEvent>,
        mailbox: FakeMailbox,
        notifier: Arc<RecordingNotifier>,
    }

    fn harness(mailbox: FakeMailbox) -> Harness {
        harness_for(&["acc"], mailbox)
    }

    fn harness_for(accounts: &[&str], mailbox: FakeMailbox) -> Harness {
        let notifier = Arc::new(RecordingNotifier::default());
        let (manager, events) = SessionManager::new(
            registry(accounts),
            FakeConnector {
                mailbox: mailbox.clone(),
            },
            Dispatcher::new(notifier.clone()),
            Arc::new(TemplateReplies),
            settings(),
        );
        Harness {
            manager,
            events,
            mailbox,
            notifier,
        }
    }

    fn interested_mailbox() -> FakeMailbox {
        FakeMailbox::default().with_message(
            1,
            raw_message(INTERESTED.0, "Jane Doe <jane@example.com>", INTERESTED.1),
        )
    }

    async fn advance(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    fn drain(events: &mut mpsc::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_emits_initial_list() {
        let mut h = harness(interested_mailbox());
        h.manager.connect_all().await;
        advance(1).await;

        assert_eq!(h.manager.state("acc").await, Some(SessionState::Ready));
        let events = drain(&mut h.events);
        let list = events.iter().find_map(|e| match e {
            SessionEvent::EmailsList { emails, .. } => Some(emails.clone()),
            _ => None,
        });
        let list = list.expect("initial list");
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].classification, Category::Interested);
        assert_eq!(list[0].subject(), Some("Re: proposal"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_notifies_once_across_repeated_lists() {
        let h = harness(interested_mailbox());
        h.manager.connect_all().await;
        advance(1).await;

        h.manager.fetch_list("acc").await.unwrap();
        h.manager.fetch_list("acc").await.unwrap();
        // Several background polls
        advance(95).await;
        h.notifier.settle().await;

        assert!(h.mailbox.count("search") >= 5);
        assert_eq!(h.notifier.count(), 1);
        assert_eq!(h.notifier.alerts()[0].subject.as_deref(), Some("Re: proposal"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_realerts_after_category_flip() {
        let h = harness(interested_mailbox());
        h.manager.connect_all().await;
        advance(1).await;
        h.notifier.settle().await;
        assert_eq!(h.notifier.count(), 1);

        h.mailbox.put(
            1,
            raw_message("Re: proposal", "jane@example.com", "We are not interested, thanks"),
        );
        let message = h.manager.fetch_one("acc", 1).await.unwrap();
        assert_eq!(message.classification, Category::NotInterested);

        h.mailbox.put(
            1,
            raw_message(INTERESTED.0, "jane@example.com", INTERESTED.1),
        );
        let message = h.manager.fetch_one("acc", 1).await.unwrap();
        assert_eq!(message.classification, Category::Interested);

        h.notifier.settle().await;
        assert_eq!(h.notifier.count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_failure_cancels_polling_before_reconnect() {
        let h = harness(interested_mailbox());
        h.manager.connect_all().await;
        advance(1).await;

        h.mailbox.drop_next_search();
        // First poll tick fails at t=30, reconnect at t=40
        advance(35).await;
        assert_eq!(h.manager.state("acc").await, Some(SessionState::Disconnected));

        advance(100).await;
        assert_eq!(h.manager.state("acc").await, Some(SessionState::Ready));

        let log = h.mailbox.log();
        let dropped = log.iter().position(|e| e == "search:dropped").unwrap();
        let reconnect = dropped + log[dropped..].iter().position(|e| e == "connect").unwrap();
        // Nothing polled between the failure and the new connection
        assert!(log[dropped + 1..reconnect].iter().all(|e| e != "search"));
        // Reconnected at t=40: immediate fetch plus ticks at 70, 100, 130
        let searches = log[reconnect..].iter().filter(|e| *e == "search").count();
        assert_eq!(searches, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_reconnect_does_not_duplicate_polling() {
        let h = harness(interested_mailbox());
        h.manager.connect_all().await;
        advance(1).await;

        h.manager.reconnect("acc").await.unwrap();
        advance(1).await;
        assert_eq!(h.mailbox.count("logout"), 1);
        assert_eq!(h.mailbox.count("connect"), 2);

        let before = h.mailbox.count("search");
        advance(60).await;
        // One worker polling every 30s
        assert_eq!(h.mailbox.count("search") - before, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_all_twice_keeps_one_worker() {
        let h = harness(interested_mailbox());
        h.manager.connect_all().await;
        h.manager.connect_all().await;
        advance(1).await;

        assert_eq!(h.mailbox.count("connect"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_missing_uid_is_not_found() {
        let mut h = harness(interested_mailbox());
        h.manager.connect_all().await;
        advance(1).await;
        drain(&mut h.events);

        let err = h.manager.fetch_one("acc", 999).await.unwrap_err();
        assert!(matches!(err, SessionError::NotFound(999)));
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let events = drain(&mut h.events);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::EmailContentError { uid: 999, kind: ErrorKind::NotFound, .. }
        )));
        // Not a transport failure, the session stays up
        assert_eq!(h.manager.state("acc").await, Some(SessionState::Ready));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_account() {
        let h = harness(interested_mailbox());
        h.manager.connect_all().await;

        let err = h.manager.fetch_one("nope", 1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(matches!(
            h.manager.reconnect("nope").await,
            Err(SessionError::UnknownAccount(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_one_recovers_disconnected_session() {
        let mailbox = interested_mailbox();
        mailbox.fail_connects(1);
        let h = harness(mailbox);
        h.manager.connect_all().await;
        advance(1).await;
        assert_eq!(h.manager.state("acc").await, Some(SessionState::Disconnected));

        let message = h.manager.fetch_one("acc", 1).await.unwrap();
        assert_eq!(message.classification, Category::Interested);
        assert_eq!(message.content.subject.as_deref(), Some("Re: proposal"));
        assert_eq!(h.manager.state("acc").await, Some(SessionState::Ready));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_one_reports_failed_recovery() {
        let mailbox = interested_mailbox();
        mailbox.fail_connects(u32::MAX);
        let h = harness(mailbox);
        h.manager.connect_all().await;
        advance(1).await;

        let err = h.manager.fetch_one("acc", 1).await.unwrap_err();
        assert!(matches!(err, SessionError::Reconnect(_)));
        assert_eq!(err.to_string().split(':').next(), Some("Failed to reconnect to email server"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_fails_fast_when_not_authenticated() {
        let mailbox = interested_mailbox();
        mailbox.fail_connects(u32::MAX);
        let h = harness(mailbox);
        h.manager.connect_all().await;
        advance(1).await;
        let connects = h.mailbox.count("connect");

        let err = h.manager.generate_reply("acc", 1).await.unwrap_err();
        assert!(matches!(err, SessionError::NotAuthenticated));
        // No recovery attempt on this path
        assert_eq!(h.mailbox.count("connect"), connects);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_reply() {
        let h = harness(interested_mailbox());
        h.manager.connect_all().await;
        advance(1).await;

        let result = h.manager.generate_reply("acc", 1).await.unwrap();
        assert_eq!(result.classification, Category::Interested);
        assert_eq!(result.headers.from, "Jane Doe <jane@example.com>");
        assert_eq!(result.reply.source, ReplySource::Template);
        assert!(result.reply.reply.contains("Jane"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_opens_after_max_attempts() {
        let mailbox = interested_mailbox();
        mailbox.fail_connects(u32::MAX);
        let mut h = harness(mailbox);
        h.manager.connect_all().await;

        // Delays 10 + 20 + 40, then the fourth failure opens the circuit
        advance(100).await;
        assert_eq!(h.manager.state("acc").await, Some(SessionState::Failed));
        assert_eq!(h.mailbox.count("connect"), 4);

        let events = drain(&mut h.events);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::AccountFailed { attempts: 3, .. }
        )));

        advance(1000).await;
        assert_eq!(h.mailbox.count("connect"), 4);

        // Manual reconnect closes the circuit
        h.mailbox.fail_connects(0);
        h.manager.reconnect("acc").await.unwrap();
        advance(1).await;
        assert_eq!(h.manager.state("acc").await, Some(SessionState::Ready));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_all_logs_out() {
        let h = harness(interested_mailbox());
        h.manager.connect_all().await;
        advance(1).await;

        h.manager.disconnect_all().await;
        assert_eq!(h.mailbox.count("logout"), 1);
        assert_eq!(h.manager.state("acc").await, None);

        let before = h.mailbox.count("search");
        advance(120).await;
        assert_eq!(h.mailbox.count("search"), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_failure_keeps_session() {
        let mut h = harness(interested_mailbox());
        h.manager.connect_all().await;
        advance(1).await;
        drain(&mut h.events);

        h.mailbox
            .fail_next_uid_search(MailboxError::Protocol("NO search refused".into()));
        let err = h.manager.fetch_one("acc", 1).await.unwrap_err();
        assert!(matches!(err, SessionError::Search(_)));
        assert_eq!(err.kind(), ErrorKind::Protocol);

        let events = drain(&mut h.events);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::EmailContentError { uid: 1, kind: ErrorKind::Protocol, .. }
        )));
        assert_eq!(h.manager.state("acc").await, Some(SessionState::Ready));

        // Same session serves the next request
        h.manager.fetch_one("acc", 1).await.unwrap();
        assert_eq!(h.mailbox.count("connect"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_transport_failure_drops_session() {
        let mut h = harness(interested_mailbox());
        h.manager.connect_all().await;
        advance(1).await;
        drain(&mut h.events);

        h.mailbox
            .fail_next_full_fetch(MailboxError::Transport("connection reset".into()));
        let err = h.manager.fetch_one("acc", 1).await.unwrap_err();
        assert!(matches!(err, SessionError::Fetch(_)));
        assert_eq!(err.kind(), ErrorKind::Transport);

        let events = drain(&mut h.events);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::EmailContentError { uid: 1, kind: ErrorKind::Transport, .. }
        )));
        assert_eq!(h.manager.state("acc").await, Some(SessionState::Disconnected));

        // Scheduled reconnect after the first backoff delay
        advance(15).await;
        assert_eq!(h.manager.state("acc").await, Some(SessionState::Ready));
        assert_eq!(h.mailbox.count("connect"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_teardown_does_not_block_other_accounts() {
        let mailbox = interested_mailbox();
        mailbox.stall_logout("a", Duration::from_secs(60));
        let h = harness_for(&["a", "b"], mailbox);
        let manager = Arc::new(h.manager);
        manager.connect_all().await;
        advance(1).await;

        let reconnecting = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.reconnect("a").await })
        };
        // Let the reconnect reach the stalled logout
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(h.mailbox.count("logout"), 1);

        let started = tokio::time::Instant::now();
        let message = manager.fetch_one("b", 1).await.unwrap();
        assert_eq!(message.classification, Category::Interested);
        assert!(started.elapsed() < Duration::from_secs(1));

        reconnecting.await.unwrap().unwrap();
        advance(1).await;
        assert_eq!(manager.state("a").await, Some(SessionState::Ready));
        assert_eq!(manager.state("b").await, Some(SessionState::Ready));
    }

    #[tokio::test(start_paused = true)]
    async fn test_requested_content_survives_full_event_stream() {
        let h = harness(interested_mailbox());
        let Harness {
            manager,
            mut events,
            ..
        } = h;
        manager.connect_all().await;

        // Nobody reads while background polls overflow the channel
        advance(30 * (EVENT_CHANNEL_CAPACITY as u64 + 10)).await;
        assert_eq!(events.len(), EVENT_CHANNEL_CAPACITY);

        let reader = async {
            for _ in 0..2 * EVENT_CHANNEL_CAPACITY {
                match events.recv().await {
                    Some(SessionEvent::EmailContent { uid: 1, .. }) => return true,
                    Some(_) => {}
                    None => return false,
                }
            }
            false
        };
        let (result, delivered) = tokio::join!(manager.fetch_one("acc", 1), reader);

        assert!(result.is_ok());
        assert!(delivered);
    }
}
