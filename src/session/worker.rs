//! Per-account worker: owns the protocol session, its timers and the command queue.
//!
//! Every protocol operation for an account runs on this task, one at a time.
//! Teardown goes through the cancellation token, which also drops the timers.

use chrono::{Days, NaiveDate, Utc};
use std::future::{Future, poll_fn};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};
use tokio_util::sync::CancellationToken;

use super::error::SessionError;
use super::events::{SessionEvent, emit};
use super::pipeline::Pipeline;
use super::state::SessionState;
use crate::account::Account;
use crate::actor::{Backoff, RetryConfig};
use crate::classify::Category;
use crate::config::{Config, ConnectionConfig, PollingConfig};
use crate::constants::{COMMAND_CHANNEL_CAPACITY, LOGOUT_TIMEOUT_SECS};
use crate::mail::parser::{extract_preview, parse_header_fields, parse_message};
use crate::mail::{MailboxConnector, MailboxError, MailboxSession, MessageContent, MessageSummary};

/// Tuning shared by all workers.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub poll_interval: Duration,
    pub window_days: u64,
    pub preview_length: usize,
    pub connect_timeout: Duration,
    pub operation_timeout: Duration,
    pub reconnect: RetryConfig,
}

impl WorkerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.polling, &config.connection)
    }

    pub fn new(polling: &PollingConfig, conn: &ConnectionConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(polling.interval_secs.max(1)),
            window_days: polling.window_days.max(0) as u64,
            preview_length: polling.preview_length,
            connect_timeout: conn.connect_timeout(),
            operation_timeout: conn.operation_timeout(),
            reconnect: RetryConfig::new(
                conn.max_reconnect_attempts,
                Duration::from_secs(conn.reconnect_delay_secs),
                Duration::from_secs(conn.max_reconnect_delay_secs),
            ),
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::new(&PollingConfig::default(), &ConnectionConfig::default())
    }
}

/// A fully fetched message with its resolved category.
#[derive(Debug, Clone)]
pub struct ClassifiedMessage {
    pub content: MessageContent,
    pub classification: Category,
}

type Responder<T> = oneshot::Sender<Result<T, SessionError>>;

pub(crate) enum WorkerCommand {
    FetchList {
        respond_to: Responder<Vec<MessageSummary>>,
    },
    FetchOne {
        uid: u32,
        respond_to: Responder<ClassifiedMessage>,
    },
    /// Fetch and classify without touching the cache
    FetchForReply {
        uid: u32,
        respond_to: Responder<ClassifiedMessage>,
    },
}

/// Manager-side handle of a running worker.
pub(crate) struct WorkerHandle {
    pub cmd_tx: mpsc::Sender<WorkerCommand>,
    pub state: watch::Receiver<SessionState>,
    pub cancel: CancellationToken,
    pub join: JoinHandle<()>,
}

pub(crate) fn spawn_worker<C: MailboxConnector>(
    account: Arc<Account>,
    connector: Arc<C>,
    pipeline: Arc<Pipeline>,
    settings: WorkerSettings,
    event_tx: mpsc::Sender<SessionEvent>,
) -> WorkerHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);
    let cancel = CancellationToken::new();

    let worker = Worker {
        backoff: Backoff::new(settings.reconnect.clone()),
        account,
        connector,
        pipeline,
        settings,
        session: None,
        timers: Timers::default(),
        state_tx,
        event_tx,
        cmd_rx,
        cancel: cancel.clone(),
    };
    let join = tokio::spawn(worker.run());

    WorkerHandle {
        cmd_tx,
        state: state_rx,
        cancel,
        join,
    }
}

enum Fired {
    Poll,
    Reconnect,
}

/// Poll ticker and pending reconnect, both owned by the worker.
#[derive(Default)]
struct Timers {
    poll: Option<Interval>,
    reconnect: Option<Pin<Box<Sleep>>>,
}

impl Timers {
    fn arm_poll(&mut self, period: Duration, immediate: bool) {
        let start = if immediate {
            Instant::now()
        } else {
            Instant::now() + period
        };
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.poll = Some(interval);
    }

    fn arm_reconnect(&mut self, delay: Duration) {
        self.reconnect = Some(Box::pin(tokio::time::sleep(delay)));
    }

    fn cancel_poll(&mut self) {
        self.poll = None;
    }

    fn cancel_all(&mut self) {
        self.poll = None;
        self.reconnect = None;
    }

    fn poll_fired(&mut self, cx: &mut Context<'_>) -> Poll<Fired> {
        if let Some(sleep) = self.reconnect.as_mut()
            && sleep.as_mut().poll(cx).is_ready()
        {
            self.reconnect = None;
            return Poll::Ready(Fired::Reconnect);
        }
        if let Some(interval) = self.poll.as_mut()
            && interval.poll_tick(cx).is_ready()
        {
            return Poll::Ready(Fired::Poll);
        }
        Poll::Pending
    }

    /// Resolves when a timer fires; pending forever when none is armed.
    async fn fired(&mut self) -> Fired {
        poll_fn(|cx| self.poll_fired(cx)).await
    }
}

struct Worker<C: MailboxConnector> {
    account: Arc<Account>,
    connector: Arc<C>,
    pipeline: Arc<Pipeline>,
    settings: WorkerSettings,
    session: Option<C::Session>,
    timers: Timers,
    backoff: Backoff,
    state_tx: watch::Sender<SessionState>,
    event_tx: mpsc::Sender<SessionEvent>,
    cmd_rx: mpsc::Receiver<WorkerCommand>,
    cancel: CancellationToken,
}

/// Bound one protocol round-trip.
async fn bounded<T>(
    limit: Duration,
    op: impl Future<Output = Result<T, MailboxError>>,
) -> Result<T, MailboxError> {
    tokio::time::timeout(limit, op)
        .await
        .map_err(|_| MailboxError::Timeout(limit))?
}

impl<C: MailboxConnector> Worker<C> {
    async fn run(mut self) {
        let cancel = self.cancel.clone();
        tracing::debug!(account = %self.account.id, "Account worker started");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {}
            _ = self.connect() => {}
        }

        while !cancel.is_cancelled() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                cmd = self.cmd_rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = self.handle_command(cmd) => {}
                    }
                }
                fired = self.timers.fired() => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = self.on_timer(fired) => {}
                    }
                }
            }
        }

        self.teardown().await;
        tracing::debug!(account = %self.account.id, "Account worker stopped");
    }

    fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            tracing::debug!(account = %self.account.id, "Session {} -> {}", previous, state);
            emit(
                &self.event_tx,
                SessionEvent::SessionState {
                    account_id: self.account.id.clone(),
                    state,
                },
            );
        }
    }

    async fn open_session(&mut self) -> Result<(), MailboxError> {
        let limit = self.settings.connect_timeout;
        let session = bounded(limit, self.connector.connect(&self.account)).await?;
        self.session = Some(session);
        Ok(())
    }

    /// Connect, then arm polling with an immediate first fetch. On failure
    /// schedule the next attempt or open the circuit.
    async fn connect(&mut self) {
        self.timers.cancel_all();
        self.set_state(SessionState::Connecting);
        tracing::info!(account = %self.account.id, "Connecting to {}", self.account.address());

        match self.open_session().await {
            Ok(()) => self.on_connected(),
            Err(e) => {
                tracing::warn!(account = %self.account.id, "Connection failed: {}", e);
                self.set_state(SessionState::Disconnected);
                self.schedule_reconnect(&e);
            }
        }
    }

    fn on_connected(&mut self) {
        self.backoff.reset();
        self.set_state(SessionState::Ready);
        self.timers.arm_poll(self.settings.poll_interval, true);
        tracing::info!(account = %self.account.id, "Session ready");
    }

    fn schedule_reconnect(&mut self, error: &MailboxError) {
        match self.backoff.next_delay() {
            Some(delay) => {
                tracing::info!(
                    account = %self.account.id,
                    attempt = self.backoff.failures(),
                    "Reconnecting in {:?}",
                    delay
                );
                self.timers.arm_reconnect(delay);
            }
            None => {
                let attempts = self.backoff.failures().saturating_sub(1);
                tracing::error!(
                    account = %self.account.id,
                    "Giving up after {} reconnect attempts: {}",
                    attempts,
                    error
                );
                self.set_state(SessionState::Failed);
                emit(
                    &self.event_tx,
                    SessionEvent::AccountFailed {
                        account_id: self.account.id.clone(),
                        attempts,
                        error: error.to_string(),
                    },
                );
            }
        }
    }

    /// The session is unusable: stop polling first, drop it, then reconnect.
    fn on_session_lost(&mut self, error: &MailboxError) {
        self.timers.cancel_poll();
        self.session = None;
        tracing::warn!(account = %self.account.id, "Session lost: {}", error);
        self.set_state(SessionState::Disconnected);
        self.schedule_reconnect(error);
    }

    async fn close_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            let limit = Duration::from_secs(LOGOUT_TIMEOUT_SECS);
            if let Err(e) = bounded(limit, session.logout()).await {
                tracing::debug!(account = %self.account.id, "Logout failed: {}", e);
            }
        }
    }

    async fn teardown(&mut self) {
        self.timers.cancel_all();
        self.close_session().await;
        self.set_state(SessionState::Disconnected);
    }

    async fn on_timer(&mut self, fired: Fired) {
        match fired {
            Fired::Reconnect => self.connect().await,
            Fired::Poll => {
                let emails = match self.list_messages().await {
                    Ok(emails) => emails,
                    Err(e) => {
                        tracing::warn!(account = %self.account.id, "Polling failed: {}", e);
                        self.on_list_failure(&e);
                        Vec::new()
                    }
                };
                emit(
                    &self.event_tx,
                    SessionEvent::EmailsList {
                        account_id: self.account.id.clone(),
                        emails,
                    },
                );
            }
        }
    }

    /// A failed list operation on a live session invalidates it.
    fn on_list_failure(&mut self, error: &SessionError) {
        let cause = match error {
            SessionError::Inbox(e) | SessionError::Search(e) | SessionError::Fetch(e) => e.clone(),
            _ => return,
        };
        self.on_session_lost(&cause);
    }

    async fn handle_command(&mut self, cmd: WorkerCommand) {
        match cmd {
            WorkerCommand::FetchList { respond_to } => {
                let result = self.list_messages().await;
                if let Err(e) = &result {
                    self.on_list_failure(e);
                }
                let _ = respond_to.send(result);
            }
            WorkerCommand::FetchOne { uid, respond_to } => {
                let result = self.fetch_one(uid).await;
                let _ = respond_to.send(result);
            }
            WorkerCommand::FetchForReply { uid, respond_to } => {
                let result = if self.state() == SessionState::Ready {
                    self.fetch_content(uid).await.map(|content| ClassifiedMessage {
                        classification: self.pipeline.classify_full(&content),
                        content,
                    })
                } else {
                    Err(SessionError::NotAuthenticated)
                };
                if let Err(e) = &result
                    && let Some(cause) = e.lost_connection()
                {
                    let cause = cause.clone();
                    self.on_session_lost(&cause);
                }
                let _ = respond_to.send(result);
            }
        }
    }

    async fn list_messages(&mut self) -> Result<Vec<MessageSummary>, SessionError> {
        if self.state() != SessionState::Ready {
            return Err(SessionError::NoSession);
        }
        let limit = self.settings.operation_timeout;
        let preview_length = self.settings.preview_length;
        let since = Utc::now()
            .date_naive()
            .checked_sub_days(Days::new(self.settings.window_days))
            .unwrap_or(NaiveDate::MIN);

        let session = self.session.as_mut().ok_or(SessionError::NoSession)?;
        bounded(limit, session.open_inbox())
            .await
            .map_err(SessionError::Inbox)?;
        let uids = bounded(limit, session.search_since(since))
            .await
            .map_err(SessionError::Search)?;
        tracing::debug!(account = %self.account.id, "Found {} messages since {}", uids.len(), since);

        if uids.is_empty() {
            return Ok(Vec::new());
        }

        let previews = bounded(limit, session.fetch_previews(&uids, preview_length))
            .await
            .map_err(SessionError::Fetch)?;

        let mut emails = Vec::with_capacity(previews.len());
        for raw in previews {
            let headers = parse_header_fields(&raw.header);
            let preview = extract_preview(&raw.header, &raw.text, preview_length);
            let summary = self
                .pipeline
                .resolve_preview(&self.account.id, raw.uid, headers, preview)
                .await;
            emails.push(summary);
        }

        Ok(emails)
    }

    async fn fetch_one(&mut self, uid: u32) -> Result<ClassifiedMessage, SessionError> {
        if self.state() != SessionState::Ready {
            self.recover().await?;
        }

        match self.fetch_content(uid).await {
            Ok(content) => {
                let classification = self.pipeline.resolve_full(&self.account.id, &content).await;
                Ok(ClassifiedMessage {
                    content,
                    classification,
                })
            }
            Err(e) => {
                if let Some(cause) = e.lost_connection() {
                    let cause = cause.clone();
                    self.on_session_lost(&cause);
                }
                Err(e)
            }
        }
    }

    /// One-shot re-establishment for an on-demand fetch.
    async fn recover(&mut self) -> Result<(), SessionError> {
        let was_failed = self.state() == SessionState::Failed;
        tracing::info!(account = %self.account.id, "Session not ready, reconnecting for fetch");

        self.timers.cancel_all();
        self.close_session().await;
        self.set_state(SessionState::Connecting);

        match self.open_session().await {
            Ok(()) => {
                self.on_connected();
                Ok(())
            }
            Err(e) => {
                tracing::warn!(account = %self.account.id, "Recovery connect failed: {}", e);
                if was_failed {
                    self.set_state(SessionState::Failed);
                } else {
                    self.set_state(SessionState::Disconnected);
                    self.schedule_reconnect(&e);
                }
                Err(SessionError::Reconnect(e))
            }
        }
    }

    async fn fetch_content(&mut self, uid: u32) -> Result<MessageContent, SessionError> {
        let limit = self.settings.operation_timeout;
        let session = self.session.as_mut().ok_or(SessionError::NoSession)?;

        bounded(limit, session.open_inbox())
            .await
            .map_err(SessionError::Inbox)?;

        let found = bounded(limit, session.search_uid(uid))
            .await
            .map_err(SessionError::Search)?;
        if !found.contains(&uid) {
            return Err(SessionError::NotFound(uid));
        }

        let raw = bounded(limit, session.fetch_full(uid))
            .await
            .map_err(SessionError::Fetch)?
            .ok_or(SessionError::NotFound(uid))?;

        Ok(parse_message(uid, &raw)?)
    }
}
