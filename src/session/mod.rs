//! Per-account IMAP sessions.
//!
//! This module is split into:
//! - `manager.rs` - Public operations addressed by account id
//! - `worker.rs` - The task owning one account's connection, timers and queue
//! - `pipeline.rs` - Classification, cache and alert decision per message
//! - `events.rs` / `state.rs` / `error.rs` - What callers observe

mod error;
mod events;
mod manager;
mod pipeline;
mod state;
mod worker;

#[cfg(test)]
mod testing;

pub use manager::SessionManager;
pub use worker::WorkerSettings;
