mod retry;

pub use retry::{Backoff, RetryConfig, with_retry};
