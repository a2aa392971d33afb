//! Retry policies for the HTTP collaborators
//!
//! Spreadsheet and marketplace calls are retried only on transient failures
//! (throttling and 5xx responses); everything else surfaces immediately.

pub mod config;
pub mod retry;

pub use config::ResilienceConfig;
pub use retry::{RetryConfig, RetryPolicy};
