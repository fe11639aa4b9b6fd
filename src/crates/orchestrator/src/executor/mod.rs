//! Retry/backoff policy shared by every node that calls out to a sandbox
//! or collaborator port, applied only to errors classified as transient.

pub mod retry;

pub use retry::{classify_error, retry_with_backoff, ErrorClass, RetryConfig};
