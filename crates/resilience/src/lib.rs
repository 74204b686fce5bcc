//! Resilience patterns for remote calls
//!
//! - Retry with exponential backoff, driven by a caller-supplied retryability test
//! - Bounded timeouts that turn a hung call into an error
//!
//! # Example
//!
//! ```rust
//! use bookplayer_resilience::{with_timeout, RetryPolicy};
//! use std::time::Duration;
//!
//! # async fn demo() {
//! let policy = RetryPolicy::new(3).with_initial_delay(Duration::from_millis(100));
//! assert_eq!(policy.max_attempts(), 3);
//!
//! let value = with_timeout(Duration::from_secs(1), async { 42 }).await;
//! assert_eq!(value.ok(), Some(42));
//! # }
//! ```

mod error;
mod retry;
mod timeout;

pub use error::{ResilienceError, ResilienceResult};
pub use retry::{with_retry, RetryPolicy};
pub use timeout::{with_timeout, Timeout};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_exports_accessible() {
        let _: RetryPolicy = RetryPolicy::default();
        let _: Timeout = Timeout::new(std::time::Duration::from_secs(5));
    }
}
