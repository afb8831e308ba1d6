//! Timers.

pub use std::time::Duration;
pub use tokio::time::{sleep, timeout, Instant};

/// Returned by [`timeout`] when the deadline passes first.
pub type Elapsed = tokio::time::error::Elapsed;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timeout_elapses_on_pending_future() {
        let outcome = timeout(Duration::from_millis(10), std::future::pending::<()>()).await;
        let _: Elapsed = outcome.unwrap_err();
    }
}
