//! Synchronization primitives.
//!
//! All of these are async-aware: waiting on them yields to the runtime
//! instead of blocking the worker thread.

pub use tokio::sync::{
    broadcast, mpsc, watch, Mutex, MutexGuard, Notify, OnceCell, OwnedMutexGuard, RwLock,
};
pub use tokio_util::sync::CancellationToken;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_child_token_follows_parent() {
        let parent = CancellationToken::new();
        let child = parent.child_token();
        parent.cancel();
        child.cancelled().await;
        assert!(child.is_cancelled());
    }
}
