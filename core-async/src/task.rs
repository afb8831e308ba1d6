//! Background task spawning.
//!
//! Tasks run on the ambient multi-threaded runtime and must be `Send`.
//! Dropping a [`JoinHandle`] detaches the task; call `abort` to stop it.

pub use tokio::task::{spawn, JoinHandle};

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawned_task_output_is_joined() {
        let handle: JoinHandle<usize> = spawn(async { "picker".len() });
        assert_eq!(handle.await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_aborted_task_reports_cancellation() {
        let handle = spawn(std::future::pending::<()>());
        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
    }
}
