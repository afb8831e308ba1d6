//! Async runtime surface for the picker core.
//!
//! Core crates spawn tasks, wait on timers and share async state through
//! this crate rather than naming the runtime directly, so the runtime is
//! chosen in one place.
//!
//! # Modules
//!
//! - `task`: spawning background work
//! - `time`: sleeps and deadlines
//! - `sync`: channels, cells, locks and cancellation
//!
//! ```rust
//! use core_async::time::{timeout, Duration};
//!
//! # async fn example() {
//! let handle = core_async::spawn(async { 7 });
//! let value = timeout(Duration::from_secs(1), handle).await;
//! # }
//! ```

pub mod sync;
pub mod task;
pub mod time;

pub use task::spawn;
pub use time::{sleep, timeout, Duration};

/// Wait on several branches and run the first one that completes.
pub use tokio::select;
