//! Observable state holders
//!
//! Both types wrap `tokio::sync::watch`. [`StateCell`] publishes a value and
//! only wakes watchers when the value actually changes. [`ConflatedSignal`]
//! carries no value at all: fires that happen while nobody is looking
//! collapse into one wake-up, and new receivers never see past fires.

use core_async::sync::watch;

/// Current value plus change notification.
///
/// ```
/// use core_sync::state::StateCell;
///
/// let cell = StateCell::new(vec![1]);
/// let watcher = cell.subscribe();
/// assert!(!cell.set(vec![1]));
/// assert!(!watcher.has_changed().unwrap());
/// assert!(cell.set(vec![1, 2]));
/// assert!(watcher.has_changed().unwrap());
/// ```
#[derive(Debug)]
pub struct StateCell<T> {
    sender: watch::Sender<T>,
}

impl<T> StateCell<T>
where
    T: Clone + PartialEq,
{
    pub fn new(initial: T) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    /// Snapshot of the current value
    pub fn get(&self) -> T {
        self.sender.borrow().clone()
    }

    /// Publish `value` unless it equals the current one.
    ///
    /// Returns whether watchers were notified.
    pub fn set(&self, value: T) -> bool {
        self.sender.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        })
    }

    /// Watch the value. The current value counts as already seen.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.sender.subscribe()
    }
}

impl<T: Clone + PartialEq + Default> Default for StateCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Fire-and-forget notification with a single slot.
#[derive(Debug)]
pub struct ConflatedSignal {
    sender: watch::Sender<u64>,
}

impl ConflatedSignal {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(0);
        Self { sender }
    }

    pub fn fire(&self) {
        self.sender.send_modify(|fired| *fired = fired.wrapping_add(1));
    }

    /// Total fires so far
    pub fn fire_count(&self) -> u64 {
        *self.sender.borrow()
    }

    /// A receiver that wakes for fires after this call only.
    pub fn subscribe(&self) -> SignalReceiver {
        SignalReceiver {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for ConflatedSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of a [`ConflatedSignal`].
#[derive(Debug, Clone)]
pub struct SignalReceiver {
    receiver: watch::Receiver<u64>,
}

impl SignalReceiver {
    /// Wait for the next fire.
    ///
    /// Returns `false` once the signal is dropped.
    pub async fn recv(&mut self) -> bool {
        self.receiver.changed().await.is_ok()
    }

    /// Consume a pending fire without waiting.
    pub fn try_recv(&mut self) -> bool {
        match self.receiver.has_changed() {
            Ok(true) => {
                self.receiver.borrow_and_update();
                true
            }
            _ => false,
        }
    }
}
