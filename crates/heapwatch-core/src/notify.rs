//! Change notification channel.
//!
//! A zero-payload fan-out: observers learn *that* a sample was appended and
//! read the history themselves. Every listener owns an unbounded queue, so it
//! receives exactly one wake-up per notification however far behind it is,
//! and sending never waits for receivers.

use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;

/// Producer side, owned by the tracker.
#[derive(Debug, Default)]
pub struct ChangeNotifier {
    listeners: Mutex<Vec<mpsc::UnboundedSender<()>>>,
}

impl ChangeNotifier {
    /// Create a notifier with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal every current listener. Returns immediately.
    ///
    /// Listeners that have been dropped are forgotten.
    pub fn notify(&self) {
        self.lock().retain(|tx| tx.send(()).is_ok());
    }

    /// Register a new listener. It only observes notifications sent after
    /// this call.
    pub fn subscribe(&self) -> ChangeListener {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(tx);
        ChangeListener { rx }
    }

    /// Number of live listeners.
    pub fn listener_count(&self) -> usize {
        let mut listeners = self.lock();
        listeners.retain(|tx| !tx.is_closed());
        listeners.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::UnboundedSender<()>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Observer side; one per subscriber.
#[derive(Debug)]
pub struct ChangeListener {
    rx: mpsc::UnboundedReceiver<()>,
}

impl ChangeListener {
    /// Wait for the next change.
    ///
    /// Returns `false` once the tracker that owns the channel is gone and
    /// every pending notification has been drained.
    pub async fn changed(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }

    /// Consume a pending change without waiting.
    pub fn try_changed(&mut self) -> bool {
        self.rx.try_recv().is_ok()
    }
}
