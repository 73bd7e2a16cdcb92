//! # Memory Pressure
//!
//! The host environment owns the platform's low-memory signal. It forwards
//! that signal to a [`PressureNotifier`], which evicts every registered memory
//! tier that is still alive.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

/// Something that can shed memory when the host asks for it
pub trait PressureListener: Send + Sync {
    fn on_memory_pressure(&self);
}

/// Fan-out point for memory-pressure signals.
///
/// Listeners are held weakly, so registering a cache does not keep it alive.
#[derive(Clone, Default)]
pub struct PressureNotifier {
    listeners: Arc<Mutex<Vec<Weak<dyn PressureListener>>>>,
}

impl PressureNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: Arc<dyn PressureListener>) {
        self.listeners.lock().push(Arc::downgrade(&listener));
    }

    /// Deliver a memory-pressure signal, returning how many listeners received it
    pub fn notify(&self) -> usize {
        // Collect live listeners first so none of them run under the lock
        let live: Vec<Arc<dyn PressureListener>> = {
            let mut listeners = self.listeners.lock();
            listeners.retain(|listener| listener.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };

        for listener in &live {
            listener.on_memory_pressure();
        }

        debug!(listeners = live.len(), "Delivered memory pressure signal");
        live.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl PressureListener for Counter {
        fn on_memory_pressure(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_notifies_live_listeners() {
        let notifier = PressureNotifier::new();
        let a = Arc::new(Counter::default());
        let b = Arc::new(Counter::default());
        notifier.register(a.clone());
        notifier.register(b.clone());

        assert_eq!(notifier.notify(), 2);
        assert_eq!(a.0.load(Ordering::SeqCst), 1);
        assert_eq!(b.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropped_listeners_are_pruned() {
        let notifier = PressureNotifier::new();
        let kept = Arc::new(Counter::default());
        notifier.register(kept.clone());
        notifier.register(Arc::new(Counter::default()));

        assert_eq!(notifier.notify(), 1);
        assert_eq!(notifier.listeners.lock().len(), 1);
    }
}
