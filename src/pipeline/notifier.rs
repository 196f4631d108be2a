use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use uuid::Uuid;

use crate::models::analysis::AnalysisResult;

/// Outcome of a resolved job, delivered to every registered observer.
#[derive(Debug, Clone)]
pub struct CompletionEvent {
    pub subject_id: Uuid,
    pub result: AnalysisResult,
    pub success: bool,
}

/// Handle returned by `subscribe`, used to unregister the observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Observer = std::sync::Arc<dyn Fn(&CompletionEvent) + Send + Sync>;

/// Fan-out of job outcomes to registered observers.
///
/// Observers run synchronously in subscription order after each job
/// resolves. A panicking observer is caught and logged; it never prevents
/// later observers from running or stalls the worker loop.
pub struct CompletionNotifier {
    next_id: AtomicU64,
    observers: RwLock<BTreeMap<u64, Observer>>,
}

impl CompletionNotifier {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            observers: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn subscribe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&CompletionEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, std::sync::Arc::new(observer));
        ObserverId(id)
    }

    /// Returns true when the observer was registered.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id.0)
            .is_some()
    }

    pub fn observer_count(&self) -> usize {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub(crate) fn notify(&self, event: &CompletionEvent) {
        // Snapshot the registry so observers may subscribe/unsubscribe
        // from inside a callback without deadlocking.
        let observers: Vec<(u64, Observer)> = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, observer)| (*id, observer.clone()))
            .collect();

        for (id, observer) in observers {
            let call = std::panic::catch_unwind(AssertUnwindSafe(|| observer(event)));
            if call.is_err() {
                tracing::error!(
                    observer_id = id,
                    subject_id = %event.subject_id,
                    "completion observer panicked"
                );
            }
        }
    }
}

impl Default for CompletionNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn event() -> CompletionEvent {
        CompletionEvent {
            subject_id: Uuid::new_v4(),
            result: AnalysisResult::empty_success(),
            success: true,
        }
    }

    #[test]
    fn test_subscribe_and_notify() {
        let notifier = CompletionNotifier::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&seen);
        notifier.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        notifier.notify(&event());
        notifier.notify(&event());
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let notifier = CompletionNotifier::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&seen);
        let id = notifier.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        notifier.notify(&event());
        assert!(notifier.unsubscribe(id));
        assert!(!notifier.unsubscribe(id));
        notifier.notify(&event());

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(notifier.observer_count(), 0);
    }

    #[test]
    fn test_panicking_observer_is_isolated() {
        let notifier = CompletionNotifier::new();
        let seen = Arc::new(AtomicUsize::new(0));

        notifier.subscribe(|_| panic!("observer bug"));
        let counter = Arc::clone(&seen);
        notifier.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        notifier.notify(&event());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_observer_receives_failure_event() {
        let notifier = CompletionNotifier::new();
        let failures = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&failures);
        notifier.subscribe(move |e| {
            if !e.success {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        let failure = CompletionEvent {
            subject_id: Uuid::new_v4(),
            result: AnalysisResult::failure("timed out"),
            success: false,
        };
        notifier.notify(&failure);
        assert_eq!(failures.load(Ordering::SeqCst), 1);
    }
}
