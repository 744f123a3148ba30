use crate::domain_model::{ListenerId, SessionEvent};
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

pub type SessionListener = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Synchronous fan-out of lifecycle events to registered listeners.
/// Nothing is queued: a listener only sees events emitted while it is registered.
pub struct EventNotifier {
    listeners: Mutex<BTreeMap<ListenerId, SessionListener>>,
    next_id: AtomicU64,
}

impl EventNotifier {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe(&self, listener: SessionListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().insert(id, listener);
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.lock().remove(&id).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    /// Calls every listener once; returns how many returned normally.
    pub fn emit(&self, event: &SessionEvent) -> usize {
        // listeners may subscribe or unsubscribe from inside the callback
        let snapshot: Vec<(ListenerId, SessionListener)> =
            self.lock().iter().map(|(id, l)| (*id, l.clone())).collect();

        tracing::info!(event = event.name(), listeners = snapshot.len(), "session event");

        let mut delivered = 0;
        for (id, listener) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    tracing::error!(listener = id.0, event = event.name(), "session listener panicked")
                }
            }
        }
        delivered
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<ListenerId, SessionListener>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EventNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::AtomicUsize;

    fn counting(counter: &Arc<AtomicUsize>) -> SessionListener {
        let counter = counter.clone();
        Arc::new(move |_: &SessionEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn panicking_listener_does_not_starve_others() {
        let notifier = EventNotifier::new();
        let seen = Arc::new(AtomicUsize::new(0));
        notifier.subscribe(counting(&seen));
        notifier.subscribe(Arc::new(|_: &SessionEvent| panic!("listener bug")));
        notifier.subscribe(counting(&seen));

        let delivered = notifier.emit(&SessionEvent::TokenRefreshed { at: Utc::now() });
        assert_eq!(delivered, 2);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribed_listener_is_skipped() {
        let notifier = EventNotifier::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let id = notifier.subscribe(counting(&seen));
        assert!(notifier.unsubscribe(id));
        assert!(!notifier.unsubscribe(id));

        notifier.emit(&SessionEvent::TokenRefreshed { at: Utc::now() });
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn listener_can_unsubscribe_itself() {
        let notifier = Arc::new(EventNotifier::new());
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));
        let (n, s) = (notifier.clone(), slot.clone());
        let id = notifier.subscribe(Arc::new(move |_: &SessionEvent| {
            if let Some(id) = s.lock().unwrap().take() {
                n.unsubscribe(id);
            }
        }));
        *slot.lock().unwrap() = Some(id);

        notifier.emit(&SessionEvent::TokenRefreshed { at: Utc::now() });
        assert_eq!(notifier.listener_count(), 0);
    }
}
