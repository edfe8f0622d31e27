use super::Topic;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

type Callback = Arc<dyn Fn(Value) + Send + Sync + 'static>;

/// Handle identifying one registered callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

#[derive(Clone)]
struct Subscriber {
    id: SubscriptionId,
    callback: Callback,
}

/// A callback that panicked while handling an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberFault {
    pub topic: Topic,
    pub subscription: SubscriptionId,
    pub message: String,
}

/// Delivery counts for a single publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub delivered: usize,
    pub faulted: usize,
}

/// Topic → ordered callback list.
///
/// Publishing iterates over a snapshot of the subscriber list, so a callback may
/// subscribe or unsubscribe (even itself) without disturbing the delivery in progress.
/// A panicking callback is logged as a [`SubscriberFault`] and the remaining callbacks
/// still run.
#[derive(Default)]
pub struct EventRegistry {
    topics: Mutex<HashMap<Topic, Vec<Subscriber>>>,
    next_id: AtomicU64,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `topic`. Callbacks run in registration order.
    pub fn subscribe<F>(&self, topic: impl Into<Topic>, callback: F) -> SubscriptionId
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let topic = topic.into();
        tracing::debug!(topic = %topic, subscription = id.0, "Registered subscriber");

        self.topics.lock().entry(topic).or_default().push(Subscriber {
            id,
            callback: Arc::new(callback),
        });
        id
    }

    /// Remove one callback, or every callback on the topic when `subscription` is `None`.
    ///
    /// Returns how many callbacks were removed.
    pub fn unsubscribe(&self, topic: &Topic, subscription: Option<SubscriptionId>) -> usize {
        let mut topics = self.topics.lock();
        let removed = match subscription {
            Some(id) => {
                let Some(subscribers) = topics.get_mut(topic) else {
                    return 0;
                };
                let before = subscribers.len();
                subscribers.retain(|s| s.id != id);
                let removed = before - subscribers.len();
                if subscribers.is_empty() {
                    topics.remove(topic);
                }
                removed
            }
            None => topics.remove(topic).map(|s| s.len()).unwrap_or(0),
        };

        tracing::debug!(topic = %topic, removed, "Removed subscribers");
        removed
    }

    /// Deliver `payload` to every callback registered on `topic`.
    pub fn publish(&self, topic: &Topic, payload: Value) -> DispatchOutcome {
        let snapshot: Vec<Subscriber> = match self.topics.lock().get(topic) {
            Some(subscribers) => subscribers.clone(),
            None => return DispatchOutcome::default(),
        };

        let mut outcome = DispatchOutcome::default();
        for subscriber in snapshot {
            let callback = Arc::clone(&subscriber.callback);
            let value = payload.clone();
            match catch_unwind(AssertUnwindSafe(move || callback(value))) {
                Ok(()) => outcome.delivered += 1,
                Err(panic) => {
                    let fault = SubscriberFault {
                        topic: topic.clone(),
                        subscription: subscriber.id,
                        message: panic_message(panic.as_ref()),
                    };
                    tracing::error!(
                        topic = %fault.topic,
                        subscription = fault.subscription.0,
                        "Error in event handler: {}",
                        fault.message
                    );
                    outcome.faulted += 1;
                }
            }
        }
        outcome
    }

    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.topics.lock().get(topic).map(Vec::len).unwrap_or(0)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "subscriber panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&'static str) -> Callback) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_for_factory = Arc::clone(&log);
        let factory = move |name: &'static str| -> Callback {
            let log = Arc::clone(&log_for_factory);
            Arc::new(move |_| log.lock().push(name.to_string()))
        };
        (log, factory)
    }

    #[test]
    fn test_callbacks_run_in_registration_order() {
        let registry = EventRegistry::new();
        let (log, make) = recorder();
        let a = make("a");
        let b = make("b");
        registry.subscribe("x", move |v| a(v));
        registry.subscribe("x", move |v| b(v));

        let outcome = registry.publish(&Topic::parse("x"), json!(1));

        assert_eq!(outcome.delivered, 2);
        assert_eq!(*log.lock(), vec!["a", "b"]);
    }

    #[test]
    fn test_unsubscribe_one_keeps_others() {
        let registry = EventRegistry::new();
        let (log, make) = recorder();
        let a = make("a");
        let b = make("b");
        let id_a = registry.subscribe(Topic::Notification, move |v| a(v));
        registry.subscribe(Topic::Notification, move |v| b(v));

        assert_eq!(registry.unsubscribe(&Topic::Notification, Some(id_a)), 1);
        registry.publish(&Topic::Notification, json!({}));

        assert_eq!(*log.lock(), vec!["b"]);
        assert_eq!(registry.subscriber_count(&Topic::Notification), 1);
    }

    #[test]
    fn test_unsubscribe_all_clears_topic() {
        let registry = EventRegistry::new();
        registry.subscribe(Topic::TaskUpdate, |_| {});
        registry.subscribe(Topic::TaskUpdate, |_| {});
        registry.subscribe(Topic::AgentStatus, |_| {});

        assert_eq!(registry.unsubscribe(&Topic::TaskUpdate, None), 2);
        assert_eq!(registry.subscriber_count(&Topic::TaskUpdate), 0);
        assert_eq!(registry.subscriber_count(&Topic::AgentStatus), 1);
    }

    #[test]
    fn test_unsubscribe_unknown_is_noop() {
        let registry = EventRegistry::new();
        let id = registry.subscribe(Topic::Error, |_| {});
        assert_eq!(registry.unsubscribe(&Topic::Pong, Some(id)), 0);
        assert_eq!(registry.unsubscribe(&Topic::Pong, None), 0);
        assert_eq!(registry.subscriber_count(&Topic::Error), 1);
    }

    #[test]
    fn test_panicking_subscriber_is_isolated() {
        let registry = EventRegistry::new();
        let (log, make) = recorder();
        let after = make("after");
        registry.subscribe(Topic::Message, |_| panic!("boom"));
        registry.subscribe(Topic::Message, move |v| after(v));

        let outcome = registry.publish(&Topic::Message, json!(null));

        assert_eq!(outcome, DispatchOutcome { delivered: 1, faulted: 1 });
        assert_eq!(*log.lock(), vec!["after"]);
    }

    #[test]
    fn test_subscriber_may_mutate_registry_during_dispatch() {
        let registry = Arc::new(EventRegistry::new());
        let (log, make) = recorder();

        let inner = Arc::clone(&registry);
        let late = make("late");
        registry.subscribe(Topic::Collaboration, move |_| {
            let late = Arc::clone(&late);
            inner.subscribe(Topic::Collaboration, move |v| late(v));
            inner.unsubscribe(&Topic::Notification, None);
        });
        let second = make("second");
        registry.subscribe(Topic::Collaboration, move |v| second(v));

        let outcome = registry.publish(&Topic::Collaboration, json!(null));

        // The callback added mid-dispatch is not part of this delivery.
        assert_eq!(outcome.delivered, 2);
        assert_eq!(*log.lock(), vec!["second"]);
        assert_eq!(registry.subscriber_count(&Topic::Collaboration), 3);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let registry = EventRegistry::new();
        assert_eq!(
            registry.publish(&Topic::Pong, json!(null)),
            DispatchOutcome::default()
        );
    }
}
