use std::sync::Arc;

use serde_json::Value;

use crate::client::Client;
use crate::error::RpcError;

/// Identifies a registered observer for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

/// A call received from the peer.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingCall {
    /// The peer's id, echoed verbatim in the reply.
    pub id: Value,
    pub method: String,
    pub params: Value,
}

pub(crate) type NotificationFn = Arc<dyn Fn(&Client, &str, &Value) + Send + Sync>;
pub(crate) type CallFn = Arc<dyn Fn(&Client, &IncomingCall) -> bool + Send + Sync>;
pub(crate) type FailedFn = Arc<dyn Fn(&Client, &RpcError) + Send + Sync>;

/// A list of callbacks with ids, invoked in registration order.
pub(crate) struct Registry<F> {
    entries: Vec<(ObserverId, F)>,
}

impl<F: Clone> Registry<F> {
    pub(crate) fn add(&mut self, id: ObserverId, f: F) {
        self.entries.push((id, f));
    }

    pub(crate) fn remove(&mut self, id: ObserverId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    /// Copy the callbacks out so they can run without holding a lock.
    pub(crate) fn snapshot(&self) -> Vec<F> {
        self.entries.iter().map(|(_, f)| f.clone()).collect()
    }
}

impl<F> Default for Registry<F> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

/// Hands out observer ids.
#[derive(Debug, Default)]
pub(crate) struct IdSource {
    last: u64,
}

impl IdSource {
    pub(crate) fn next(&mut self) -> ObserverId {
        self.last += 1;
        ObserverId(self.last)
    }
}

/// Observers attached to one client.
#[derive(Default)]
pub(crate) struct ClientObservers {
    ids: IdSource,
    notifications: Registry<(Option<String>, NotificationFn)>,
    calls: Registry<CallFn>,
    failed: Registry<FailedFn>,
    /// Consulted after `calls`; installed by the owning server.
    fallback: Option<CallFn>,
}

impl ClientObservers {
    pub(crate) fn add_notification(
        &mut self,
        method: Option<String>,
        f: NotificationFn,
    ) -> ObserverId {
        let id = self.ids.next();
        self.notifications.add(id, (method, f));
        id
    }

    pub(crate) fn add_call(&mut self, f: CallFn) -> ObserverId {
        let id = self.ids.next();
        self.calls.add(id, f);
        id
    }

    pub(crate) fn add_failed(&mut self, f: FailedFn) -> ObserverId {
        let id = self.ids.next();
        self.failed.add(id, f);
        id
    }

    pub(crate) fn set_fallback(&mut self, f: CallFn) {
        self.fallback = Some(f);
    }

    pub(crate) fn remove(&mut self, id: ObserverId) -> bool {
        self.notifications.remove(id) || self.calls.remove(id) || self.failed.remove(id)
    }

    pub(crate) fn notification_handlers(&self, method: &str) -> Vec<NotificationFn> {
        self.notifications
            .snapshot()
            .into_iter()
            .filter(|(filter, _)| filter.as_deref().is_none_or(|m| m == method))
            .map(|(_, f)| f)
            .collect()
    }

    pub(crate) fn call_handlers(&self) -> Vec<CallFn> {
        let mut handlers = self.calls.snapshot();
        handlers.extend(self.fallback.clone());
        handlers
    }

    pub(crate) fn failed_handlers(&self) -> Vec<FailedFn> {
        self.failed.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_notification() -> NotificationFn {
        Arc::new(|_: &Client, _: &str, _: &Value| {})
    }

    #[test]
    fn notification_filter_by_method() {
        let mut observers = ClientObservers::default();
        observers.add_notification(Some("a".into()), noop_notification());
        observers.add_notification(None, noop_notification());
        observers.add_notification(Some("b".into()), noop_notification());

        assert_eq!(observers.notification_handlers("a").len(), 2);
        assert_eq!(observers.notification_handlers("b").len(), 2);
        assert_eq!(observers.notification_handlers("c").len(), 1);
    }

    #[test]
    fn removal_by_id() {
        let mut observers = ClientObservers::default();
        let a = observers.add_notification(None, noop_notification());
        let b = observers.add_call(Arc::new(|_: &Client, _: &IncomingCall| true));
        assert_ne!(a, b);

        assert!(observers.remove(a));
        assert!(!observers.remove(a));
        assert!(observers.remove(b));
        assert!(observers.notification_handlers("x").is_empty());
        assert!(observers.call_handlers().is_empty());
    }

    #[test]
    fn fallback_runs_after_call_observers() {
        let mut observers = ClientObservers::default();
        observers.set_fallback(Arc::new(|_: &Client, _: &IncomingCall| true));
        observers.add_call(Arc::new(|_: &Client, _: &IncomingCall| false));
        assert_eq!(observers.call_handlers().len(), 2);
    }
}
