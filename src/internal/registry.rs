use std::{collections::HashMap, sync::Arc};

use crate::Listener;

/// Per-context map of event name to listeners, in subscription order.
///
/// Duplicates are kept: a listener subscribed twice runs twice per delivery.
/// An event never maps to an empty list; the entry is removed instead.
#[derive(Debug)]
pub(crate) struct Registry<C> {
    listeners: HashMap<Arc<str>, Vec<Listener<C>>>,
}

impl<C> Default for Registry<C> {
    fn default() -> Self {
        Self {
            listeners: HashMap::new(),
        }
    }
}

impl<C> Registry<C> {
    pub fn subscribe(&mut self, event: &str, listener: &Listener<C>) {
        match self.listeners.get_mut(event) {
            Some(list) => list.push(listener.clone()),
            None => {
                self.listeners.insert(Arc::from(event), vec![listener.clone()]);
            }
        }
    }

    /// Remove every entry equal to `listener`. Returns `true` when the event
    /// has no listeners left (or never had any), i.e. when the broker
    /// subscription should be dropped.
    pub fn unsubscribe(&mut self, event: &str, listener: &Listener<C>) -> bool {
        let Some(list) = self.listeners.get_mut(event) else {
            return true;
        };
        list.retain(|l| l != listener);
        if list.is_empty() {
            self.listeners.remove(event);
            true
        } else {
            false
        }
    }

    /// Snapshot of the listeners for `event`, oldest first.
    pub fn listeners(&self, event: &str) -> Option<Vec<Listener<C>>> {
        self.listeners.get(event).cloned()
    }

    pub fn events(&self) -> Vec<Arc<str>> {
        let mut events: Vec<_> = self.listeners.keys().cloned().collect();
        events.sort();
        events
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ctx;

    fn listener() -> Listener<Ctx> {
        Listener::new(|_: &Ctx, _: &str| {})
    }

    #[test]
    fn test_keeps_order_and_duplicates() {
        let (a, b) = (listener(), listener());
        let mut registry = Registry::default();
        registry.subscribe("x", &a);
        registry.subscribe("x", &b);
        registry.subscribe("x", &a);

        let list = registry.listeners("x").unwrap();
        assert_eq!(list.len(), 3);
        assert!(list[0] == a && list[1] == b && list[2] == a);
    }

    #[test]
    fn test_unsubscribe_removes_every_match() {
        let (a, b) = (listener(), listener());
        let mut registry = Registry::default();
        registry.subscribe("x", &a);
        registry.subscribe("x", &b);
        registry.subscribe("x", &a);

        assert!(!registry.unsubscribe("x", &a));
        assert_eq!(registry.listeners("x").unwrap(), vec![b.clone()]);

        assert!(registry.unsubscribe("x", &b));
        assert!(registry.listeners("x").is_none());
        assert!(registry.events().is_empty());
    }

    #[test]
    fn test_unsubscribe_unknown_event() {
        let mut registry = Registry::<Ctx>::default();
        assert!(registry.unsubscribe("never", &listener()));
    }

    #[test]
    fn test_unsubscribe_foreign_listener_keeps_list() {
        let (a, b) = (listener(), listener());
        let mut registry = Registry::default();
        registry.subscribe("x", &a);
        assert!(!registry.unsubscribe("x", &b));
        assert_eq!(registry.listeners("x").unwrap().len(), 1);
    }

    #[test]
    fn test_events_sorted() {
        let a = listener();
        let mut registry = Registry::default();
        registry.subscribe("b", &a);
        registry.subscribe("a", &a);
        assert_eq!(registry.events(), vec![Arc::<str>::from("a"), Arc::<str>::from("b")]);
    }
}
