//! Removal-listener registry shared by sensor backends.
use crate::device::{ListenerId, RemovalListener};
use std::collections::HashMap;

/// Registered removal listeners, keyed by the id handed back to the subscriber.
#[derive(Default)]
pub struct RemovalListeners {
    next_id: ListenerId,
    listeners: HashMap<ListenerId, RemovalListener>,
}

impl RemovalListeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener and returns its id.
    pub fn add_listener(&mut self, listener: RemovalListener) -> ListenerId {
        let id = self.next_id;
        self.listeners.insert(id, listener);
        self.next_id += 1;
        id
    }

    /// Unregisters a listener. Unknown ids are ignored.
    pub fn remove_listener(&mut self, id: ListenerId) {
        self.listeners.remove(&id);
    }

    /// Fires every registered listener.
    pub fn notify_all(&mut self) {
        for listener in self.listeners.values_mut() {
            listener();
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl std::fmt::Debug for RemovalListeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemovalListeners")
            .field("next_id", &self.next_id)
            .field("len", &self.listeners.len())
            .finish()
    }
}

/// Removal listeners plus a one-shot "fired" latch for the open handle.
///
/// [`fire`](Self::fire) notifies listeners at most once until
/// [`reset`](Self::reset) is called for the next handle. A listener that
/// subscribes after the latch fired, while the handle is still open, is
/// notified immediately.
#[derive(Debug, Default)]
pub struct RemovalLatch {
    listeners: RemovalListeners,
    fired: bool,
}

impl RemovalLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-arm for a freshly opened handle.
    pub fn reset(&mut self) {
        self.fired = false;
    }

    /// Notify listeners unless this handle's removal was already reported.
    pub fn fire(&mut self) {
        if !self.fired {
            self.fired = true;
            self.listeners.notify_all();
        }
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// Register `listener`; if the open handle is already gone, notify it now.
    pub fn subscribe(&mut self, mut listener: RemovalListener, handle_open: bool) -> ListenerId {
        if self.fired && handle_open {
            listener();
        }
        self.listeners.add_listener(listener)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) {
        self.listeners.remove_listener(id);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}
