//! The listener and waiter table behind a [`crate::Dispatcher`].
//!
//! `Registry` itself is plain data behind a `std::sync::Mutex`. Nothing in
//! here awaits or runs user code; the dispatcher snapshots what it needs,
//! drops the lock, and only then calls predicates or queues events for
//! listeners.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dpkit_protocol::{Event, EventKind};
use tokio::sync::{mpsc, oneshot};

use crate::{DispatchError, HandlerError};

pub(crate) type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send>>;
pub(crate) type Handler = Arc<dyn Fn(Arc<Event>) -> HandlerFuture + Send + Sync>;
pub(crate) type Predicate = Arc<dyn Fn(&Event) -> bool + Send + Sync>;
pub(crate) type WaiterReply = oneshot::Sender<Result<Arc<Event>, DispatchError>>;
/// Feeds one listener's worker task. Dropping it ends the worker once the
/// queued events are handled.
pub(crate) type ListenerQueue = mpsc::UnboundedSender<Arc<Event>>;

/// Identifies a persistent listener registered with `on`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct WaiterId(u64);

pub(crate) struct Listener {
    pub id: ListenerId,
    pub kind: EventKind,
    pub queue: ListenerQueue,
}

pub(crate) struct Waiter {
    pub id: WaiterId,
    pub kind: EventKind,
    pub predicate: Predicate,
    pub reply: WaiterReply,
}

#[derive(Default)]
pub(crate) struct Registry {
    next_id: u64,
    /// Registration order.
    listeners: Vec<Listener>,
    /// Registration order.
    waiters: Vec<Waiter>,
    closed: bool,
}

impl Registry {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn next_listener_id(&mut self) -> ListenerId {
        ListenerId(self.next_id())
    }

    pub fn add_listener(&mut self, id: ListenerId, kind: EventKind, queue: ListenerQueue) {
        self.listeners.push(Listener { id, kind, queue });
    }

    /// Returns `true` if the listener was present.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.id != id);
        self.listeners.len() != before
    }

    pub fn add_waiter(&mut self, kind: EventKind, predicate: Predicate, reply: WaiterReply) -> WaiterId {
        let id = WaiterId(self.next_id());
        self.waiters.push(Waiter {
            id,
            kind,
            predicate,
            reply,
        });
        id
    }

    /// Removes a waiter, handing back its reply slot if it was still
    /// pending. Whoever gets the slot is the only one allowed to resolve it.
    pub fn take_waiter(&mut self, id: WaiterId) -> Option<WaiterReply> {
        let pos = self.waiters.iter().position(|w| w.id == id)?;
        Some(self.waiters.remove(pos).reply)
    }

    pub fn listeners_for(&self, kind: EventKind) -> Vec<(ListenerId, ListenerQueue)> {
        self.listeners
            .iter()
            .filter(|l| l.kind == kind)
            .map(|l| (l.id, l.queue.clone()))
            .collect()
    }

    pub fn waiters_for(&self, kind: EventKind) -> Vec<(WaiterId, Predicate)> {
        self.waiters
            .iter()
            .filter(|w| w.kind == kind)
            .map(|w| (w.id, Arc::clone(&w.predicate)))
            .collect()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn pending_waiters(&self) -> usize {
        self.waiters.len()
    }

    /// Marks the registry closed and returns every pending reply slot.
    pub fn close(&mut self) -> Vec<WaiterReply> {
        self.closed = true;
        self.listeners.clear();
        self.waiters.drain(..).map(|w| w.reply).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn always() -> Predicate {
        Arc::new(|_: &Event| true)
    }

    fn add(reg: &mut Registry, kind: EventKind) -> (ListenerId, mpsc::UnboundedReceiver<Arc<Event>>) {
        let (queue, events) = mpsc::unbounded_channel();
        let id = reg.next_listener_id();
        reg.add_listener(id, kind, queue);
        (id, events)
    }

    #[test]
    fn test_take_waiter_is_exactly_once() {
        let mut reg = Registry::default();
        let (tx, _rx) = oneshot::channel();
        let id = reg.add_waiter(EventKind::Chat, always(), tx);

        assert!(reg.take_waiter(id).is_some());
        assert!(reg.take_waiter(id).is_none());
        assert_eq!(reg.pending_waiters(), 0);
    }

    #[test]
    fn test_listeners_for_keeps_registration_order() {
        let mut reg = Registry::default();
        let (a, _a) = add(&mut reg, EventKind::Elim);
        let (_, _b) = add(&mut reg, EventKind::Chat);
        let (c, _c) = add(&mut reg, EventKind::Elim);

        let ids: Vec<_> = reg.listeners_for(EventKind::Elim).into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![a, c]);
    }

    #[test]
    fn test_remove_listener_is_idempotent() {
        let mut reg = Registry::default();
        let (id, mut events) = add(&mut reg, EventKind::Chat);
        assert!(reg.remove_listener(id));
        assert!(events.try_recv().is_err());
        assert!(events.is_closed());
        assert!(!reg.remove_listener(id));
    }

    #[test]
    fn test_close_drains_everything() {
        let mut reg = Registry::default();
        let (_, events) = add(&mut reg, EventKind::Chat);
        let (tx, _rx) = oneshot::channel();
        reg.add_waiter(EventKind::Chat, always(), tx);

        let replies = reg.close();
        assert_eq!(replies.len(), 1);
        assert!(reg.is_closed());
        assert_eq!(reg.listener_count(), 0);
        assert_eq!(reg.pending_waiters(), 0);
        assert!(events.is_closed());
    }

    #[test]
    fn test_listener_id_display() {
        assert_eq!(ListenerId(7).to_string(), "listener-7");
    }
}
