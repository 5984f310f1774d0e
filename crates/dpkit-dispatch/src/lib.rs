//! Event dispatch for dpkit.
//!
//! A [`Dispatcher`] fans each parsed [`Event`] out to:
//!
//! - **persistent listeners** registered with [`Dispatcher::on`], which
//!   fire on every event of their kind until removed, and
//! - **one-shot waiters** created by [`Dispatcher::wait_for`], which
//!   resolve on the first event of their kind that satisfies a predicate,
//!   or fail on timeout or close.
//!
//! # Ordering
//!
//! Events are dispatched in arrival order by a single consumer (see
//! [`Dispatcher::run`]). For each event, listeners are fed in registration
//! order, then waiters are resolved in registration order. One event can
//! satisfy any number of waiters.
//!
//! Every listener owns a worker task with an unbounded queue, so it sees
//! events strictly in arrival order, one at a time, while a slow listener
//! never holds up dispatch or other listeners.
//!
//! # Locking
//!
//! The registry sits behind a `std::sync::Mutex` that is only ever held for
//! short, non-awaiting sections. Predicates and handlers run after the lock
//! is released, so user code can call back into the dispatcher freely.

mod error;
mod filter;
mod registry;
mod waiter;

pub use error::{DispatchError, HandlerError};
pub use filter::EventFilter;
pub use registry::ListenerId;

use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dpkit_protocol::{Event, EventKind, Grammar};
use dpkit_source::{LogSource, SourceError};
use futures_util::FutureExt;
use tokio::sync::{mpsc, oneshot, watch};

use crate::registry::{Handler, HandlerFuture, Registry};
use crate::waiter::WaiterGuard;

struct Shared {
    registry: Mutex<Registry>,
    closed: watch::Sender<bool>,
}

/// A cheap, cloneable handle to one listener/waiter registry.
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                registry: Mutex::new(Registry::default()),
                closed,
            }),
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.shared
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Persistent listeners
    // -----------------------------------------------------------------------

    /// Registers `handler` for every future event of `kind`.
    ///
    /// The handler runs on a worker task of its own and is called once per
    /// event, in arrival order; the next call starts when the previous one
    /// has finished. A handler that needs to wait for later events should
    /// spawn that wait instead of holding up its own queue. A handler that
    /// returns `Err` or panics is logged; the listener stays registered.
    ///
    /// # Errors
    /// [`DispatchError::SessionClosed`] if the dispatcher is closed.
    ///
    /// # Panics
    /// When called outside a Tokio runtime, since the worker task is
    /// spawned here.
    pub fn on<F, Fut>(&self, kind: EventKind, handler: F) -> Result<ListenerId, DispatchError>
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |event: Arc<Event>| -> HandlerFuture { Box::pin(handler(event)) });
        let (queue, events) = mpsc::unbounded_channel();
        let id = {
            let mut registry = self.registry();
            if registry.is_closed() {
                return Err(DispatchError::SessionClosed);
            }
            let id = registry.next_listener_id();
            registry.add_listener(id, kind, queue);
            id
        };
        tokio::spawn(listener_worker(id, kind, handler, events));
        tracing::debug!(%id, ?kind, "listener registered");
        Ok(id)
    }

    /// Removes a listener. Returns `false` if it was already gone.
    pub fn off(&self, id: ListenerId) -> bool {
        let removed = self.registry().remove_listener(id);
        if removed {
            tracing::debug!(%id, "listener removed");
        }
        removed
    }

    // -----------------------------------------------------------------------
    // One-shot waiters
    // -----------------------------------------------------------------------

    /// Waits for the next event of `kind` for which `predicate` holds.
    ///
    /// The waiter is removed exactly once: by the dispatch that resolves
    /// it, by the deadline, by [`close`](Self::close), or when this future
    /// is dropped.
    ///
    /// # Errors
    /// [`DispatchError::Timeout`] if `timeout` elapses first,
    /// [`DispatchError::SessionClosed`] if the dispatcher is or becomes
    /// closed.
    pub async fn wait_for<P>(
        &self,
        kind: EventKind,
        predicate: P,
        timeout: Option<Duration>,
    ) -> Result<Arc<Event>, DispatchError>
    where
        P: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        let (reply_tx, mut reply_rx) = oneshot::channel();
        let id = {
            let mut registry = self.registry();
            if registry.is_closed() {
                return Err(DispatchError::SessionClosed);
            }
            registry.add_waiter(kind, Arc::new(predicate), reply_tx)
        };
        let guard = WaiterGuard::new(id, self.clone());

        let received = match timeout {
            Some(deadline) => tokio::time::timeout(deadline, &mut reply_rx).await.ok(),
            None => Some((&mut reply_rx).await),
        };

        match received {
            Some(Ok(result)) => result,
            Some(Err(_)) => Err(DispatchError::SessionClosed),
            None => {
                if guard.cancel() {
                    tracing::debug!(?kind, "waiter timed out");
                    Err(DispatchError::Timeout(kind))
                } else {
                    // A dispatch or close took the waiter just as the
                    // deadline fired; it sends right after releasing the lock.
                    reply_rx.await.unwrap_or(Err(DispatchError::SessionClosed))
                }
            }
        }
    }

    /// Waits for the next event of `kind`, whatever its fields.
    pub async fn wait_for_next(
        &self,
        kind: EventKind,
        timeout: Option<Duration>,
    ) -> Result<Arc<Event>, DispatchError> {
        self.wait_for(kind, |_| true, timeout).await
    }

    /// Waits for the next event of `kind` that passes `filter`.
    pub async fn wait_for_match(
        &self,
        kind: EventKind,
        filter: EventFilter,
        timeout: Option<Duration>,
    ) -> Result<Arc<Event>, DispatchError> {
        self.wait_for(kind, filter.into_predicate(), timeout).await
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Delivers one event to every matching listener and waiter.
    ///
    /// Listeners only get the event queued, so this never blocks and needs
    /// no runtime. Returns how many listeners and waiters received it.
    pub fn dispatch(&self, event: Event) -> usize {
        let event = Arc::new(event);
        let kind = event.kind;

        let (listeners, waiters) = {
            let registry = self.registry();
            if registry.is_closed() {
                return 0;
            }
            (registry.listeners_for(kind), registry.waiters_for(kind))
        };

        let queued = listeners
            .iter()
            .filter(|(_, queue)| queue.send(Arc::clone(&event)).is_ok())
            .count();

        let matched: Vec<_> = waiters
            .into_iter()
            .filter(|(_, predicate)| {
                catch_unwind(AssertUnwindSafe(|| predicate(&event))).unwrap_or_else(|_| {
                    tracing::warn!(?kind, "waiter predicate panicked");
                    false
                })
            })
            .map(|(id, _)| id)
            .collect();

        let mut resolved = 0;
        if !matched.is_empty() {
            let replies: Vec<_> = {
                let mut registry = self.registry();
                matched
                    .into_iter()
                    .filter_map(|id| registry.take_waiter(id))
                    .collect()
            };
            for reply in replies {
                if reply.send(Ok(Arc::clone(&event))).is_ok() {
                    resolved += 1;
                }
            }
        }

        tracing::trace!(?kind, listeners = queued, waiters = resolved, "event dispatched");
        queued + resolved
    }

    /// Pulls lines from `source`, parses them with `grammar`, and dispatches
    /// the resulting events until the source ends or the dispatcher is
    /// closed. Closes the dispatcher on the way out.
    pub async fn run<S: LogSource>(&self, mut source: S, grammar: &Grammar) -> Result<(), SourceError> {
        let result = loop {
            let line = tokio::select! {
                line = source.next_line() => line,
                _ = self.closed() => break Ok(()),
            };
            match line {
                Ok(Some(line)) => {
                    if let Some(event) = grammar.parse_at(&line.text, line.received_at) {
                        self.dispatch(event);
                    }
                }
                Ok(None) => {
                    tracing::info!("log source ended");
                    break Ok(());
                }
                Err(e) => break Err(e),
            }
        };
        self.close();
        result
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Resolves every pending waiter with
    /// [`DispatchError::SessionClosed`], drops all listeners, and rejects
    /// further registrations. Idempotent.
    pub fn close(&self) {
        let replies = {
            let mut registry = self.registry();
            if registry.is_closed() {
                return;
            }
            registry.close()
        };
        let pending = replies.len();
        for reply in replies {
            let _ = reply.send(Err(DispatchError::SessionClosed));
        }
        self.shared.closed.send_replace(true);
        tracing::info!(pending, "dispatcher closed");
    }

    /// Completes once [`close`](Self::close) has been called.
    pub async fn closed(&self) {
        let mut rx = self.shared.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    pub fn is_closed(&self) -> bool {
        self.registry().is_closed()
    }

    pub fn listener_count(&self) -> usize {
        self.registry().listener_count()
    }

    pub fn pending_waiters(&self) -> usize {
        self.registry().pending_waiters()
    }
}

/// Runs one listener's handler over its queue until the listener is removed
/// or the dispatcher closes.
async fn listener_worker(
    id: ListenerId,
    kind: EventKind,
    handler: Handler,
    mut events: mpsc::UnboundedReceiver<Arc<Event>>,
) {
    while let Some(event) = events.recv().await {
        match AssertUnwindSafe(async { handler(event).await })
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(%id, ?kind, error = %e, "event handler failed"),
            Err(_) => tracing::warn!(%id, ?kind, "event handler panicked"),
        }
    }
    tracing::debug!(%id, "listener worker finished");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_resolved_while_deadline_fires_returns_event() {
        let dispatcher = Dispatcher::new();
        let waiter = {
            let d = dispatcher.clone();
            tokio::spawn(async move { d.wait_for_next(EventKind::Chat, Some(Duration::from_secs(1))).await })
        };
        while dispatcher.pending_waiters() < 1 {
            tokio::task::yield_now().await;
        }

        // Take the slot the way a dispatch does, but hold the send back
        // until the deadline has passed.
        let slot = {
            let mut registry = dispatcher.registry();
            let (id, _) = registry.waiters_for(EventKind::Chat).remove(0);
            registry.take_waiter(id).unwrap()
        };
        tokio::time::advance(Duration::from_secs(2)).await;
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        assert!(!waiter.is_finished());

        let _ = slot.send(Ok(Arc::new(Event::new(EventKind::Chat).with_field("message", "late"))));
        let event = waiter.await.unwrap().unwrap();
        assert_eq!(event.text("message"), Some("late"));
    }

    #[test]
    fn test_dispatch_outside_runtime_queues_for_listener() {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let dispatcher = Dispatcher::new();
        {
            let _entered = runtime.enter();
            dispatcher
                .on(EventKind::Chat, |_| async { Ok::<(), HandlerError>(()) })
                .unwrap();
        }

        assert_eq!(dispatcher.dispatch(Event::new(EventKind::Chat)), 1);
        assert_eq!(dispatcher.dispatch(Event::new(EventKind::Elim)), 0);
    }
}
