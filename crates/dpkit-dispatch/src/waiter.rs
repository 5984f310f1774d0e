use crate::Dispatcher;
use crate::registry::WaiterId;

/// Drop guard that removes a waiter from the registry when the waiting
/// future finishes or is dropped.
///
/// Removal goes through [`Registry::take_waiter`](crate::registry::Registry),
/// so the guard, the deadline and a resolving dispatch can race freely:
/// exactly one of them gets the reply slot.
pub(crate) struct WaiterGuard {
    id: WaiterId,
    dispatcher: Dispatcher,
}

impl WaiterGuard {
    pub fn new(id: WaiterId, dispatcher: Dispatcher) -> Self {
        Self { id, dispatcher }
    }

    /// Removes the waiter now. Returns `true` if it was still pending.
    pub fn cancel(&self) -> bool {
        self.dispatcher.registry().take_waiter(self.id).is_some()
    }
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        self.cancel();
    }
}
