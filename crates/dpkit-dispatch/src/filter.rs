use std::fmt;
use std::sync::Arc;

use dpkit_protocol::{Event, FieldValue};

/// Field-equality constraints plus an optional custom check.
///
/// Every named field must be present with exactly the given value; the
/// check, if any, must also pass.
///
/// ```
/// use dpkit_dispatch::EventFilter;
/// use dpkit_protocol::{Event, EventKind};
///
/// let filter = EventFilter::new()
///     .field("victim_nick", "whoa")
///     .check(|e| e.flag("suicide") == Some(false));
///
/// let event = Event::new(EventKind::Elim)
///     .with_field("victim_nick", "whoa")
///     .with_field("suicide", false);
/// assert!(filter.matches(&event));
/// ```
#[derive(Clone, Default)]
pub struct EventFilter {
    fields: Vec<(&'static str, FieldValue)>,
    check: Option<Arc<dyn Fn(&Event) -> bool + Send + Sync>>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `name` to equal `value`.
    pub fn field(mut self, name: &'static str, value: impl Into<FieldValue>) -> Self {
        self.fields.push((name, value.into()));
        self
    }

    /// Adds a custom check. A second call replaces the first.
    pub fn check(mut self, check: impl Fn(&Event) -> bool + Send + Sync + 'static) -> Self {
        self.check = Some(Arc::new(check));
        self
    }

    pub fn matches(&self, event: &Event) -> bool {
        self.fields
            .iter()
            .all(|(name, value)| event.get(name) == Some(value))
            && self.check.as_ref().is_none_or(|check| check(event))
    }

    /// Turns the filter into a predicate for [`crate::Dispatcher::wait_for`].
    pub fn into_predicate(self) -> impl Fn(&Event) -> bool + Send + Sync + 'static {
        move |event| self.matches(event)
    }
}

impl fmt::Debug for EventFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventFilter")
            .field("fields", &self.fields)
            .field("check", &self.check.is_some())
            .finish()
    }
}
