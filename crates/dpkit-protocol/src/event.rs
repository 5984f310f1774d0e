//! Typed game events.
//!
//! An [`Event`] is what one log line turns into. The set of kinds is
//! closed; the per-kind payload lives in a small field map so that rules
//! can be added to a [`crate::Grammar`] without touching this type.

use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Every category of event the server log can produce.
///
/// `Timeout` is never produced by a grammar; it exists so callers can
/// report a deadline in the same vocabulary as real events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    Chat,
    Entrance,
    Disconnect,
    Elim,
    ElimTeamsFlag,
    Respawn,
    FlagGrab,
    FlagDrop,
    FlagCaptured,
    NameChange,
    TeamSwitch,
    RoundStarted,
    RoundEnd,
    GameEnd,
    MapChange,
    GameMode,
    Timeout,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A single captured value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Bool(bool),
    Text(String),
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

/// Wall-clock time printed by the server in front of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LogClock {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl LogClock {
    /// Parses `HH:MM:SS`.
    pub fn parse(text: &str) -> Option<Self> {
        let bytes = text.as_bytes();
        if bytes.len() != 8 || bytes[2] != b':' || bytes[5] != b':' {
            return None;
        }
        let two = |i: usize| -> Option<u8> {
            let (a, b) = (bytes[i], bytes[i + 1]);
            (a.is_ascii_digit() && b.is_ascii_digit()).then(|| (a - b'0') * 10 + (b - b'0'))
        };
        let clock = Self {
            hour: two(0)?,
            minute: two(3)?,
            second: two(6)?,
        };
        (clock.hour < 24 && clock.minute < 60 && clock.second < 60).then_some(clock)
    }

    /// Splits a leading `[HH:MM:SS] ` off `line`.
    pub fn split_prefix(line: &str) -> (Option<Self>, &str) {
        let parsed = line
            .strip_prefix('[')
            .and_then(|rest| rest.get(..8).zip(rest.get(8..)))
            .and_then(|(clock, rest)| Some((Self::parse(clock)?, rest.strip_prefix("] ")?)));
        match parsed {
            Some((clock, rest)) => (Some(clock), rest),
            None => (None, line),
        }
    }
}

impl fmt::Display for LogClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

/// A classified log line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub kind: EventKind,
    /// When the line was received.
    pub timestamp: SystemTime,
    /// Time printed by the server, if the line carried one.
    pub clock: Option<LogClock>,
    pub fields: BTreeMap<&'static str, FieldValue>,
}

impl Event {
    /// Creates an event with no fields, stamped now.
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            timestamp: SystemTime::now(),
            clock: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: &'static str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name, value.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_clock(mut self, clock: Option<LogClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Returns a text field, or `None` if absent or not text.
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.fields.get(name)? {
            FieldValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.fields.get(name)? {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn flag(&self, name: &str) -> Option<bool> {
        match self.fields.get(name)? {
            FieldValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_clock_split_prefix() {
        let (clock, rest) = LogClock::split_prefix("[19:54:18] hTml: test");
        assert_eq!(
            clock,
            Some(LogClock {
                hour: 19,
                minute: 54,
                second: 18
            })
        );
        assert_eq!(rest, "hTml: test");
    }

    #[test]
    fn test_log_clock_split_prefix_absent_or_invalid() {
        assert_eq!(LogClock::split_prefix("hello"), (None, "hello"));
        assert_eq!(LogClock::split_prefix("[99:00:00] x"), (None, "[99:00:00] x"));
        assert_eq!(LogClock::split_prefix("[OBS] a: b"), (None, "[OBS] a: b"));
        assert_eq!(LogClock::split_prefix("[1"), (None, "[1"));
    }

    #[test]
    fn test_event_accessors_check_type() {
        let event = Event::new(EventKind::Elim)
            .with_field("killer_id", 1_i64)
            .with_field("weapon", "Spyder SE")
            .with_field("suicide", false);
        assert_eq!(event.int("killer_id"), Some(1));
        assert_eq!(event.text("weapon"), Some("Spyder SE"));
        assert_eq!(event.flag("suicide"), Some(false));
        assert_eq!(event.text("killer_id"), None);
        assert_eq!(event.int("missing"), None);
    }

    #[test]
    fn test_event_serializes_untagged_fields() {
        let event = Event::new(EventKind::Chat)
            .with_field("nick", "mRokita")
            .with_field("points", 3_i64);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "Chat");
        assert_eq!(json["fields"]["nick"], "mRokita");
        assert_eq!(json["fields"]["points"], 3);
    }
}
