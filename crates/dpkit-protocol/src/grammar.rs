//! Log-line grammar: an ordered table of line templates.
//!
//! A template is literal text with named captures:
//!
//! | Capture | Matches |
//! |---|---|
//! | `{name}` | any text, as little as possible |
//! | `{name:int}` | an optionally signed run of digits |
//! | `{name:team}` | `Red`, `Blue`, `Purple` or `Yellow` |
//! | `{name:mode}` | a game mode label, e.g. `Team Flag CTF` |
//!
//! `{{` and `}}` stand for literal braces. Templates must match the whole
//! line (after the optional `[HH:MM:SS] ` prefix); the matcher backtracks, so
//! `{a}: {b}` splits `x: y: z` at the first `: `.
//!
//! Rules are tried in order and the first one that matches wins. Chat rules
//! sit right after the server-only banners so that a player typing
//! `x disconnected.` produces a chat event, not a disconnect.

use std::time::SystemTime;

use crate::event::{Event, EventKind, FieldValue, LogClock};
use crate::text;
use crate::types::{GameMode, Team};
use crate::ProtocolError;

/// What a capture is allowed to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureClass {
    Text,
    Int,
    Team,
    Mode,
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Capture {
        name: &'static str,
        class: CaptureClass,
    },
}

// ---------------------------------------------------------------------------
// Pattern
// ---------------------------------------------------------------------------

/// A compiled line template.
#[derive(Debug, Clone)]
pub struct Pattern {
    template: &'static str,
    segments: Vec<Segment>,
}

impl Pattern {
    /// Compiles a template.
    ///
    /// # Errors
    /// [`ProtocolError::InvalidPattern`] for unbalanced braces, empty or
    /// duplicate capture names, unknown classes, or two captures with no
    /// literal text between them.
    pub fn new(template: &'static str) -> Result<Self, ProtocolError> {
        let invalid = |reason: &str| ProtocolError::InvalidPattern {
            template: template.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = template;

        while let Some(c) = rest.chars().next() {
            if let Some(after) = rest.strip_prefix("{{") {
                literal.push('{');
                rest = after;
            } else if let Some(after) = rest.strip_prefix("}}") {
                literal.push('}');
                rest = after;
            } else if c == '}' {
                return Err(invalid("unmatched '}'"));
            } else if c == '{' {
                let close = rest.find('}').ok_or_else(|| invalid("unclosed '{'"))?;
                let spec = &rest[1..close];
                let (name, class) = match spec.split_once(':') {
                    None => (spec, CaptureClass::Text),
                    Some((name, "int")) => (name, CaptureClass::Int),
                    Some((name, "team")) => (name, CaptureClass::Team),
                    Some((name, "mode")) => (name, CaptureClass::Mode),
                    Some(_) => return Err(invalid("unknown capture class")),
                };
                if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                    return Err(invalid("capture names must be non-empty identifiers"));
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                } else if matches!(segments.last(), Some(Segment::Capture { .. })) {
                    return Err(invalid("captures must be separated by literal text"));
                }
                let duplicate = segments
                    .iter()
                    .any(|s| matches!(s, Segment::Capture { name: n, .. } if *n == name));
                if duplicate {
                    return Err(invalid("duplicate capture name"));
                }
                segments.push(Segment::Capture { name, class });
                rest = &rest[close + 1..];
            } else {
                literal.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { template, segments })
    }

    pub fn template(&self) -> &'static str {
        self.template
    }

    /// Names of all captures, in template order.
    pub fn capture_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.segments.iter().filter_map(|s| match s {
            Segment::Capture { name, .. } => Some(*name),
            Segment::Literal(_) => None,
        })
    }

    /// Matches the whole of `line`, returning the captured fields.
    pub fn captures(&self, line: &str) -> Option<Vec<(&'static str, FieldValue)>> {
        let mut out = Vec::new();
        self.match_from(0, line, 0, &mut out).then_some(out)
    }

    fn match_from(
        &self,
        seg: usize,
        line: &str,
        pos: usize,
        out: &mut Vec<(&'static str, FieldValue)>,
    ) -> bool {
        let Some(segment) = self.segments.get(seg) else {
            return pos == line.len();
        };
        let rest = &line[pos..];

        match segment {
            Segment::Literal(lit) => {
                rest.starts_with(lit.as_str()) && self.match_from(seg + 1, line, pos + lit.len(), out)
            }
            Segment::Capture { name, class } => {
                let next = match self.segments.get(seg + 1) {
                    Some(Segment::Literal(lit)) => Some(lit.as_str()),
                    _ => None,
                };
                for len in candidate_lengths(*class, rest) {
                    let tail = &rest[len..];
                    let fits = match next {
                        Some(lit) => tail.starts_with(lit),
                        None => tail.is_empty(),
                    };
                    if !fits {
                        continue;
                    }
                    let Some(value) = capture_value(*class, &rest[..len]) else {
                        continue;
                    };
                    out.push((*name, value));
                    if self.match_from(seg + 1, line, pos + len, out) {
                        return true;
                    }
                    out.pop();
                }
                false
            }
        }
    }
}

/// Every length a capture of `class` could take at the start of `rest`,
/// in preference order.
fn candidate_lengths(class: CaptureClass, rest: &str) -> Vec<usize> {
    match class {
        CaptureClass::Text => rest
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(rest.len()))
            .collect(),
        CaptureClass::Int => {
            let sign = usize::from(rest.starts_with('-'));
            let digits = rest[sign..].bytes().take_while(u8::is_ascii_digit).count();
            (1..=digits).rev().map(|n| sign + n).collect()
        }
        CaptureClass::Team => Team::PLAYING
            .iter()
            .map(Team::as_str)
            .filter(|name| rest.starts_with(*name))
            .map(str::len)
            .collect(),
        CaptureClass::Mode => GameMode::ALL
            .iter()
            .map(GameMode::label)
            .filter(|label| rest.starts_with(*label))
            .map(str::len)
            .collect(),
    }
}

fn capture_value(class: CaptureClass, raw: &str) -> Option<FieldValue> {
    match class {
        CaptureClass::Text => Some(FieldValue::Text(text::decode(raw))),
        CaptureClass::Int => raw.parse().ok().map(FieldValue::Int),
        CaptureClass::Team | CaptureClass::Mode => Some(FieldValue::from(raw)),
    }
}

// ---------------------------------------------------------------------------
// Rule / Grammar
// ---------------------------------------------------------------------------

/// A template bound to the event kind it produces.
#[derive(Debug, Clone)]
pub struct Rule {
    pub kind: EventKind,
    pub pattern: Pattern,
    /// Fields added to every event this rule produces.
    pub fixed_fields: Vec<(&'static str, FieldValue)>,
}

impl Rule {
    pub fn new(kind: EventKind, template: &'static str) -> Result<Self, ProtocolError> {
        Ok(Self {
            kind,
            pattern: Pattern::new(template)?,
            fixed_fields: Vec::new(),
        })
    }

    pub fn with_fixed(mut self, name: &'static str, value: impl Into<FieldValue>) -> Self {
        self.fixed_fields.push((name, value.into()));
        self
    }

    fn apply(&self, line: &str) -> Option<Event> {
        let captures = self.pattern.captures(line)?;
        let mut event = Event::new(self.kind);
        for (name, value) in captures.into_iter().chain(self.fixed_fields.iter().cloned()) {
            event.fields.insert(name, value);
        }
        Some(event)
    }
}

/// An ordered rule table; the first matching rule wins.
#[derive(Debug, Clone, Default)]
pub struct Grammar {
    rules: Vec<Rule>,
}

impl Grammar {
    /// An empty grammar that matches nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a rule with the lowest priority so far.
    pub fn push(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.push(rule);
        self
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Classifies one line, stamping the event with the current time.
    pub fn parse(&self, line: &str) -> Option<Event> {
        self.parse_at(line, SystemTime::now())
    }

    /// Classifies one line received at `received_at`.
    ///
    /// Trailing `\r`/`\n` and a leading `[HH:MM:SS] ` are stripped first.
    /// Lines no rule matches yield `None`.
    pub fn parse_at(&self, line: &str, received_at: SystemTime) -> Option<Event> {
        self.parse_with(line, received_at, |_| true)
    }

    /// Classifies `line` with every rule except those producing `kind`.
    ///
    /// Used when a match of `kind` turned out to be bogus, e.g. a chat line
    /// whose speaker is not connected: the line may still be a genuine
    /// event of another kind.
    pub fn parse_excluding(&self, line: &str, received_at: SystemTime, kind: EventKind) -> Option<Event> {
        self.parse_with(line, received_at, |rule| rule.kind != kind)
    }

    fn parse_with(&self, line: &str, received_at: SystemTime, allow: impl Fn(&Rule) -> bool) -> Option<Event> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (clock, body) = LogClock::split_prefix(line);
        let Some(event) = self
            .rules
            .iter()
            .filter(|rule| allow(rule))
            .find_map(|rule| rule.apply(body))
        else {
            tracing::trace!(line = body, "no rule matched");
            return None;
        };
        Some(event.with_timestamp(received_at).with_clock(clock))
    }

    /// The built-in Paintball 2 grammar.
    pub fn paintball2() -> Self {
        Self::try_paintball2().expect("built-in templates are valid")
    }

    fn try_paintball2() -> Result<Self, ProtocolError> {
        let rules = vec![
            Rule::new(EventKind::MapChange, "== Map Loaded: {map} ==")?,
            Rule::new(EventKind::GameMode, "=== {mode:mode} ===")?,
            Rule::new(EventKind::RoundStarted, "Round started...")?,
            Rule::new(EventKind::GameEnd, "0:00 left in match.")?,
            Rule::new(EventKind::RoundEnd, "{team:team} team wins the round!")?,
            // chat
            Rule::new(EventKind::Chat, "[OBS] {nick}: {message}")?.with_fixed("channel", "observer"),
            Rule::new(EventKind::Chat, "[ELIM] {nick}: {message}")?.with_fixed("channel", "eliminated"),
            Rule::new(EventKind::Chat, "{nick}: {message}")?.with_fixed("channel", "all"),
            // eliminations
            Rule::new(
                EventKind::Elim,
                "*{killer_nick} ({killer_weapon}) eliminated *{victim_nick} ({victim_weapon}).",
            )?
            .with_fixed("suicide", false),
            Rule::new(EventKind::Elim, "*{killer_nick} eliminated himself with a paintgren.")?
                .with_fixed("suicide", true)
                .with_fixed("killer_weapon", "paintgren"),
            Rule::new(EventKind::Elim, "*{killer_nick} eliminated herself with a paintgren.")?
                .with_fixed("suicide", true)
                .with_fixed("killer_weapon", "paintgren"),
            Rule::new(
                EventKind::Elim,
                "{killer_nick}[{killer_id:int}] killed {victim_nick}[{victim_id:int}] with {weapon}",
            )?,
            Rule::new(
                EventKind::ElimTeamsFlag,
                "*{team:team}'s {nick} earned {points:int} points for possesion of eliminated teams flag!",
            )?,
            // flags
            Rule::new(EventKind::FlagCaptured, "*{team:team}'s {nick} returned the *{flag:team} flag!")?,
            Rule::new(EventKind::FlagCaptured, "*{team:team}'s {nick} returned the flag!")?,
            Rule::new(EventKind::Respawn, "*{team:team}'s {nick} revived!")?,
            Rule::new(EventKind::FlagGrab, "*{nick} got the *{flag:team} flag!")?,
            Rule::new(EventKind::FlagGrab, "*{nick} got the flag!")?,
            Rule::new(EventKind::FlagDrop, "*{nick} dropped the flag!")?,
            // players
            Rule::new(EventKind::Entrance, "{nick} entered the game ({build}) [{addr}]")?,
            Rule::new(EventKind::TeamSwitch, "{nick} switched from *{old_team:team} to *{new_team:team}.")?,
            Rule::new(EventKind::TeamSwitch, "{nick} joined the *{new_team:team} team.")?
                .with_fixed("old_team", Team::Observer.as_str()),
            Rule::new(EventKind::TeamSwitch, "{nick} is now observing.")?
                .with_fixed("new_team", Team::Observer.as_str()),
            Rule::new(EventKind::NameChange, "{old_nick} changed name to {new_nick}.")?,
            Rule::new(EventKind::Disconnect, "{nick} disconnected.")?,
        ];

        Ok(Self { rules })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_rejects_bad_templates() {
        for bad in ["{", "}", "{}", "{a:float}", "{a}{b}", "{a} {a}", "{a b}"] {
            assert!(
                matches!(Pattern::new(bad), Err(ProtocolError::InvalidPattern { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_pattern_escaped_braces_are_literal() {
        let pattern = Pattern::new("{{{word}}}").unwrap();
        let caps = pattern.captures("{hi}").unwrap();
        assert_eq!(caps, vec![("word", FieldValue::from("hi"))]);
    }

    #[test]
    fn test_pattern_text_capture_is_lazy() {
        let pattern = Pattern::new("{a}: {b}").unwrap();
        let caps = pattern.captures("x: y: z").unwrap();
        assert_eq!(caps[0], ("a", FieldValue::from("x")));
        assert_eq!(caps[1], ("b", FieldValue::from("y: z")));
    }

    #[test]
    fn test_pattern_is_anchored_to_whole_line() {
        let pattern = Pattern::new("{nick} disconnected.").unwrap();
        assert!(pattern.captures("a disconnected. really").is_none());
    }

    #[test]
    fn test_pattern_int_backtracks() {
        let pattern = Pattern::new("{a:int}1").unwrap();
        let caps = pattern.captures("-421").unwrap();
        assert_eq!(caps, vec![("a", FieldValue::Int(-42))]);
    }

    #[test]
    fn test_pattern_capture_names_in_order() {
        let pattern = Pattern::new("{a} and {b:int}.").unwrap();
        assert_eq!(pattern.capture_names().collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(pattern.template(), "{a} and {b:int}.");
    }

    #[test]
    fn test_paintball2_builds() {
        assert!(Grammar::try_paintball2().is_ok());
        assert!(!Grammar::paintball2().rules().is_empty());
    }

    #[test]
    fn test_empty_grammar_matches_nothing() {
        assert!(Grammar::new().parse("anything").is_none());
    }

    #[test]
    fn test_custom_rule_appended() {
        let grammar = Grammar::new()
            .with_rule(Rule::new(EventKind::GameEnd, "Match over").unwrap());
        assert_eq!(grammar.parse("Match over\r\n").unwrap().kind, EventKind::GameEnd);
    }
}
