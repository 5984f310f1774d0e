//! Structured views of server replies: teams, game modes, status, roster.
//!
//! None of these are cached anywhere in dpkit. They are point-in-time
//! snapshots; callers re-query when they need fresh data.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;
use crate::text;

// ---------------------------------------------------------------------------
// Team
// ---------------------------------------------------------------------------

/// A team colour, or the observer pseudo-team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Team {
    Red,
    Blue,
    Purple,
    Yellow,
    Observer,
}

impl Team {
    /// The four playing teams, in the order the server lists them.
    pub const PLAYING: [Team; 4] = [Team::Red, Team::Blue, Team::Purple, Team::Yellow];

    /// The name as it appears in log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Red => "Red",
            Self::Blue => "Blue",
            Self::Purple => "Purple",
            Self::Yellow => "Yellow",
            Self::Observer => "Observer",
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Team {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Red" => Ok(Self::Red),
            "Blue" => Ok(Self::Blue),
            "Purple" => Ok(Self::Purple),
            "Yellow" => Ok(Self::Yellow),
            "Observer" => Ok(Self::Observer),
            _ => Err(()),
        }
    }
}

// ---------------------------------------------------------------------------
// GameMode
// ---------------------------------------------------------------------------

/// Game modes announced with `=== <mode> ===` on map load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameMode {
    Deathmatch,
    TeamFlagCtf,
    SingleFlagCtf,
    TeamSiege,
    TeamElim,
    TeamDeathmatch,
    TeamKoth,
    Pong,
}

impl GameMode {
    /// All known modes.
    pub const ALL: [GameMode; 8] = [
        GameMode::Deathmatch,
        GameMode::TeamFlagCtf,
        GameMode::SingleFlagCtf,
        GameMode::TeamSiege,
        GameMode::TeamElim,
        GameMode::TeamDeathmatch,
        GameMode::TeamKoth,
        GameMode::Pong,
    ];

    /// The label the server prints.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Deathmatch => "Deathmatch",
            Self::TeamFlagCtf => "Team Flag CTF",
            Self::SingleFlagCtf => "Single Flag CTF",
            Self::TeamSiege => "Team Siege",
            Self::TeamElim => "Team Elim",
            Self::TeamDeathmatch => "Team Deathmatch",
            Self::TeamKoth => "Team KOTH",
            Self::Pong => "Pong",
        }
    }

    /// Short code accepted by `sv newmap <map> <code>`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Deathmatch => "dm",
            Self::TeamFlagCtf => "ctf",
            Self::SingleFlagCtf => "1flag",
            Self::TeamSiege => "siege",
            Self::TeamElim => "elim",
            Self::TeamDeathmatch => "tdm",
            Self::TeamKoth => "koth",
            Self::Pong => "pong",
        }
    }

    /// Looks a mode up by its printed label.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.label() == label)
    }

    /// Looks a mode up by its short code.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.code() == code)
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Roster (`sv players`)
// ---------------------------------------------------------------------------

/// One row of the `sv players` listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Client slot, used by `kick` and `tban`.
    pub id: u32,
    /// Login-service account id; `None` for players without an account.
    pub dplogin: Option<String>,
    /// Nick in template form (see [`crate::text::decode`]).
    pub nick: String,
    /// Game build, e.g. `b41`.
    pub build: String,
}

impl Player {
    /// Parses every recognizable row of an `sv players` reply.
    ///
    /// Rows look like `3 (1234)] * OP 1, nick (b41)`; the dplogin
    /// parentheses and the `OP n, ` marker are optional.
    pub fn parse_roster(body: &str) -> Vec<Player> {
        body.lines().filter_map(Self::parse_row).collect()
    }

    fn parse_row(line: &str) -> Option<Player> {
        let line = line.trim();
        let digits = line.find(|c: char| !c.is_ascii_digit())?;
        let id: u32 = line[..digits].parse().ok()?;
        let rest = line[digits..].trim_start();

        let (dplogin, rest) = match rest.strip_prefix('(') {
            Some(inner) => {
                let close = inner.find(')')?;
                let login = &inner[..close];
                let login = (!login.is_empty()).then(|| login.to_string());
                (login, &inner[close + 1..])
            }
            None => (None, rest),
        };

        let rest = rest.trim_start().strip_prefix("] * ")?;
        let rest = match rest.strip_prefix("OP ") {
            Some(op) => {
                let comma = op.find(", ")?;
                if !op[..comma].chars().all(|c| c.is_ascii_digit()) {
                    return None;
                }
                &op[comma + 2..]
            }
            None => rest,
        };

        let open = rest.rfind(" (b")?;
        let build = rest[open + 2..].strip_suffix(')')?;
        if build.len() < 2 || !build[1..].chars().all(|c| c.is_ascii_digit()) {
            return None;
        }

        Some(Player {
            id,
            dplogin,
            nick: text::decode(&rest[..open]),
            build: build.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// One player row of a `status` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPlayer {
    pub nick: String,
    pub score: i32,
    pub ping: u32,
}

/// A parsed `status` reply: server variables plus the player table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatus {
    /// Every `\key\value` pair of the info string.
    pub variables: BTreeMap<String, String>,
    /// Connected players.
    pub players: Vec<StatusPlayer>,
}

impl ServerStatus {
    /// Parses a `status` reply body (after the `print` preamble).
    ///
    /// ```text
    /// \mapname\airtime\hostname\my server\TimeLeft\20:00\_scores\Red:0 Blue:0
    /// 0 13 "mRokita"
    /// ```
    pub fn parse(body: &str) -> Result<Self, ProtocolError> {
        let mut lines = body.lines().skip_while(|l| l.trim().is_empty());
        let info = lines
            .next()
            .ok_or_else(|| ProtocolError::MalformedStatus("empty reply".into()))?;
        let info = info
            .strip_prefix('\\')
            .ok_or_else(|| ProtocolError::MalformedStatus(format!("bad info string: {info:?}")))?;

        let parts: Vec<&str> = info.split('\\').collect();
        if parts.len() % 2 != 0 {
            return Err(ProtocolError::MalformedStatus(
                "info string has an odd number of fields".into(),
            ));
        }
        let variables = parts
            .chunks(2)
            .map(|kv| (kv[0].to_string(), kv[1].to_string()))
            .collect();

        let mut players = Vec::new();
        for line in lines.filter(|l| !l.trim().is_empty()) {
            players.push(Self::parse_player(line)?);
        }

        Ok(Self { variables, players })
    }

    fn parse_player(line: &str) -> Result<StatusPlayer, ProtocolError> {
        let bad = || ProtocolError::MalformedStatus(format!("bad player row: {line:?}"));
        let mut parts = line.trim().splitn(3, ' ');
        let score = parts.next().and_then(|s| s.parse().ok()).ok_or_else(bad)?;
        let ping = parts.next().and_then(|s| s.parse().ok()).ok_or_else(bad)?;
        let name = parts
            .next()
            .and_then(|s| s.strip_prefix('"'))
            .and_then(|s| s.strip_suffix('"'))
            .ok_or_else(bad)?;
        Ok(StatusPlayer {
            nick: text::decode(name),
            score,
            ping,
        })
    }

    /// Looks up a raw info-string variable.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.variables.get(key).map(String::as_str)
    }

    pub fn hostname(&self) -> Option<&str> {
        self.get("hostname")
    }

    pub fn map_name(&self) -> Option<&str> {
        self.get("mapname")
    }

    /// Configured time limit in minutes.
    pub fn time_limit(&self) -> Option<u32> {
        self.get("timelimit")?.parse().ok()
    }

    /// Remaining time as printed (`mm:ss`).
    pub fn time_left(&self) -> Option<&str> {
        self.get("TimeLeft")
    }

    /// Per-team scores from the `_scores` variable (`Red:0 Blue:3 `).
    pub fn team_scores(&self) -> Vec<(Team, i32)> {
        let Some(raw) = self.get("_scores") else {
            return Vec::new();
        };
        raw.split_whitespace()
            .filter_map(|entry| {
                let (team, score) = entry.split_once(':')?;
                Some((team.parse().ok()?, score.parse().ok()?))
            })
            .collect()
    }

    /// Nicks of all players, in listing order.
    pub fn nicks(&self) -> Vec<&str> {
        self.players.iter().map(|p| p.nick.as_str()).collect()
    }
}

// ---------------------------------------------------------------------------
// Cvars
// ---------------------------------------------------------------------------

/// Extracts a cvar value from the reply to a bare `"<name>"` command.
///
/// Returns `Ok(None)` when the server reports the cvar as unknown.
pub fn parse_cvar(name: &str, body: &str) -> Result<Option<String>, ProtocolError> {
    let line = body.lines().next().unwrap_or("").trim();
    if line == format!("Unknown command \"{name}\".") {
        return Ok(None);
    }
    let prefix = format!("\"{name}\" is \"");
    line.strip_prefix(&prefix)
        .and_then(|rest| rest.split('"').next())
        .map(|value| Some(value.to_string()))
        .ok_or_else(|| ProtocolError::MalformedStatus(format!("unexpected cvar reply: {line:?}")))
}
