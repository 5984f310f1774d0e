//! Warns and finally kicks players who eliminate opponents right after they
//! respawn.
//!
//! Usage: `spawnkill-guard [config.json]`. Log verbosity follows `RUST_LOG`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use dpkit::prelude::*;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct GuardConfig {
    session: SessionConfig,
    log_path: PathBuf,
    tail: TailConfig,
    /// An elimination this soon after the victim's respawn is a spawnkill.
    spawn_window: Duration,
    /// Spawnkills further apart than this start a fresh streak.
    streak_reset: Duration,
    /// Warnings before the kick.
    max_warnings: u32,
    /// Print every event as a JSON line on stdout.
    print_events: bool,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            log_path: PathBuf::from("qconsole27910.log"),
            tail: TailConfig::default(),
            spawn_window: Duration::from_secs(2),
            streak_reset: Duration::from_secs(10),
            max_warnings: 3,
            print_events: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Streak bookkeeping
// ---------------------------------------------------------------------------

struct SpawnkillTracker {
    reset_after: Duration,
    streaks: HashMap<String, (u32, Instant)>,
}

impl SpawnkillTracker {
    fn new(reset_after: Duration) -> Self {
        Self {
            reset_after,
            streaks: HashMap::new(),
        }
    }

    /// Records one spawnkill by `killer` and returns the current streak.
    fn record(&mut self, killer: &str, now: Instant) -> u32 {
        let entry = self.streaks.entry(killer.to_string()).or_insert((0, now));
        if now.duration_since(entry.1) > self.reset_after {
            entry.0 = 0;
        }
        entry.0 += 1;
        entry.1 = now;
        entry.0
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

const PRINTED_KINDS: [EventKind; 16] = [
    EventKind::Chat,
    EventKind::Entrance,
    EventKind::Disconnect,
    EventKind::Elim,
    EventKind::ElimTeamsFlag,
    EventKind::Respawn,
    EventKind::FlagGrab,
    EventKind::FlagDrop,
    EventKind::FlagCaptured,
    EventKind::NameChange,
    EventKind::TeamSwitch,
    EventKind::RoundStarted,
    EventKind::RoundEnd,
    EventKind::GameEnd,
    EventKind::MapChange,
    EventKind::GameMode,
];

async fn watch_respawn(
    session: Session,
    config: Arc<GuardConfig>,
    tracker: Arc<Mutex<SpawnkillTracker>>,
    event: Arc<Event>,
) {
    if let Err(e) = on_respawn(session, config, tracker, event).await {
        tracing::warn!(error = %e, "spawnkill check failed");
    }
}

async fn on_respawn(
    session: Session,
    config: Arc<GuardConfig>,
    tracker: Arc<Mutex<SpawnkillTracker>>,
    event: Arc<Event>,
) -> Result<(), HandlerError> {
    let Some(victim) = event.text("nick").map(str::to_string) else {
        return Ok(());
    };
    let kill = match session
        .wait_for_match(
            EventKind::Elim,
            EventFilter::new()
                .field("victim_nick", victim.as_str())
                .field("suicide", false),
            Some(config.spawn_window),
        )
        .await
    {
        Ok(kill) => kill,
        Err(SessionError::Dispatch(DispatchError::Timeout(_))) => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    let Some(killer) = kill.text("killer_nick") else {
        return Ok(());
    };

    let streak = tracker
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .record(killer, Instant::now());
    tracing::info!(killer, victim = %victim, streak, "spawnkill");

    session
        .say(&format!("{{C}}9{killer}, {{C}}A{{U}}STOP SPAWNKILLING{{U}}"))
        .await?;
    if streak > config.max_warnings {
        session.kick_nick(killer).await?;
        tracing::info!(killer, "kicked for spawnkilling");
    }
    Ok(())
}

fn register(session: &Session, config: Arc<GuardConfig>) -> Result<(), SessionError> {
    let tracker = Arc::new(Mutex::new(SpawnkillTracker::new(config.streak_reset)));
    let handle = session.clone();
    let guard_config = Arc::clone(&config);
    session.on(EventKind::Respawn, move |event| {
        // Watching the spawn window must not hold up the next respawn.
        tokio::spawn(watch_respawn(
            handle.clone(),
            Arc::clone(&guard_config),
            Arc::clone(&tracker),
            event,
        ));
        async { Ok::<(), HandlerError>(()) }
    })?;

    if config.print_events {
        for kind in PRINTED_KINDS {
            session.on(kind, |event| async move {
                println!("{}", serde_json::to_string(&*event)?);
                Ok::<(), HandlerError>(())
            })?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

fn load_config() -> Result<GuardConfig, Box<dyn std::error::Error>> {
    match std::env::args().nth(1) {
        Some(path) => Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?),
        None => Ok(GuardConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Arc::new(load_config()?);
    tracing::info!(addr = %config.session.addr, log = %config.log_path.display(), "starting spawnkill guard");

    let session = dpkit::attach(config.session.clone(), &config.log_path, config.tail.clone()).await?;
    register(&session, Arc::clone(&config))?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("interrupted"),
        _ = session.closed() => tracing::info!("log stream ended"),
    }
    session.stop().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_counts_streak() {
        let mut tracker = SpawnkillTracker::new(Duration::from_secs(10));
        let t0 = Instant::now();
        assert_eq!(tracker.record("whoa", t0), 1);
        assert_eq!(tracker.record("whoa", t0 + Duration::from_secs(3)), 2);
        assert_eq!(tracker.record("Bob", t0 + Duration::from_secs(4)), 1);
    }

    #[test]
    fn test_tracker_resets_after_quiet_period() {
        let mut tracker = SpawnkillTracker::new(Duration::from_secs(10));
        let t0 = Instant::now();
        tracker.record("whoa", t0);
        tracker.record("whoa", t0 + Duration::from_secs(5));
        assert_eq!(tracker.record("whoa", t0 + Duration::from_secs(16)), 1);
    }

    #[test]
    fn test_guard_config_partial_json() {
        let config: GuardConfig =
            serde_json::from_str(r#"{"log_path":"/srv/pb2/qconsole.log","max_warnings":1}"#).unwrap();
        assert_eq!(config.log_path, PathBuf::from("/srv/pb2/qconsole.log"));
        assert_eq!(config.max_warnings, 1);
        assert_eq!(config.spawn_window, Duration::from_secs(2));
        assert!(config.session.verify_chat_speakers);
    }

    #[tokio::test]
    async fn test_spawnkill_is_warned_then_kicked() {
        let server = dpkit_transport::FakeServer::start("hello").await.unwrap();
        server.reply_to("sv players", "2 ()] * camper (b41)\n");
        let (tx, source) = ChannelSource::pair(16);
        let session_config = SessionConfig {
            addr: server.addr().to_string(),
            rcon_secret: "hello".into(),
            ..SessionConfig::default()
        };
        let session = Session::start(session_config, source).await.unwrap();
        let config = Arc::new(GuardConfig {
            max_warnings: 0,
            print_events: false,
            ..GuardConfig::default()
        });
        register(&session, config).unwrap();

        tx.send(RawLine::new("*Red's rookie revived!")).await.unwrap();
        while session.dispatcher().pending_waiters() < 1 {
            tokio::task::yield_now().await;
        }
        tx.send(RawLine::new("*camper (Spyder SE) eliminated *rookie (PGP)."))
            .await
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !server.received().iter().any(|c| c == "kick 2") {
            assert!(Instant::now() < deadline, "camper should be kicked");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let received = server.received();
        assert!(received.contains(&"say \"\u{88}9camper, \u{88}A\u{86}STOP SPAWNKILLING\u{86}\"".to_string()));
        session.stop().await.unwrap();
    }
}
