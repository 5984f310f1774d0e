//! An in-process UDP server that speaks the rcon protocol.
//!
//! `FakeServer` issues real challenges, checks tokens with the configured
//! secret, and answers from a small script. It exists so the transport and
//! everything built on it can be tested without a game server.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dpkit_protocol::codec::{self, RconRequest};
use rand::Rng;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::Instant;

struct FakeState {
    secret: String,
    challenge_ttl: Duration,
    challenges: HashMap<String, Instant>,
    challenges_issued: usize,
    replies: HashMap<String, String>,
    cvars: HashMap<String, String>,
    maps: HashSet<String>,
    received: Vec<String>,
    muted: bool,
}

/// A scripted rcon server bound to `127.0.0.1:0`.
///
/// The task stops when the `FakeServer` is dropped.
pub struct FakeServer {
    addr: SocketAddr,
    state: Arc<Mutex<FakeState>>,
    task: JoinHandle<()>,
}

impl FakeServer {
    /// Binds and starts serving with `secret` as the rcon password.
    pub async fn start(secret: &str) -> std::io::Result<Self> {
        let socket = UdpSocket::bind("127.0.0.1:0").await?;
        let addr = socket.local_addr()?;
        let state = Arc::new(Mutex::new(FakeState {
            secret: secret.to_string(),
            challenge_ttl: Duration::from_secs(60),
            challenges: HashMap::new(),
            challenges_issued: 0,
            replies: HashMap::new(),
            cvars: HashMap::new(),
            maps: HashSet::new(),
            received: Vec::new(),
            muted: false,
        }));
        let task = tokio::spawn(serve(socket, Arc::clone(&state)));
        tracing::debug!(%addr, "fake rcon server listening");
        Ok(Self { addr, state, task })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answers `command` with `text` (after the `print` preamble).
    pub fn reply_to(&self, command: &str, text: &str) {
        self.state()
            .replies
            .insert(command.to_string(), text.to_string());
    }

    /// Makes `map <name>` and `sv newmap <name>` succeed.
    pub fn add_map(&self, name: &str) {
        self.state().maps.insert(name.to_string());
    }

    pub fn set_cvar(&self, name: &str, value: &str) {
        self.state()
            .cvars
            .insert(name.to_string(), value.to_string());
    }

    pub fn cvar(&self, name: &str) -> Option<String> {
        self.state().cvars.get(name).cloned()
    }

    pub fn set_secret(&self, secret: &str) {
        self.state().secret = secret.to_string();
    }

    /// How long an issued challenge stays valid.
    pub fn set_challenge_ttl(&self, ttl: Duration) {
        self.state().challenge_ttl = ttl;
    }

    /// Forgets every issued challenge.
    pub fn expire_challenges(&self) {
        self.state().challenges.clear();
    }

    /// While muted, every datagram is read and ignored.
    pub fn set_muted(&self, muted: bool) {
        self.state().muted = muted;
    }

    /// Commands that passed authentication, oldest first.
    pub fn received(&self) -> Vec<String> {
        self.state().received.clone()
    }

    pub fn challenges_issued(&self) -> usize {
        self.state().challenges_issued
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(socket: UdpSocket, state: Arc<Mutex<FakeState>>) {
    let mut buf = vec![0u8; codec::MAX_DATAGRAM];
    loop {
        let (n, peer) = match socket.recv_from(&mut buf).await {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(error = %e, "fake server recv failed");
                continue;
            }
        };
        let reply = {
            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            handle_datagram(&mut state, &buf[..n])
        };
        if let Some(packet) = reply {
            if let Err(e) = socket.send_to(&packet, peer).await {
                tracing::debug!(error = %e, %peer, "fake server send failed");
            }
        }
    }
}

fn handle_datagram(state: &mut FakeState, data: &[u8]) -> Option<Vec<u8>> {
    if state.muted {
        return None;
    }
    let body = codec::decode_packet(data).ok()?;

    if body.trim_end() == "getchallenge" {
        let token = rand::rng().random_range(1_000_000u32..u32::MAX).to_string();
        state.challenges.insert(token.clone(), Instant::now());
        state.challenges_issued += 1;
        return Some(codec::challenge_reply(&token));
    }

    let request = RconRequest::parse(&body)?;
    let fresh = state
        .challenges
        .get(&request.challenge)
        .is_some_and(|issued| issued.elapsed() < state.challenge_ttl);
    let text = if !fresh {
        "Bad challenge.\n".to_string()
    } else if !request.is_signed_by(&state.secret) {
        "Bad rcon_password.\n".to_string()
    } else {
        state.received.push(request.command.clone());
        run_command(state, &request.command)
    };
    codec::print_reply(&text).ok()
}

fn run_command(state: &mut FakeState, command: &str) -> String {
    if let Some(text) = state.replies.get(command) {
        return text.clone();
    }

    let words: Vec<&str> = command.split_whitespace().collect();
    match words.as_slice() {
        ["set", name, value @ ..] => {
            let value = value.join(" ");
            state
                .cvars
                .insert(name.to_string(), value.trim_matches('"').to_string());
            String::new()
        }
        ["map", map, ..] | ["sv", "newmap", map, ..] => {
            if state.maps.contains(*map) {
                String::new()
            } else {
                format!("Can't find maps/{map}.bsp\n")
            }
        }
        [quoted] if quoted.len() > 2 && quoted.starts_with('"') && quoted.ends_with('"') => {
            let name = &quoted[1..quoted.len() - 1];
            match state.cvars.get(name) {
                Some(value) => format!("\"{name}\" is \"{value}\"\n"),
                None => format!("Unknown command \"{name}\".\n"),
            }
        }
        _ => String::new(),
    }
}
