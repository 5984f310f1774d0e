//! Challenge-response rcon over UDP.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Mutex, MutexGuard, PoisonError};

use dpkit_protocol::codec::{self, Reply};
use tokio::net::UdpSocket;
use tokio::time::{Instant, timeout};

use crate::{AuthState, RconTransport, TransportConfig, TransportError};

struct CachedChallenge {
    token: String,
    fetched_at: Instant,
}

/// Mutable state guarded by a short-lived lock.
struct Credentials {
    secret: String,
    state: AuthState,
}

/// An [`RconTransport`] talking to one server address.
///
/// Every call opens its own ephemeral socket, so concurrent commands never
/// read each other's replies. The challenge is shared: it is fetched once,
/// reused until `challenge_ttl` runs out, and refreshed under an async lock
/// so that concurrent callers never fetch two at once.
pub struct UdpRcon {
    addr: SocketAddr,
    config: TransportConfig,
    credentials: Mutex<Credentials>,
    challenge: tokio::sync::Mutex<Option<CachedChallenge>>,
}

impl UdpRcon {
    pub fn new(addr: SocketAddr, secret: impl Into<String>, config: TransportConfig) -> Self {
        Self {
            addr,
            config,
            credentials: Mutex::new(Credentials {
                secret: secret.into(),
                state: AuthState::Unauthenticated,
            }),
            challenge: tokio::sync::Mutex::new(None),
        }
    }

    /// Resolves `host:port` and creates a transport for the first address.
    pub async fn resolve(
        host: &str,
        secret: impl Into<String>,
        config: TransportConfig,
    ) -> Result<Self, TransportError> {
        let addr = tokio::net::lookup_host(host).await?.next().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no address for {host}"),
            )
        })?;
        Ok(Self::new(addr, secret, config))
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Replaces the secret and clears a lockout.
    pub async fn set_secret(&self, secret: impl Into<String>) {
        {
            let mut creds = self.credentials();
            creds.secret = secret.into();
            creds.state = AuthState::Unauthenticated;
        }
        self.drop_challenge().await;
        tracing::info!(addr = %self.addr, "rcon secret replaced");
    }

    fn credentials(&self) -> MutexGuard<'_, Credentials> {
        self.credentials.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: AuthState) {
        let mut creds = self.credentials();
        if creds.state != state {
            tracing::info!(addr = %self.addr, from = %creds.state, to = %state, "auth state changed");
            creds.state = state;
        }
    }

    async fn drop_challenge(&self) {
        *self.challenge.lock().await = None;
    }

    async fn open_socket(&self) -> Result<UdpSocket, TransportError> {
        let local: SocketAddr = match self.addr {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(self.addr).await?;
        Ok(socket)
    }

    /// Receives one datagram and strips its header.
    async fn recv_body(&self, socket: &UdpSocket) -> Result<String, TransportError> {
        let mut buf = vec![0u8; codec::MAX_DATAGRAM];
        let n = timeout(self.config.reply_timeout, socket.recv(&mut buf))
            .await
            .map_err(|_| TransportError::Timeout)??;
        codec::decode_packet(&buf[..n]).map_err(|e| TransportError::SecurityCheck(e.to_string()))
    }

    /// Returns a fresh challenge, fetching one if the cache is empty or
    /// stale.
    async fn challenge(&self) -> Result<String, TransportError> {
        let mut cached = self.challenge.lock().await;
        if let Some(c) = cached.as_ref() {
            if c.fetched_at.elapsed() < self.config.challenge_ttl {
                return Ok(c.token.clone());
            }
            tracing::debug!(addr = %self.addr, "cached challenge expired");
        }
        *cached = None;

        let token = self.fetch_challenge().await?;
        *cached = Some(CachedChallenge {
            token: token.clone(),
            fetched_at: Instant::now(),
        });
        Ok(token)
    }

    async fn fetch_challenge(&self) -> Result<String, TransportError> {
        let socket = self.open_socket().await?;
        let request = codec::challenge_request();
        let attempts = self.config.challenge_retries.saturating_add(1);

        for attempt in 1..=attempts {
            socket.send(&request).await?;
            match self.recv_body(&socket).await {
                Ok(body) => {
                    let token = codec::parse_challenge(&body)
                        .map_err(|e| TransportError::SecurityCheck(e.to_string()))?;
                    tracing::debug!(addr = %self.addr, attempt, "challenge received");
                    return Ok(token);
                }
                Err(TransportError::Timeout) => {
                    tracing::debug!(addr = %self.addr, attempt, "challenge request timed out");
                }
                Err(e) => return Err(e),
            }
        }
        Err(TransportError::Timeout)
    }
}

impl RconTransport for UdpRcon {
    async fn send_command(&self, command: &str) -> Result<String, TransportError> {
        codec::check_command(command)?;
        if !self.auth_state().can_send() {
            return Err(TransportError::BadRconPassword);
        }

        let challenge = self.challenge().await?;
        let secret = self.credentials().secret.clone();
        let packet = codec::rcon_request(&secret, &challenge, command)?;

        let socket = self.open_socket().await?;
        socket.send(&packet).await?;
        tracing::debug!(addr = %self.addr, command, "rcon command sent");

        let reply = match self.recv_body(&socket).await {
            Ok(body) => codec::classify_reply(&body)
                .map_err(|e| TransportError::SecurityCheck(e.to_string())),
            Err(e) => Err(e),
        };
        let reply = match reply {
            Ok(reply) => reply,
            Err(e @ TransportError::SecurityCheck(_)) => {
                self.drop_challenge().await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        match reply {
            Reply::Text(text) => {
                self.set_state(AuthState::Authenticated);
                Ok(text)
            }
            Reply::BadPassword => {
                tracing::warn!(addr = %self.addr, "server rejected the rcon secret");
                self.set_state(AuthState::LockedOut);
                self.drop_challenge().await;
                Err(TransportError::BadRconPassword)
            }
            Reply::BadChallenge => {
                self.drop_challenge().await;
                Err(TransportError::SecurityCheck("bad challenge".into()))
            }
            Reply::MapNotFound(map) => Err(TransportError::MapNotFound(map)),
        }
    }

    fn auth_state(&self) -> AuthState {
        self.credentials().state
    }
}
