//! A live admin session: events from the log plus rcon commands.

use std::future::Future;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dpkit_dispatch::{Dispatcher, EventFilter, HandlerError, ListenerId};
use dpkit_protocol::{Event, EventKind, GameMode, Grammar, Player, ServerStatus, parse_cvar, text};
use dpkit_source::{LogSource, SourceError};
use dpkit_transport::{AuthState, RconTransport, TransportError, UdpRcon};
use tokio::task::JoinHandle;

use crate::SessionError;
use crate::config::SessionConfig;
use crate::pump::Pump;

/// Player name that blocks the `maploaded` pseudo-nick; see
/// [`Session::make_secure`].
const MAPLOADED: &str = "maploaded";

struct SessionInner {
    transport: Arc<UdpRcon>,
    dispatcher: Dispatcher,
    pump: Mutex<Option<JoinHandle<Result<(), SourceError>>>>,
}

/// Handle to one managed server. Cheap to clone; clones share the same
/// transport, listeners and pump.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Connects to the server in `config` and starts consuming `source`
    /// with the stock Paintball 2 grammar.
    pub async fn start<S: LogSource>(config: SessionConfig, source: S) -> Result<Self, SessionError> {
        Self::start_with_grammar(config, Grammar::paintball2(), source).await
    }

    /// Like [`start`](Self::start), with a custom grammar.
    pub async fn start_with_grammar<S: LogSource>(
        config: SessionConfig,
        grammar: Grammar,
        source: S,
    ) -> Result<Self, SessionError> {
        let transport = UdpRcon::resolve(&config.addr, config.rcon_secret.clone(), config.transport.clone()).await?;
        let session = Self {
            inner: Arc::new(SessionInner {
                transport: Arc::new(transport),
                dispatcher: Dispatcher::new(),
                pump: Mutex::new(None),
            }),
        };

        if config.init_security {
            session.make_secure().await?;
        }

        let pump = Pump {
            source,
            grammar: Arc::new(grammar),
            dispatcher: session.inner.dispatcher.clone(),
            transport: Arc::clone(&session.inner.transport),
            verify_chat_speakers: config.verify_chat_speakers,
        };
        let handle = tokio::spawn(pump.run());
        *session.pump_slot() = Some(handle);

        tracing::info!(addr = %session.inner.transport.addr(), "session started");
        Ok(session)
    }

    fn pump_slot(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<Result<(), SourceError>>>> {
        self.inner.pump.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn transport(&self) -> &UdpRcon {
        &self.inner.transport
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub fn auth_state(&self) -> AuthState {
        self.inner.transport.auth_state()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.dispatcher.is_closed()
    }

    /// Completes once the session has stopped, for whatever reason.
    pub async fn closed(&self) {
        self.inner.dispatcher.closed().await
    }

    /// Stops the pump and resolves every pending waiter with
    /// [`SessionError::SessionClosed`]. Idempotent.
    pub async fn stop(&self) -> Result<(), SessionError> {
        self.inner.dispatcher.close();
        let pump = self.pump_slot().take();
        let Some(pump) = pump else {
            return Ok(());
        };
        match pump.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "log source had failed"),
            Err(e) => tracing::warn!(error = %e, "event pump task failed"),
        }
        tracing::info!(addr = %self.inner.transport.addr(), "session stopped");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Registers a persistent handler for `kind`.
    pub fn on<F, Fut>(&self, kind: EventKind, handler: F) -> Result<ListenerId, SessionError>
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        Ok(self.inner.dispatcher.on(kind, handler)?)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.dispatcher.off(id)
    }

    /// Waits for the next `kind` event satisfying `predicate`.
    pub async fn wait_for<P>(
        &self,
        kind: EventKind,
        predicate: P,
        timeout: Option<Duration>,
    ) -> Result<Arc<Event>, SessionError>
    where
        P: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        Ok(self.inner.dispatcher.wait_for(kind, predicate, timeout).await?)
    }

    pub async fn wait_for_next(&self, kind: EventKind, timeout: Option<Duration>) -> Result<Arc<Event>, SessionError> {
        Ok(self.inner.dispatcher.wait_for_next(kind, timeout).await?)
    }

    /// Waits for the next `kind` event passing `filter`.
    pub async fn wait_for_match(
        &self,
        kind: EventKind,
        filter: EventFilter,
        timeout: Option<Duration>,
    ) -> Result<Arc<Event>, SessionError> {
        Ok(self.inner.dispatcher.wait_for_match(kind, filter, timeout).await?)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Sends a raw console command and returns the reply text.
    pub async fn rcon(&self, command: &str) -> Result<String, SessionError> {
        if self.is_closed() {
            return Err(SessionError::SessionClosed);
        }
        Ok(self.inner.transport.send_command(command).await?)
    }

    pub async fn status(&self) -> Result<ServerStatus, SessionError> {
        if self.is_closed() {
            return Err(SessionError::SessionClosed);
        }
        Ok(self.inner.transport.query_status().await?)
    }

    /// The live roster from `sv players`.
    pub async fn players(&self) -> Result<Vec<Player>, SessionError> {
        let body = self.rcon("sv players").await?;
        Ok(Player::parse_roster(&body))
    }

    pub async fn player_by_nick(&self, nick: &str) -> Result<Option<Player>, SessionError> {
        Ok(self.players().await?.into_iter().find(|p| p.nick == nick))
    }

    /// Reads a cvar.
    ///
    /// # Errors
    /// [`SessionError::CvarNotFound`] if the server does not know `name`.
    pub async fn get_cvar(&self, name: &str) -> Result<String, SessionError> {
        check_word("cvar name", name)?;
        let body = self.rcon(&format!("\"{name}\"")).await?;
        parse_cvar(name, &body)
            .map_err(TransportError::from)?
            .ok_or_else(|| SessionError::CvarNotFound(name.to_string()))
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Broadcasts a chat message. `message` is a formatting template (see
    /// [`dpkit_protocol::text`]); escape user input with
    /// [`text::escape_braces`].
    pub async fn say(&self, message: &str) -> Result<String, SessionError> {
        let wire = quoted("message", &text::render(message))?;
        self.rcon(&format!("say {wire}")).await
    }

    /// Prints a message in the middle of every player's screen.
    pub async fn cprint(&self, message: &str) -> Result<String, SessionError> {
        let wire = quoted("message", &text::render(message))?;
        self.rcon(&format!("sv cprint {wire}")).await
    }

    pub async fn set_cvar(&self, name: &str, value: &str) -> Result<String, SessionError> {
        check_word("cvar name", name)?;
        let value = quoted("cvar value", value)?;
        self.rcon(&format!("set {name} {value}")).await
    }

    pub async fn kick(&self, id: u32) -> Result<String, SessionError> {
        self.rcon(&format!("kick {id}")).await
    }

    /// Looks `nick` up on the roster and kicks that slot.
    ///
    /// # Errors
    /// [`SessionError::PlayerNotFound`] if nobody by that nick is connected.
    pub async fn kick_nick(&self, nick: &str) -> Result<String, SessionError> {
        let player = self
            .player_by_nick(nick)
            .await?
            .ok_or_else(|| SessionError::PlayerNotFound(nick.to_string()))?;
        self.kick(player.id).await
    }

    /// Temporarily bans client slot `id` for `duration` (server units,
    /// minutes on stock servers).
    pub async fn tempban(&self, id: u32, duration: u32) -> Result<String, SessionError> {
        self.rcon(&format!("tban {id} {duration}")).await
    }

    pub async fn remove_tempbans(&self) -> Result<String, SessionError> {
        self.rcon("removetbans").await
    }

    /// Adds `ip` to the ban list and persists it.
    pub async fn permaban(&self, ip: IpAddr) -> Result<String, SessionError> {
        let added = self.rcon(&format!("addip {ip}")).await?;
        let written = self.rcon("writeban").await?;
        Ok(format!("{added}\n{written}"))
    }

    /// Removes `ip` from the ban list and persists it.
    pub async fn remove_permaban(&self, ip: IpAddr) -> Result<String, SessionError> {
        let removed = self.rcon(&format!("removeip {ip}")).await?;
        let written = self.rcon("writeban").await?;
        Ok(format!("{removed}\n{written}"))
    }

    /// Switches map, optionally forcing a game mode.
    ///
    /// # Errors
    /// A transport `MapNotFound` (see [`SessionError::is_map_not_found`])
    /// when the server has no such map.
    pub async fn change_map(&self, map: &str, mode: Option<GameMode>) -> Result<String, SessionError> {
        check_word("map name", map)?;
        let command = match mode {
            Some(mode) => format!("sv newmap {map} {}", mode.code()),
            None => format!("sv newmap {map}"),
        };
        self.rcon(&command).await
    }

    /// Makes sure no player can call themselves `maploaded`.
    ///
    /// The server prints `maploaded` lines that look like chat from such a
    /// player, so the name goes on `sv_blockednames`. This doubles as a
    /// secret check: a wrong password surfaces here as `BadRconPassword`.
    ///
    /// Returns `true` if the blocklist had to be changed.
    pub async fn make_secure(&self) -> Result<bool, SessionError> {
        let blocked = match self.get_cvar("sv_blockednames").await {
            Ok(value) => value,
            Err(SessionError::CvarNotFound(_)) => String::new(),
            Err(e) => return Err(e),
        };
        if blocked.split(',').any(|name| name.trim() == MAPLOADED) {
            return Ok(false);
        }
        let updated = if blocked.is_empty() {
            MAPLOADED.to_string()
        } else {
            format!("{blocked},{MAPLOADED}")
        };
        self.set_cvar("sv_blockednames", &updated).await?;
        tracing::info!(blocked = %updated, "blocked the maploaded nick");
        Ok(true)
    }
}

/// Rejects empty input and anything that would split a console command.
fn check_word(what: &str, value: &str) -> Result<(), SessionError> {
    if value.is_empty() || value.contains(|c: char| c.is_whitespace() || c == '"' || c == ';') {
        return Err(SessionError::InvalidArgument(format!("{what} {value:?}")));
    }
    Ok(())
}

/// Wraps `value` in double quotes; it may not contain any itself.
fn quoted(what: &str, value: &str) -> Result<String, SessionError> {
    if value.contains('"') {
        return Err(SessionError::InvalidArgument(format!("{what} may not contain '\"'")));
    }
    Ok(format!("\"{value}\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_word_rejects_separators() {
        assert!(check_word("map name", "midnight").is_ok());
        for bad in ["", "two words", "a;quit", "\"x\""] {
            assert!(matches!(check_word("map name", bad), Err(SessionError::InvalidArgument(_))));
        }
    }

    #[test]
    fn test_quoted_wraps_and_rejects_quotes() {
        assert_eq!(quoted("message", "hi there").unwrap(), "\"hi there\"");
        assert!(quoted("message", "say \"x\"").is_err());
    }
}
