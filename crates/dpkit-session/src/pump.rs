//! The per-session consumer loop: source → grammar → dispatcher.
//!
//! Chat events are the one exception to straight-through dispatch. With
//! speaker verification on they go to a [`ChatVerifier`] task that checks
//! the roster over rcon and dispatches them afterwards, so a slow or silent
//! server only delays chat, never the other event kinds.

use std::sync::Arc;

use dpkit_dispatch::Dispatcher;
use dpkit_protocol::{Event, EventKind, Grammar, Player};
use dpkit_source::{LogSource, RawLine, SourceError};
use dpkit_transport::{RconTransport, TransportError, UdpRcon};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

/// Chat lines waiting for verification before new ones are dropped.
const VERIFY_BACKLOG: usize = 256;

pub(crate) struct Pump<S> {
    pub source: S,
    pub grammar: Arc<Grammar>,
    pub dispatcher: Dispatcher,
    pub transport: Arc<UdpRcon>,
    pub verify_chat_speakers: bool,
}

impl<S: LogSource> Pump<S> {
    /// Runs until the source ends or the dispatcher is closed, then closes
    /// the dispatcher so every pending waiter learns about it.
    pub async fn run(self) -> Result<(), SourceError> {
        let Pump {
            mut source,
            grammar,
            dispatcher,
            transport,
            verify_chat_speakers,
        } = self;
        tracing::info!(addr = %transport.addr(), "event pump started");

        let verifier = verify_chat_speakers
            .then(|| ChatVerifier::spawn(Arc::clone(&transport), Arc::clone(&grammar), dispatcher.clone()));

        let mut stopped = false;
        let result = loop {
            let line = tokio::select! {
                line = source.next_line() => line,
                _ = dispatcher.closed() => {
                    stopped = true;
                    break Ok(());
                }
            };
            match line {
                Ok(Some(line)) => {
                    let Some(event) = grammar.parse_at(&line.text, line.received_at) else {
                        continue;
                    };
                    match &verifier {
                        Some(verifier) if event.kind == EventKind::Chat => verifier.submit(line, event),
                        _ => {
                            dispatcher.dispatch(event);
                        }
                    }
                }
                Ok(None) => {
                    tracing::info!("log source ended");
                    break Ok(());
                }
                Err(e) => {
                    tracing::warn!(error = %e, "log source failed");
                    break Err(e);
                }
            }
        };

        if let Some(verifier) = verifier {
            if stopped {
                verifier.abort();
            } else {
                verifier.finish().await;
            }
        }
        dispatcher.close();
        tracing::info!(addr = %transport.addr(), "event pump stopped");
        result
    }
}

// ---------------------------------------------------------------------------
// Chat verification
// ---------------------------------------------------------------------------

/// Handle to the task that checks chat speakers, one line at a time and in
/// arrival order.
struct ChatVerifier {
    queue: mpsc::Sender<(RawLine, Event)>,
    task: JoinHandle<()>,
}

impl ChatVerifier {
    fn spawn(transport: Arc<UdpRcon>, grammar: Arc<Grammar>, dispatcher: Dispatcher) -> Self {
        let (queue, pending) = mpsc::channel(VERIFY_BACKLOG);
        let task = tokio::spawn(verify_chat(pending, transport, grammar, dispatcher));
        Self { queue, task }
    }

    fn submit(&self, line: RawLine, event: Event) {
        match self.queue.try_send((line, event)) {
            Ok(()) => {}
            Err(TrySendError::Full((line, _))) => {
                tracing::warn!(line = %line.text, "chat verification backlog full, dropping line");
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }

    /// Lets the queued lines through, then waits for the task to end.
    async fn finish(self) {
        drop(self.queue);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "chat verifier task failed");
        }
    }

    fn abort(self) {
        self.task.abort();
    }
}

async fn verify_chat(
    mut pending: mpsc::Receiver<(RawLine, Event)>,
    transport: Arc<UdpRcon>,
    grammar: Arc<Grammar>,
    dispatcher: Dispatcher,
) {
    while let Some((line, event)) = pending.recv().await {
        if let Some(event) = admit_chat(&transport, &grammar, &line, event).await {
            dispatcher.dispatch(event);
        }
    }
}

/// Passes chat from connected speakers. A line whose speaker is not
/// connected is reclassified without the chat rules, since it may be a
/// genuine event for a nick containing `": "`.
async fn admit_chat(transport: &UdpRcon, grammar: &Grammar, line: &RawLine, event: Event) -> Option<Event> {
    let nick = event.text("nick").unwrap_or_default();
    match speaker_connected(transport, nick).await {
        Ok(true) => Some(event),
        Ok(false) => {
            let reparsed = grammar.parse_excluding(&line.text, line.received_at, EventKind::Chat);
            match &reparsed {
                Some(other) => tracing::debug!(nick, kind = ?other.kind, "chat speaker not connected, line reclassified"),
                None => tracing::warn!(nick, "dropping chat from a nick that is not connected"),
            }
            reparsed
        }
        Err(e) => {
            tracing::warn!(nick, error = %e, "could not verify chat speaker, dropping");
            None
        }
    }
}

async fn speaker_connected(transport: &UdpRcon, nick: &str) -> Result<bool, TransportError> {
    let body = transport.send_command("sv players").await?;
    Ok(Player::parse_roster(&body).iter().any(|p| p.nick == nick))
}
