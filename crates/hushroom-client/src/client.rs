//! Chat client that keeps a session with a relay alive.
//!
//! [`ChatClient`] is the downward API for a user interface; everything
//! coming back up is a [`ClientEvent`] on the channel returned by
//! [`ChatClient::new`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, RwLock, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use hushroom_proto::frames::{MAX_ENCRYPTED_FRAME_LEN, PONG};
use hushroom_proto::{ServerAction, ServerKeyAnnouncement};

use crate::config::ClientOptions;
use crate::credentials::Credentials;
use crate::error::ClientError;
use crate::events::{ClientEvent, EventSink, Peer};
use crate::handshake::{HandshakeManager, HandshakeState};
use crate::heartbeat::spawn_ping_task;
use crate::peers::{PeerTable, PeerUpdate};

/// How long `disconnect` waits for the connection task to close cleanly.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// One live transport. Replaced wholesale on reconnect.
struct Connection {
    credentials: Credentials,
    handshake: HandshakeManager,
    peers: PeerTable,
    outbound: mpsc::UnboundedSender<String>,
}

impl Connection {
    fn send_frame(&self, frame: String) {
        if self.outbound.send(frame).is_err() {
            debug!("Outbound queue closed, frame dropped");
        }
    }

    fn send_action(&self, action: &ServerAction) -> Result<(), ClientError> {
        let key = self
            .handshake
            .server_key()
            .ok_or(ClientError::NotConnected)?;
        let frame = key.encrypt(action)?;
        if frame.len() > MAX_ENCRYPTED_FRAME_LEN {
            return Err(ClientError::FrameTooLarge {
                size: frame.len(),
                max: MAX_ENCRYPTED_FRAME_LEN,
            });
        }
        self.send_frame(frame);
        Ok(())
    }

    fn apply(&self, update: PeerUpdate, events: &EventSink) {
        for action in &update.outgoing {
            if let Err(e) = self.send_action(action) {
                warn!(error = %e, "Failed to send peer action");
            }
        }
        for event in update.events {
            events.emit(event);
        }
    }

    /// Frames before the server key exists: announcement or signed reply.
    /// Every failure here is reported as [`ClientError::Handshake`].
    fn handle_handshake_frame(&mut self, text: &str, events: &EventSink) -> Result<(), ClientError> {
        let as_handshake = |e: ClientError| match e {
            ClientError::Handshake(_) => e,
            other => ClientError::Handshake(other.to_string()),
        };
        if let Some(announcement) = ServerKeyAnnouncement::parse(text) {
            return self
                .handshake
                .handle_announcement(&announcement)
                .map_err(as_handshake);
        }
        if let Some(join) = self
            .handshake
            .handle_reply(text, &self.credentials.channel_hash)
            .map_err(as_handshake)?
        {
            self.send_action(&join)?;
            events.emit(ClientEvent::ServerSecured);
        }
        Ok(())
    }
}

struct Inner {
    options: ClientOptions,
    credentials: RwLock<Option<Credentials>>,
    connection: Mutex<Option<Connection>>,
    events: EventSink,
}

impl Inner {
    /// Connect, and reconnect with backoff while credentials are set.
    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut attempt: u32 = 0;

        loop {
            if *shutdown.borrow() {
                info!("Chat client shutting down");
                return;
            }
            let Some(credentials) = self.credentials.read().await.clone() else {
                info!("Credentials cleared, not reconnecting");
                return;
            };

            let started = Instant::now();
            let result = self.connect_and_run(credentials, &mut shutdown).await;
            if self.connection.lock().await.take().is_some() {
                self.events.emit(ClientEvent::ServerClosed);
            }

            match result {
                Ok(()) => {
                    info!("Relay connection closed on request");
                    return;
                }
                // An untrusted relay is not retried; `connect` starts over.
                Err(ClientError::Handshake(reason)) => {
                    error!(
                        relay = %self.options.relay_url,
                        %reason,
                        "Relay handshake failed, not reconnecting"
                    );
                    return;
                }
                Err(e) => {
                    // Reset backoff if the connection was up long enough
                    if started.elapsed() > self.options.stable_after {
                        attempt = 0;
                    }
                    if self.credentials.read().await.is_none() {
                        return;
                    }
                    if !self.options.reconnect.should_retry(attempt) {
                        error!(error = %e, attempt, "Max reconnect attempts reached");
                        return;
                    }

                    let delay = self.options.reconnect.delay_for_attempt(attempt);
                    warn!(error = %e, attempt, delay_ms = delay.as_millis(), "Reconnecting");

                    tokio::select! {
                        () = sleep(delay) => {}
                        _ = shutdown.changed() => {
                            info!("Chat client shutting down during reconnect wait");
                            return;
                        }
                    }
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }

    /// One transport from open to close. `Ok` means shutdown was requested.
    async fn connect_and_run(
        &self,
        credentials: Credentials,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), ClientError> {
        let (ws, _) = tokio::select! {
            result = connect_async(self.options.relay_url.as_str()) => result.map_err(Box::new)?,
            _ = shutdown.changed() => return Ok(()),
        };
        info!(relay = %self.options.relay_url, "Connected to relay");
        let (mut sink, mut source) = ws.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        let mut handshake =
            HandshakeManager::new(self.options.trust.clone(), self.options.relay_url.clone());
        let first = handshake.begin();
        let connection = Connection {
            peers: PeerTable::new(credentials.clone()),
            credentials,
            handshake,
            outbound: tx.clone(),
        };
        connection.send_frame(first);
        *self.connection.lock().await = Some(connection);

        let ping = spawn_ping_task(tx, self.options.ping_interval, shutdown.clone());

        let result: Result<(), ClientError> = loop {
            tokio::select! {
                Some(frame) = rx.recv() => {
                    if let Err(e) = sink.send(Message::Text(frame)).await {
                        break Err(Box::new(e).into());
                    }
                }
                msg = source.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = self.handle_frame(&text).await {
                            warn!(error = %e, "Closing relay connection");
                            let _ = sink.send(Message::Close(None)).await;
                            break Err(e);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break Err(ClientError::Connection("closed by relay".into()));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Err(Box::new(e).into()),
                },
                _ = shutdown.changed() => {
                    let _ = sink.send(Message::Close(None)).await;
                    break Ok(());
                }
            }
        };

        ping.abort();
        result
    }

    /// Handle one text frame. An error closes the connection.
    async fn handle_frame(&self, text: &str) -> Result<(), ClientError> {
        if text == PONG {
            return Ok(());
        }
        let mut guard = self.connection.lock().await;
        let Some(conn) = guard.as_mut() else {
            return Ok(());
        };
        let Some(key) = conn.handshake.server_key().cloned() else {
            return conn.handle_handshake_frame(text, &self.events);
        };

        let action: ServerAction = match key.decrypt(text) {
            Ok(action) => action,
            Err(e) => {
                debug!(error = %e, "Undecryptable relay frame dropped");
                return Ok(());
            }
        };
        conn.handshake.mark_joined();

        let update = match action {
            ServerAction::Members { members } => conn.peers.on_members(&members),
            ServerAction::Direct { payload, peer } => conn.peers.on_direct(&peer, &payload),
            ServerAction::Join { .. } | ServerAction::Fanout { .. } => {
                debug!("Client-only action received from relay, ignored");
                return Ok(());
            }
        };
        conn.apply(update, &self.events);
        Ok(())
    }
}

struct Running {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Running {
    async fn stop(self) {
        let _ = self.shutdown.send(true);
        let mut task = self.task;
        if timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
            warn!("Connection task did not stop in time, aborting");
            task.abort();
        }
    }
}

/// Handle to a reconnecting relay session.
pub struct ChatClient {
    inner: Arc<Inner>,
    running: Mutex<Option<Running>>,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("relay_url", &self.inner.options.relay_url)
            .finish_non_exhaustive()
    }
}

impl ChatClient {
    pub fn new(options: ClientOptions) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (events, rx) = EventSink::channel();
        let inner = Arc::new(Inner {
            options,
            credentials: RwLock::new(None),
            connection: Mutex::new(None),
            events,
        });
        (
            Self {
                inner,
                running: Mutex::new(None),
            },
            rx,
        )
    }

    /// Set the username, room and password used by the next connection.
    pub async fn set_credentials(&self, username: &str, room: &str, password: &str) {
        *self.inner.credentials.write().await = Some(Credentials::new(username, room, password));
    }

    /// Start (or restart) the connection task.
    pub async fn connect(&self) -> Result<(), ClientError> {
        if self.inner.credentials.read().await.is_none() {
            return Err(ClientError::NoCredentials);
        }
        let mut running = self.running.lock().await;
        if let Some(previous) = running.take() {
            previous.stop().await;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(inner.run(shutdown_rx));
        *running = Some(Running { shutdown, task });
        Ok(())
    }

    /// Send content to every secured member of the channel.
    ///
    /// Returns `false` when no member is secured yet and nothing was sent.
    pub async fn send_to_channel(&self, kind: &str, data: &str) -> Result<bool, ClientError> {
        let guard = self.inner.connection.lock().await;
        let conn = guard.as_ref().ok_or(ClientError::NotConnected)?;
        match conn.peers.channel_message(kind, data)? {
            Some(action) => {
                conn.send_action(&action)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Send content to one secured member.
    pub async fn send_to_peer(&self, peer: &str, kind: &str, data: &str) -> Result<(), ClientError> {
        let guard = self.inner.connection.lock().await;
        let conn = guard.as_ref().ok_or(ClientError::NotConnected)?;
        let action = conn.peers.peer_message(peer, kind, data)?;
        conn.send_action(&action)
    }

    pub async fn state(&self) -> HandshakeState {
        self.inner
            .connection
            .lock()
            .await
            .as_ref()
            .map_or(HandshakeState::Disconnected, |conn| conn.handshake.state())
    }

    pub async fn secured_peers(&self) -> Vec<Peer> {
        self.inner
            .connection
            .lock()
            .await
            .as_ref()
            .map(|conn| conn.peers.secured_peers())
            .unwrap_or_default()
    }

    /// Close the transport and stop reconnecting. Credentials are kept so
    /// [`Self::connect`] can resume.
    pub async fn disconnect(&self) {
        if let Some(running) = self.running.lock().await.take() {
            running.stop().await;
        }
    }

    /// Disconnect and forget the credentials.
    pub async fn destroy(&self) {
        *self.inner.credentials.write().await = None;
        self.disconnect().await;
    }
}
