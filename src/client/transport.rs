use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::client::bus::EventBus;
use crate::core::{ClientEvent, Config, ConnectionState, ConnectionStatus, ServerEvent, TransportConfig};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// The send queue is unbounded so FIFO replay is never violated, but
/// sustained growth during a long disconnect should be visible.
const QUEUE_WARN_THRESHOLD: usize = 256;

/// Backoff before reconnect attempt `attempt` (counted from 0):
/// `base * 1.5^attempt`.
pub fn reconnect_delay(base_interval_ms: u64, attempt: u32) -> Duration {
    Duration::from_millis((base_interval_ms as f64 * 1.5f64.powi(attempt as i32)) as u64)
}

enum Command {
    Connect(String),
    Send(ClientEvent),
    Disconnect,
}

/// Owns the one realtime connection of a client instance: dialing,
/// heartbeat keep-alive, exponential-backoff reconnection, and FIFO
/// queueing of events sent while disconnected. All socket and timer state
/// lives in a single background task; this handle just forwards commands
/// and exposes the observable [`ConnectionState`].
pub struct SessionTransport {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state: Arc<Mutex<ConnectionState>>,
    bus: Arc<EventBus>,
}

impl SessionTransport {
    pub fn new(ws_url: String, tuning: TransportConfig, bus: Arc<EventBus>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(ConnectionState::default()));

        let task = TransportTask {
            ws_url,
            tuning,
            bus: Arc::clone(&bus),
            state: Arc::clone(&state),
            cmd_rx,
            queue: VecDeque::new(),
            session_id: None,
            reconnect_enabled: true,
        };
        tokio::spawn(task.run());

        Self { cmd_tx, state, bus }
    }

    pub fn from_config(config: &Config, bus: Arc<EventBus>) -> Self {
        Self::new(
            config.backend.ws_url.clone(),
            config.transport.clone(),
            bus,
        )
    }

    /// Open the channel for `session_id`. No-op when already connected.
    /// Also the recovery path after reconnect exhaustion: an explicit
    /// connect resets the attempt counter.
    pub fn connect(&self, session_id: &str) {
        self.command(Command::Connect(session_id.to_string()));
    }

    /// Serialize and send an event, or queue it for FIFO replay if the
    /// channel is not open. Never returns an error to the caller; wire
    /// failures surface through [`ConnectionState`].
    pub fn send(&self, event: ClientEvent) {
        self.command(Command::Send(event));
    }

    /// Close with code 1000 and disable reconnection. Safe to call more
    /// than once.
    pub fn disconnect(&self) {
        self.command(Command::Disconnect);
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.lock().expect("connection state poisoned").clone()
    }

    pub fn bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }

    fn command(&self, command: Command) {
        if self.cmd_tx.send(command).is_err() {
            tracing::warn!("Session transport task is gone; command dropped");
        }
    }
}

enum Driven {
    /// Normal close or explicit disconnect; no reconnect.
    CleanExit,
    /// Abnormal close or wire error; caller schedules a reconnect.
    Reconnect,
    /// Every handle was dropped; tear down entirely.
    HandleDropped,
}

struct TransportTask {
    ws_url: String,
    tuning: TransportConfig,
    bus: Arc<EventBus>,
    state: Arc<Mutex<ConnectionState>>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    queue: VecDeque<ClientEvent>,
    session_id: Option<String>,
    reconnect_enabled: bool,
}

impl TransportTask {
    async fn run(mut self) {
        // Idle: no channel, no timers. Events sent here queue for replay.
        loop {
            let Some(command) = self.cmd_rx.recv().await else {
                return;
            };
            match command {
                Command::Send(event) => self.enqueue(event),
                Command::Disconnect => {
                    self.update_state(|s| s.status = ConnectionStatus::Disconnected);
                }
                Command::Connect(session_id) => {
                    self.session_id = Some(session_id);
                    self.reconnect_enabled = true;
                    self.update_state(|s| {
                        s.reconnect_attempts = 0;
                        s.error = None;
                    });
                    if !self.run_session().await {
                        return;
                    }
                }
            }
        }
    }

    /// Dial/connected/backoff loop for the current session id. Returns
    /// false when every handle has been dropped.
    async fn run_session(&mut self) -> bool {
        loop {
            let session_id = self.session_id.clone().unwrap_or_default();
            let url = format!("{}/ws/{}", self.ws_url.trim_end_matches('/'), session_id);
            self.update_state(|s| s.status = ConnectionStatus::Connecting);

            match connect_async(&url).await {
                Ok((ws, _)) => {
                    tracing::info!("Session channel connected: {}", session_id);
                    self.update_state(|s| {
                        s.status = ConnectionStatus::Connected;
                        s.reconnect_attempts = 0;
                        s.error = None;
                        s.last_connected = Some(chrono::Utc::now().to_rfc3339());
                    });
                    match self.drive(ws).await {
                        Driven::CleanExit => return true,
                        Driven::HandleDropped => return false,
                        Driven::Reconnect => {}
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to open session channel {}: {}", url, e);
                    self.update_state(|s| {
                        s.status = ConnectionStatus::Error;
                        s.error = Some(e.to_string());
                    });
                }
            }

            if !self.reconnect_enabled {
                self.update_state(|s| s.status = ConnectionStatus::Disconnected);
                return true;
            }

            let attempt = self.connection_state().reconnect_attempts;
            if attempt >= self.tuning.reconnect_attempts {
                tracing::error!(
                    "Giving up on session {} after {} reconnect attempts",
                    session_id,
                    attempt
                );
                self.update_state(|s| {
                    s.status = ConnectionStatus::Error;
                    s.error = Some("Failed to reconnect after maximum attempts".to_string());
                });
                return true;
            }

            let delay = reconnect_delay(self.tuning.reconnect_interval_ms, attempt);
            self.update_state(|s| {
                s.status = ConnectionStatus::Reconnecting;
                s.reconnect_attempts = attempt + 1;
            });
            tracing::info!(
                "Reconnecting to session {} in {:.1}s (attempt {}/{})",
                session_id,
                delay.as_secs_f64(),
                attempt + 1,
                self.tuning.reconnect_attempts
            );

            let deadline = tokio::time::Instant::now() + delay;
            loop {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => break,
                    command = self.cmd_rx.recv() => match command {
                        None => return false,
                        Some(Command::Send(event)) => self.enqueue(event),
                        Some(Command::Disconnect) => {
                            self.reconnect_enabled = false;
                            self.update_state(|s| s.status = ConnectionStatus::Disconnected);
                            return true;
                        }
                        Some(Command::Connect(id)) => {
                            // Explicit connect cancels the pending backoff
                            // and dials immediately with a fresh counter.
                            self.session_id = Some(id);
                            self.update_state(|s| {
                                s.reconnect_attempts = 0;
                                s.error = None;
                            });
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Pump one open socket: flush the queue, then multiplex commands,
    /// inbound frames, and the heartbeat until the connection ends.
    async fn drive(&mut self, mut ws: WsStream) -> Driven {
        while let Some(event) = self.queue.pop_front() {
            if let Err(e) = send_event(&mut ws, &event).await {
                tracing::warn!("Failed to flush queued event: {}", e);
                self.queue.push_front(event);
                return self.wire_failure(e);
            }
        }

        let heartbeat_every = Duration::from_millis(self.tuning.heartbeat_interval_ms);
        let mut heartbeat = tokio::time::interval_at(
            tokio::time::Instant::now() + heartbeat_every,
            heartbeat_every,
        );

        loop {
            tokio::select! {
                command = self.cmd_rx.recv() => match command {
                    None => {
                        let _ = ws.close(None).await;
                        return Driven::HandleDropped;
                    }
                    Some(Command::Connect(_)) => {
                        tracing::debug!("Session channel already connected");
                    }
                    Some(Command::Send(event)) => {
                        if let Err(e) = send_event(&mut ws, &event).await {
                            tracing::warn!("Send failed, event queued for replay: {}", e);
                            self.queue.push_back(event);
                            return self.wire_failure(e);
                        }
                    }
                    Some(Command::Disconnect) => {
                        self.reconnect_enabled = false;
                        let _ = ws
                            .close(Some(CloseFrame {
                                code: CloseCode::Normal,
                                reason: "client disconnect".into(),
                            }))
                            .await;
                        self.update_state(|s| s.status = ConnectionStatus::Disconnected);
                        return Driven::CleanExit;
                    }
                },
                _ = heartbeat.tick() => {
                    let event = ClientEvent::Heartbeat {
                        timestamp: chrono::Utc::now().to_rfc3339(),
                    };
                    if let Err(e) = send_event(&mut ws, &event).await {
                        tracing::warn!("Heartbeat failed: {}", e);
                        return self.wire_failure(e);
                    }
                },
                frame = ws.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => self.handle_frame(&text),
                    Some(Ok(WsMessage::Close(close))) => {
                        let normal = close
                            .as_ref()
                            .map(|f| f.code == CloseCode::Normal)
                            .unwrap_or(false);
                        tracing::info!("Session channel closed: {:?}", close);
                        if normal || !self.reconnect_enabled {
                            self.update_state(|s| s.status = ConnectionStatus::Disconnected);
                            return Driven::CleanExit;
                        }
                        return Driven::Reconnect;
                    }
                    Some(Ok(_)) => {
                        // Binary and ping/pong frames are not part of the
                        // session protocol.
                    }
                    Some(Err(e)) => {
                        tracing::error!("Session channel error: {}", e);
                        return self.wire_failure(anyhow::anyhow!(e));
                    }
                    None => {
                        tracing::info!("Session channel ended without close frame");
                        if !self.reconnect_enabled {
                            self.update_state(|s| s.status = ConnectionStatus::Disconnected);
                            return Driven::CleanExit;
                        }
                        return Driven::Reconnect;
                    }
                }
            }
        }
    }

    /// Parse one inbound frame and broadcast it. Malformed payloads are
    /// dropped without touching connection state.
    fn handle_frame(&self, text: &str) {
        match serde_json::from_str::<ServerEvent>(text) {
            Ok(event) => {
                tracing::debug!("Received {} frame", event.event_type());
                self.bus.emit(&event);
            }
            Err(e) => {
                tracing::warn!("Dropping malformed session frame: {}", e);
            }
        }
    }

    fn wire_failure(&mut self, e: anyhow::Error) -> Driven {
        self.update_state(|s| {
            s.status = ConnectionStatus::Error;
            s.error = Some(e.to_string());
        });
        if self.reconnect_enabled {
            Driven::Reconnect
        } else {
            self.update_state(|s| s.status = ConnectionStatus::Disconnected);
            Driven::CleanExit
        }
    }

    fn enqueue(&mut self, event: ClientEvent) {
        self.queue.push_back(event);
        if self.queue.len() == QUEUE_WARN_THRESHOLD {
            tracing::warn!(
                "Send queue reached {} events while disconnected",
                QUEUE_WARN_THRESHOLD
            );
        }
        tracing::debug!("Queued event for replay ({} pending)", self.queue.len());
    }

    fn connection_state(&self) -> ConnectionState {
        self.state.lock().expect("connection state poisoned").clone()
    }

    fn update_state(&self, apply: impl FnOnce(&mut ConnectionState)) {
        let snapshot = {
            let mut state = self.state.lock().expect("connection state poisoned");
            apply(&mut state);
            state.clone()
        };
        self.bus
            .emit(&ServerEvent::ConnectionStateChanged { state: snapshot });
    }
}

async fn send_event(ws: &mut WsStream, event: &ClientEvent) -> Result<()> {
    let json = serde_json::to_string(event)?;
    ws.send(WsMessage::Text(json)).await?;
    Ok(())
}
