/// Realtime socket lifecycle: at most one live connection per manager
use crate::error::{InboxError, Result};
use crate::models::InboxMessage;
use crate::socket::protocol::{subscribe_frame, SocketFrame, StateChangeEvent};
use crate::socket::transport::{RealtimeConnection, RealtimeTransport, TransportFrame};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Connection state of the realtime socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    /// No connection
    Disconnected,
    /// Transport connect in progress
    Connecting,
    /// Open, not yet subscribed
    Connected,
    /// Open and receiving inbox events
    Subscribed,
}

/// Inbound notifications from the live connection
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    Opened,
    Message(InboxMessage),
    StateChange(StateChangeEvent),
    Closed { code: u16, reason: String },
    Error(String),
}

enum SocketCommand {
    Subscribe(String),
    Close,
}

struct LiveConnection {
    id: Uuid,
    commands: mpsc::UnboundedSender<SocketCommand>,
    task: JoinHandle<()>,
}

/// A dial in progress. Dialing needs no access to the manager, so callers
/// can hold the manager's lock only around `prepare` and `install`.
pub struct ConnectAttempt {
    id: u64,
    transport: Arc<dyn RealtimeTransport>,
    url: String,
}

impl ConnectAttempt {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn dial(&self) -> Result<Box<dyn RealtimeConnection>> {
        self.transport.connect(&self.url).await
    }
}

pub struct SocketManager {
    transport: Arc<dyn RealtimeTransport>,
    url: String,
    live: Option<LiveConnection>,
    state: Arc<watch::Sender<SocketState>>,
    /// Bumped by every `prepare` and `disconnect`; older attempts are stale
    attempt: u64,
}

impl SocketManager {
    pub fn new(transport: Arc<dyn RealtimeTransport>, url: impl Into<String>) -> Self {
        let (state, _) = watch::channel(SocketState::Disconnected);
        Self {
            transport,
            url: url.into(),
            live: None,
            state: Arc::new(state),
            attempt: 0,
        }
    }

    pub fn state(&self) -> SocketState {
        *self.state.borrow()
    }

    /// Observe state transitions
    pub fn watch(&self) -> watch::Receiver<SocketState> {
        self.state.subscribe()
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state(), SocketState::Connected | SocketState::Subscribed)
    }

    /// Close the live connection and start a new attempt. Dial it, then
    /// hand the result to `install`.
    pub async fn prepare(&mut self) -> ConnectAttempt {
        self.disconnect().await;
        self.attempt += 1;
        self.state.send_replace(SocketState::Connecting);
        ConnectAttempt {
            id: self.attempt,
            transport: self.transport.clone(),
            url: self.url.clone(),
        }
    }

    /// Adopt the outcome of `attempt`; inbound notifications are delivered
    /// on `events`. A connection dialed for an attempt that has since been
    /// superseded or disconnected is closed again.
    pub async fn install(
        &mut self,
        attempt: &ConnectAttempt,
        dialed: Result<Box<dyn RealtimeConnection>>,
        events: mpsc::UnboundedSender<SocketEvent>,
    ) -> Result<Uuid> {
        if attempt.id != self.attempt {
            debug!("Discarding superseded socket attempt {}", attempt.id);
            if let Ok(mut connection) = dialed {
                if let Err(e) = connection.close().await {
                    debug!("Closing superseded socket failed: {}", e);
                }
            }
            return Err(InboxError::Socket(
                "Connection attempt was superseded".to_string(),
            ));
        }

        let connection = match dialed {
            Ok(connection) => connection,
            Err(e) => {
                warn!("Socket connect to {} failed: {}", self.url, e);
                self.state.send_replace(SocketState::Disconnected);
                let _ = events.send(SocketEvent::Error(e.to_string()));
                return Err(e);
            }
        };

        let id = Uuid::new_v4();
        let (commands, command_rx) = mpsc::unbounded_channel();
        self.state.send_replace(SocketState::Connected);
        let _ = events.send(SocketEvent::Opened);
        info!("Socket {} connected to {}", id, self.url);

        let task = tokio::spawn(run_connection(
            id,
            connection,
            command_rx,
            events,
            self.state.clone(),
        ));
        self.live = Some(LiveConnection { id, commands, task });
        Ok(id)
    }

    /// Subscribe the live connection to `user_id`'s inbox events
    pub fn subscribe(&self, user_id: &str, token: Option<&str>) -> Result<()> {
        let live = self
            .live
            .as_ref()
            .ok_or_else(|| InboxError::Socket("Socket is not connected".to_string()))?;
        let frame = subscribe_frame(user_id, token)?;
        live.commands
            .send(SocketCommand::Subscribe(frame))
            .map_err(|_| InboxError::Socket("Socket connection already closed".to_string()))
    }

    /// Close the live connection and wait for it to be fully gone.
    /// Returns whether there was a connection to close.
    pub async fn disconnect(&mut self) -> bool {
        self.attempt += 1;
        let Some(live) = self.live.take() else {
            if self.state() == SocketState::Connecting {
                self.state.send_replace(SocketState::Disconnected);
            }
            return false;
        };

        let _ = live.commands.send(SocketCommand::Close);
        if let Err(e) = live.task.await {
            warn!("Socket {} task ended abnormally: {}", live.id, e);
        }
        self.state.send_replace(SocketState::Disconnected);
        info!("Socket {} disconnected", live.id);
        true
    }
}

impl Drop for SocketManager {
    fn drop(&mut self) {
        if let Some(live) = self.live.take() {
            live.task.abort();
        }
    }
}

enum Step {
    Command(Option<SocketCommand>),
    Frame(Option<Result<TransportFrame>>),
}

/// Owns one connection until it closes, errors or is told to stop
async fn run_connection(
    id: Uuid,
    mut connection: Box<dyn RealtimeConnection>,
    mut commands: mpsc::UnboundedReceiver<SocketCommand>,
    events: mpsc::UnboundedSender<SocketEvent>,
    state: Arc<watch::Sender<SocketState>>,
) {
    loop {
        let step = tokio::select! {
            command = commands.recv() => Step::Command(command),
            frame = connection.recv() => Step::Frame(frame),
        };

        match step {
            Step::Command(Some(SocketCommand::Subscribe(frame))) => {
                if let Err(e) = connection.send_text(frame).await {
                    warn!("Socket {} subscribe failed: {}", id, e);
                    let _ = events.send(SocketEvent::Error(e.to_string()));
                    break;
                }
                state.send_replace(SocketState::Subscribed);
                debug!("Socket {} subscribed", id);
            }
            Step::Command(Some(SocketCommand::Close)) | Step::Command(None) => {
                if let Err(e) = connection.close().await {
                    debug!("Socket {} close handshake failed: {}", id, e);
                }
                let _ = events.send(SocketEvent::Closed {
                    code: 1000,
                    reason: "closed by client".to_string(),
                });
                break;
            }
            Step::Frame(Some(Ok(TransportFrame::Text(text)))) => {
                handle_text(id, &text, &events);
            }
            Step::Frame(Some(Ok(TransportFrame::Closed { code, reason }))) => {
                info!("Socket {} closed by server: {} {}", id, code, reason);
                let _ = events.send(SocketEvent::Closed { code, reason });
                break;
            }
            Step::Frame(Some(Err(e))) => {
                warn!("Socket {} error: {}", id, e);
                let _ = events.send(SocketEvent::Error(e.to_string()));
                break;
            }
            Step::Frame(None) => {
                let _ = events.send(SocketEvent::Closed {
                    code: 1006,
                    reason: "stream ended".to_string(),
                });
                break;
            }
        }
    }

    state.send_replace(SocketState::Disconnected);
}

fn handle_text(id: Uuid, text: &str, events: &mpsc::UnboundedSender<SocketEvent>) {
    let frame = match SocketFrame::from_text(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!("Socket {} ignoring unrecognized frame: {}", id, e);
            return;
        }
    };

    match frame {
        SocketFrame::Message { data } => {
            let _ = events.send(SocketEvent::Message(data));
        }
        SocketFrame::Event { event, message_id } => {
            match StateChangeEvent::from_frame(event, message_id) {
                Some(change) => {
                    let _ = events.send(SocketEvent::StateChange(change));
                }
                None => debug!("Socket {} dropping {:?} event without message id", id, event),
            }
        }
    }
}
