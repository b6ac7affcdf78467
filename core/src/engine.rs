/// Inbox engine: the shared handle applications hold
///
/// All mutable state sits behind one `RwLock`. Locks are never held across a
/// network call or a listener callback; work is done in short critical
/// sections and listeners are notified from a copied listener list.
use crate::client::{HttpInboxClient, InboxApi};
use crate::config::Config;
use crate::error::{InboxError, Result};
use crate::listener::{
    fan_out, fan_out_changes, fan_out_snapshot, InboxListener, ListenerHandle, ListenerRegistry,
    Notification,
};
use crate::models::{InboxFeed, InboxSnapshot};
use crate::mutation::UnconfirmedFlags;
use crate::pipeline::PendingReload;
use crate::session::SessionProvider;
use crate::socket::{
    RealtimeTransport, SocketEvent, SocketManager, SocketState, StateChangeEvent, WsTransport,
};
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tracing::{debug, info, warn};

pub(crate) struct EngineState {
    pub(crate) config: Config,
    pub(crate) snapshot: Option<InboxSnapshot>,
    /// Generation of the reload that produced `snapshot`
    pub(crate) snapshot_generation: u64,
    pub(crate) next_generation: u64,
    pub(crate) pending: Option<PendingReload>,
    pub(crate) listeners: ListenerRegistry,
    /// Feeds with a page fetch in flight
    pub(crate) paging: HashSet<InboxFeed>,
    pub(crate) unconfirmed: UnconfirmedFlags,
}

pub(crate) struct EngineInner {
    pub(crate) state: RwLock<EngineState>,
    pub(crate) api: Arc<dyn InboxApi>,
    pub(crate) session: Arc<dyn SessionProvider>,
    pub(crate) socket: Mutex<SocketManager>,
    socket_state: watch::Receiver<SocketState>,
}

/// How a newly added listener catches up
enum Catchup {
    Unauthenticated,
    Snapshot(InboxSnapshot),
    JoinReload(bool),
    /// The pending reload has not announced itself yet and will include us
    AwaitReload,
    StartReload(PendingReload),
}

/// Cheap-to-clone handle to one inbox
#[derive(Clone)]
pub struct InboxEngine {
    pub(crate) inner: Arc<EngineInner>,
}

impl InboxEngine {
    pub fn new(
        mut config: Config,
        session: Arc<dyn SessionProvider>,
        api: Arc<dyn InboxApi>,
        transport: Arc<dyn RealtimeTransport>,
    ) -> Self {
        config.set_pagination_limit(config.pagination_limit);
        let socket = SocketManager::new(transport, config.socket_url.clone());
        let socket_state = socket.watch();

        Self {
            inner: Arc::new(EngineInner {
                state: RwLock::new(EngineState {
                    config,
                    snapshot: None,
                    snapshot_generation: 0,
                    next_generation: 0,
                    pending: None,
                    listeners: ListenerRegistry::new(),
                    paging: HashSet::new(),
                    unconfirmed: UnconfirmedFlags::default(),
                }),
                api,
                session,
                socket: Mutex::new(socket),
                socket_state,
            }),
        }
    }

    /// Engine wired to the HTTP API and the websocket transport
    pub fn connect(config: Config, session: Arc<dyn SessionProvider>) -> Result<Self> {
        let api = Arc::new(HttpInboxClient::new(&config, session.clone())?);
        let transport = Arc::new(WsTransport::new(config.connect_timeout));
        Ok(Self::new(config, session, api, transport))
    }

    /// Register a listener. It catches up with the current state: the live
    /// snapshot, the loading signal of a reload in flight, or a fresh reload
    /// when nothing has been loaded yet.
    pub async fn add_listener(&self, listener: InboxListener) -> ListenerHandle {
        let listener = Arc::new(listener);
        let signed_in = self.inner.session.is_signed_in();

        let (handle, catchup) = {
            let mut state = self.inner.state.write().await;
            let handle = state.listeners.add(listener.clone());
            let in_flight = state
                .pending
                .as_ref()
                .filter(|p| p.is_in_flight())
                .map(|p| (p.is_announced(), p.is_refresh()));

            let catchup = if !signed_in {
                Catchup::Unauthenticated
            } else if let Some((announced, is_refresh)) = in_flight {
                if announced {
                    Catchup::JoinReload(is_refresh)
                } else {
                    Catchup::AwaitReload
                }
            } else if let Some(snapshot) = state.snapshot.clone() {
                Catchup::Snapshot(snapshot)
            } else {
                Catchup::StartReload(state.begin_reload(false))
            };
            (handle, catchup)
        };

        debug!("Listener {} added", handle.id());
        let only = [listener];
        match catchup {
            Catchup::Unauthenticated => {
                warn!("Listener {} added without a signed-in user", handle.id());
                fan_out(&only, Notification::Error(&InboxError::NotAuthenticated));
            }
            Catchup::Snapshot(snapshot) => fan_out_snapshot(&only, &snapshot),
            Catchup::JoinReload(is_refresh) => fan_out(&only, Notification::Loading(is_refresh)),
            Catchup::AwaitReload => {}
            Catchup::StartReload(pending) => {
                let engine = self.clone();
                tokio::spawn(async move {
                    let _ = engine.run_reload(pending).await;
                });
            }
        }

        handle
    }

    /// Remove one listener. Removing the last one closes the inbox.
    pub async fn remove_listener(&self, handle: ListenerHandle) -> bool {
        let (removed, now_empty) = {
            let mut state = self.inner.state.write().await;
            let removed = state.listeners.remove(handle);
            (removed, removed && state.listeners.is_empty())
        };

        if removed {
            debug!("Listener {} removed", handle.id());
        }
        if now_empty {
            self.close_inbox().await;
        }
        removed
    }

    pub async fn remove_all_listeners(&self) -> usize {
        let removed = self.inner.state.write().await.listeners.clear();
        if removed > 0 {
            debug!("Removed all {} listeners", removed);
            self.close_inbox().await;
        }
        removed
    }

    /// Reload with `is_refresh` set
    pub async fn refresh(&self) -> Result<InboxSnapshot> {
        self.reload(true).await
    }

    /// Resume after `unlink`: refresh if anyone is listening
    pub async fn link(&self) -> Result<Option<InboxSnapshot>> {
        if self.listener_count().await == 0 {
            return Ok(None);
        }
        info!("Linking inbox");
        self.refresh().await.map(Some)
    }

    /// Pause realtime updates while keeping listeners and the snapshot
    pub async fn unlink(&self) {
        if self.listener_count().await == 0 {
            return;
        }
        info!("Unlinking inbox");
        self.close_socket().await;
    }

    pub async fn pagination_limit(&self) -> usize {
        self.inner.state.read().await.config.pagination_limit
    }

    /// Clamped into `[MIN_PAGE_LIMIT, MAX_PAGE_LIMIT]`
    pub async fn set_pagination_limit(&self, limit: usize) {
        let mut state = self.inner.state.write().await;
        state.config.set_pagination_limit(limit);
        debug!("Pagination limit set to {}", state.config.pagination_limit);
    }

    /// Copy of the live snapshot, if one has been published
    pub async fn snapshot(&self) -> Option<InboxSnapshot> {
        self.inner.state.read().await.snapshot.clone()
    }

    pub async fn listener_count(&self) -> usize {
        self.inner.state.read().await.listeners.len()
    }

    pub fn socket_state(&self) -> SocketState {
        *self.inner.socket_state.borrow()
    }

    /// Observe socket state transitions
    pub fn watch_socket(&self) -> watch::Receiver<SocketState> {
        self.inner.socket_state.clone()
    }

    pub(crate) async fn listeners(&self) -> Vec<Arc<InboxListener>> {
        self.inner.state.read().await.listeners.snapshot()
    }

    /// Cancel any reload and drop all state once nobody is listening
    async fn close_inbox(&self) {
        {
            let mut state = self.inner.state.write().await;
            if !state.listeners.is_empty() {
                return;
            }
            if let Some(pending) = state.pending.take() {
                pending.cancel();
            }
            state.snapshot = None;
            state.paging.clear();
            state.unconfirmed.clear();
        }

        self.close_socket().await;
        info!("Inbox closed, no listeners remain");
    }

    pub(crate) async fn close_socket(&self) -> bool {
        self.inner.socket.lock().await.disconnect().await
    }

    /// Open and subscribe the socket for the reload that published
    /// `generation`, unless that reload is no longer current
    pub(crate) async fn connect_socket(&self, generation: u64) {
        let Some(user_id) = self.inner.session.user_id() else {
            return;
        };
        let token = self.inner.session.auth_token();

        let attempt = {
            let mut socket = self.inner.socket.lock().await;
            {
                let state = self.inner.state.read().await;
                let current = state.pending.as_ref().map(|p| p.generation()) == Some(generation);
                if !current || state.listeners.is_empty() {
                    debug!("Skipping socket connect for stale reload {}", generation);
                    return;
                }
            }
            socket.prepare().await
        };

        // Dialed without the socket lock; install drops it if closed meanwhile
        let dialed = attempt.dial().await;

        let (events, rx) = mpsc::unbounded_channel();
        let mut socket = self.inner.socket.lock().await;
        if let Err(e) = socket.install(&attempt, dialed, events).await {
            warn!("Inbox socket unavailable: {}", e);
            return;
        }
        if let Err(e) = socket.subscribe(&user_id, token.as_deref()) {
            warn!("Inbox socket subscribe failed: {}", e);
        }
        drop(socket);

        spawn_event_loop(Arc::downgrade(&self.inner), rx);
    }

    pub(crate) async fn handle_socket_event(&self, event: SocketEvent) {
        match event {
            SocketEvent::Opened => debug!("Inbox socket opened"),
            SocketEvent::Message(message) => {
                info!("New inbox message received: {}", message.message_id);
            }
            SocketEvent::StateChange(change) => self.apply_remote_change(change).await,
            SocketEvent::Closed { code, reason } => {
                info!("Inbox socket closed: {} {}", code, reason);
            }
            SocketEvent::Error(e) => warn!("Inbox socket error: {}", e),
        }
    }

    /// Apply a status change pushed by the server. Unknown ids are ignored.
    async fn apply_remote_change(&self, change: StateChangeEvent) {
        let (changes, listeners) = {
            let mut guard = self.inner.state.write().await;
            let state = &mut *guard;
            let Some(snapshot) = state.snapshot.as_mut() else {
                return;
            };

            let applied = match &change {
                StateChangeEvent::MarkAllRead => Some(snapshot.read_all()),
                StateChangeEvent::Read(id) => snapshot.set_read(id, true),
                StateChangeEvent::Unread(id) => snapshot.set_read(id, false),
                StateChangeEvent::Archive(id) => {
                    info!("Message {} archived remotely", id);
                    snapshot.archive(id)
                }
                StateChangeEvent::Opened(id) => {
                    info!("Message {} opened remotely", id);
                    snapshot.set_opened(id)
                }
            };

            let Some((_, changes)) = applied else {
                debug!("Ignoring {} for unknown message", change);
                return;
            };
            (changes, state.listeners.snapshot())
        };

        fan_out_changes(&listeners, &changes);
    }
}

/// Drain one connection's events. Holds the engine weakly so an open socket
/// does not keep a dropped engine alive.
fn spawn_event_loop(engine: Weak<EngineInner>, mut events: mpsc::UnboundedReceiver<SocketEvent>) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let Some(inner) = engine.upgrade() else {
                break;
            };
            InboxEngine { inner }.handle_socket_event(event).await;
        }
    });
}
