/// Sync pipeline: full reloads and next-page fetches
///
/// A reload cancels whatever reload is in flight, announces `on_loading`,
/// fetches the feed page, archived page and unread count concurrently, and
/// only then publishes a new snapshot and (re)opens the socket. Any failure
/// discards all three results and keeps the previous snapshot.
use crate::engine::{EngineState, InboxEngine};
use crate::error::{InboxError, Result};
use crate::listener::{fan_out, fan_out_snapshot, Notification};
use crate::models::{InboxFeed, InboxMessage, InboxSnapshot, MessageSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Handle for the in-flight reload. At most one exists per engine.
#[derive(Debug, Clone)]
pub struct PendingReload {
    generation: u64,
    is_refresh: bool,
    token: CancellationToken,
    /// `on_loading` has gone out to the listeners registered at the time
    announced: bool,
    completed: bool,
}

impl PendingReload {
    fn new(generation: u64, is_refresh: bool) -> Self {
        Self {
            generation,
            is_refresh,
            token: CancellationToken::new(),
            announced: false,
            completed: false,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_refresh(&self) -> bool {
        self.is_refresh
    }

    pub fn is_announced(&self) -> bool {
        self.announced
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }

    /// Still running and not superseded
    pub(crate) fn is_in_flight(&self) -> bool {
        !self.completed && !self.is_cancelled()
    }
}

impl EngineState {
    /// Cancel the current reload (if any) and register a new one
    pub(crate) fn begin_reload(&mut self, is_refresh: bool) -> PendingReload {
        if let Some(previous) = self.pending.take() {
            if previous.is_in_flight() {
                debug!("Reload {} superseded", previous.generation);
            }
            previous.cancel();
        }

        self.next_generation += 1;
        let pending = PendingReload::new(self.next_generation, is_refresh);
        self.pending = Some(pending.clone());
        pending
    }

    fn is_current(&self, pending: &PendingReload) -> bool {
        !pending.is_cancelled()
            && self
                .pending
                .as_ref()
                .is_some_and(|p| p.generation == pending.generation)
    }

    fn complete(&mut self, pending: &PendingReload) {
        if let Some(current) = self.pending.as_mut() {
            if current.generation == pending.generation {
                current.completed = true;
            }
        }
    }
}

impl InboxEngine {
    /// Reload the whole inbox, replacing the live snapshot on success
    pub async fn reload(&self, is_refresh: bool) -> Result<InboxSnapshot> {
        if !self.inner.session.is_signed_in() {
            let err = InboxError::NotAuthenticated;
            warn!("Inbox reload requested without a signed-in user");
            let listeners = self.listeners().await;
            fan_out(&listeners, Notification::Error(&err));
            return Err(err);
        }

        let pending = self.inner.state.write().await.begin_reload(is_refresh);
        self.run_reload(pending).await
    }

    pub(crate) async fn run_reload(&self, pending: PendingReload) -> Result<InboxSnapshot> {
        let (limit, listeners) = {
            let mut state = self.inner.state.write().await;
            if let Some(current) = state.pending.as_mut() {
                if current.generation == pending.generation {
                    current.announced = true;
                }
            }
            (
                state.config.reload_limit(pending.is_refresh),
                state.listeners.snapshot(),
            )
        };

        info!(
            "Reload {} started (refresh: {}, limit: {})",
            pending.generation, pending.is_refresh, limit
        );
        fan_out(&listeners, Notification::Loading(pending.is_refresh));

        let fetched = tokio::select! {
            _ = pending.token.cancelled() => {
                debug!("Reload {} cancelled in flight", pending.generation);
                return Err(InboxError::Cancelled);
            }
            result = self.fetch_inbox(limit) => result,
        };

        match fetched {
            Ok(snapshot) => self.publish(&pending, snapshot).await,
            Err(err) => self.fail(&pending, err).await,
        }
    }

    /// Feed page, archived page and unread count, concurrently.
    /// The first failure drops the other two requests.
    async fn fetch_inbox(&self, limit: usize) -> Result<InboxSnapshot> {
        let api = &self.inner.api;
        let (feed, archived, unread_count) = tokio::try_join!(
            api.get_messages(limit, None),
            api.get_archived_messages(limit, None),
            api.get_unread_count(),
        )?;
        Ok(InboxSnapshot::new(feed, archived, unread_count))
    }

    async fn publish(&self, pending: &PendingReload, snapshot: InboxSnapshot) -> Result<InboxSnapshot> {
        let listeners = {
            let mut state = self.inner.state.write().await;
            if !state.is_current(pending) {
                debug!("Reload {} finished after being superseded", pending.generation);
                return Err(InboxError::Cancelled);
            }
            state.snapshot = Some(snapshot.clone());
            state.snapshot_generation = pending.generation;
            state.paging.clear();
            state.unconfirmed.clear();
            state.complete(pending);
            state.listeners.snapshot()
        };

        info!(
            "Reload {} published: {} messages, {} archived, {} unread",
            pending.generation,
            snapshot.feed.len(),
            snapshot.archived.len(),
            snapshot.unread_count
        );
        fan_out_snapshot(&listeners, &snapshot);

        // Socket strictly after publication
        if !listeners.is_empty() {
            self.connect_socket(pending.generation).await;
        }

        Ok(snapshot)
    }

    async fn fail(&self, pending: &PendingReload, err: InboxError) -> Result<InboxSnapshot> {
        let listeners = {
            let mut state = self.inner.state.write().await;
            if !state.is_current(pending) {
                return Err(InboxError::Cancelled);
            }
            state.complete(pending);
            state.listeners.snapshot()
        };

        error!("Reload {} failed: {}", pending.generation, err);
        self.close_socket().await;
        fan_out(&listeners, Notification::Error(&err));
        Err(err)
    }

    /// Fetch and append the next page of `feed`. Returns the appended
    /// messages, or nothing when the feed is exhausted or already paging.
    /// The fetch runs on its own task and always clears its paging mark,
    /// even if the returned future is dropped.
    pub async fn fetch_next_page(&self, feed: InboxFeed) -> Result<Vec<InboxMessage>> {
        let engine = self.clone();
        tokio::spawn(async move { engine.fetch_page(feed).await }).await?
    }

    async fn fetch_page(&self, feed: InboxFeed) -> Result<Vec<InboxMessage>> {
        if !self.inner.session.is_signed_in() {
            return Err(InboxError::NotAuthenticated);
        }

        let (cursor, generation, limit) = {
            let mut guard = self.inner.state.write().await;
            let state = &mut *guard;
            let snapshot = state.snapshot.as_ref().ok_or(InboxError::NotInitialized)?;
            let set = snapshot.set(feed);
            if !set.has_next_page || state.paging.contains(&feed) {
                return Ok(Vec::new());
            }
            let cursor = set.cursor.clone();
            state.paging.insert(feed);
            (cursor, state.snapshot_generation, state.config.pagination_limit)
        };

        debug!("Fetching next {:?} page after {:?}", feed, cursor);
        let api = &self.inner.api;
        let result = match feed {
            InboxFeed::Feed => api.get_messages(limit, cursor.as_deref()).await,
            InboxFeed::Archived => api.get_archived_messages(limit, cursor.as_deref()).await,
        };

        let (outcome, listeners) = {
            let mut guard = self.inner.state.write().await;
            let state = &mut *guard;
            let current = state.snapshot.is_some() && state.snapshot_generation == generation;
            if current {
                state.paging.remove(&feed);
            }

            let outcome = match (result, state.snapshot.as_mut()) {
                (Ok(page), Some(snapshot)) if current => {
                    let set = snapshot.set_mut(feed);
                    let added = set.append_page(page);
                    Ok(MessageSet {
                        messages: added,
                        cursor: set.cursor.clone(),
                        has_next_page: set.has_next_page,
                    })
                }
                (Ok(_), _) => {
                    debug!("Discarding {:?} page fetched for a replaced inbox", feed);
                    return Ok(Vec::new());
                }
                (Err(err), _) => Err(err),
            };
            (outcome, state.listeners.snapshot())
        };

        match outcome {
            Ok(page) => {
                info!("Appended {} messages to {:?}", page.len(), feed);
                fan_out(&listeners, Notification::PageAdded(feed, &page));
                Ok(page.messages)
            }
            Err(err) => {
                warn!("Fetching next {:?} page failed: {}", feed, err);
                fan_out(&listeners, Notification::Error(&err));
                Err(err)
            }
        }
    }
}
