/// Optimistic mutations
///
/// Every user action runs the same three steps: apply it to the snapshot and
/// notify listeners, confirm it with the backend, and on failure put back
/// the flags or position captured in step one.
use crate::client::InboxApi;
use crate::engine::InboxEngine;
use crate::error::{InboxError, Result};
use crate::listener::{fan_out, fan_out_changes, InboxListener, Notification};
use crate::models::{InboxChange, InboxSnapshot, MessageFlag, Undo};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A user action on the inbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboxAction {
    Read(String),
    Unread(String),
    Open(String),
    Archive(String),
    Click {
        message_id: String,
        tracking_id: String,
    },
    ReadAll,
}

impl InboxAction {
    pub fn message_id(&self) -> Option<&str> {
        match self {
            InboxAction::Read(id)
            | InboxAction::Unread(id)
            | InboxAction::Open(id)
            | InboxAction::Archive(id) => Some(id),
            InboxAction::Click { message_id, .. } => Some(message_id),
            InboxAction::ReadAll => None,
        }
    }

    /// Read-state actions fail fast without a local copy. The others are
    /// still sent to the backend.
    fn requires_local_copy(&self) -> bool {
        matches!(
            self,
            InboxAction::Read(_) | InboxAction::Unread(_) | InboxAction::ReadAll
        )
    }

    fn apply(&self, snapshot: &mut InboxSnapshot) -> Option<(Undo, Vec<InboxChange>)> {
        match self {
            InboxAction::Read(id) => snapshot.set_read(id, true),
            InboxAction::Unread(id) => snapshot.set_read(id, false),
            InboxAction::Open(id) => snapshot.set_opened(id),
            InboxAction::Archive(id) => snapshot.archive(id),
            InboxAction::Click { message_id, .. } => snapshot.set_clicked(message_id),
            InboxAction::ReadAll => Some(snapshot.read_all()),
        }
    }

    async fn confirm(&self, api: &dyn InboxApi) -> Result<()> {
        match self {
            InboxAction::Read(id) => api.read(id).await,
            InboxAction::Unread(id) => api.unread(id).await,
            InboxAction::Open(id) => api.open(id).await,
            InboxAction::Archive(id) => api.archive(id).await,
            InboxAction::Click {
                message_id,
                tracking_id,
            } => api.click(message_id, tracking_id).await,
            InboxAction::ReadAll => api.read_all().await,
        }
    }
}

impl fmt::Display for InboxAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InboxAction::Read(id) => write!(f, "read({})", id),
            InboxAction::Unread(id) => write!(f, "unread({})", id),
            InboxAction::Open(id) => write!(f, "open({})", id),
            InboxAction::Archive(id) => write!(f, "archive({})", id),
            InboxAction::Click { message_id, .. } => write!(f, "click({})", message_id),
            InboxAction::ReadAll => write!(f, "read_all"),
        }
    }
}

/// What step one captured, for step three
struct Applied {
    generation: u64,
    undo: Undo,
}

impl InboxEngine {
    pub async fn read(&self, message_id: &str) -> Result<()> {
        self.mutate(InboxAction::Read(message_id.to_string())).await
    }

    pub async fn unread(&self, message_id: &str) -> Result<()> {
        self.mutate(InboxAction::Unread(message_id.to_string())).await
    }

    pub async fn open(&self, message_id: &str) -> Result<()> {
        self.mutate(InboxAction::Open(message_id.to_string())).await
    }

    pub async fn archive(&self, message_id: &str) -> Result<()> {
        self.mutate(InboxAction::Archive(message_id.to_string())).await
    }

    pub async fn click(&self, message_id: &str, tracking_id: &str) -> Result<()> {
        self.mutate(InboxAction::Click {
            message_id: message_id.to_string(),
            tracking_id: tracking_id.to_string(),
        })
        .await
    }

    pub async fn read_all(&self) -> Result<()> {
        self.mutate(InboxAction::ReadAll).await
    }

    /// Apply `action` locally, confirm it remotely, roll back on failure.
    /// The confirmation runs on its own task: dropping the returned future
    /// does not stop the rollback.
    pub async fn mutate(&self, action: InboxAction) -> Result<()> {
        if !self.inner.session.is_signed_in() {
            return Err(InboxError::NotAuthenticated);
        }

        let applied = self.apply_local(&action).await?;

        let engine = self.clone();
        tokio::spawn(async move { engine.settle(action, applied).await }).await?
    }

    async fn apply_local(&self, action: &InboxAction) -> Result<Option<Applied>> {
        let (applied, changes, listeners) = {
            let mut guard = self.inner.state.write().await;
            let state = &mut *guard;

            let Some(snapshot) = state.snapshot.as_mut() else {
                if action.requires_local_copy() {
                    return Err(InboxError::NotInitialized);
                }
                return Ok(None);
            };

            let Some((undo, changes)) = action.apply(snapshot) else {
                if action.requires_local_copy() {
                    let id = action.message_id().unwrap_or_default();
                    return Err(InboxError::MessageNotFound(id.to_string()));
                }
                debug!("{} not in local inbox, sending to backend only", action);
                return Ok(None);
            };

            state.unconfirmed.track(&undo);
            let applied = Applied {
                generation: state.snapshot_generation,
                undo,
            };
            (applied, changes, state.listeners.snapshot())
        };

        fan_out_changes(&listeners, &changes);
        Ok(Some(applied))
    }

    async fn settle(&self, action: InboxAction, applied: Option<Applied>) -> Result<()> {
        debug!("Confirming {} with backend", action);
        let err = match action.confirm(self.inner.api.as_ref()).await {
            Ok(()) => {
                info!("Confirmed {}", action);
                if let Some(applied) = applied {
                    self.reconcile(applied, true).await;
                }
                return Ok(());
            }
            Err(err) => err,
        };

        warn!("{} rejected, rolling back: {}", action, err);
        let listeners = match applied {
            Some(applied) => self.reconcile(applied, false).await,
            None => self.listeners().await,
        };
        fan_out(&listeners, Notification::Error(&err));
        Err(err)
    }

    /// Record the backend's answer and bring the local copy in line with
    /// it, unless a reload has replaced the snapshot in the meantime.
    /// Returns the listeners to report a failure to.
    async fn reconcile(&self, applied: Applied, confirmed: bool) -> Vec<Arc<InboxListener>> {
        let (changes, listeners) = {
            let mut guard = self.inner.state.write().await;
            let state = &mut *guard;
            let changes = match state.snapshot.as_mut() {
                Some(snapshot) if state.snapshot_generation == applied.generation => {
                    state.unconfirmed.settle(snapshot, applied.undo, confirmed)
                }
                _ => {
                    debug!("Inbox reloaded since the mutation, nothing to roll back");
                    Vec::new()
                }
            };
            (changes, state.listeners.snapshot())
        };

        fan_out_changes(&listeners, &changes);
        listeners
    }
}

#[derive(Debug)]
struct FlagWrites {
    in_flight: usize,
    /// Value the backend last accepted, or the value before the first write
    accepted: bool,
    rejected: bool,
}

/// Flag writes still waiting for the backend, per message flag.
///
/// Writes to one flag can overlap. A rejected write is only undone once the
/// last overlapping write has answered, and then the flag goes back to the
/// value the backend accepted last rather than to what the rejected write
/// saw locally.
#[derive(Debug, Default)]
pub(crate) struct UnconfirmedFlags {
    entries: HashMap<(String, MessageFlag), FlagWrites>,
}

impl UnconfirmedFlags {
    fn begin(&mut self, message_id: &str, flag: MessageFlag, previous: bool) {
        self.entries
            .entry((message_id.to_string(), flag))
            .or_insert(FlagWrites {
                in_flight: 0,
                accepted: previous,
                rejected: false,
            })
            .in_flight += 1;
    }

    /// `written` is the value the backend accepted, `None` on rejection.
    /// Returns the value to put back once the last write has answered and
    /// one of them was rejected.
    fn answer(&mut self, message_id: &str, flag: MessageFlag, written: Option<bool>) -> Option<bool> {
        let key = (message_id.to_string(), flag);
        let writes = self.entries.get_mut(&key)?;
        writes.in_flight = writes.in_flight.saturating_sub(1);
        match written {
            Some(value) => writes.accepted = value,
            None => writes.rejected = true,
        }
        if writes.in_flight > 0 {
            return None;
        }
        let writes = self.entries.remove(&key)?;
        writes.rejected.then_some(writes.accepted)
    }

    pub(crate) fn track(&mut self, undo: &Undo) {
        match undo {
            Undo::Flag {
                message_id,
                flag,
                previous,
                ..
            } => self.begin(message_id, *flag, *previous),
            Undo::ReadAll { previous, .. } => {
                for (message_id, read) in previous {
                    self.begin(message_id, MessageFlag::Read, *read);
                }
            }
            Undo::Archive { .. } => {}
        }
    }

    /// Apply the backend's answer for `undo` to `snapshot`
    fn settle(&mut self, snapshot: &mut InboxSnapshot, undo: Undo, confirmed: bool) -> Vec<InboxChange> {
        match undo {
            Undo::Flag {
                message_id,
                flag,
                value,
                ..
            } => match self.answer(&message_id, flag, confirmed.then_some(value)) {
                Some(accepted) if snapshot.flag(&message_id, flag) != Some(accepted) => snapshot
                    .set_flag(&message_id, flag, accepted)
                    .map(|(_, changes)| changes)
                    .unwrap_or_default(),
                _ => Vec::new(),
            },
            Undo::ReadAll {
                previous,
                hidden_unread,
            } => {
                let reads: Vec<(String, bool)> = previous
                    .into_iter()
                    .filter_map(|(message_id, _)| {
                        let accepted =
                            self.answer(&message_id, MessageFlag::Read, confirmed.then_some(true))?;
                        Some((message_id, accepted))
                    })
                    .collect();
                let hidden_unread = if confirmed { 0 } else { hidden_unread };
                snapshot.restore_reads(&reads, hidden_unread)
            }
            Undo::Archive { .. } if confirmed => Vec::new(),
            undo @ Undo::Archive { .. } => snapshot.restore(undo),
        }
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
