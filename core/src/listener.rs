/// Inbox listeners and ordered fan-out
use crate::error::InboxError;
use crate::models::{InboxChange, InboxFeed, InboxMessage, InboxSnapshot, MessageSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

type LoadingFn = Box<dyn Fn(bool) + Send + Sync>;
type ErrorFn = Box<dyn Fn(&InboxError) + Send + Sync>;
type CountFn = Box<dyn Fn(u32) + Send + Sync>;
type SetFn = Box<dyn Fn(&MessageSet) + Send + Sync>;
type PageFn = Box<dyn Fn(InboxFeed, &MessageSet) + Send + Sync>;
type MessageFn = Box<dyn Fn(InboxFeed, usize, &InboxMessage) + Send + Sync>;

/// A subscriber. Every callback slot is optional.
#[derive(Default)]
pub struct InboxListener {
    on_loading: Option<LoadingFn>,
    on_error: Option<ErrorFn>,
    on_unread_count_changed: Option<CountFn>,
    on_feed_changed: Option<SetFn>,
    on_archive_changed: Option<SetFn>,
    on_page_added: Option<PageFn>,
    on_message_changed: Option<MessageFn>,
    on_all_read: Option<SetFn>,
}

impl InboxListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with `is_refresh` when a reload starts
    pub fn on_loading(mut self, f: impl Fn(bool) + Send + Sync + 'static) -> Self {
        self.on_loading = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&InboxError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn on_unread_count_changed(mut self, f: impl Fn(u32) + Send + Sync + 'static) -> Self {
        self.on_unread_count_changed = Some(Box::new(f));
        self
    }

    pub fn on_feed_changed(mut self, f: impl Fn(&MessageSet) + Send + Sync + 'static) -> Self {
        self.on_feed_changed = Some(Box::new(f));
        self
    }

    pub fn on_archive_changed(mut self, f: impl Fn(&MessageSet) + Send + Sync + 'static) -> Self {
        self.on_archive_changed = Some(Box::new(f));
        self
    }

    /// Called with the newly appended messages only
    pub fn on_page_added(
        mut self,
        f: impl Fn(InboxFeed, &MessageSet) + Send + Sync + 'static,
    ) -> Self {
        self.on_page_added = Some(Box::new(f));
        self
    }

    pub fn on_message_changed(
        mut self,
        f: impl Fn(InboxFeed, usize, &InboxMessage) + Send + Sync + 'static,
    ) -> Self {
        self.on_message_changed = Some(Box::new(f));
        self
    }

    /// Called once with the whole feed when everything is marked read.
    /// Without it the listener gets `on_feed_changed` and a zero
    /// `on_unread_count_changed` instead.
    pub fn on_all_read(mut self, f: impl Fn(&MessageSet) + Send + Sync + 'static) -> Self {
        self.on_all_read = Some(Box::new(f));
        self
    }

    fn deliver(&self, notification: &Notification<'_>) {
        match *notification {
            Notification::Loading(is_refresh) => {
                if let Some(f) = &self.on_loading {
                    f(is_refresh)
                }
            }
            Notification::Error(err) => {
                if let Some(f) = &self.on_error {
                    f(err)
                }
            }
            Notification::UnreadCount(count) => {
                if let Some(f) = &self.on_unread_count_changed {
                    f(count)
                }
            }
            Notification::Feed(set) => {
                if let Some(f) = &self.on_feed_changed {
                    f(set)
                }
            }
            Notification::Archive(set) => {
                if let Some(f) = &self.on_archive_changed {
                    f(set)
                }
            }
            Notification::PageAdded(feed, set) => {
                if let Some(f) = &self.on_page_added {
                    f(feed, set)
                }
            }
            Notification::MessageChanged(feed, index, message) => {
                if let Some(f) = &self.on_message_changed {
                    f(feed, index, message)
                }
            }
            Notification::AllRead(set) => match &self.on_all_read {
                Some(f) => f(set),
                None => {
                    if let Some(f) = &self.on_feed_changed {
                        f(set)
                    }
                    if let Some(f) = &self.on_unread_count_changed {
                        f(0)
                    }
                }
            },
        }
    }
}

/// One callback invocation, borrowed from engine state
#[derive(Debug, Clone, Copy)]
pub(crate) enum Notification<'a> {
    Loading(bool),
    Error(&'a InboxError),
    UnreadCount(u32),
    Feed(&'a MessageSet),
    Archive(&'a MessageSet),
    PageAdded(InboxFeed, &'a MessageSet),
    MessageChanged(InboxFeed, usize, &'a InboxMessage),
    AllRead(&'a MessageSet),
}

impl<'a> Notification<'a> {
    fn name(&self) -> &'static str {
        match self {
            Notification::Loading(_) => "loading",
            Notification::Error(_) => "error",
            Notification::UnreadCount(_) => "unread_count_changed",
            Notification::Feed(_) => "feed_changed",
            Notification::Archive(_) => "archive_changed",
            Notification::PageAdded(..) => "page_added",
            Notification::MessageChanged(..) => "message_changed",
            Notification::AllRead(_) => "all_read",
        }
    }

    pub(crate) fn from_change(change: &'a InboxChange) -> Self {
        match change {
            InboxChange::MessageChanged {
                feed,
                index,
                message,
            } => Notification::MessageChanged(*feed, *index, message),
            InboxChange::FeedChanged(set) => Notification::Feed(set),
            InboxChange::ArchiveChanged(set) => Notification::Archive(set),
            InboxChange::UnreadCount(count) => Notification::UnreadCount(*count),
            InboxChange::AllRead(set) => Notification::AllRead(set),
        }
    }
}

/// Deliver to every listener in registration order. A panicking callback is
/// logged and does not stop delivery to the rest.
pub(crate) fn fan_out(listeners: &[Arc<InboxListener>], notification: Notification<'_>) {
    for listener in listeners {
        let delivered = catch_unwind(AssertUnwindSafe(|| listener.deliver(&notification)));
        if delivered.is_err() {
            error!("Inbox listener panicked in {} callback", notification.name());
        }
    }
}

/// Deliver a full snapshot: feed, archive, then unread count
pub(crate) fn fan_out_snapshot(listeners: &[Arc<InboxListener>], snapshot: &InboxSnapshot) {
    fan_out(listeners, Notification::Feed(&snapshot.feed));
    fan_out(listeners, Notification::Archive(&snapshot.archived));
    fan_out(listeners, Notification::UnreadCount(snapshot.unread_count));
}

pub(crate) fn fan_out_changes(listeners: &[Arc<InboxListener>], changes: &[InboxChange]) {
    for change in changes {
        fan_out(listeners, Notification::from_change(change));
    }
}

/// Opaque subscription handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(Uuid);

impl ListenerHandle {
    pub fn id(&self) -> Uuid {
        self.0
    }
}

/// Ordered set of registered listeners
#[derive(Default)]
pub struct ListenerRegistry {
    entries: Vec<(ListenerHandle, Arc<InboxListener>)>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, listener: Arc<InboxListener>) -> ListenerHandle {
        let handle = ListenerHandle(Uuid::new_v4());
        self.entries.push((handle, listener));
        handle
    }

    pub fn get(&self, handle: ListenerHandle) -> Option<Arc<InboxListener>> {
        self.entries
            .iter()
            .find(|(h, _)| *h == handle)
            .map(|(_, l)| l.clone())
    }

    /// Returns whether the handle was registered
    pub fn remove(&mut self, handle: ListenerHandle) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(h, _)| *h != handle);
        self.entries.len() != before
    }

    /// Returns how many listeners were dropped
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy of the current listener list, safe to iterate while the
    /// registry changes underneath
    pub fn snapshot(&self) -> Vec<Arc<InboxListener>> {
        self.entries.iter().map(|(_, l)| l.clone()).collect()
    }
}
