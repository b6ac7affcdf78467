/// Inbox data model: messages, feeds and the live snapshot
///
/// Status flags only change through the operations on `InboxSnapshot`, each of
/// which hands back an `Undo` record (for rollback) and the list of
/// `InboxChange`s listeners need to hear about.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which of the two message lists an item lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InboxFeed {
    /// Active messages
    Feed,
    /// Archived messages
    Archived,
}

/// One inbox message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxMessage {
    pub message_id: String,
    pub title: Option<String>,
    pub body: Option<String>,
    pub preview: Option<String>,
    /// Opaque payload attached by the sender
    pub data: Option<serde_json::Value>,
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub opened: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub clicked: bool,
    /// Click-tracking token passed back on `click`
    pub tracking_id: Option<String>,
}

impl InboxMessage {
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            title: None,
            body: None,
            preview: None,
            data: None,
            created: None,
            read: false,
            opened: false,
            archived: false,
            clicked: false,
            tracking_id: None,
        }
    }

    pub fn flags(&self) -> MessageFlags {
        MessageFlags {
            read: self.read,
            opened: self.opened,
            archived: self.archived,
            clicked: self.clicked,
        }
    }

    fn set_flags(&mut self, flags: MessageFlags) {
        self.read = flags.read;
        self.opened = flags.opened;
        self.archived = flags.archived;
        self.clicked = flags.clicked;
    }
}

/// The mutable part of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageFlags {
    pub read: bool,
    pub opened: bool,
    pub archived: bool,
    pub clicked: bool,
}

/// One boolean status flag of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageFlag {
    Read,
    Opened,
    Archived,
    Clicked,
}

impl MessageFlag {
    pub fn get(self, flags: &MessageFlags) -> bool {
        match self {
            MessageFlag::Read => flags.read,
            MessageFlag::Opened => flags.opened,
            MessageFlag::Archived => flags.archived,
            MessageFlag::Clicked => flags.clicked,
        }
    }

    fn set(self, flags: &mut MessageFlags, value: bool) {
        match self {
            MessageFlag::Read => flags.read = value,
            MessageFlag::Opened => flags.opened = value,
            MessageFlag::Archived => flags.archived = value,
            MessageFlag::Clicked => flags.clicked = value,
        }
    }
}

/// One page as returned by the remote inbox API
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub messages: Vec<InboxMessage>,
    /// Cursor for the page after this one
    pub cursor: Option<String>,
    #[serde(default)]
    pub has_next_page: bool,
}

/// An ordered feed plus its pagination state
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MessageSet {
    pub messages: Vec<InboxMessage>,
    /// None = at start
    pub cursor: Option<String>,
    pub has_next_page: bool,
}

impl MessageSet {
    pub fn from_page(page: MessagePage) -> Self {
        let mut set = MessageSet::default();
        set.append_page(page);
        set
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn position(&self, message_id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.message_id == message_id)
    }

    pub fn get(&self, message_id: &str) -> Option<&InboxMessage> {
        self.messages.iter().find(|m| m.message_id == message_id)
    }

    /// Append a page in server order, skipping ids already present.
    /// Returns the messages actually appended.
    pub fn append_page(&mut self, page: MessagePage) -> Vec<InboxMessage> {
        let mut added = Vec::with_capacity(page.messages.len());
        for message in page.messages {
            if self.position(&message.message_id).is_none() {
                self.messages.push(message.clone());
                added.push(message);
            }
        }
        self.cursor = page.cursor;
        self.has_next_page = page.has_next_page;
        added
    }
}

/// A change listeners must be told about
#[derive(Debug, Clone, PartialEq)]
pub enum InboxChange {
    MessageChanged {
        feed: InboxFeed,
        index: usize,
        message: InboxMessage,
    },
    FeedChanged(MessageSet),
    ArchiveChanged(MessageSet),
    UnreadCount(u32),
    /// Every active message read and the counter at zero, as one change
    AllRead(MessageSet),
}

/// Captured state needed to revert one model operation
#[derive(Debug, Clone, PartialEq)]
pub enum Undo {
    /// A single flag write: `previous` is restored, `value` was written
    Flag {
        message_id: String,
        flag: MessageFlag,
        previous: bool,
        value: bool,
    },
    ReadAll {
        /// Read flag of every active message before the write
        previous: Vec<(String, bool)>,
        /// Unread messages the counter held beyond the loaded ones
        hidden_unread: u32,
    },
    Archive {
        message: InboxMessage,
        index: usize,
    },
}

/// Complete in-memory inbox state
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InboxSnapshot {
    pub feed: MessageSet,
    pub archived: MessageSet,
    pub unread_count: u32,
}

impl InboxSnapshot {
    pub fn new(feed: MessagePage, archived: MessagePage, unread_count: u32) -> Self {
        Self {
            feed: MessageSet::from_page(feed),
            archived: MessageSet::from_page(archived),
            unread_count,
        }
    }

    pub fn set(&self, feed: InboxFeed) -> &MessageSet {
        match feed {
            InboxFeed::Feed => &self.feed,
            InboxFeed::Archived => &self.archived,
        }
    }

    pub fn set_mut(&mut self, feed: InboxFeed) -> &mut MessageSet {
        match feed {
            InboxFeed::Feed => &mut self.feed,
            InboxFeed::Archived => &mut self.archived,
        }
    }

    /// Locate a message, active feed first
    pub fn locate(&self, message_id: &str) -> Option<(InboxFeed, usize)> {
        self.feed
            .position(message_id)
            .map(|i| (InboxFeed::Feed, i))
            .or_else(|| {
                self.archived
                    .position(message_id)
                    .map(|i| (InboxFeed::Archived, i))
            })
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.locate(message_id).is_some()
    }

    /// Set the read flag. Flag set, not toggle: repeating it is a no-op.
    pub fn set_read(&mut self, message_id: &str, read: bool) -> Option<(Undo, Vec<InboxChange>)> {
        self.set_flag(message_id, MessageFlag::Read, read)
    }

    pub fn set_opened(&mut self, message_id: &str) -> Option<(Undo, Vec<InboxChange>)> {
        self.set_flag(message_id, MessageFlag::Opened, true)
    }

    pub fn set_clicked(&mut self, message_id: &str) -> Option<(Undo, Vec<InboxChange>)> {
        self.set_flag(message_id, MessageFlag::Clicked, true)
    }

    pub fn flag(&self, message_id: &str, flag: MessageFlag) -> Option<bool> {
        let (feed, index) = self.locate(message_id)?;
        Some(flag.get(&self.set(feed).messages[index].flags()))
    }

    /// Mark every active message read and zero the counter
    pub fn read_all(&mut self) -> (Undo, Vec<InboxChange>) {
        let previous: Vec<(String, bool)> = self
            .feed
            .messages
            .iter()
            .map(|m| (m.message_id.clone(), m.read))
            .collect();
        let loaded_unread = previous.iter().filter(|(_, read)| !read).count() as u32;
        let undo = Undo::ReadAll {
            previous,
            hidden_unread: self.unread_count.saturating_sub(loaded_unread),
        };

        for message in &mut self.feed.messages {
            message.read = true;
        }
        self.unread_count = 0;

        (undo, vec![InboxChange::AllRead(self.feed.clone())])
    }

    /// Put active messages' read flags back to the given values, then add
    /// `hidden_unread` to the counter. Nothing to report when no flag moved.
    pub fn restore_reads(&mut self, reads: &[(String, bool)], hidden_unread: u32) -> Vec<InboxChange> {
        let mut moved = hidden_unread > 0;
        for (message_id, read) in reads {
            let Some(index) = self.feed.position(message_id) else {
                continue;
            };
            let message = &mut self.feed.messages[index];
            if message.read == *read {
                continue;
            }
            message.read = *read;
            moved = true;
            self.unread_count = if *read {
                self.unread_count.saturating_sub(1)
            } else {
                self.unread_count + 1
            };
        }
        self.unread_count += hidden_unread;

        if !moved {
            return Vec::new();
        }
        vec![
            InboxChange::FeedChanged(self.feed.clone()),
            InboxChange::UnreadCount(self.unread_count),
        ]
    }

    /// Move a message from the active feed to the front of the archive
    pub fn archive(&mut self, message_id: &str) -> Option<(Undo, Vec<InboxChange>)> {
        match self.locate(message_id)? {
            (InboxFeed::Archived, _) => self.set_flag(message_id, MessageFlag::Archived, true),
            (InboxFeed::Feed, index) => {
                let original = self.feed.messages.remove(index);
                let mut moved = original.clone();
                moved.archived = true;
                self.archived.messages.insert(0, moved);

                let mut changes = vec![
                    InboxChange::FeedChanged(self.feed.clone()),
                    InboxChange::ArchiveChanged(self.archived.clone()),
                ];
                if !original.read {
                    self.unread_count = self.unread_count.saturating_sub(1);
                    changes.push(InboxChange::UnreadCount(self.unread_count));
                }

                Some((
                    Undo::Archive {
                        message: original,
                        index,
                    },
                    changes,
                ))
            }
        }
    }

    /// Revert a previous operation
    pub fn restore(&mut self, undo: Undo) -> Vec<InboxChange> {
        match undo {
            Undo::Flag {
                message_id,
                flag,
                previous,
                ..
            } => self
                .set_flag(&message_id, flag, previous)
                .map(|(_, changes)| changes)
                .unwrap_or_default(),
            Undo::ReadAll {
                previous,
                hidden_unread,
            } => self.restore_reads(&previous, hidden_unread),
            Undo::Archive { message, index } => {
                let Some(archived_at) = self.archived.position(&message.message_id) else {
                    return Vec::new();
                };
                self.archived.messages.remove(archived_at);
                let was_unread = !message.read;
                let index = index.min(self.feed.len());
                self.feed.messages.insert(index, message);

                let mut changes = vec![
                    InboxChange::FeedChanged(self.feed.clone()),
                    InboxChange::ArchiveChanged(self.archived.clone()),
                ];
                if was_unread {
                    self.unread_count += 1;
                    changes.push(InboxChange::UnreadCount(self.unread_count));
                }
                changes
            }
        }
    }

    /// Write one flag, keeping the unread counter in step with read
    /// transitions in the active feed. Other flags are left alone.
    pub fn set_flag(
        &mut self,
        message_id: &str,
        flag: MessageFlag,
        value: bool,
    ) -> Option<(Undo, Vec<InboxChange>)> {
        let (feed, index) = self.locate(message_id)?;
        let message = &mut self.set_mut(feed).messages[index];

        let mut flags = message.flags();
        let previous = flag.get(&flags);
        flag.set(&mut flags, value);
        message.set_flags(flags);
        let message = message.clone();

        let mut changes = vec![InboxChange::MessageChanged {
            feed,
            index,
            message,
        }];

        if flag == MessageFlag::Read && feed == InboxFeed::Feed && previous != value {
            self.unread_count = if value {
                self.unread_count.saturating_sub(1)
            } else {
                self.unread_count + 1
            };
            changes.push(InboxChange::UnreadCount(self.unread_count));
        }

        let undo = Undo::Flag {
            message_id: message_id.to_string(),
            flag,
            previous,
            value,
        };
        Some((undo, changes))
    }
}
