/// Realtime socket frame definitions
use crate::models::InboxMessage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-side state change kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    MarkAllRead,
    Read,
    Unread,
    Archive,
    Opened,
}

/// Inbound socket frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SocketFrame {
    /// A brand-new message was delivered to the inbox
    Message { data: InboxMessage },

    /// A message (or the whole inbox) changed state elsewhere
    Event {
        event: EventType,
        #[serde(rename = "messageId", default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
}

impl SocketFrame {
    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A state change, validated from an `Event` frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChangeEvent {
    MarkAllRead,
    Read(String),
    Unread(String),
    Archive(String),
    Opened(String),
}

impl StateChangeEvent {
    /// Per-message events without a message id are dropped
    pub fn from_frame(event: EventType, message_id: Option<String>) -> Option<Self> {
        match event {
            EventType::MarkAllRead => Some(StateChangeEvent::MarkAllRead),
            EventType::Read => message_id.map(StateChangeEvent::Read),
            EventType::Unread => message_id.map(StateChangeEvent::Unread),
            EventType::Archive => message_id.map(StateChangeEvent::Archive),
            EventType::Opened => message_id.map(StateChangeEvent::Opened),
        }
    }

    pub fn message_id(&self) -> Option<&str> {
        match self {
            StateChangeEvent::MarkAllRead => None,
            StateChangeEvent::Read(id)
            | StateChangeEvent::Unread(id)
            | StateChangeEvent::Archive(id)
            | StateChangeEvent::Opened(id) => Some(id),
        }
    }
}

impl fmt::Display for StateChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateChangeEvent::MarkAllRead => write!(f, "mark-all-read"),
            StateChangeEvent::Read(id) => write!(f, "read({})", id),
            StateChangeEvent::Unread(id) => write!(f, "unread({})", id),
            StateChangeEvent::Archive(id) => write!(f, "archive({})", id),
            StateChangeEvent::Opened(id) => write!(f, "opened({})", id),
        }
    }
}

#[derive(Debug, Serialize)]
struct SubscribeData<'a> {
    channel: &'a str,
    event: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct SubscribeFrame<'a> {
    action: &'a str,
    data: SubscribeData<'a>,
}

/// Outbound frame subscribing to every inbox event for `user_id`
pub fn subscribe_frame(user_id: &str, token: Option<&str>) -> Result<String, serde_json::Error> {
    serde_json::to_string(&SubscribeFrame {
        action: "subscribe",
        data: SubscribeData {
            channel: user_id,
            event: "*",
            token,
        },
    })
}
