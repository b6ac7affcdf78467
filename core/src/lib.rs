/// InboxSync - client-side notification inbox engine
///
/// Keeps a local snapshot of a user's inbox (active feed, archive, unread
/// counter) in step with a remote service: cancellable concurrent reloads,
/// a realtime socket for server-pushed changes, optimistic mutations with
/// rollback, and ordered fan-out to registered listeners.

pub mod callbacks;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod listener;
pub mod models;
pub mod mutation;
pub mod pipeline;
pub mod session;
pub mod socket;

pub use client::{HttpInboxClient, InboxApi};
pub use config::Config;
pub use engine::InboxEngine;
pub use error::{InboxError, Result};
pub use listener::{InboxListener, ListenerHandle};
pub use models::{
    InboxFeed, InboxMessage, InboxSnapshot, MessageFlag, MessageFlags, MessagePage, MessageSet,
};
pub use mutation::InboxAction;
pub use session::{MemorySession, SessionProvider};
pub use socket::{SocketState, WsTransport};
