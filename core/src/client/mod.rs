/// Remote inbox client seam
pub mod http;

pub use http::HttpInboxClient;

use crate::error::Result;
use crate::models::MessagePage;
use async_trait::async_trait;

/// Stateless request functions against the inbox backend.
///
/// Every call fails with a transport-family `InboxError` on a non-2xx
/// response or a network failure.
#[async_trait]
pub trait InboxApi: Send + Sync {
    async fn get_messages(&self, limit: usize, cursor: Option<&str>) -> Result<MessagePage>;

    async fn get_archived_messages(&self, limit: usize, cursor: Option<&str>)
        -> Result<MessagePage>;

    async fn get_unread_count(&self) -> Result<u32>;

    async fn read(&self, message_id: &str) -> Result<()>;

    async fn unread(&self, message_id: &str) -> Result<()>;

    async fn open(&self, message_id: &str) -> Result<()>;

    async fn archive(&self, message_id: &str) -> Result<()>;

    async fn click(&self, message_id: &str, tracking_id: &str) -> Result<()>;

    async fn read_all(&self) -> Result<()>;
}
