/// REST implementation of `InboxApi`
///
/// Endpoints (relative to `Config::api_url`):
///   GET  /messages                ?limit=N&cursor=C
///   GET  /messages/archived       ?limit=N&cursor=C
///   GET  /messages/unread-count
///   POST /messages/:id/read
///   POST /messages/:id/unread
///   POST /messages/:id/opened
///   POST /messages/:id/archive
///   POST /messages/:id/click      body: {"trackingId":"..."}
///   POST /messages/read-all
use crate::client::InboxApi;
use crate::config::Config;
use crate::error::{InboxError, Result};
use crate::models::MessagePage;
use crate::session::SessionProvider;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

const USER_ID_HEADER: &str = "x-inbox-user-id";

#[derive(Deserialize)]
struct UnreadCountResponse {
    count: u32,
}

pub struct HttpInboxClient {
    http: reqwest::Client,
    base_url: String,
    session: Arc<dyn SessionProvider>,
}

impl HttpInboxClient {
    pub fn new(config: &Config, session: Arc<dyn SessionProvider>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| InboxError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    fn message_url(&self, message_id: &str, action: &str) -> String {
        format!(
            "{}/messages/{}/{}",
            self.base_url,
            urlencoding::encode(message_id),
            action
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder> {
        let token = self.session.auth_token().ok_or(InboxError::NotAuthenticated)?;
        let user_id = self.session.user_id().ok_or(InboxError::NotAuthenticated)?;
        Ok(request.bearer_auth(token).header(USER_ID_HEADER, user_id))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = self.authorize(request)?.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read response body: {}>", e));
            return Err(InboxError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn get_page(&self, path: &str, limit: usize, cursor: Option<&str>) -> Result<MessagePage> {
        let url = format!("{}{}", self.base_url, path);
        let mut query = vec![("limit", limit.to_string())];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }

        debug!("GET {} limit={} cursor={:?}", url, limit, cursor);
        let response = self.send(self.http.get(&url).query(&query)).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn post_action(&self, message_id: &str, action: &str) -> Result<()> {
        let url = self.message_url(message_id, action);
        debug!("POST {}", url);
        self.send(self.http.post(&url)).await?;
        Ok(())
    }
}

#[async_trait]
impl InboxApi for HttpInboxClient {
    async fn get_messages(&self, limit: usize, cursor: Option<&str>) -> Result<MessagePage> {
        self.get_page("/messages", limit, cursor).await
    }

    async fn get_archived_messages(
        &self,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<MessagePage> {
        self.get_page("/messages/archived", limit, cursor).await
    }

    async fn get_unread_count(&self) -> Result<u32> {
        let url = format!("{}/messages/unread-count", self.base_url);
        let response = self.send(self.http.get(&url)).await?;
        let bytes = response.bytes().await?;
        let body: UnreadCountResponse = serde_json::from_slice(&bytes)?;
        Ok(body.count)
    }

    async fn read(&self, message_id: &str) -> Result<()> {
        self.post_action(message_id, "read").await
    }

    async fn unread(&self, message_id: &str) -> Result<()> {
        self.post_action(message_id, "unread").await
    }

    async fn open(&self, message_id: &str) -> Result<()> {
        self.post_action(message_id, "opened").await
    }

    async fn archive(&self, message_id: &str) -> Result<()> {
        self.post_action(message_id, "archive").await
    }

    async fn click(&self, message_id: &str, tracking_id: &str) -> Result<()> {
        let url = self.message_url(message_id, "click");
        debug!("POST {}", url);
        let body = serde_json::json!({ "trackingId": tracking_id });
        self.send(self.http.post(&url).json(&body)).await?;
        Ok(())
    }

    async fn read_all(&self) -> Result<()> {
        let url = format!("{}/messages/read-all", self.base_url);
        debug!("POST {}", url);
        self.send(self.http.post(&url)).await?;
        Ok(())
    }
}
