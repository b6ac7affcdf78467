/// Configuration management
use crate::error::{InboxError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Smallest page the backend will serve
pub const MIN_PAGE_LIMIT: usize = 1;

/// Largest page the backend will serve, also the refresh cap
pub const MAX_PAGE_LIMIT: usize = 200;

pub const DEFAULT_PAGE_LIMIT: usize = 32;

const DEFAULT_API_URL: &str = "http://127.0.0.1:8787/inbox";
const DEFAULT_SOCKET_URL: &str = "ws://127.0.0.1:8787/realtime";

/// Clamp a requested page size into `[MIN_PAGE_LIMIT, MAX_PAGE_LIMIT]`
pub fn clamp_page_limit(limit: usize) -> usize {
    limit.clamp(MIN_PAGE_LIMIT, MAX_PAGE_LIMIT)
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the inbox REST API
    pub api_url: String,

    /// Realtime socket endpoint
    pub socket_url: String,

    /// Messages per page. Always within `[MIN_PAGE_LIMIT, MAX_PAGE_LIMIT]`,
    /// use `set_pagination_limit` rather than writing it directly.
    pub pagination_limit: usize,

    /// Per-request timeout for REST calls
    pub request_timeout: Duration,

    /// Socket connect timeout
    pub connect_timeout: Duration,

    /// Signed-in user (binary only; library callers pass a session provider)
    pub user_id: Option<String>,

    /// Bearer token for the signed-in user
    pub auth_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            socket_url: DEFAULT_SOCKET_URL.to_string(),
            pagination_limit: DEFAULT_PAGE_LIMIT,
            request_timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(10),
            user_id: None,
            auth_token: None,
        }
    }
}

impl Config {
    pub fn set_pagination_limit(&mut self, limit: usize) {
        self.pagination_limit = clamp_page_limit(limit);
    }

    /// Page size for a reload. Refreshes never exceed `MAX_PAGE_LIMIT`.
    pub fn reload_limit(&self, is_refresh: bool) -> usize {
        let limit = clamp_page_limit(self.pagination_limit);
        if is_refresh {
            limit.min(MAX_PAGE_LIMIT)
        } else {
            limit
        }
    }

    /// Create config from command line arguments
    pub fn from_args(args: &[String]) -> Result<Self> {
        if args.len() < 2 {
            return Err(InboxError::Config(format!(
                "Usage: {} <user_id> [--token <token>] [--api-url <url>] [--socket-url <url>] [--limit <n>] [--timeout-ms <ms>]",
                args.first().map(String::as_str).unwrap_or("inbox-watch")
            )));
        }

        let mut config = Config {
            user_id: Some(args[1].clone()),
            ..Default::default()
        };

        let mut i = 2;
        while i < args.len() {
            let flag = args[i].as_str();
            let value = || {
                args.get(i + 1)
                    .cloned()
                    .ok_or_else(|| InboxError::Config(format!("{} requires an argument", flag)))
            };
            match flag {
                "--token" => config.auth_token = Some(value()?),
                "--api-url" => config.api_url = value()?,
                "--socket-url" => config.socket_url = value()?,
                "--limit" => {
                    let limit = value()?.parse::<usize>().map_err(|_| {
                        InboxError::Config("--limit must be a positive number".to_string())
                    })?;
                    config.set_pagination_limit(limit);
                }
                "--timeout-ms" => {
                    let ms = value()?.parse::<u64>().map_err(|_| {
                        InboxError::Config("--timeout-ms must be a number".to_string())
                    })?;
                    config.request_timeout = Duration::from_millis(ms);
                }
                other => {
                    return Err(InboxError::Config(format!("Unknown argument: {}", other)));
                }
            }
            i += 2;
        }

        // Env overrides (nice for scripts)
        if let Ok(url) = std::env::var("INBOX_API_URL") {
            config.api_url = url;
        }
        if let Ok(url) = std::env::var("INBOX_SOCKET_URL") {
            config.socket_url = url;
        }
        if let Ok(token) = std::env::var("INBOX_AUTH_TOKEN") {
            config.auth_token = Some(token);
        }
        if let Some(limit) = std::env::var("INBOX_PAGE_LIMIT")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
        {
            config.set_pagination_limit(limit);
        }

        Ok(config)
    }
}
