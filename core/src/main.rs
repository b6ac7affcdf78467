/// inbox-watch - follow a user's inbox from the terminal
use inboxsync_core::{Config, InboxEngine, InboxFeed, InboxListener, MemorySession};
use std::env;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Parse configuration
    let args: Vec<String> = env::args().collect();
    let config = Config::from_args(&args).map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let user_id = config
        .user_id
        .clone()
        .ok_or_else(|| anyhow::anyhow!("Configuration error: no user id"))?;
    let token = config.auth_token.clone().unwrap_or_default();
    let session = Arc::new(MemorySession::signed_in(user_id.clone(), token));

    info!("Watching inbox for {}", user_id);
    info!("   API: {}", config.api_url);
    info!("   Socket: {}", config.socket_url);

    let engine = InboxEngine::connect(config, session).map_err(|e| anyhow::anyhow!("Engine error: {}", e))?;
    engine.add_listener(printing_listener()).await;

    wait_for_shutdown().await;

    info!("Shutting down");
    engine.remove_all_listeners().await;
    Ok(())
}

fn printing_listener() -> InboxListener {
    InboxListener::new()
        .on_loading(|is_refresh| info!("Loading inbox (refresh: {})", is_refresh))
        .on_error(|e| error!("Inbox error: {}", e))
        .on_unread_count_changed(|count| info!("Unread: {}", count))
        .on_feed_changed(|set| {
            info!("Feed: {} messages", set.len());
            for message in &set.messages {
                let marker = if message.read { " " } else { "*" };
                info!(
                    "  {} {} {}",
                    marker,
                    message.message_id,
                    message.title.as_deref().unwrap_or("(untitled)")
                );
            }
        })
        .on_all_read(|set| info!("All {} messages marked read", set.len()))
        .on_archive_changed(|set| info!("Archive: {} messages", set.len()))
        .on_page_added(|feed, page| {
            let name = match feed {
                InboxFeed::Feed => "feed",
                InboxFeed::Archived => "archive",
            };
            info!("{} more messages in {}", page.len(), name);
        })
        .on_message_changed(|_, index, message| {
            info!(
                "Message {} at {} (read: {}, opened: {})",
                message.message_id, index, message.read, message.opened
            );
        })
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl+C");
    }
}
