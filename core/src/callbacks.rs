/// Callback-style entry points
///
/// Each `*_then` method runs the matching async operation on the runtime and
/// reports its outcome through exactly one of the two callbacks.
use crate::engine::InboxEngine;
use crate::error::{InboxError, Result};
use crate::models::{InboxFeed, InboxMessage, InboxSnapshot};
use std::future::Future;
use tokio::task::JoinHandle;

fn detach<T, F, S, E>(operation: F, on_success: S, on_failure: E) -> JoinHandle<()>
where
    T: Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
    S: FnOnce(T) + Send + 'static,
    E: FnOnce(InboxError) + Send + 'static,
{
    tokio::spawn(async move {
        match operation.await {
            Ok(value) => on_success(value),
            Err(err) => on_failure(err),
        }
    })
}

impl InboxEngine {
    pub fn refresh_then(
        &self,
        on_success: impl FnOnce(InboxSnapshot) + Send + 'static,
        on_failure: impl FnOnce(InboxError) + Send + 'static,
    ) -> JoinHandle<()> {
        let engine = self.clone();
        detach(async move { engine.refresh().await }, on_success, on_failure)
    }

    pub fn fetch_next_page_then(
        &self,
        feed: InboxFeed,
        on_success: impl FnOnce(Vec<InboxMessage>) + Send + 'static,
        on_failure: impl FnOnce(InboxError) + Send + 'static,
    ) -> JoinHandle<()> {
        let engine = self.clone();
        detach(
            async move { engine.fetch_next_page(feed).await },
            on_success,
            on_failure,
        )
    }

    pub fn read_then(
        &self,
        message_id: impl Into<String>,
        on_success: impl FnOnce() + Send + 'static,
        on_failure: impl FnOnce(InboxError) + Send + 'static,
    ) -> JoinHandle<()> {
        let engine = self.clone();
        let message_id = message_id.into();
        detach(
            async move { engine.read(&message_id).await },
            move |()| on_success(),
            on_failure,
        )
    }

    pub fn unread_then(
        &self,
        message_id: impl Into<String>,
        on_success: impl FnOnce() + Send + 'static,
        on_failure: impl FnOnce(InboxError) + Send + 'static,
    ) -> JoinHandle<()> {
        let engine = self.clone();
        let message_id = message_id.into();
        detach(
            async move { engine.unread(&message_id).await },
            move |()| on_success(),
            on_failure,
        )
    }

    pub fn open_then(
        &self,
        message_id: impl Into<String>,
        on_success: impl FnOnce() + Send + 'static,
        on_failure: impl FnOnce(InboxError) + Send + 'static,
    ) -> JoinHandle<()> {
        let engine = self.clone();
        let message_id = message_id.into();
        detach(
            async move { engine.open(&message_id).await },
            move |()| on_success(),
            on_failure,
        )
    }

    pub fn archive_then(
        &self,
        message_id: impl Into<String>,
        on_success: impl FnOnce() + Send + 'static,
        on_failure: impl FnOnce(InboxError) + Send + 'static,
    ) -> JoinHandle<()> {
        let engine = self.clone();
        let message_id = message_id.into();
        detach(
            async move { engine.archive(&message_id).await },
            move |()| on_success(),
            on_failure,
        )
    }

    pub fn click_then(
        &self,
        message_id: impl Into<String>,
        tracking_id: impl Into<String>,
        on_success: impl FnOnce() + Send + 'static,
        on_failure: impl FnOnce(InboxError) + Send + 'static,
    ) -> JoinHandle<()> {
        let engine = self.clone();
        let message_id = message_id.into();
        let tracking_id = tracking_id.into();
        detach(
            async move { engine.click(&message_id, &tracking_id).await },
            move |()| on_success(),
            on_failure,
        )
    }

    pub fn read_all_then(
        &self,
        on_success: impl FnOnce() + Send + 'static,
        on_failure: impl FnOnce(InboxError) + Send + 'static,
    ) -> JoinHandle<()> {
        let engine = self.clone();
        detach(
            async move { engine.read_all().await },
            move |()| on_success(),
            on_failure,
        )
    }
}
