#![allow(dead_code)]

/// Shared test doubles: an in-memory inbox backend, a scripted realtime
/// transport and a listener that records every callback
use async_trait::async_trait;
use inboxsync_core::socket::{RealtimeConnection, RealtimeTransport, TransportFrame};
use inboxsync_core::{
    Config, InboxApi, InboxEngine, InboxError, InboxFeed, InboxListener, InboxMessage,
    MemorySession, MessagePage, Result,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub fn message(id: &str, read: bool) -> InboxMessage {
    let mut message = InboxMessage::new(id);
    message.title = Some(format!("Title {}", id));
    message.read = read;
    message
}

pub fn messages(prefix: &str, count: usize) -> Vec<InboxMessage> {
    (0..count)
        .map(|i| message(&format!("{}{}", prefix, i), false))
        .collect()
}

/// Backend holding the full feed and archive, served page by page
#[derive(Default)]
pub struct MockApi {
    pub feed: Mutex<Vec<InboxMessage>>,
    pub archived: Mutex<Vec<InboxMessage>>,
    pub unread_count: Mutex<u32>,
    pub fail_feed: AtomicBool,
    pub fail_archived: AtomicBool,
    pub fail_actions: AtomicBool,
    /// Delays consumed one per `get_messages` call
    pub feed_delays: Mutex<VecDeque<Duration>>,
    pub feed_fetches: AtomicUsize,
    pub limits: Mutex<Vec<usize>>,
    /// Recorded only when the backend accepts them
    pub actions: Mutex<Vec<String>>,
    /// (delay, fail) consumed one per action call, ahead of `fail_actions`
    pub action_script: Mutex<VecDeque<(Duration, bool)>>,
}

impl MockApi {
    pub fn new(feed: Vec<InboxMessage>, archived: Vec<InboxMessage>, unread_count: u32) -> Arc<Self> {
        Arc::new(Self {
            feed: Mutex::new(feed),
            archived: Mutex::new(archived),
            unread_count: Mutex::new(unread_count),
            ..Default::default()
        })
    }

    pub fn delay_next_feed(&self, delay: Duration) {
        self.feed_delays.lock().unwrap().push_back(delay);
    }

    /// Answer the next action after `delay`, rejecting it if `fail`
    pub fn script_action(&self, delay: Duration, fail: bool) {
        self.action_script.lock().unwrap().push_back((delay, fail));
    }

    pub fn actions(&self) -> Vec<String> {
        self.actions.lock().unwrap().clone()
    }

    fn page(all: &[InboxMessage], limit: usize, cursor: Option<&str>) -> MessagePage {
        let start = cursor.and_then(|c| c.parse::<usize>().ok()).unwrap_or(0);
        let end = (start + limit).min(all.len());
        let has_next_page = end < all.len();
        MessagePage {
            messages: all[start.min(end)..end].to_vec(),
            cursor: has_next_page.then(|| end.to_string()),
            has_next_page,
        }
    }

    async fn action(&self, name: String) -> Result<()> {
        let scripted = self.action_script.lock().unwrap().pop_front();
        let fail = match scripted {
            Some((delay, fail)) => {
                tokio::time::sleep(delay).await;
                fail
            }
            None => self.fail_actions.load(Ordering::SeqCst),
        };
        if fail {
            return Err(InboxError::Http {
                status: 500,
                body: "backend unavailable".to_string(),
            });
        }
        self.actions.lock().unwrap().push(name);
        Ok(())
    }
}

#[async_trait]
impl InboxApi for MockApi {
    async fn get_messages(&self, limit: usize, cursor: Option<&str>) -> Result<MessagePage> {
        self.feed_fetches.fetch_add(1, Ordering::SeqCst);
        self.limits.lock().unwrap().push(limit);
        let delay = self.feed_delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_feed.load(Ordering::SeqCst) {
            return Err(InboxError::Transport("feed unavailable".to_string()));
        }
        Ok(Self::page(&self.feed.lock().unwrap(), limit, cursor))
    }

    async fn get_archived_messages(&self, limit: usize, cursor: Option<&str>) -> Result<MessagePage> {
        if self.fail_archived.load(Ordering::SeqCst) {
            return Err(InboxError::Transport("archive unavailable".to_string()));
        }
        Ok(Self::page(&self.archived.lock().unwrap(), limit, cursor))
    }

    async fn get_unread_count(&self) -> Result<u32> {
        Ok(*self.unread_count.lock().unwrap())
    }

    async fn read(&self, message_id: &str) -> Result<()> {
        self.action(format!("read:{}", message_id)).await
    }

    async fn unread(&self, message_id: &str) -> Result<()> {
        self.action(format!("unread:{}", message_id)).await
    }

    async fn open(&self, message_id: &str) -> Result<()> {
        self.action(format!("open:{}", message_id)).await
    }

    async fn archive(&self, message_id: &str) -> Result<()> {
        self.action(format!("archive:{}", message_id)).await
    }

    async fn click(&self, message_id: &str, tracking_id: &str) -> Result<()> {
        self.action(format!("click:{}:{}", message_id, tracking_id)).await
    }

    async fn read_all(&self) -> Result<()> {
        self.action("read_all".to_string()).await
    }
}

/// Transport whose connections are fed by `push`
#[derive(Default)]
pub struct MockTransport {
    pub connects: AtomicUsize,
    pub closes: Arc<AtomicUsize>,
    pub sent: Arc<Mutex<Vec<String>>>,
    pub fail_connect: AtomicBool,
    /// Delays consumed one per `connect` call
    pub connect_delays: Mutex<VecDeque<Duration>>,
    inbound: Mutex<Option<mpsc::UnboundedSender<TransportFrame>>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn delay_next_connect(&self, delay: Duration) {
        self.connect_delays.lock().unwrap().push_back(delay);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Deliver a text frame on the newest connection
    pub fn push(&self, text: &str) {
        if let Some(tx) = self.inbound.lock().unwrap().as_ref() {
            let _ = tx.send(TransportFrame::Text(text.to_string()));
        }
    }
}

#[async_trait]
impl RealtimeTransport for MockTransport {
    async fn connect(&self, _url: &str) -> Result<Box<dyn RealtimeConnection>> {
        let delay = self.connect_delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(InboxError::Socket("connection refused".to_string()));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        *self.inbound.lock().unwrap() = Some(tx);
        Ok(Box::new(MockConnection {
            inbound: rx,
            sent: self.sent.clone(),
            closes: self.closes.clone(),
        }))
    }
}

struct MockConnection {
    inbound: mpsc::UnboundedReceiver<TransportFrame>,
    sent: Arc<Mutex<Vec<String>>>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl RealtimeConnection for MockConnection {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<TransportFrame>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// One recorded listener callback
#[derive(Debug, Clone, PartialEq)]
pub enum Seen {
    Loading(bool),
    Error(String),
    Unread(u32),
    Feed(Vec<String>),
    Archive(Vec<String>),
    Page(InboxFeed, Vec<String>),
    Message(InboxFeed, usize, String),
}

fn ids(messages: &[InboxMessage]) -> Vec<String> {
    messages.iter().map(|m| m.message_id.clone()).collect()
}

#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<Seen>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Seen> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, matches: impl Fn(&Seen) -> bool) -> usize {
        self.events().iter().filter(|e| matches(e)).count()
    }

    pub fn errors(&self) -> usize {
        self.count(|e| matches!(e, Seen::Error(_)))
    }

    pub fn last_unread(&self) -> Option<u32> {
        self.events().iter().rev().find_map(|e| match e {
            Seen::Unread(n) => Some(*n),
            _ => None,
        })
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    fn push(&self, seen: Seen) {
        self.events.lock().unwrap().push(seen);
    }

    pub fn listener(self: &Arc<Self>) -> InboxListener {
        let (a, b, c, d, e, f, g) = (
            self.clone(),
            self.clone(),
            self.clone(),
            self.clone(),
            self.clone(),
            self.clone(),
            self.clone(),
        );
        InboxListener::new()
            .on_loading(move |is_refresh| a.push(Seen::Loading(is_refresh)))
            .on_error(move |err| b.push(Seen::Error(err.to_string())))
            .on_unread_count_changed(move |n| c.push(Seen::Unread(n)))
            .on_feed_changed(move |set| d.push(Seen::Feed(ids(&set.messages))))
            .on_archive_changed(move |set| e.push(Seen::Archive(ids(&set.messages))))
            .on_page_added(move |feed, page| f.push(Seen::Page(feed, ids(&page.messages))))
            .on_message_changed(move |feed, index, message| {
                g.push(Seen::Message(feed, index, message.message_id.clone()))
            })
    }
}

pub fn engine(api: Arc<MockApi>, transport: Arc<MockTransport>) -> InboxEngine {
    let session = Arc::new(MemorySession::signed_in("user-1", "token-1"));
    engine_with_session(api, transport, session)
}

pub fn engine_with_session(
    api: Arc<MockApi>,
    transport: Arc<MockTransport>,
    session: Arc<MemorySession>,
) -> InboxEngine {
    let config = Config {
        pagination_limit: 2,
        ..Default::default()
    };
    InboxEngine::new(config, session, api, transport)
}

/// Poll until `check` holds or two seconds pass
pub async fn wait_until(check: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
