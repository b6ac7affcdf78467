/// Frame-level realtime transport seam, plus the websocket implementation
use crate::error::{InboxError, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

/// What a connection hands back from `recv`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFrame {
    Text(String),
    Closed { code: u16, reason: String },
}

/// One open realtime connection
#[async_trait]
pub trait RealtimeConnection: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Next inbound frame; `None` once the stream has ended
    async fn recv(&mut self) -> Option<Result<TransportFrame>>;

    async fn close(&mut self) -> Result<()>;
}

/// Opens realtime connections
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn RealtimeConnection>>;
}

/// Websocket transport over tokio-tungstenite
#[derive(Debug, Clone)]
pub struct WsTransport {
    connect_timeout: Duration,
}

impl WsTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl RealtimeTransport for WsTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn RealtimeConnection>> {
        debug!("Opening websocket to {}", url);
        let (stream, _) = timeout(self.connect_timeout, tokio_tungstenite::connect_async(url))
            .await
            .map_err(|_| InboxError::Socket(format!("Connect timeout to {}", url)))??;
        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl RealtimeConnection for WsConnection {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.stream.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<TransportFrame>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(e.into())),
            };

            match message {
                Message::Text(text) => return Some(Ok(TransportFrame::Text(text.as_str().to_string()))),
                Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Some(Ok(TransportFrame::Text(text))),
                    Err(_) => debug!("Ignoring non-UTF-8 binary frame"),
                },
                Message::Close(frame) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.as_str().to_string()))
                        .unwrap_or((1005, String::new()));
                    return Some(Ok(TransportFrame::Closed { code, reason }));
                }
                // Ping/pong are answered by tungstenite itself
                _ => continue,
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.close(None).await?;
        Ok(())
    }
}
