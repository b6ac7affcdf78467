/// Realtime inbox socket
pub mod manager;
pub mod protocol;
pub mod transport;

pub use manager::{ConnectAttempt, SocketEvent, SocketManager, SocketState};
pub use protocol::{EventType, SocketFrame, StateChangeEvent};
pub use transport::{RealtimeConnection, RealtimeTransport, TransportFrame, WsTransport};
