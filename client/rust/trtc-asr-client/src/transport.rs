use async_trait::async_trait;
use futures::{Sink, Stream, StreamExt};
use std::pin::Pin;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

/// Outbound half of a connection.
pub type FrameSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;

/// Inbound half of a connection.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Message, WsError>> + Send>>;

/// Opens a duplex frame connection for a prepared handshake request.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, request: Request) -> Result<(FrameSink, FrameStream), WsError>;
}

/// WebSocket connector over `tokio-tungstenite` (rustls, webpki roots).
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, request: Request) -> Result<(FrameSink, FrameStream), WsError> {
        let (ws_stream, _resp) = connect_async(request).await?;
        let (sink, stream) = ws_stream.split();
        Ok((Box::pin(sink), Box::pin(stream)))
    }
}
