//! `tokio-tungstenite` implementation of the transport seam.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use threadlens_core::errors::TransportError;

use super::{CloseInfo, Connection, Connector, TransportEvent};

/// Connects to the backend query endpoint over WebSocket.
///
/// The bearer credential rides as a query parameter on the connection URI
/// and is treated opaquely.
#[derive(Clone, Debug)]
pub struct WsConnector {
    ws_url: String,
    token: Option<String>,
}

impl WsConnector {
    /// Create a connector for the given endpoint and optional credential.
    #[must_use]
    pub fn new(ws_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            token,
        }
    }

    fn request_url(&self) -> String {
        match &self.token {
            Some(token) => {
                let encoded = utf8_percent_encode(token, NON_ALPHANUMERIC);
                let sep = if self.ws_url.contains('?') { '&' } else { '?' };
                format!("{}{sep}token={encoded}", self.ws_url)
            }
            None => self.ws_url.clone(),
        }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>, TransportError> {
        let (stream, response) = connect_async(self.request_url())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        debug!(status = %response.status(), "websocket handshake complete");
        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connection for WsConnection {
    async fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        match self.stream.send(Message::text(frame)).await {
            Ok(()) => Ok(()),
            // Send after close is a silent no-op.
            Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::Send(e.to_string())),
        }
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Some(TransportEvent::Frame(text.to_string()));
                }
                Some(Ok(Message::Close(frame))) => {
                    let info = CloseInfo {
                        code: frame.as_ref().map(|f| u16::from(f.code)),
                        reason: frame
                            .map(|f| f.reason.to_string())
                            .filter(|r| !r.is_empty()),
                    };
                    return Some(TransportEvent::Closed(info));
                }
                // Control and binary frames carry no protocol signal.
                Some(Ok(_)) => {}
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => return None,
                Some(Err(e)) => return Some(TransportEvent::Failed(e.to_string())),
                None => return None,
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.stream.close(None).await {
            // Double close is a silent no-op.
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::Close(e.to_string())),
        }
    }
}
