//! The transport seam: a duplex, message-oriented connection primitive.
//!
//! The controller talks to [`Connector`]/[`Connection`] traits, never to a
//! concrete socket. [`WsConnector`](crate::transport::ws::WsConnector) is the
//! production implementation; tests script their own.

pub mod ws;

pub use ws::WsConnector;

use async_trait::async_trait;

use threadlens_core::errors::TransportError;

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Endpoint going away (counts as a clean close).
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Policy violation — the backend uses it for rejected credentials.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;
/// Application-defined authorization rejection.
pub const CLOSE_AUTH_REJECTED: u16 = 4001;

/// How a closure should be interpreted by the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseClass {
    /// Expected close; not a failure.
    Normal,
    /// The server rejected the bearer credential.
    AuthRejected,
    /// Anything else — including a drop with no close frame at all.
    Abnormal,
}

/// Close notification details.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CloseInfo {
    /// Close code, if a close frame was received.
    pub code: Option<u16>,
    /// Close reason, if non-empty.
    pub reason: Option<String>,
}

impl CloseInfo {
    /// Classify the closure.
    #[must_use]
    pub fn class(&self) -> CloseClass {
        match self.code {
            Some(CLOSE_NORMAL | CLOSE_GOING_AWAY) => CloseClass::Normal,
            Some(CLOSE_POLICY_VIOLATION | CLOSE_AUTH_REJECTED) => CloseClass::AuthRejected,
            _ => CloseClass::Abnormal,
        }
    }
}

/// One inbound notification from the transport.
///
/// The four platform connection callbacks (open, message, error, close)
/// collapse into this single ordered event type, consumed one at a time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame arrived.
    Frame(String),
    /// The connection closed.
    Closed(CloseInfo),
    /// The connection failed with a transport-level error.
    Failed(String),
}

/// An open duplex connection.
///
/// Send-after-close and double-close are silent no-ops; the controller
/// relies on that for idempotent cancellation.
#[async_trait]
pub trait Connection: Send {
    /// Send one text frame.
    async fn send(&mut self, frame: &str) -> Result<(), TransportError>;

    /// Next inbound event, in arrival order. `None` once the stream is
    /// exhausted (callers treat that as an abnormal drop if no close frame
    /// preceded it).
    async fn next_event(&mut self) -> Option<TransportEvent>;

    /// Close the connection.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Opens connections. One connector, many sequential connections — each
/// submission gets a fresh one.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection; resolving means the open-notification fired.
    async fn connect(&self) -> Result<Box<dyn Connection>, TransportError>;
}
