//! Error taxonomy for the threadlens client.
//!
//! Four families, matching where in the pipeline a failure occurs:
//!
//! - [`ParamsError`]: bad query parameters, rejected synchronously before any
//!   connection is attempted.
//! - [`ProtocolError`]: a malformed inbound frame. Never fatal — callers log
//!   it and keep consuming the stream.
//! - [`TransportError`]: connection establishment or I/O failure. Terminal
//!   for the session it occurs in, never for the process.
//! - [`HistoryError`]: listing/hydration fetch failure. Degrades the history
//!   view, never propagates into the active session.

use thiserror::Error;

/// Query parameter validation errors.
///
/// Raised by [`crate::session::QueryParams::validate`] before a connection
/// is opened. No transcript mutation occurs on rejection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParamsError {
    /// Post limit outside the accepted range.
    #[error("post limit must be between {min} and {max}, got {got}")]
    LimitOutOfRange {
        /// Smallest accepted limit.
        min: u8,
        /// Largest accepted limit.
        max: u8,
        /// The rejected value.
        got: u8,
    },

    /// A required text field was empty.
    #[error("{field} must not be empty")]
    EmptyField {
        /// Name of the offending field.
        field: &'static str,
    },
}

/// A frame that could not be understood.
///
/// One bad frame must not abort an otherwise-healthy session, so this error
/// is always swallowed at the dispatch boundary after logging.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame was not valid JSON.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Transport-level failures.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection could not be established.
    #[error("failed to connect: {0}")]
    Connect(String),

    /// Sending a frame failed.
    #[error("failed to send frame: {0}")]
    Send(String),

    /// Closing the connection failed.
    #[error("failed to close connection: {0}")]
    Close(String),
}

/// History listing/hydration failures.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// The HTTP request itself failed.
    #[error("history request failed: {0}")]
    Request(String),

    /// The backend answered with a non-success status.
    #[error("history endpoint returned status {0}")]
    Status(u16),

    /// The response body could not be decoded.
    #[error("history response could not be decoded: {0}")]
    Decode(String),
}
