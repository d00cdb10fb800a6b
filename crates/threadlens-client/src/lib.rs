//! # threadlens-client
//!
//! The client-side controller for a long-lived, bidirectional query session.
//!
//! - [`controller::SessionController`]: owns exactly one in-flight session at
//!   a time; drives the `Idle → Connecting → AwaitingAssignment → Streaming →
//!   terminal` state machine and the append-only transcript.
//! - [`transport`]: the [`transport::Connector`]/[`transport::Connection`]
//!   seam plus the `tokio-tungstenite` implementation. The connection handle
//!   is owned by the active controller run — never a free-floating global —
//!   and is closed before any new submission opens a fresh one.
//!
//! All controller state transitions happen on delivery of a discrete
//! transport event, one event fully processed before the next — no locking
//! on the transcript, no racing callbacks.
//!
//! ## Crate Position
//!
//! Depends on `threadlens-core` (protocol, data model) and
//! `threadlens-history` (transcript mirroring).

#![deny(unsafe_code)]

pub mod controller;
pub mod transport;

pub use controller::{ClientError, ControllerConfig, SessionController};
pub use transport::{CloseClass, CloseInfo, Connection, Connector, TransportEvent, WsConnector};
