//! # threadlens-history
//!
//! The ordered catalogue of query sessions — past and current.
//!
//! - [`HistoryStore`]: in-memory entry list synchronized from the backend
//!   listing endpoint and updated incrementally by the live session. Pending
//!   optimistic entries and server-confirmed entries collapse into exactly
//!   one entry per session id.
//! - [`HistoryClient`]: thin `reqwest` wrapper for the listing and hydration
//!   endpoints. Fetch failures degrade the history view; they never touch
//!   the active session.
//!
//! ## Crate Position
//!
//! Depends on `threadlens-core`. Shared (behind `Arc`) between the session
//! controller and any number of viewing surfaces.

#![deny(unsafe_code)]

pub mod client;
pub mod store;

pub use client::{HistoryClient, HistoryListing, SessionDetail};
pub use store::{HistoryEntry, HistoryStore};
