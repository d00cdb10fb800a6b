//! # threadlens-core
//!
//! Foundation types and wire protocol for the threadlens client.
//!
//! This crate provides the shared vocabulary the other threadlens crates
//! depend on:
//!
//! - **Sessions**: [`session::Session`], [`session::SessionKey`],
//!   [`session::SessionState`] state machine values
//! - **Transcript**: [`session::Message`] with `user`/`assistant`/`system` roles
//! - **Params**: [`session::QueryParams`] with fail-fast validation
//! - **Wire protocol**: [`events::ServerFrame`] inbound frames,
//!   [`events::ServerEvent`] tagged events, [`events::QueryFrame`] outbound
//! - **Errors**: [`errors`] hierarchy via `thiserror`
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other threadlens crates.

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod session;
