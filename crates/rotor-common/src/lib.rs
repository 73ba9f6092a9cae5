//! Rotor Common Types
//!
//! This crate provides the pieces shared by the rotor server and its CLI:
//!
//! - **Errors**: [`RotorError`] and the crate-wide [`Result`] alias
//! - **Wire**: the two fixed replies a peer can receive
//! - **Client**: a blocking [`Probe`] that connects and reads the reply
//!
//! # Wire Format
//!
//! There is no application protocol. A peer connects, the server eventually
//! writes one fixed line and closes the connection:
//!
//! - `HELLO\n` after normal processing
//! - `UNEXPECTEDLY CLOSED\n` when the server shuts down before serving it

pub mod client;
pub mod error;
pub mod wire;

pub use client::Probe;
pub use error::{Result, RotorError};
pub use wire::Reply;
