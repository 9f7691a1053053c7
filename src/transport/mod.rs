//! HAG1 Protocol - Transport Layer
//!
//! This module implements the wire format and stream framing of the HAG1
//! protocol. It provides:
//!
//! - **Frame encoding/decoding**: [`Frame`], [`PayloadType`], and the 32-byte
//!   header wire format
//! - **Typed payloads**: text/image/composite packing and tolerant extraction
//! - **Stream framing**: [`send_frame`] / [`recv_frame`] moving exactly one
//!   frame at a time over a TCP stream
//!
//! # Architecture
//!
//! The transport layer sits between the raw TCP stream and the routing
//! core. It owns the byte format and nothing else: identity, routing, and
//! delivery live in the server and client modules.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       Server / Client / Callbacks       │
//! ├─────────────────────────────────────────┤
//! │         Transport Layer                 │  ← This module
//! │   frames, typed payloads, framing       │
//! ├─────────────────────────────────────────┤
//! │              TCP                        │
//! └─────────────────────────────────────────┘
//! ```

mod error;
mod frame;
mod payload;
mod stream;

pub use error::*;
pub use frame::*;
pub use payload::*;
pub use stream::*;
