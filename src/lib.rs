//! # HAG1 Protocol
//!
//! A small message-routing server and matching client for the `hag1`
//! length-prefixed TCP protocol. It provides:
//!
//! - **Frames**: a fixed 32-byte little-endian header plus typed payloads
//!   (text, PNG images, composite lists, nested frames)
//! - **Routing**: broadcast, group, user, and user+group fan-out keyed on
//!   destination header fields, with multiple sessions per user
//! - **Identity**: a `CONNECT:<user>:<group>` handshake that rekeys the
//!   session table on the fly
//! - **Callbacks**: per-endpoint typed listener lists for decoded payloads
//!
//! Payloads are opaque to the routing core but carry a type tag, so
//! consumers demultiplex without re-parsing.
//!
//! ## Feature Flags
//!
//! - `transport` (default): frame codec, stream framer, callback hub
//! - `server` (default): session table, router, accept loop
//! - `client` (default): connection state machine
//! - `staging` (default): temp-file staging helper for blob payloads
//!
//! ## Example Usage
//!
//! ```ignore
//! use hag_protocol::prelude::*;
//!
//! // Server side
//! let server = HagServer::builder().build();
//! server.hub().add_log_message_listener(|msg| println!("[server] {msg}"));
//! server.start(18888).await?;
//!
//! // Client side
//! let client = HagClient::builder().build();
//! client.hub().add_text_listener(|message, frame| {
//!     println!("user {} says {message}", frame.src_user_id);
//! });
//! client.connect("127.0.0.1", 18888, 100, 1).await?;
//!
//! // Send to every session of user 200
//! client
//!     .send_data(Frame::text("hello").with_destination(0xFFFF, 200))
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Transport layer (feature-gated)
#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
pub mod transport;

// Callback layer (feature-gated with transport)
#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
pub mod callbacks;

// Client API (feature-gated)
#[cfg(feature = "client")]
#[cfg_attr(docsrs, doc(cfg(feature = "client")))]
pub mod client;

// Server API (feature-gated)
#[cfg(feature = "server")]
#[cfg_attr(docsrs, doc(cfg(feature = "server")))]
pub mod server;

// Blob staging helper (feature-gated)
#[cfg(feature = "staging")]
#[cfg_attr(docsrs, doc(cfg(feature = "staging")))]
pub mod staging;

#[cfg(test)]
pub(crate) mod test_util;

/// Prelude module for convenient imports.
pub mod prelude {
    // Core constants and types
    pub use crate::core::*;

    // Transport and callback types (when enabled)
    #[cfg(feature = "transport")]
    pub use crate::callbacks::{CallbackHub, dispatch_frame};
    #[cfg(feature = "transport")]
    pub use crate::transport::{
        CompositeParts, Frame, FrameError, PayloadType, TransportError, TransportResult,
        pack_segments, recv_frame, send_frame, unpack_segments,
    };

    // High-level endpoints (when enabled)
    #[cfg(feature = "client")]
    pub use crate::client::{ClientConfig, ClientError, HagClient, HagClientBuilder};
    #[cfg(feature = "server")]
    pub use crate::server::{
        HagServer, HagServerBuilder, ServerConfig, ServerError, Session, SessionManager,
    };

    // Staging helper (when enabled)
    #[cfg(feature = "staging")]
    pub use crate::staging::{BlobStaging, FileId, StagingError};
}

// Re-export commonly used items at crate root
pub use crate::core::{PngData, PngError};

#[cfg(feature = "transport")]
pub use crate::callbacks::{CallbackHub, dispatch_frame};
#[cfg(feature = "transport")]
pub use crate::transport::{CompositeParts, Frame, FrameError, PayloadType, TransportError};

#[cfg(feature = "client")]
pub use crate::client::HagClient;
#[cfg(feature = "server")]
pub use crate::server::HagServer;
