//! HAG1 Protocol - Client Library
//!
//! High-level API for HAG1 clients.

#[allow(clippy::module_inception)]
mod client;

pub use client::*;
