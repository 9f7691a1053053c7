//! HAG1 Protocol - Callback Layer
//!
//! Typed listener registry ([`CallbackHub`]) and the dispatch rule
//! ([`dispatch_frame`]) both endpoints apply to decoded frames.

mod dispatch;
mod hub;

pub use dispatch::*;
pub use hub::*;
