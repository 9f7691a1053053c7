//! HAG1 Protocol - Core constants and types.
//!
//! This module provides the foundational constants and boundary types for
//! the HAG1 protocol. It has minimal dependencies and no async machinery.

mod constants;
mod image;

pub use constants::*;
pub use image::*;
