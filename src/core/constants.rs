//! Protocol constants for HAG1.
//!
//! These values are fixed by the wire protocol and MUST NOT be changed.

use std::time::Duration;

// =============================================================================
// WIRE FORMAT
// =============================================================================

/// Frame magic, first four bytes of every header.
pub const HEADER_MAGIC: [u8; 4] = *b"hag1";

/// Fixed header size: magic + reserved + five u32 fields.
pub const HEADER_SIZE: usize = 32;

/// Count header inside `Complex`/`Requirement` payloads (three u32 counts).
pub const COMPOSITE_COUNTS_SIZE: usize = 12;

// =============================================================================
// RESERVED IDENTITIES
// =============================================================================

/// User id addressing the server itself. Not assignable to clients.
pub const SERVER_USER_ID: u32 = 0;

/// Wildcard in a destination field, meaning "any". Not assignable to clients.
///
/// The protocol reserves the numeric value 0xFFFF on 32-bit id fields, so
/// both 0 and 65535 are off-limits as real user or group ids.
pub const WILDCARD_ID: u32 = 0xFFFF;

// =============================================================================
// HANDSHAKE / WELCOME
// =============================================================================

/// Prefix of the identity-claim frame a client sends after connecting.
///
/// Full grammar: `CONNECT:<decimal-u32>:<decimal-u32>` (user id, group id).
pub const HANDSHAKE_PREFIX: &str = "CONNECT:";

/// Body of the greeting frame the server sends on accept.
pub const WELCOME_MESSAGE: &str = "ようこそ！サーバーに接続しました。";

/// Prefix a client matches to recognize the greeting frame.
pub const WELCOME_PREFIX: &str = "ようこそ";

// =============================================================================
// DEFAULT KNOBS
// =============================================================================

/// Default receive-side payload ceiling (64 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 64 * 1024 * 1024;

/// Default settle delay between connecting and sending the handshake.
///
/// Tolerates servers that are not yet reading; not required for correctness.
pub const DEFAULT_HANDSHAKE_DELAY: Duration = Duration::from_millis(500);
