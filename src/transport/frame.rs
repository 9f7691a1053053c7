//! Frame encoding and decoding for the HAG1 wire format.
//!
//! A frame is a fixed 32-byte little-endian header followed by an opaque
//! payload. The header carries destination and source (group, user) pairs,
//! a payload tag, and the payload length. Typed payload packing lives in
//! [`super::payload`].

use thiserror::Error;

use crate::core::{HEADER_MAGIC, HEADER_SIZE, WILDCARD_ID};

/// Payload tag carried in the header.
///
/// The set is closed; tags outside it still decode (as [`PayloadType::Other`],
/// keeping their numeric value) and are treated as raw binary downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadType {
    /// Opaque bytes.
    BinaryRaw,
    /// UTF-8 text (invalid sequences are replaced on extraction, never an error).
    PlainText,
    /// One PNG-encoded image.
    PngImage,
    /// Length-prefixed pair of [utf-8 text, png bytes].
    TextAndPngImage,
    /// Length-prefixed list: count header, then texts, images, binaries.
    Complex,
    /// Payload is a nested encoded frame.
    PacketFrame,
    /// Same layout as `Complex`, separate semantic channel.
    Requirement,
    /// Unrecognized tag, value preserved.
    Other(u32),
}

impl PayloadType {
    /// Parse a payload tag from its wire value.
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => Self::BinaryRaw,
            1 => Self::PlainText,
            8000 => Self::PngImage,
            8001 => Self::TextAndPngImage,
            10000 => Self::Complex,
            20000 => Self::PacketFrame,
            30000 => Self::Requirement,
            other => Self::Other(other),
        }
    }

    /// Wire value of this tag.
    pub fn as_u32(self) -> u32 {
        match self {
            Self::BinaryRaw => 0,
            Self::PlainText => 1,
            Self::PngImage => 8000,
            Self::TextAndPngImage => 8001,
            Self::Complex => 10000,
            Self::PacketFrame => 20000,
            Self::Requirement => 30000,
            Self::Other(other) => other,
        }
    }
}

/// Errors that can occur while decoding wire bytes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Buffer smaller than the fixed header.
    #[error("header too short: expected {expected} bytes, got {actual}")]
    ShortHeader {
        /// Minimum expected size.
        expected: usize,
        /// Actual size received.
        actual: usize,
    },

    /// The magic bytes did not match `hag1`.
    #[error("bad magic: {0:02x?}")]
    BadMagic([u8; 4]),

    /// Header promises more payload than the buffer holds.
    #[error("payload too short: header says {expected} bytes, got {actual}")]
    ShortPayload {
        /// Payload size from the header.
        expected: usize,
        /// Payload bytes actually available.
        actual: usize,
    },

    /// A length prefix inside a sub-list overruns the payload.
    #[error("truncated segment at offset {offset}: length {length} exceeds {remaining} remaining bytes")]
    TruncatedSegment {
        /// Offset of the offending length prefix.
        offset: usize,
        /// Declared segment length.
        length: usize,
        /// Bytes remaining after the prefix.
        remaining: usize,
    },
}

/// One unit on the wire: header plus payload.
///
/// Wire format (all integers little-endian):
/// ```text
/// +-------+----------+------------+-----------+-----------+----------+------+------+
/// | magic | reserved | dest_group | dest_user | src_group | src_user | type | size |
/// | hag1  | 4 x 0    | u32        | u32       | u32       | u32      | u32  | u32  |
/// +-------+----------+------------+-----------+-----------+----------+------+------+
/// ```
/// followed by `size` payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Destination group id (0xFFFF = wildcard).
    pub dest_group_id: u32,
    /// Destination user id (0 = server, 0xFFFF = wildcard).
    pub dest_user_id: u32,
    /// Source group id; the server fills it from the session if zero.
    pub src_group_id: u32,
    /// Source user id; the server fills it from the session if 0 or 0xFFFF.
    pub src_user_id: u32,
    /// Payload tag.
    pub payload_type: PayloadType,
    /// Payload bytes.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a frame with the default addressing of a fresh client frame:
    /// destination (0, 0), source group 0, source user wildcard.
    ///
    /// The zero/wildcard source markers ask the sending endpoint to fill in
    /// its own identity.
    pub fn new(payload_type: PayloadType, payload: Vec<u8>) -> Self {
        Self {
            dest_group_id: 0,
            dest_user_id: 0,
            src_group_id: 0,
            src_user_id: WILDCARD_ID,
            payload_type,
            payload,
        }
    }

    /// Set the destination (group, user) pair, header field order.
    pub fn with_destination(mut self, group_id: u32, user_id: u32) -> Self {
        self.dest_group_id = group_id;
        self.dest_user_id = user_id;
        self
    }

    /// Set the source (group, user) pair, header field order.
    pub fn with_source(mut self, group_id: u32, user_id: u32) -> Self {
        self.src_group_id = group_id;
        self.src_user_id = user_id;
        self
    }

    /// Payload length in bytes.
    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }

    /// Serialize header plus payload. Never fails; the size field is always
    /// recomputed from the payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        buf.extend_from_slice(&HEADER_MAGIC);
        buf.extend_from_slice(&[0u8; 4]);
        buf.extend_from_slice(&self.dest_group_id.to_le_bytes());
        buf.extend_from_slice(&self.dest_user_id.to_le_bytes());
        buf.extend_from_slice(&self.src_group_id.to_le_bytes());
        buf.extend_from_slice(&self.src_user_id.to_le_bytes());
        buf.extend_from_slice(&self.payload_type.as_u32().to_le_bytes());
        buf.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Parse a frame from wire bytes.
    ///
    /// `buf` must hold the full header and at least `payload_size` bytes
    /// after it; anything past that is ignored (the stream framer hands in
    /// exactly one frame).
    ///
    /// # Errors
    ///
    /// - [`FrameError::ShortHeader`] if fewer than 32 bytes
    /// - [`FrameError::BadMagic`] on a magic mismatch
    /// - [`FrameError::ShortPayload`] if the payload is cut off
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        if buf.len() < HEADER_SIZE {
            return Err(FrameError::ShortHeader {
                expected: HEADER_SIZE,
                actual: buf.len(),
            });
        }

        if buf[0..4] != HEADER_MAGIC {
            let mut magic = [0u8; 4];
            magic.copy_from_slice(&buf[0..4]);
            return Err(FrameError::BadMagic(magic));
        }

        // Bytes 4..8 are reserved and ignored.
        let dest_group_id = read_u32(buf, 8);
        let dest_user_id = read_u32(buf, 12);
        let src_group_id = read_u32(buf, 16);
        let src_user_id = read_u32(buf, 20);
        let payload_type = PayloadType::from_u32(read_u32(buf, 24));
        let payload_size = read_u32(buf, 28) as usize;

        if buf.len() < HEADER_SIZE + payload_size {
            return Err(FrameError::ShortPayload {
                expected: payload_size,
                actual: buf.len() - HEADER_SIZE,
            });
        }

        Ok(Self {
            dest_group_id,
            dest_user_id,
            src_group_id,
            src_user_id,
            payload_type,
            payload: buf[HEADER_SIZE..HEADER_SIZE + payload_size].to_vec(),
        })
    }
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}
