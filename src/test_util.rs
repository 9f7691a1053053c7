//! Shared fixtures for unit tests.

use crate::core::PngData;

/// Bytes with a valid PNG signature and chunk-shaped tail; enough for the
/// signature-level validation this crate performs.
pub(crate) fn tiny_png_bytes() -> Vec<u8> {
    let mut bytes = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    // IHDR chunk for a 1x1 RGBA image, then IEND.
    bytes.extend_from_slice(&[0, 0, 0, 13]);
    bytes.extend_from_slice(b"IHDR");
    bytes.extend_from_slice(&[0, 0, 0, 1, 0, 0, 0, 1, 8, 6, 0, 0, 0]);
    bytes.extend_from_slice(&[0x1F, 0x15, 0xC4, 0x89]);
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    bytes.extend_from_slice(b"IEND");
    bytes.extend_from_slice(&[0xAE, 0x42, 0x60, 0x82]);
    bytes
}

/// The fixture as a validated [`PngData`].
pub(crate) fn tiny_png() -> PngData {
    PngData::from_bytes(tiny_png_bytes()).expect("fixture carries the PNG signature")
}
