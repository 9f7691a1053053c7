//! PNG payload contract.
//!
//! The routing core treats images as opaque PNG byte blobs. [`PngData`]
//! is the boundary type: it checks the PNG signature on the way in (the
//! crate's whole "decode" obligation) and converts to/from the base64
//! forms the original consumers expect. Actual raster decoding belongs to
//! the application.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;

/// Eight-byte signature every PNG stream starts with.
const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Header prepended to a data-URI base64 image.
const DATA_URI_HEADER: &str = "data:image/png;base64,";

/// Errors raised by the PNG boundary type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PngError {
    /// The bytes do not start with the PNG signature.
    #[error("not a PNG stream (bad signature)")]
    BadSignature,

    /// Base64 input could not be decoded.
    #[error("invalid base64 image data: {0}")]
    InvalidBase64(String),
}

/// One PNG-encoded image, validated at the signature level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PngData(Vec<u8>);

impl PngData {
    /// Wrap PNG bytes, validating the signature.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, PngError> {
        if bytes.len() < PNG_SIGNATURE.len() || bytes[..PNG_SIGNATURE.len()] != PNG_SIGNATURE {
            return Err(PngError::BadSignature);
        }
        Ok(Self(bytes))
    }

    /// Decode a base64 string (optionally `data:image/png;base64,`-prefixed)
    /// into validated PNG bytes.
    pub fn from_base64(data: &str, with_header: bool) -> Result<Self, PngError> {
        let encoded = if with_header {
            data.split_once(',').map_or(data, |(_, rest)| rest)
        } else {
            data
        };
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| PngError::InvalidBase64(e.to_string()))?;
        Self::from_bytes(bytes)
    }

    /// Borrow the raw PNG bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume into the raw PNG bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Encoded size in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// A PNG stream is never empty (the signature alone is 8 bytes).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render as base64, with or without the `data:image/png;base64,` header.
    pub fn to_base64(&self, with_header: bool) -> String {
        let b64 = STANDARD.encode(&self.0);
        if with_header {
            format!("{DATA_URI_HEADER}{b64}")
        } else {
            b64
        }
    }
}

impl AsRef<[u8]> for PngData {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::tiny_png_bytes as tiny_png;

    #[test]
    fn test_accepts_png_signature() {
        let png = PngData::from_bytes(tiny_png()).unwrap();
        assert_eq!(&png.as_bytes()[..4], &[0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn test_rejects_bad_signature() {
        assert_eq!(
            PngData::from_bytes(b"JFIF not a png".to_vec()),
            Err(PngError::BadSignature)
        );
        assert_eq!(PngData::from_bytes(vec![0x89, 0x50]), Err(PngError::BadSignature));
    }

    #[test]
    fn test_base64_round_trip_with_header() {
        let png = PngData::from_bytes(tiny_png()).unwrap();
        let uri = png.to_base64(true);
        assert!(uri.starts_with("data:image/png;base64,"));
        let back = PngData::from_base64(&uri, true).unwrap();
        assert_eq!(back, png);
    }

    #[test]
    fn test_base64_round_trip_bare() {
        let png = PngData::from_bytes(tiny_png()).unwrap();
        let bare = png.to_base64(false);
        assert!(!bare.contains(','));
        let back = PngData::from_base64(&bare, false).unwrap();
        assert_eq!(back, png);
    }

    #[test]
    fn test_base64_garbage() {
        assert!(matches!(
            PngData::from_base64("!!not base64!!", false),
            Err(PngError::InvalidBase64(_))
        ));
    }
}
