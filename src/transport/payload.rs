//! Typed payload packing for HAG1 frames.
//!
//! Three payload families share a length-prefixed sub-list format ("LPS"):
//! a sequence of (u32 length, bytes) tuples concatenated, the empty sequence
//! encoding to zero bytes. `TextAndPngImage` is a two-element list,
//! `Complex`/`Requirement` are lists whose FIRST element is a 12-byte count
//! header (texts, images, binaries as u32 each).
//!
//! Extraction is tolerant across forms: asking a `Complex` frame for text
//! yields its first text item, asking a `TextAndPngImage` frame for an image
//! yields its second element, and missing data yields an empty string or
//! `None`, never an error.

use tracing::debug;

use super::frame::{Frame, FrameError, PayloadType};
use crate::core::{COMPOSITE_COUNTS_SIZE, PngData};

/// Pack byte strings into the length-prefixed sub-list format.
pub fn pack_segments<T: AsRef<[u8]>>(segments: &[T]) -> Vec<u8> {
    let total: usize = segments.iter().map(|s| 4 + s.as_ref().len()).sum();
    let mut buf = Vec::with_capacity(total);
    for segment in segments {
        let bytes = segment.as_ref();
        buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(bytes);
    }
    buf
}

/// Split a length-prefixed sub-list back into its byte strings.
///
/// # Errors
///
/// [`FrameError::TruncatedSegment`] if a length prefix is cut off or
/// promises more bytes than remain.
pub fn unpack_segments(buf: &[u8]) -> Result<Vec<Vec<u8>>, FrameError> {
    let mut segments = Vec::new();
    let mut offset = 0;
    while offset < buf.len() {
        let remaining = buf.len() - offset;
        if remaining < 4 {
            return Err(FrameError::TruncatedSegment { offset, length: 4, remaining });
        }
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&buf[offset..offset + 4]);
        let length = u32::from_le_bytes(len_bytes) as usize;
        offset += 4;

        if length > buf.len() - offset {
            return Err(FrameError::TruncatedSegment {
                offset: offset - 4,
                length,
                remaining: buf.len() - offset,
            });
        }
        segments.push(buf[offset..offset + length].to_vec());
        offset += length;
    }
    Ok(segments)
}

/// Decoded contents of a `Complex` or `Requirement` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompositeParts {
    /// Text items, in payload order.
    pub texts: Vec<String>,
    /// PNG items, in payload order.
    pub images: Vec<PngData>,
    /// Opaque binary items, in payload order.
    pub binaries: Vec<Vec<u8>>,
}

impl CompositeParts {
    /// True when no items of any kind are present.
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty() && self.images.is_empty() && self.binaries.is_empty()
    }
}

impl Frame {
    /// Build a `PlainText` frame from a message.
    pub fn text(message: &str) -> Self {
        Self::new(PayloadType::PlainText, message.as_bytes().to_vec())
    }

    /// Build a `BinaryRaw` frame from opaque bytes.
    pub fn binary(raw: Vec<u8>) -> Self {
        Self::new(PayloadType::BinaryRaw, raw)
    }

    /// Build a `PngImage` frame from one image.
    pub fn image(image: &PngData) -> Self {
        Self::new(PayloadType::PngImage, image.as_bytes().to_vec())
    }

    /// Build a `TextAndPngImage` frame: LPS of [text, png bytes].
    pub fn text_and_image(text: &str, image: &PngData) -> Self {
        let payload = pack_segments(&[text.as_bytes(), image.as_bytes()]);
        Self::new(PayloadType::TextAndPngImage, payload)
    }

    /// Build a `Complex` frame from texts, images, and binaries.
    ///
    /// The 12-byte count header is itself the first element of the sub-list,
    /// not a prefix outside it.
    pub fn complex(texts: &[&str], images: &[PngData], binaries: &[Vec<u8>]) -> Self {
        Self::new(PayloadType::Complex, pack_composite(texts, images, binaries))
    }

    /// Build a `Requirement` frame; identical layout to [`Frame::complex`].
    pub fn requirement(texts: &[&str], images: &[PngData], binaries: &[Vec<u8>]) -> Self {
        Self::new(PayloadType::Requirement, pack_composite(texts, images, binaries))
    }

    /// Build a `PacketFrame` frame embedding another frame.
    pub fn packet(child: &Frame) -> Self {
        Self::new(PayloadType::PacketFrame, child.encode())
    }

    /// Extract text. Tolerant of composite forms; empty string when absent.
    pub fn to_text(&self) -> String {
        match self.payload_type {
            PayloadType::PlainText => lossy(&self.payload),
            PayloadType::TextAndPngImage => unpack_segments(&self.payload)
                .ok()
                .and_then(|parts| parts.first().map(|p| lossy(p)))
                .unwrap_or_default(),
            PayloadType::Complex => {
                self.to_complex().texts.into_iter().next().unwrap_or_default()
            }
            _ => String::new(),
        }
    }

    /// The frame's message as a string; alias for [`Frame::to_text`].
    pub fn message(&self) -> String {
        self.to_text()
    }

    /// Extract an image. Tolerant of composite forms; `None` when absent or
    /// not PNG-shaped.
    pub fn to_image(&self) -> Option<PngData> {
        match self.payload_type {
            PayloadType::PngImage => PngData::from_bytes(self.payload.clone()).ok(),
            PayloadType::TextAndPngImage => unpack_segments(&self.payload)
                .ok()
                .and_then(|parts| parts.into_iter().nth(1))
                .and_then(|bytes| PngData::from_bytes(bytes).ok()),
            PayloadType::Complex => self.to_complex().images.into_iter().next(),
            _ => None,
        }
    }

    /// Extract text and image together; each side absent when missing.
    pub fn to_text_and_image(&self) -> (String, Option<PngData>) {
        match self.payload_type {
            PayloadType::TextAndPngImage => {
                let parts = unpack_segments(&self.payload).unwrap_or_default();
                let text = parts.first().map(|p| lossy(p)).unwrap_or_default();
                let image = parts
                    .into_iter()
                    .nth(1)
                    .and_then(|bytes| PngData::from_bytes(bytes).ok());
                (text, image)
            }
            PayloadType::PlainText => (lossy(&self.payload), None),
            PayloadType::PngImage => (String::new(), self.to_image()),
            PayloadType::Complex => {
                let parts = self.to_complex();
                (
                    parts.texts.into_iter().next().unwrap_or_default(),
                    parts.images.into_iter().next(),
                )
            }
            _ => (String::new(), None),
        }
    }

    /// Decode a `Complex` payload; empty parts for any other tag or on
    /// malformed contents.
    pub fn to_complex(&self) -> CompositeParts {
        if self.payload_type != PayloadType::Complex {
            return CompositeParts::default();
        }
        unpack_composite(&self.payload)
    }

    /// Decode a `Requirement` payload; empty parts for any other tag.
    pub fn to_requirement(&self) -> CompositeParts {
        if self.payload_type != PayloadType::Requirement {
            return CompositeParts::default();
        }
        unpack_composite(&self.payload)
    }

    /// Decode the nested frame of a `PacketFrame` payload.
    pub fn to_packet_frame(&self) -> Option<Frame> {
        if self.payload_type != PayloadType::PacketFrame {
            return None;
        }
        Frame::decode(&self.payload).ok()
    }

    /// The frame's image as base64: a `data:image/png;base64,` URI when
    /// `with_header`, bare base64 otherwise, empty string when no image.
    pub fn to_base64_image(&self, with_header: bool) -> String {
        self.to_image()
            .map(|image| image.to_base64(with_header))
            .unwrap_or_default()
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn pack_composite(texts: &[&str], images: &[PngData], binaries: &[Vec<u8>]) -> Vec<u8> {
    let mut counts = Vec::with_capacity(COMPOSITE_COUNTS_SIZE);
    counts.extend_from_slice(&(texts.len() as u32).to_le_bytes());
    counts.extend_from_slice(&(images.len() as u32).to_le_bytes());
    counts.extend_from_slice(&(binaries.len() as u32).to_le_bytes());

    let mut segments: Vec<&[u8]> = Vec::with_capacity(1 + texts.len() + images.len() + binaries.len());
    segments.push(&counts);
    segments.extend(texts.iter().map(|t| t.as_bytes()));
    segments.extend(images.iter().map(|i| i.as_bytes()));
    segments.extend(binaries.iter().map(|b| b.as_slice()));
    pack_segments(&segments)
}

fn unpack_composite(payload: &[u8]) -> CompositeParts {
    let Ok(segments) = unpack_segments(payload) else {
        debug!("composite payload has truncated segments, treating as empty");
        return CompositeParts::default();
    };
    let mut items = segments.into_iter();
    let Some(counts) = items.next() else {
        return CompositeParts::default();
    };
    if counts.len() < COMPOSITE_COUNTS_SIZE {
        debug!(len = counts.len(), "composite count header too short");
        return CompositeParts::default();
    }

    let n_texts = read_count(&counts, 0);
    let n_images = read_count(&counts, 4);
    let n_binaries = read_count(&counts, 8);

    let mut parts = CompositeParts::default();
    for _ in 0..n_texts {
        match items.next() {
            Some(bytes) => parts.texts.push(lossy(&bytes)),
            None => return parts,
        }
    }
    for _ in 0..n_images {
        match items.next() {
            Some(bytes) => match PngData::from_bytes(bytes) {
                Ok(image) => parts.images.push(image),
                Err(_) => debug!("skipping composite image item without PNG signature"),
            },
            None => return parts,
        }
    }
    for _ in 0..n_binaries {
        match items.next() {
            Some(bytes) => parts.binaries.push(bytes),
            None => return parts,
        }
    }
    parts
}

fn read_count(counts: &[u8], offset: usize) -> usize {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&counts[offset..offset + 4]);
    u32::from_le_bytes(bytes) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::tiny_png;

    #[test]
    fn test_segments_roundtrip() {
        let input: Vec<Vec<u8>> = vec![b"one".to_vec(), Vec::new(), b"three".to_vec()];
        let packed = pack_segments(&input);
        assert_eq!(unpack_segments(&packed).unwrap(), input);
    }

    #[test]
    fn test_segments_empty_list() {
        assert!(pack_segments::<Vec<u8>>(&[]).is_empty());
        assert!(unpack_segments(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_segments_truncated_body() {
        let mut packed = pack_segments(&[b"abcdef"]);
        packed.truncate(7);
        assert!(matches!(
            unpack_segments(&packed),
            Err(FrameError::TruncatedSegment { offset: 0, length: 6, remaining: 3 })
        ));
    }

    #[test]
    fn test_segments_truncated_prefix() {
        let packed = pack_segments(&[b"ab"]);
        // Cut into the next length prefix.
        let mut bad = packed.clone();
        bad.extend_from_slice(&[9, 0]);
        assert!(matches!(
            unpack_segments(&bad),
            Err(FrameError::TruncatedSegment { offset: 6, .. })
        ));
    }

    #[test]
    fn test_text_frame() {
        let frame = Frame::text("こんにちは");
        assert_eq!(frame.payload_type, PayloadType::PlainText);
        assert_eq!(frame.to_text(), "こんにちは");
        assert_eq!(frame.message(), "こんにちは");
    }

    #[test]
    fn test_text_lossy_never_fails() {
        let frame = Frame::new(PayloadType::PlainText, vec![0xFF, 0xFE, b'a']);
        let text = frame.to_text();
        assert!(text.ends_with('a'));
        assert!(text.contains('\u{FFFD}'));
    }

    #[test]
    fn test_image_frame_roundtrip() {
        let png = tiny_png();
        let frame = Frame::image(&png);
        assert_eq!(frame.payload_type, PayloadType::PngImage);
        assert_eq!(frame.to_image().unwrap(), png);
        assert_eq!(frame.to_text(), "");
    }

    #[test]
    fn test_text_and_image_roundtrip() {
        let png = tiny_png();
        let frame = Frame::text_and_image("caption", &png);

        let (text, image) = frame.to_text_and_image();
        assert_eq!(text, "caption");
        assert_eq!(image.unwrap(), png);

        // Cross-form access pulls out the matching half.
        assert_eq!(frame.to_text(), "caption");
        assert_eq!(frame.to_image().unwrap(), png);
    }

    #[test]
    fn test_complex_roundtrip() {
        let png = tiny_png();
        let frame = Frame::complex(
            &["a", "b"],
            std::slice::from_ref(&png),
            &[vec![0x00, 0x01]],
        );

        let parts = frame.to_complex();
        assert_eq!(parts.texts, vec!["a", "b"]);
        assert_eq!(parts.images, vec![png]);
        assert_eq!(parts.binaries, vec![vec![0x00, 0x01]]);
    }

    #[test]
    fn test_complex_empty_roundtrip() {
        let frame = Frame::complex(&[], &[], &[]);
        let parts = frame.to_complex();
        assert!(parts.is_empty());
    }

    #[test]
    fn test_complex_first_items_via_scalar_extractors() {
        let png = tiny_png();
        let frame = Frame::complex(&["first", "second"], std::slice::from_ref(&png), &[]);
        assert_eq!(frame.to_text(), "first");
        assert_eq!(frame.to_image().unwrap(), png);
        let (text, image) = frame.to_text_and_image();
        assert_eq!(text, "first");
        assert!(image.is_some());
    }

    #[test]
    fn test_requirement_same_layout_distinct_channel() {
        let frame = Frame::requirement(&["todo"], &[], &[b"bin".to_vec()]);
        assert_eq!(frame.payload_type, PayloadType::Requirement);

        let parts = frame.to_requirement();
        assert_eq!(parts.texts, vec!["todo"]);
        assert_eq!(parts.binaries, vec![b"bin".to_vec()]);

        // A requirement is not a complex and vice versa.
        assert!(frame.to_complex().is_empty());
        assert!(Frame::complex(&["x"], &[], &[]).to_requirement().is_empty());
    }

    #[test]
    fn test_packet_frame_nesting() {
        let inner = Frame::text("nested").with_destination(5, 6);
        let outer = Frame::packet(&inner);
        assert_eq!(outer.payload_type, PayloadType::PacketFrame);

        let child = outer.to_packet_frame().unwrap();
        assert_eq!(child, inner);
    }

    #[test]
    fn test_packet_frame_garbage_is_absent() {
        let frame = Frame::new(PayloadType::PacketFrame, b"not a frame".to_vec());
        assert!(frame.to_packet_frame().is_none());
    }

    #[test]
    fn test_base64_accessor() {
        let png = tiny_png();
        let frame = Frame::image(&png);
        assert!(frame.to_base64_image(true).starts_with("data:image/png;base64,"));
        assert_eq!(frame.to_base64_image(false), png.to_base64(false));
        assert_eq!(Frame::text("no image").to_base64_image(true), "");
    }

    #[test]
    fn test_malformed_composite_is_empty() {
        // A complex frame whose payload is not a valid sub-list.
        let frame = Frame::new(PayloadType::Complex, vec![0xFF; 5]);
        assert!(frame.to_complex().is_empty());

        // Count header shorter than 12 bytes.
        let frame = Frame::new(PayloadType::Complex, pack_segments(&[b"xy"]));
        assert!(frame.to_complex().is_empty());
    }
}
