//! Decoded-frame dispatch.
//!
//! The single entry point both endpoints use to turn a decoded frame into
//! listener invocations. The routing core never looks inside payloads;
//! this is the one place payload tags are interpreted.

use tracing::debug;

use super::hub::CallbackHub;
use crate::core::HANDSHAKE_PREFIX;
use crate::transport::{Frame, PayloadType};

/// Deliver a decoded frame to the matching listener set.
///
/// `PlainText` bodies starting with `CONNECT:` are identity claims, not
/// chat: they go to the log sink only and are NEVER raised as text. Image
/// events fire only when the payload passes the PNG check; unknown payload
/// tags fall through to the binary listeners.
pub fn dispatch_frame(hub: &CallbackHub, frame: &Frame) {
    match frame.payload_type {
        PayloadType::PlainText => {
            let message = frame.to_text();
            if message.starts_with(HANDSHAKE_PREFIX) {
                debug!(body = %message, "suppressing handshake frame from text listeners");
                hub.raise_log_message(&format!("connection request: {message}"));
            } else if !message.is_empty() {
                hub.raise_text(&message, frame);
            }
        }
        PayloadType::PngImage => {
            if let Some(image) = frame.to_image() {
                hub.raise_image(&image, frame);
            }
        }
        PayloadType::TextAndPngImage => {
            let (text, image) = frame.to_text_and_image();
            if let Some(image) = image {
                hub.raise_text_and_image(&text, &image, frame);
            }
        }
        PayloadType::Complex => {
            hub.raise_complex(&frame.to_complex(), frame);
        }
        PayloadType::PacketFrame => {
            if let Some(child) = frame.to_packet_frame() {
                hub.raise_packet_frame(&child, frame);
            }
        }
        PayloadType::Requirement => {
            hub.raise_requirement(&frame.to_requirement(), frame);
        }
        PayloadType::BinaryRaw | PayloadType::Other(_) => {
            hub.raise_binary(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::test_util::tiny_png;

    fn counter(hub: &CallbackHub, kind: &str) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        match kind {
            "text" => hub.add_text_listener(move |_, _| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
            "image" => hub.add_image_listener(move |_, _| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
            "binary" => hub.add_binary_listener(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
            "log" => hub.add_log_message_listener(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
            other => panic!("unknown counter kind {other}"),
        }
        count
    }

    #[test]
    fn test_text_frames_reach_text_listeners() {
        let hub = CallbackHub::new();
        let texts = counter(&hub, "text");

        dispatch_frame(&hub, &Frame::text("hello"));
        assert_eq!(texts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_connect_goes_to_log_only() {
        let hub = CallbackHub::new();
        let texts = counter(&hub, "text");
        let logs = counter(&hub, "log");

        dispatch_frame(&hub, &Frame::text("CONNECT:5:6"));
        assert_eq!(texts.load(Ordering::SeqCst), 0);
        assert_eq!(logs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_text_is_not_raised() {
        let hub = CallbackHub::new();
        let texts = counter(&hub, "text");

        dispatch_frame(&hub, &Frame::text(""));
        assert_eq!(texts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_image_frame_dispatch() {
        let hub = CallbackHub::new();
        let images = counter(&hub, "image");

        dispatch_frame(&hub, &Frame::image(&tiny_png()));
        assert_eq!(images.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_undecodable_image_is_dropped() {
        let hub = CallbackHub::new();
        let images = counter(&hub, "image");
        let binaries = counter(&hub, "binary");

        dispatch_frame(&hub, &Frame::new(PayloadType::PngImage, b"not png".to_vec()));
        assert_eq!(images.load(Ordering::SeqCst), 0);
        assert_eq!(binaries.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_text_and_image_requires_decodable_image() {
        let hub = CallbackHub::new();
        let pairs = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&pairs);
        hub.add_text_and_image_listener(move |_, _, _| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        dispatch_frame(&hub, &Frame::text_and_image("caption", &tiny_png()));
        assert_eq!(pairs.load(Ordering::SeqCst), 1);

        let broken = Frame::new(
            PayloadType::TextAndPngImage,
            crate::transport::pack_segments(&[b"caption".as_slice(), b"junk".as_slice()]),
        );
        dispatch_frame(&hub, &broken);
        assert_eq!(pairs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_complex_and_requirement_channels_are_separate() {
        let hub = CallbackHub::new();
        let complexes = Arc::new(AtomicUsize::new(0));
        let requirements = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&complexes);
        hub.add_complex_listener(move |parts, _| {
            assert_eq!(parts.texts, vec!["a"]);
            c.fetch_add(1, Ordering::SeqCst);
        });
        let r = Arc::clone(&requirements);
        hub.add_requirement_listener(move |parts, _| {
            assert_eq!(parts.texts, vec!["b"]);
            r.fetch_add(1, Ordering::SeqCst);
        });

        dispatch_frame(&hub, &Frame::complex(&["a"], &[], &[]));
        dispatch_frame(&hub, &Frame::requirement(&["b"], &[], &[]));
        assert_eq!(complexes.load(Ordering::SeqCst), 1);
        assert_eq!(requirements.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_packet_frame_delivers_child() {
        let hub = CallbackHub::new();
        let children = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&children);
        hub.add_packet_frame_listener(move |child, carrier| {
            assert_eq!(child.to_text(), "inner");
            assert_eq!(carrier.payload_type, PayloadType::PacketFrame);
            c.fetch_add(1, Ordering::SeqCst);
        });

        dispatch_frame(&hub, &Frame::packet(&Frame::text("inner")));
        assert_eq!(children.load(Ordering::SeqCst), 1);

        // Garbage child decodes to nothing; no event.
        dispatch_frame(&hub, &Frame::new(PayloadType::PacketFrame, b"junk".to_vec()));
        assert_eq!(children.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_tags_dispatch_as_binary() {
        let hub = CallbackHub::new();
        let binaries = counter(&hub, "binary");

        dispatch_frame(&hub, &Frame::binary(vec![0xAB]));
        dispatch_frame(&hub, &Frame::new(PayloadType::Other(555), vec![0xCD]));
        assert_eq!(binaries.load(Ordering::SeqCst), 2);
    }
}
