//! Property-based tests for the frame codec and sub-list format.

use hag_protocol::transport::{Frame, PayloadType, pack_segments, unpack_segments};
use proptest::prelude::*;

mod common;

fn arbitrary_frame() -> impl Strategy<Value = Frame> {
    (
        any::<u32>(),
        any::<u32>(),
        any::<u32>(),
        any::<u32>(),
        any::<u32>(),
        prop::collection::vec(any::<u8>(), 0..2048),
    )
        .prop_map(|(dest_group_id, dest_user_id, src_group_id, src_user_id, tag, payload)| {
            Frame {
                dest_group_id,
                dest_user_id,
                src_group_id,
                src_user_id,
                payload_type: PayloadType::from_u32(tag),
                payload,
            }
        })
}

proptest! {
    #[test]
    fn frame_round_trip(frame in arbitrary_frame()) {
        let bytes = frame.encode();
        let decoded = Frame::decode(&bytes).expect("encoded frames decode");
        prop_assert_eq!(decoded, frame);
    }

    #[test]
    fn payload_tag_round_trip(tag in any::<u32>()) {
        prop_assert_eq!(PayloadType::from_u32(tag).as_u32(), tag);
    }

    #[test]
    fn segments_round_trip(
        segments in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..256), 0..16)
    ) {
        let packed = pack_segments(&segments);
        prop_assert_eq!(unpack_segments(&packed).expect("packed lists unpack"), segments);
    }

    #[test]
    fn decode_arbitrary_bytes_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = Frame::decode(&bytes);
        let _ = unpack_segments(&bytes);
    }

    #[test]
    fn text_extraction_never_panics(payload in prop::collection::vec(any::<u8>(), 0..512)) {
        // Invalid UTF-8 is replaced, composite walks tolerate garbage.
        for tag in [
            PayloadType::PlainText,
            PayloadType::TextAndPngImage,
            PayloadType::Complex,
            PayloadType::Requirement,
            PayloadType::PacketFrame,
        ] {
            let frame = Frame::new(tag, payload.clone());
            let _ = frame.to_text();
            let _ = frame.to_image();
            let _ = frame.to_text_and_image();
            let _ = frame.to_complex();
            let _ = frame.to_requirement();
            let _ = frame.to_packet_frame();
        }
    }

    #[test]
    fn composite_round_trip(
        texts in prop::collection::vec("[a-zA-Z0-9ぁ-ん]{0,24}", 0..5),
        binaries in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..5),
        image_count in 0usize..3,
    ) {
        let text_refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let images = vec![common::tiny_png(); image_count];

        let frame = Frame::complex(&text_refs, &images, &binaries);
        let parts = frame.to_complex();
        prop_assert_eq!(parts.texts, texts);
        prop_assert_eq!(parts.images, images);
        prop_assert_eq!(parts.binaries, binaries);
    }
}
