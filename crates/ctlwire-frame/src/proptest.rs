//! Property-based tests for the header and body codecs.
//!
//! These tests use proptest to verify:
//! - Body roundtrip for arbitrary configuration messages
//! - `compute_body_length` always equals the encoded length
//! - Any strict prefix of an encoded header or body fails as truncated
//! - Decoders never panic on arbitrary input

use proptest::prelude::*;

use crate::body::{compute_body_length, decode_body, ConfigMessage, LoggingFile, MetaData};
use crate::codec::{decode_header, Header, HEADER_SIZE};
use crate::error::FrameError;

// =============================================================================
// Arbitrary Generators
// =============================================================================

prop_compose! {
    fn arb_logging_file()(
        id in any::<u32>(),
        enable in ".{0,8}",
        name_prefix in ".{0,16}",
        name_subfix in ".{0,16}",
        extension in "[a-z]{0,4}",
    ) -> LoggingFile {
        LoggingFile { id, enable, name_prefix, name_subfix, extension }
    }
}

prop_compose! {
    fn arb_meta_data()(
        entries in prop::collection::btree_map(".{0,12}", ".{0,24}", 0..6),
        issue in ".{0,32}",
    ) -> MetaData {
        MetaData { entries, issue }
    }
}

prop_compose! {
    fn arb_config_message()(
        logging_directory_path in ".{0,48}",
        numbers in any::<[u32; 5]>(),
        logging_files in prop::collection::vec(arb_logging_file(), 0..5),
        meta_data in arb_meta_data(),
    ) -> ConfigMessage {
        ConfigMessage {
            logging_directory_path,
            logging_mode: numbers[0],
            history_time: numbers[1],
            follow_time: numbers[2],
            split_time: numbers[3],
            data_length: numbers[4],
            logging_files,
            meta_data,
        }
    }
}

prop_compose! {
    fn arb_header()(
        timestamp_ns in any::<u64>(),
        message_type in any::<u8>(),
        sequence_number in any::<u64>(),
        body_length in any::<u32>(),
    ) -> Header {
        Header { timestamp_ns, message_type, sequence_number, body_length }
    }
}

// =============================================================================
// Property Tests
// =============================================================================

proptest! {
    #[test]
    fn body_roundtrip(msg in arb_config_message()) {
        let bytes = msg.to_bytes().unwrap();
        let decoded = decode_body(&bytes).unwrap();
        prop_assert_eq!(msg, decoded);
    }

    #[test]
    fn computed_length_matches_encoding(msg in arb_config_message()) {
        let bytes = msg.to_bytes().unwrap();
        prop_assert_eq!(compute_body_length(&msg).unwrap() as usize, bytes.len());
    }

    #[test]
    fn body_prefix_is_truncated(msg in arb_config_message(), cut in any::<prop::sample::Index>()) {
        let bytes = msg.to_bytes().unwrap();
        let cut = cut.index(bytes.len());
        let result = decode_body(&bytes[..cut]);
        prop_assert!(
            matches!(result, Err(FrameError::Truncated { .. })),
            "prefix of {} bytes gave {:?}",
            cut,
            result
        );
    }

    #[test]
    fn header_roundtrip(header in arb_header()) {
        prop_assert_eq!(decode_header(&header.encode()).unwrap(), header);
    }

    #[test]
    fn header_prefix_is_truncated(header in arb_header(), cut in 0usize..HEADER_SIZE) {
        let bytes = header.encode();
        let result = decode_header(&bytes[..cut]);
        prop_assert!(matches!(result, Err(FrameError::Truncated { .. })), "unexpected {:?}", result);
    }

    #[test]
    fn body_decoder_never_panics(data in prop::collection::vec(any::<u8>(), 0..2048)) {
        let _ = decode_body(&data);
    }
}
