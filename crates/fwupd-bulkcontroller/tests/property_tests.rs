//! Property-based tests for frame decoding and image transfer.

mod common;

use std::io::Cursor;

use common::SimDevice;
use fwupd_bulkcontroller::protocol::{SyncFrame, decode_ack_payload, decode_upd, encode_ack_payload};
use fwupd_bulkcontroller::{BulkSession, NoProgress, SessionConfig, WriteFlags};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_ack_names_command(cmd in 0u32..1_000_000) {
        let payload = encode_ack_payload(cmd).map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(payload.len(), 6);
        prop_assert!(payload.iter().all(|&b| b == 0 || b.is_ascii_digit()));
        prop_assert_eq!(decode_ack_payload(&payload).ok(), Some(cmd));
    }

    #[test]
    fn test_ack_wider_than_field_rejected(cmd in 1_000_000u32..) {
        prop_assert!(encode_ack_payload(cmd).is_err());
    }

    #[test]
    fn test_arbitrary_frames_never_panic(data in proptest::collection::vec(any::<u8>(), 0..64)) {
        if let Ok(frame) = SyncFrame::decode(&data) {
            prop_assert!(frame.payload.len() + 12 <= data.len());
            if let Ok(cmd) = decode_ack_payload(&frame.payload) {
                prop_assert!(cmd < 1_000_000);
            }
        }
        if let Ok((_cmd, payload)) = decode_upd(&data) {
            prop_assert!(payload.len() + 8 <= data.len());
        }
    }

    #[test]
    fn test_device_receives_whole_image(
        blob in proptest::collection::vec(any::<u8>(), 1..8000),
        buffer_size in 512usize..2048,
    ) {
        let config = SessionConfig {
            default_buffer_size: buffer_size,
            init_retry_delay_ms: 1,
            verify_delay_ms: 1,
            ..SessionConfig::default()
        };
        let mut sim = SimDevice::default();
        {
            let mut session = BulkSession::new(&mut sim, config)
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            session
                .write_firmware(Cursor::new(&blob), WriteFlags::NONE, &mut NoProgress)
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
        }
        prop_assert!(sim.largest_packet <= buffer_size);
        prop_assert_eq!(sim.image_size, Some(blob.len() as u64));
        prop_assert_eq!(sim.image, blob);
    }
}
