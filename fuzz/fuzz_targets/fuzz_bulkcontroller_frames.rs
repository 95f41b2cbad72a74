//! Fuzzes the bulk-controller frame and message decoders.
//!
//! Exercises `SyncFrame::decode`, the ack payload, update frames, update
//! responses and the protobuf device messages with arbitrary bytes. None of
//! these operations must panic.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_bulkcontroller_frames

#![no_main]

use fwupd_bulkcontroller::message::{decode_message, parse_device_info};
use fwupd_bulkcontroller::protocol::{
    EndTransfer, SyncFrame, UpdResponse, decode_ack_payload, decode_upd,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(frame) = SyncFrame::decode(data) {
        let _ = decode_ack_payload(&frame.payload);
        if let Ok(msg) = decode_message(&frame.payload) {
            if let Some(json) = msg.device_info_json() {
                let _ = parse_device_info(json);
            }
        }
    }
    if let Ok((_cmd, payload)) = decode_upd(data) {
        let _ = EndTransfer::decode(payload);
    }
    let _ = UpdResponse::decode(data);
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = parse_device_info(text);
    }
});
