#![no_main]

use libfuzzer_sys::fuzz_target;
use peer_link::core::packet::PacketHeader;

fuzz_target!(|data: &[u8]| {
    // Header parsing must reject, never panic
    if let Ok((header, payload)) = PacketHeader::parse(data) {
        assert!(payload.len() + header.encoded_len() == data.len());
    }
});
