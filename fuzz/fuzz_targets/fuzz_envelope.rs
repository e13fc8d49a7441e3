#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use session_core::core::codec::FrameCodec;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // Stream framing over arbitrary input: no panics, no unbounded buffering
    let mut codec = FrameCodec::new(4096);
    let mut buf = BytesMut::from(data);
    while let Ok(Some(frame)) = codec.decode(&mut buf) {
        assert!(frame.wire_len() <= 4096 + 4);
    }
});
