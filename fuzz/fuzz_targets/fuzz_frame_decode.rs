#![no_main]

use libfuzzer_sys::fuzz_target;
use session_core::protocol::registry::FrameRegistry;

fuzz_target!(|data: &[u8]| {
    // Any byte string must decode or fail cleanly; a decoded frame must re-encode.
    let registry = FrameRegistry::standard();
    if let Ok(frame) = registry.decode_tagged(data) {
        let raw = frame.to_raw().expect("decoded frame re-encodes");
        let again = registry.decode_raw(&raw).expect("re-encoded frame decodes");
        assert_eq!(again.to_raw().expect("stable encoding"), raw);
    }
});
