#![no_main]

use libfuzzer_sys::fuzz_target;

use retouch::media::decode_inline;

const LIMIT: usize = 64 * 1024;

fuzz_target!(|data: &str| {
    // Arbitrary payloads behind a valid header: decode or fail, never panic.
    let locator = format!("data:image/png;base64,{data}");
    if let Ok(media) = decode_inline(&locator, LIMIT) {
        assert!(!media.bytes.is_empty());
        assert!(media.bytes.len() <= LIMIT);
    }

    let _ = decode_inline(data, LIMIT);
});
