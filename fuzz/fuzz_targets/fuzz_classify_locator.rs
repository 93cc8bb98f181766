#![no_main]

use libfuzzer_sys::fuzz_target;

use retouch::media::{classify, strip_sandbox_prefix};

fuzz_target!(|data: &str| {
    // Classification is total and stable.
    let first = classify(data);
    assert_eq!(first, classify(data));
    assert_eq!(first, classify(data.trim()));

    let stripped = strip_sandbox_prefix(data);
    assert!(stripped.len() <= data.len());
});
