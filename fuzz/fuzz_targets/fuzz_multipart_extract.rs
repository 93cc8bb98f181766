#![no_main]

use libfuzzer_sys::fuzz_target;

use retouch::media::{boundary_from_content_type, extract_file_field};

fuzz_target!(|data: &[u8]| {
    // First line is the Content-Type header, the rest is the body.
    let split = data.iter().position(|b| *b == b'\n').unwrap_or(data.len());
    let header = String::from_utf8_lossy(&data[..split]);
    let body = data.get(split + 1..).unwrap_or_default();

    if let Ok(boundary) = boundary_from_content_type(&header) {
        if let Ok(file) = extract_file_field(body, &boundary) {
            assert!(file.content.len() <= body.len());
        }
    }

    let _ = extract_file_field(body, "fuzzboundary");
});
