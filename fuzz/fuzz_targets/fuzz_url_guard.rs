#![no_main]

use libfuzzer_sys::fuzz_target;

use retouch::media::fetch::{check_url, is_private_ip};
use std::net::IpAddr;

fuzz_target!(|data: &str| {
    // The host guard must never panic, whatever the URL looks like.
    if let Ok(url) = url::Url::parse(data) {
        let blocked = check_url(&url, false);
        let allowed = check_url(&url, true);
        // Allowing private hosts can only widen what passes.
        if blocked.is_ok() {
            assert!(allowed.is_ok());
        }
    }

    if let Ok(ip) = data.parse::<IpAddr>() {
        let _ = is_private_ip(&ip);
    }
});
