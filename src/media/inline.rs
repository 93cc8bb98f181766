//! Inline `data:image/<subtype>;base64,<payload>` decoding.
//!
//! Payloads arriving through chat-like channels are often line-wrapped, use
//! the URL-safe alphabet, or lose their padding. Those are repaired; anything
//! structurally unrecoverable is rejected.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use bytes::Bytes;
use regex::Regex;
use std::sync::LazyLock;

use super::{check_size, DecodedMedia, MediaError};

static INLINE_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^data:image/([a-z0-9.+-]+);base64,").expect("valid inline header regex")
});

/// Standard alphabet, canonical padding required, non-zero trailing bits tolerated.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::RequireCanonical),
);

/// Largest base64 text that can decode to at most `max_bytes`.
pub fn max_encoded_len(max_bytes: usize) -> usize {
    max_bytes.div_ceil(3).saturating_mul(4)
}

/// Decode an inline image locator into bytes plus its declared media type.
pub fn decode_inline(locator: &str, max_bytes: usize) -> Result<DecodedMedia, MediaError> {
    let locator = locator.trim();
    let caps = INLINE_HEADER.captures(locator).ok_or_else(|| {
        MediaError::InvalidEncoding("expected a data:image/<type>;base64, prefix".to_string())
    })?;
    let subtype = caps[1].to_ascii_lowercase();
    let payload_start = caps.get(0).map(|m| m.end()).unwrap_or(0);
    let payload = &locator[payload_start..];

    let max_encoded = max_encoded_len(max_bytes);
    let normalized = normalize_payload(payload, max_encoded, max_bytes)?;

    let decoded = LENIENT
        .decode(normalized.as_bytes())
        .map_err(|e| MediaError::InvalidEncoding(e.to_string()))?;
    check_size(decoded.len(), max_bytes)?;

    let media_type = format!("image/{subtype}");
    let name_hint = Some(format!("inline.{}", subtype_extension(&subtype)));
    Ok(DecodedMedia {
        media_type,
        bytes: Bytes::from(decoded),
        name_hint,
    })
}

/// Strip whitespace, map the URL-safe alphabet onto the standard one, and
/// re-derive padding.
fn normalize_payload(
    payload: &str,
    max_encoded: usize,
    max_bytes: usize,
) -> Result<String, MediaError> {
    let mut out = String::with_capacity(payload.len().min(max_encoded) + 2);
    for c in payload.chars() {
        match c {
            c if c.is_ascii_whitespace() => continue,
            '-' => out.push('+'),
            '_' => out.push('/'),
            'A'..='Z' | 'a'..='z' | '0'..='9' | '+' | '/' | '=' => out.push(c),
            other => {
                return Err(MediaError::InvalidEncoding(format!(
                    "unexpected character {other:?} in base64 payload"
                )))
            }
        }
        if out.len() > max_encoded + 2 {
            return Err(MediaError::PayloadTooLarge {
                size: out.len() / 4 * 3,
                limit: max_bytes,
            });
        }
    }

    let body_len = out.trim_end_matches('=').len();
    out.truncate(body_len);
    if out.contains('=') {
        return Err(MediaError::InvalidEncoding(
            "padding character inside base64 payload".to_string(),
        ));
    }
    if out.is_empty() {
        return Err(MediaError::InvalidEncoding("base64 payload is empty".to_string()));
    }

    match out.len() % 4 {
        0 => {}
        2 => out.push_str("=="),
        3 => out.push('='),
        _ => return Err(MediaError::TruncatedPayload(body_len)),
    }

    if out.len() > max_encoded {
        return Err(MediaError::PayloadTooLarge {
            size: out.len() / 4 * 3,
            limit: max_bytes,
        });
    }
    Ok(out)
}

fn subtype_extension(subtype: &str) -> &str {
    match subtype {
        "jpeg" | "jpg" | "pjpeg" => "jpg",
        "svg+xml" => "svg",
        other => other,
    }
}
