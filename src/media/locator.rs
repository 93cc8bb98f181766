//! Locator classification.
//!
//! Every input string maps to exactly one [`LocatorKind`]; the first matching
//! rule wins, in this order: https URL, http URL, inline `data:image/` payload,
//! caller-side staged path, unsupported.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// Prefix some sandboxed callers put in front of their local file references.
pub const SANDBOX_PREFIX: &str = "sandbox:";

static INLINE_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^data:image/[a-z0-9.+-]+;base64,").expect("valid inline image regex")
});

static STAGED_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:file://|/mnt/(?:data|user-data)/|/tmp/|/home/|/Users/|~/|[A-Za-z]:\\)")
        .expect("valid staged path regex")
});

/// What kind of locator a string is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LocatorKind {
    HttpsUrl,
    HttpUrl,
    InlineEncoded,
    LocalStagedPath,
    Unsupported,
}

impl LocatorKind {
    /// Whether the locator can be downloaded by this service.
    pub fn is_remote(self) -> bool {
        matches!(self, LocatorKind::HttpsUrl | LocatorKind::HttpUrl)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LocatorKind::HttpsUrl => "https-url",
            LocatorKind::HttpUrl => "http-url",
            LocatorKind::InlineEncoded => "inline-encoded",
            LocatorKind::LocalStagedPath => "local-staged-path",
            LocatorKind::Unsupported => "unsupported",
        }
    }
}

impl std::fmt::Display for LocatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a locator. Total: unknown shapes, including the empty string,
/// are [`LocatorKind::Unsupported`].
pub fn classify(input: &str) -> LocatorKind {
    let s = input.trim();
    if s.is_empty() {
        return LocatorKind::Unsupported;
    }
    if has_prefix_ignore_case(s, "https://") {
        return LocatorKind::HttpsUrl;
    }
    if has_prefix_ignore_case(s, "http://") {
        return LocatorKind::HttpUrl;
    }
    if INLINE_IMAGE.is_match(s) {
        return LocatorKind::InlineEncoded;
    }
    if has_prefix_ignore_case(s, SANDBOX_PREFIX) || STAGED_PATH.is_match(s) {
        return LocatorKind::LocalStagedPath;
    }
    LocatorKind::Unsupported
}

/// Remove a leading sandbox marker, if any.
pub fn strip_sandbox_prefix(input: &str) -> &str {
    let s = input.trim();
    if has_prefix_ignore_case(s, SANDBOX_PREFIX) {
        &s[SANDBOX_PREFIX.len()..]
    } else {
        s
    }
}

fn has_prefix_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len()
        && s.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}
