//! Remote image fetching.
//!
//! One GET per call, no retries. The response must be 2xx, declare an
//! `image/*` content type, and fit under the size ceiling; the ceiling is
//! enforced from `Content-Length` when present and again while streaming.
//! Unless private fetches are allowed, URLs pointing at loopback, private or
//! link-local addresses are refused, including on every redirect hop.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use url::{Host, Url};

use super::{essence, excerpt, DecodedMedia, MediaError, DEFAULT_MAX_BYTES, ERROR_EXCERPT_CHARS};

/// Default total timeout for one fetch.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 20;

/// Connect timeout shared by all outbound clients.
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Redirect hops followed before giving up.
pub const MAX_REDIRECTS: usize = 5;

/// Bytes of an error body read to build its excerpt. Enough for
/// `ERROR_EXCERPT_CHARS` characters of 4-byte UTF-8.
const ERROR_BODY_PREFIX_BYTES: usize = ERROR_EXCERPT_CHARS * 4;

/// Fetcher settings.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub max_bytes: usize,
    pub timeout: Duration,
    /// Permit loopback/private/link-local hosts (local development and tests).
    pub allow_private: bool,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            allow_private: false,
            user_agent: format!("retouch/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Downloads images from http(s) locators.
#[derive(Debug, Clone)]
pub struct RemoteFetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

impl RemoteFetcher {
    pub fn new(config: FetchConfig) -> Result<Self, MediaError> {
        let allow_private = config.allow_private;
        let redirects = reqwest::redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                return attempt.error("too many redirects");
            }
            match check_url(attempt.url(), allow_private) {
                Ok(()) => attempt.follow(),
                Err(e) => attempt.error(e),
            }
        });

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(config.timeout)
            .redirect(redirects)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| MediaError::RemoteFetchFailed {
                status: None,
                detail: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetch `locator` and return the validated image.
    pub async fn fetch(&self, locator: &str) -> Result<DecodedMedia, MediaError> {
        let url = Url::parse(locator.trim())
            .map_err(|e| MediaError::UnsupportedInput(format!("invalid URL: {e}")))?;
        check_url(&url, self.config.allow_private)?;

        let host = url.host_str().unwrap_or_default().to_string();
        tracing::info!(host = %host, "Fetching remote image");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| MediaError::RemoteFetchFailed {
                status: None,
                detail: describe_error(&e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let (prefix, _) = read_prefix(response, ERROR_BODY_PREFIX_BYTES)
                .await
                .unwrap_or_default();
            let body = String::from_utf8_lossy(&prefix);
            let detail = if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                excerpt(&body)
            };
            tracing::warn!(host = %host, status = status.as_u16(), "Remote fetch rejected");
            return Err(MediaError::RemoteFetchFailed {
                status: Some(status.as_u16()),
                detail,
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(essence)
            .unwrap_or_default();
        if !content_type.starts_with("image/") {
            let shown = if content_type.is_empty() {
                "<missing>".to_string()
            } else {
                content_type
            };
            return Err(MediaError::NotAnImage(shown));
        }

        let limit = self.config.max_bytes;
        let declared = response.content_length();
        if let Some(len) = declared {
            let len = usize::try_from(len).unwrap_or(usize::MAX);
            if len > limit {
                return Err(MediaError::PayloadTooLarge { size: len, limit });
            }
        }

        let capacity = declared
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(0)
            .min(limit);
        let mut buf = Vec::with_capacity(capacity);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| MediaError::RemoteFetchFailed {
                status: Some(status.as_u16()),
                detail: format!("body read failed: {}", describe_error(&e)),
            })?;
            let size = buf.len() + chunk.len();
            if size > limit {
                return Err(MediaError::PayloadTooLarge { size, limit });
            }
            buf.extend_from_slice(&chunk);
        }
        if buf.is_empty() {
            return Err(MediaError::RemoteFetchFailed {
                status: Some(status.as_u16()),
                detail: "response body is empty".to_string(),
            });
        }

        tracing::info!(
            host = %host,
            media_type = %content_type,
            bytes = buf.len(),
            "Fetched remote image"
        );

        Ok(DecodedMedia {
            media_type: content_type,
            bytes: Bytes::from(buf),
            name_hint: name_hint(&url),
        })
    }
}

/// Validate scheme and, unless `allow_private`, the host.
pub fn check_url(url: &Url, allow_private: bool) -> Result<(), MediaError> {
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(MediaError::UnsupportedInput(format!(
                "URL scheme '{other}' cannot be fetched"
            )))
        }
    }
    let host = url
        .host()
        .ok_or_else(|| MediaError::UnsupportedInput("URL has no host".to_string()))?;
    if allow_private {
        return Ok(());
    }
    let blocked = match &host {
        Host::Domain(domain) => is_local_domain(domain),
        Host::Ipv4(ip) => is_private_v4(ip),
        Host::Ipv6(ip) => is_private_v6(ip),
    };
    if blocked {
        return Err(MediaError::BlockedHost(host.to_string()));
    }
    Ok(())
}

/// Whether a literal IP address is loopback, private, link-local or otherwise
/// not publicly routable.
pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => is_private_v6(v6),
    }
}

fn is_local_domain(domain: &str) -> bool {
    let d = domain.trim_end_matches('.').to_ascii_lowercase();
    d == "localhost"
        || d.ends_with(".localhost")
        || d.ends_with(".internal")
        || d.ends_with(".local")
}

fn is_private_v4(ip: &Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        // 100.64.0.0/10 carrier-grade NAT
        || (a == 100 && (64..128).contains(&b))
}

fn is_private_v6(ip: &Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_private_v4(&v4);
    }
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || (first & 0xfe00) == 0xfc00
        || (first & 0xffc0) == 0xfe80
}

fn name_hint(url: &Url) -> Option<String> {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Read at most `cap` bytes of a response body, dropping the connection once
/// the cap is hit. The flag reports whether more data was pending.
pub(crate) async fn read_prefix(
    response: reqwest::Response,
    cap: usize,
) -> Result<(Vec<u8>, bool), reqwest::Error> {
    let mut buf = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let room = cap - buf.len();
        if chunk.len() > room {
            buf.extend_from_slice(&chunk[..room]);
            return Ok((buf, true));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok((buf, false))
}

/// Flatten an error and its sources into one line.
fn describe_error(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        let text = inner.to_string();
        if !out.contains(&text) {
            out.push_str(": ");
            out.push_str(&text);
        }
        source = inner.source();
    }
    out
}
