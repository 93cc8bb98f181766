//! Single-field `multipart/form-data` extraction.
//!
//! A small state machine over a byte cursor:
//! `SeekingBoundary -> ReadingHeaders -> ReadingBody -> SeekingBoundary ...`.
//! Only the first part whose `name` is exactly the requested field is
//! returned; streaming, nested multiparts and multi-file uploads are not
//! supported.

use bytes::Bytes;

use super::{essence, MediaError};

/// Field name the upload endpoint reads.
pub const FILE_FIELD: &str = "file";

/// Media type assumed when a part carries no `Content-Type` header.
pub const DEFAULT_PART_TYPE: &str = "application/octet-stream";

/// RFC 2046 caps boundaries at 70 characters.
const MAX_BOUNDARY_LEN: usize = 70;

/// A file part pulled out of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartFile {
    pub filename: Option<String>,
    pub media_type: String,
    pub content: Bytes,
}

/// Read the `boundary` parameter from a `multipart/form-data` content type.
pub fn boundary_from_content_type(content_type: &str) -> Result<String, MediaError> {
    if essence(content_type) != "multipart/form-data" {
        return Err(MediaError::InvalidMultipart(format!(
            "expected multipart/form-data, got '{}'",
            content_type.trim()
        )));
    }
    let boundary = parse_params(content_type)
        .into_iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value)
        .ok_or_else(|| MediaError::InvalidMultipart("missing boundary parameter".to_string()))?;

    if boundary.is_empty() || boundary.len() > MAX_BOUNDARY_LEN {
        return Err(MediaError::InvalidMultipart(format!(
            "boundary must be 1-{MAX_BOUNDARY_LEN} characters"
        )));
    }
    Ok(boundary)
}

/// Extract the part named `file`.
pub fn extract_file_field(body: &[u8], boundary: &str) -> Result<MultipartFile, MediaError> {
    extract_field(body, boundary, FILE_FIELD)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    SeekingBoundary,
    ReadingHeaders,
    ReadingBody { headers_end: usize, body_start: usize },
}

/// Extract the first part whose form field name equals `field`.
pub fn extract_field(body: &[u8], boundary: &str, field: &str) -> Result<MultipartFile, MediaError> {
    if boundary.is_empty() {
        return Err(MediaError::InvalidMultipart("empty boundary".to_string()));
    }
    let delimiter = [b"--", boundary.as_bytes()].concat();
    let body_terminator = [b"\r\n--", boundary.as_bytes()].concat();

    let mut pos = 0usize;
    let mut part_start = 0usize;
    let mut state = State::SeekingBoundary;
    let mut seen_boundary = false;

    loop {
        match state {
            State::SeekingBoundary => {
                let Some(at) = find_line_start(body, &delimiter, pos) else {
                    return Err(if seen_boundary {
                        MediaError::InvalidMultipart("missing closing boundary".to_string())
                    } else {
                        MediaError::InvalidMultipart("boundary not found in body".to_string())
                    });
                };
                seen_boundary = true;
                pos = at + delimiter.len();
                if body[pos..].starts_with(b"--") {
                    return Err(MediaError::NoFileField);
                }
                while pos < body.len() && (body[pos] == b' ' || body[pos] == b'\t') {
                    pos += 1;
                }
                pos = skip_line_break(body, pos).ok_or_else(|| {
                    MediaError::InvalidMultipart("boundary line not terminated".to_string())
                })?;
                part_start = pos;
                state = State::ReadingHeaders;
            }
            State::ReadingHeaders => {
                let part_end = find(body, &body_terminator, part_start);
                let limit = part_end.unwrap_or(body.len());
                let segment = &body[part_start..limit];

                let separator = if segment.starts_with(b"\r\n") {
                    Some((0, 2))
                } else {
                    find(segment, b"\r\n\r\n", 0).map(|i| (i, i + 4))
                };
                match (separator, part_end) {
                    (Some((headers_end, body_start)), Some(_)) => {
                        state = State::ReadingBody {
                            headers_end: part_start + headers_end,
                            body_start: part_start + body_start,
                        };
                    }
                    (_, None) => {
                        return Err(MediaError::InvalidMultipart(
                            "part is not terminated by a boundary".to_string(),
                        ))
                    }
                    // No blank line between headers and body: skip the part.
                    (None, Some(end)) => {
                        pos = end + 2;
                        state = State::SeekingBoundary;
                    }
                }
            }
            State::ReadingBody {
                headers_end,
                body_start,
            } => {
                // ReadingHeaders only transitions here when a terminator exists.
                let body_end = find(body, &body_terminator, body_start)
                    .ok_or_else(|| MediaError::InvalidMultipart("unterminated part".to_string()))?;
                let headers = PartHeaders::parse(&body[part_start..headers_end]);
                if headers.name.as_deref() == Some(field) {
                    return Ok(MultipartFile {
                        filename: headers.filename,
                        media_type: headers
                            .content_type
                            .unwrap_or_else(|| DEFAULT_PART_TYPE.to_string()),
                        content: Bytes::copy_from_slice(&body[body_start..body_end]),
                    });
                }
                pos = body_end + 2;
                state = State::SeekingBoundary;
            }
        }
    }
}

#[derive(Debug, Default)]
struct PartHeaders {
    name: Option<String>,
    filename: Option<String>,
    content_type: Option<String>,
}

impl PartHeaders {
    fn parse(raw: &[u8]) -> Self {
        let text = String::from_utf8_lossy(raw);
        let mut headers = PartHeaders::default();
        for line in text.split('\n') {
            let Some((key, value)) = line.trim_end_matches('\r').split_once(':') else {
                continue;
            };
            let key = key.trim();
            if key.eq_ignore_ascii_case("content-disposition") {
                for (param, val) in parse_params(value) {
                    if param.eq_ignore_ascii_case("name") {
                        headers.name = Some(val);
                    } else if param.eq_ignore_ascii_case("filename") {
                        headers.filename = Some(val).filter(|f| !f.is_empty());
                    }
                }
            } else if key.eq_ignore_ascii_case("content-type") {
                let ct = value.trim();
                if !ct.is_empty() {
                    headers.content_type = Some(essence(ct));
                }
            }
        }
        headers
    }
}

/// Parse `; key=value` / `; key="quoted value"` parameters after the first `;`.
fn parse_params(header_value: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let Some((_, rest)) = header_value.split_once(';') else {
        return params;
    };
    let mut chars = rest.chars().peekable();
    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace() || *c == ';') {
            chars.next();
        }
        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c == ';' {
                break;
            }
            key.push(c);
            chars.next();
        }
        if key.is_empty() && chars.peek().is_none() {
            break;
        }
        let mut value = String::new();
        if chars.peek() == Some(&'=') {
            chars.next();
            while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
                chars.next();
            }
            if chars.peek() == Some(&'"') {
                chars.next();
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                value.push(escaped);
                            }
                        }
                        '"' => break,
                        other => value.push(other),
                    }
                }
                // Anything between the closing quote and the next ';' is ignored.
                while matches!(chars.peek(), Some(c) if *c != ';') {
                    chars.next();
                }
            } else {
                while let Some(&c) = chars.peek() {
                    if c == ';' {
                        break;
                    }
                    value.push(c);
                    chars.next();
                }
                value = value.trim().to_string();
            }
        }
        let key = key.trim();
        if !key.is_empty() {
            params.push((key.to_string(), value));
        }
    }
    params
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}

/// Find `needle` at the start of a line (offset 0 or right after `\n`).
fn find_line_start(haystack: &[u8], needle: &[u8], mut from: usize) -> Option<usize> {
    while let Some(at) = find(haystack, needle, from) {
        if at == 0 || haystack[at - 1] == b'\n' {
            return Some(at);
        }
        from = at + 1;
    }
    None
}

fn skip_line_break(buf: &[u8], pos: usize) -> Option<usize> {
    if buf[pos..].starts_with(b"\r\n") {
        Some(pos + 2)
    } else if buf[pos..].starts_with(b"\n") {
        Some(pos + 1)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDARY: &str = "----retouchBoundary7MA4YWxk";

    fn part(headers: &str, content: &[u8]) -> Vec<u8> {
        let mut out = format!("--{BOUNDARY}\r\n{headers}\r\n\r\n").into_bytes();
        out.extend_from_slice(content);
        out.extend_from_slice(b"\r\n");
        out
    }

    fn close() -> Vec<u8> {
        format!("--{BOUNDARY}--\r\n").into_bytes()
    }

    #[test]
    fn test_boundary_from_content_type() {
        assert_eq!(
            boundary_from_content_type("multipart/form-data; boundary=abc123").unwrap(),
            "abc123"
        );
        assert_eq!(
            boundary_from_content_type("Multipart/Form-Data; charset=utf-8; BOUNDARY=\"a b;c\"")
                .unwrap(),
            "a b;c"
        );
    }

    #[test]
    fn test_boundary_rejects_wrong_types() {
        assert!(matches!(
            boundary_from_content_type("application/json"),
            Err(MediaError::InvalidMultipart(_))
        ));
        assert!(matches!(
            boundary_from_content_type("multipart/form-data"),
            Err(MediaError::InvalidMultipart(_))
        ));
        assert!(matches!(
            boundary_from_content_type("multipart/form-data; boundary="),
            Err(MediaError::InvalidMultipart(_))
        ));
        let long = format!("multipart/form-data; boundary={}", "x".repeat(71));
        assert!(boundary_from_content_type(&long).is_err());
    }

    #[test]
    fn test_extract_single_file() {
        let mut body = part(
            "Content-Disposition: form-data; name=\"file\"; filename=\"cat.png\"\r\nContent-Type: image/png",
            b"\x89PNG\r\n\x1a\nDATA",
        );
        body.extend(close());

        let file = extract_file_field(&body, BOUNDARY).unwrap();
        assert_eq!(file.filename.as_deref(), Some("cat.png"));
        assert_eq!(file.media_type, "image/png");
        assert_eq!(file.content.as_ref(), b"\x89PNG\r\n\x1a\nDATA");
    }

    #[test]
    fn test_extract_skips_other_fields_and_preamble() {
        let mut body = b"This is the preamble.\r\n".to_vec();
        body.extend(part("Content-Disposition: form-data; name=\"caption\"", b"hello"));
        body.extend(part(
            "Content-Disposition: form-data; name=\"files\"; filename=\"wrong.png\"",
            b"nope",
        ));
        body.extend(part(
            "Content-Disposition: form-data; filename=\"a.jpg\"; name=\"file\"\r\nContent-Type: image/jpeg; q=1",
            b"JPEGBYTES",
        ));
        body.extend(close());
        body.extend_from_slice(b"epilogue");

        let file = extract_file_field(&body, BOUNDARY).unwrap();
        assert_eq!(file.filename.as_deref(), Some("a.jpg"));
        assert_eq!(file.media_type, "image/jpeg");
        assert_eq!(file.content.as_ref(), b"JPEGBYTES");
    }

    #[test]
    fn test_extract_defaults_media_type() {
        let mut body = part("Content-Disposition: form-data; name=\"file\"", b"raw");
        body.extend(close());
        let file = extract_file_field(&body, BOUNDARY).unwrap();
        assert_eq!(file.media_type, DEFAULT_PART_TYPE);
        assert_eq!(file.filename, None);
    }

    #[test]
    fn test_extract_returns_first_match() {
        let mut body = part("Content-Disposition: form-data; name=\"file\"", b"first");
        body.extend(part("Content-Disposition: form-data; name=\"file\"", b"second"));
        body.extend(close());
        let file = extract_file_field(&body, BOUNDARY).unwrap();
        assert_eq!(file.content.as_ref(), b"first");
    }

    #[test]
    fn test_extract_no_file_field() {
        let mut body = part("Content-Disposition: form-data; name=\"other\"", b"x");
        body.extend(close());
        assert_eq!(extract_file_field(&body, BOUNDARY), Err(MediaError::NoFileField));
    }

    #[test]
    fn test_extract_skips_part_without_blank_line() {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"\r\n--{BOUNDARY}\r\n"
        )
        .into_bytes();
        body.extend_from_slice(
            b"Content-Disposition: form-data; name=\"file\"; filename=\"ok.gif\"\r\n\r\nGIF89a\r\n",
        );
        body.extend(close());
        let file = extract_file_field(&body, BOUNDARY).unwrap();
        assert_eq!(file.filename.as_deref(), Some("ok.gif"));
        assert_eq!(file.content.as_ref(), b"GIF89a");
    }

    #[test]
    fn test_extract_body_containing_boundary_lookalike() {
        let tricky = format!("abc--{BOUNDARY}def").into_bytes();
        let mut body = part("Content-Disposition: form-data; name=\"file\"", &tricky);
        body.extend(close());
        let file = extract_file_field(&body, BOUNDARY).unwrap();
        assert_eq!(file.content.as_ref(), tricky.as_slice());
    }

    #[test]
    fn test_extract_empty_content() {
        let mut body = part("Content-Disposition: form-data; name=\"file\"", b"");
        body.extend(close());
        let file = extract_file_field(&body, BOUNDARY).unwrap();
        assert!(file.content.is_empty());
    }

    #[test]
    fn test_extract_missing_boundary() {
        let err = extract_file_field(b"no multipart here", BOUNDARY).unwrap_err();
        assert!(matches!(err, MediaError::InvalidMultipart(_)));
    }

    #[test]
    fn test_extract_unterminated_part() {
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"\r\n\r\ntruncated"
        );
        let err = extract_file_field(body.as_bytes(), BOUNDARY).unwrap_err();
        assert!(matches!(err, MediaError::InvalidMultipart(_)));
    }

    #[test]
    fn test_parse_params_escapes_and_bare_values() {
        let params = parse_params(r#"form-data; name=file; filename="we\"ird;name.png""#);
        assert_eq!(
            params,
            vec![
                ("name".to_string(), "file".to_string()),
                ("filename".to_string(), "we\"ird;name.png".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_params_without_parameters() {
        assert!(parse_params("form-data").is_empty());
        assert!(parse_params("form-data;").is_empty());
    }
}
