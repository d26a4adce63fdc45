//! Render response heads.

use http_types::StatusCode;

use crate::Cookie;

/// Render the status line, computed and custom headers, and cookies.
///
/// Custom `Content-Type` replaces `content_type`; custom `Content-Length` is
/// dropped since the length is always computed from the body.
pub(crate) fn encode_head(
    status: StatusCode,
    content_type: &str,
    body_len: usize,
    headers: &[(String, String)],
    cookies: &[Cookie],
) -> Vec<u8> {
    let content_type = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
        .map_or(content_type, |(_, value)| value.as_str());

    let mut head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\n",
        status,
        status.canonical_reason(),
        content_type,
        body_len
    );
    for (name, value) in headers {
        if name.eq_ignore_ascii_case("content-type") || name.eq_ignore_ascii_case("content-length")
        {
            continue;
        }
        head.push_str(&format!("{}: {}\r\n", name, value));
    }
    for cookie in cookies {
        head.push_str(&format!("Set-Cookie: {}\r\n", cookie));
    }
    head.push_str("\r\n");
    head.into_bytes()
}

/// Whether `name` is a valid header field name.
pub(crate) fn is_token(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}

/// Whether `value` fits on a single header line.
///
/// Control characters other than horizontal tab are rejected, CR and LF
/// among them.
pub(crate) fn is_field_value(value: &str) -> bool {
    value
        .bytes()
        .all(|b| b == b'\t' || (b >= b' ' && b != 0x7f))
}
