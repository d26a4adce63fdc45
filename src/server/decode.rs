//! Decode a buffered HTTP request.

use std::collections::HashMap;

use http_types::{Method, Version};

use crate::cookie;
use crate::{Error, Request, Result};

const CRLF: &[u8] = b"\r\n";
const HEAD_END: &[u8] = b"\r\n\r\n";

/// The number returned from httparse when the request is HTTP 1.1
const HTTP_1_1_VERSION: u8 = 1;

/// Decode one complete HTTP request.
///
/// `buf` must hold the full head. Without a `Content-Length` header every byte
/// after the head is the body; with one, the body is cut to that length.
pub fn decode(buf: &[u8]) -> Result<Request> {
    let head_len = find_head_end(buf, 0)
        .ok_or_else(|| malformed("request head is not terminated by a blank line"))?;
    let head = &buf[..head_len - HEAD_END.len()];
    let rest = &buf[head_len..];

    let head = std::str::from_utf8(head).map_err(|_| malformed("request head is not valid UTF-8"))?;
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let (method, path, version) = parse_request_line(request_line)?;

    let mut headers = HashMap::new();
    for line in lines {
        // Obsolete line folding, see RFC 7230 section 3.2.4.
        if line.starts_with(' ') || line.starts_with('\t') {
            return Err(malformed("folded header lines are not supported"));
        }
        let (name, value) = match line.split_once(':') {
            Some(pair) => pair,
            None => continue,
        };
        headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_owned());
    }

    let body = match body_length(head.as_bytes())? {
        Some(len) if rest.len() < len => {
            return Err(malformed(format!(
                "body is {} bytes, content-length is {}",
                rest.len(),
                len
            )))
        }
        Some(len) => rest[..len].to_vec(),
        None => rest.to_vec(),
    };

    let cookies = headers
        .get("cookie")
        .map(|h| cookie::parse(h))
        .unwrap_or_default();

    log::trace!("decoded {} {} ({} body bytes)", method, path, body.len());
    Ok(Request::new(method, path, version, headers, cookies, body))
}

/// Find the end of the request head, searching from `from`.
///
/// Returns the length of the head including the terminating blank line.
pub(crate) fn find_head_end(buf: &[u8], from: usize) -> Option<usize> {
    let start = from.saturating_sub(HEAD_END.len() - 1);
    buf.get(start..)?
        .windows(HEAD_END.len())
        .position(|w| w == HEAD_END)
        .map(|pos| start + pos + HEAD_END.len())
}

/// Read the declared body length from a request head.
///
/// Chunked bodies and conflicting lengths are rejected rather than guessed at.
pub(crate) fn body_length(head: &[u8]) -> Result<Option<usize>> {
    let mut length = None;
    for line in head.split(|b| *b == b'\n').skip(1) {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let colon = match line.iter().position(|b| *b == b':') {
            Some(colon) => colon,
            None => continue,
        };
        let name = line[..colon].trim_ascii();
        let value = line[colon + 1..].trim_ascii();

        if name.eq_ignore_ascii_case(b"transfer-encoding") {
            return Err(malformed("transfer-encoding is not supported"));
        }
        if !name.eq_ignore_ascii_case(b"content-length") {
            continue;
        }

        let parsed = std::str::from_utf8(value)
            .ok()
            .filter(|v| !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|v| v.parse::<usize>().ok())
            .ok_or_else(|| malformed("invalid content-length"))?;
        match length {
            Some(previous) if previous != parsed => {
                return Err(malformed("conflicting content-length headers"))
            }
            _ => length = Some(parsed),
        }
    }
    Ok(length)
}

fn parse_request_line(line: &str) -> Result<(Method, String, Version)> {
    let buf = [line.as_bytes(), CRLF, CRLF].concat();
    let mut headers = [httparse::EMPTY_HEADER; 0];
    let mut httparse_req = httparse::Request::new(&mut headers);

    let status = httparse_req
        .parse(&buf)
        .map_err(|e| malformed(format!("invalid request line: {}", e)))?;
    if status.is_partial() {
        return Err(malformed("incomplete request line"));
    }

    let method = match httparse_req.method {
        Some("GET") => Method::Get,
        Some("POST") => Method::Post,
        Some("PUT") => Method::Put,
        Some(other) => return Err(malformed(format!("unsupported method {}", other))),
        None => return Err(malformed("no method found")),
    };

    let target = httparse_req.path.ok_or_else(|| malformed("no path found"))?;
    let path = path_from_target(target)?;

    let version = match httparse_req.version {
        Some(HTTP_1_1_VERSION) => Version::Http1_1,
        Some(_) => Version::Http1_0,
        None => return Err(malformed("no version found")),
    };

    Ok((method, path, version))
}

/// The path is the leading run of path-safe characters in the target.
fn path_from_target(target: &str) -> Result<String> {
    if !target.starts_with('/') {
        return Err(malformed(format!("unexpected request target {}", target)));
    }
    let end = target
        .bytes()
        .position(|b| !is_path_char(b))
        .unwrap_or(target.len());
    Ok(target[..end].to_owned())
}

fn is_path_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'~' | b'-' | b'/')
}

fn malformed(msg: impl Into<String>) -> Error {
    Error::MalformedRequest(msg.into())
}
