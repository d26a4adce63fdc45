//! Parse `Cookie` headers and serialize `Set-Cookie` values.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::server::encode::is_token;
use crate::{Error, Result};

/// The `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSite {
    /// `SameSite=Strict`.
    #[default]
    Strict,
    /// `SameSite=Lax`.
    Lax,
    /// `SameSite=None`.
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SameSite::Strict => f.write_str("Strict"),
            SameSite::Lax => f.write_str("Lax"),
            SameSite::None => f.write_str("None"),
        }
    }
}

/// An outgoing cookie and its attributes.
///
/// `path` defaults to `/` and `same_site` to `Strict`; both are rendered
/// unless cleared with [`Cookie::without_path`] or
/// [`Cookie::without_same_site`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    name: String,
    value: String,
    http_only: bool,
    path: Option<String>,
    max_age: Option<Duration>,
    secure: bool,
    same_site: Option<SameSite>,
}

impl Cookie {
    /// Create a new cookie with default attributes.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            http_only: false,
            path: Some("/".to_owned()),
            max_age: None,
            secure: false,
            same_site: Some(SameSite::default()),
        }
    }

    /// The cookie name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The cookie value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Set the `HttpOnly` flag.
    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    /// Set the `Path` attribute.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Omit the `Path` attribute.
    pub fn without_path(mut self) -> Self {
        self.path = None;
        self
    }

    /// Set the `Max-Age` attribute. Sub-second precision is dropped.
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Set the `Secure` flag.
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Set the `SameSite` attribute.
    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }

    /// Omit the `SameSite` attribute.
    pub fn without_same_site(mut self) -> Self {
        self.same_site = None;
        self
    }

    /// Check that the cookie renders as a single well-formed `Set-Cookie`
    /// value.
    ///
    /// The name must be a token, the value may only hold cookie octets and
    /// the path may not contain control characters or `;`.
    pub fn validate(&self) -> Result<()> {
        if !is_token(&self.name) {
            return Err(Error::InvalidHeader(format!("cookie name {:?}", self.name)));
        }
        if !self.value.bytes().all(is_cookie_octet) {
            return Err(Error::InvalidHeader(format!("value of cookie {}", self.name)));
        }
        if let Some(path) = &self.path {
            if !path.bytes().all(|b| (b' '..0x7f).contains(&b) && b != b';') {
                return Err(Error::InvalidHeader(format!("path of cookie {}", self.name)));
            }
        }
        Ok(())
    }
}

fn is_cookie_octet(b: u8) -> bool {
    matches!(b, 0x21 | 0x23..=0x2b | 0x2d..=0x3a | 0x3c..=0x5b | 0x5d..=0x7e)
}

/// Renders the `Set-Cookie` header value.
impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)?;
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        if let Some(path) = &self.path {
            write!(f, "; Path={}", path)?;
        }
        if let Some(max_age) = self.max_age {
            write!(f, "; Max-Age={}", max_age.as_secs())?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        if let Some(same_site) = self.same_site {
            write!(f, "; SameSite={}", same_site)?;
        }
        Ok(())
    }
}

/// Serialize a cookie into a `Set-Cookie` header value.
pub fn serialize(cookie: &Cookie) -> String {
    cookie.to_string()
}

/// Parse a `Cookie` header value into name/value pairs.
///
/// Segments without `=` are skipped and later duplicates win. Values keep any
/// `=` after the first one.
pub fn parse(header: &str) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for segment in header.split(';') {
        let segment = segment.trim();
        let (name, value) = match segment.split_once('=') {
            Some(pair) => pair,
            None => continue,
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        cookies.insert(name.to_owned(), value.trim().to_owned());
    }
    cookies
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_pairs() {
        let cookies = parse("token=abc; theme=dark");
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies["token"], "abc");
        assert_eq!(cookies["theme"], "dark");
    }

    #[test]
    fn parse_keeps_equals_in_values() {
        let cookies = parse("token=a.b.c==; x=1=2");
        assert_eq!(cookies["token"], "a.b.c==");
        assert_eq!(cookies["x"], "1=2");
    }

    #[test]
    fn parse_skips_segments_without_equals() {
        let cookies = parse("flag; a=1;;  ; =orphan");
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies["a"], "1");
    }

    #[test]
    fn parse_last_duplicate_wins() {
        let cookies = parse("a=1; a=2");
        assert_eq!(cookies["a"], "2");
    }

    #[test]
    fn parse_empty_header() {
        assert!(parse("").is_empty());
    }

    #[test]
    fn serialize_defaults() {
        let cookie = Cookie::new("token", "abc");
        assert_eq!(serialize(&cookie), "token=abc; Path=/; SameSite=Strict");
    }

    #[test]
    fn serialize_all_attributes_in_order() {
        let cookie = Cookie::new("token", "abc")
            .http_only(true)
            .path("/app")
            .max_age(Duration::from_secs(3600))
            .secure(true)
            .same_site(SameSite::Lax);
        assert_eq!(
            serialize(&cookie),
            "token=abc; HttpOnly; Path=/app; Max-Age=3600; Secure; SameSite=Lax"
        );
    }

    #[test]
    fn serialize_without_optional_defaults() {
        let cookie = Cookie::new("a", "1").without_path().without_same_site();
        assert_eq!(serialize(&cookie), "a=1");
    }

    #[test]
    fn validate_accepts_tokens() {
        let cookie = Cookie::new("token", "eyJhbGciOiJIUzI1NiJ9.e30.c2ln").path("/app");
        assert!(cookie.validate().is_ok());
        assert!(Cookie::new("session", "x=y.z").validate().is_ok());
    }

    #[test]
    fn validate_rejects_line_breaks() {
        let bad = [
            Cookie::new("t", "v\r\nX-Injected: yes"),
            Cookie::new("t\r\nX-Injected", "v"),
            Cookie::new("t", "v").path("/\r\nX-Injected: yes"),
            Cookie::new("t", "a; Secure"),
            Cookie::new("", "v"),
        ];
        for cookie in bad {
            assert!(
                matches!(cookie.validate(), Err(Error::InvalidHeader(_))),
                "{:?}",
                cookie
            );
        }
    }

    #[test]
    fn serialized_cookie_parses_back() {
        let cookie = Cookie::new("session", "x=y.z")
            .http_only(true)
            .max_age(Duration::from_secs(60));
        let parsed = parse(&serialize(&cookie));
        assert_eq!(parsed["session"], "x=y.z");
    }
}
