//! The parsed form of one inbound request.

use std::collections::HashMap;
use std::net::SocketAddr;

use http_types::{Method, Version};

use crate::{Error, Result};

/// The decoded payload of a verified token.
pub type Claims = serde_json::Map<String, serde_json::Value>;

/// One parsed HTTP request.
///
/// Everything is fixed once decoded, except [`Request::identity`] which the
/// auth gate fills in after a successful token check.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    version: Version,
    headers: HashMap<String, String>,
    cookies: HashMap<String, String>,
    body: Vec<u8>,
    identity: Option<Claims>,
    peer_addr: Option<SocketAddr>,
}

impl Request {
    pub(crate) fn new(
        method: Method,
        path: String,
        version: Version,
        headers: HashMap<String, String>,
        cookies: HashMap<String, String>,
        body: Vec<u8>,
    ) -> Self {
        Self {
            method,
            path,
            version,
            headers,
            cookies,
            body,
            identity: None,
            peer_addr: None,
        }
    }

    /// The request method.
    pub fn method(&self) -> Method {
        self.method
    }

    /// The request path, without any query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The HTTP version from the request line.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Get a header by name. Names are matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// All headers, keyed by their lower-cased name.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Get a cookie sent by the client.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// All cookies sent by the client.
    pub fn cookies(&self) -> &HashMap<String, String> {
        &self.cookies
    }

    /// The raw request body. Empty when none was sent.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The request body as UTF-8 text.
    pub fn body_string(&self) -> Result<&str> {
        std::str::from_utf8(&self.body)
            .map_err(|e| Error::MalformedRequest(format!("body is not valid UTF-8: {}", e)))
    }

    /// The claims attached by the auth gate, if it ran and succeeded.
    pub fn identity(&self) -> Option<&Claims> {
        self.identity.as_ref()
    }

    /// The remote address of the connection, when known.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Attach verified claims. Only the first call has an effect.
    pub(crate) fn set_identity(&mut self, claims: Claims) -> bool {
        if self.identity.is_some() {
            return false;
        }
        self.identity = Some(claims);
        true
    }

    pub(crate) fn set_peer_addr(&mut self, addr: Option<SocketAddr>) {
        self.peer_addr = addr;
    }
}
