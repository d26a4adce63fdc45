//! Compose and finalize responses.

use std::path::{Path, PathBuf};

use http_types::StatusCode;
use serde::Serialize;

use crate::server::encode::{encode_head, is_field_value, is_token};
use crate::{Cookie, Error, Result};

/// The wire bytes of a finalized response.
#[derive(Debug)]
pub(crate) enum Payload {
    /// Head and body, written in one go.
    Single(Vec<u8>),
    /// Head and body written separately, head first.
    Split { head: Vec<u8>, body: Vec<u8> },
}

#[derive(Debug)]
enum State {
    Pending,
    Sent(Option<Payload>),
}

/// An HTTP response under construction.
///
/// Status, headers and cookies can be changed until one of [`Response::send`],
/// [`Response::send_as`], [`Response::json`] or [`Response::send_file`]
/// succeeds. After that every mutation fails with [`Error::AlreadySent`].
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Vec<(String, String)>,
    cookies: Vec<Cookie>,
    state: State,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    /// Create a pending `200 OK` response.
    pub fn new() -> Self {
        Self {
            status: StatusCode::Ok,
            headers: Vec::new(),
            cookies: Vec::new(),
            state: State::Pending,
        }
    }

    /// The current status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Set the status code.
    pub fn set_status(&mut self, status: StatusCode) -> Result<&mut Self> {
        self.ensure_pending()?;
        self.status = status;
        Ok(self)
    }

    /// Get a custom header by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Set a custom header, replacing any header with the same name.
    ///
    /// Fails with [`Error::InvalidHeader`] if the name is not a token or the
    /// value holds control characters such as CR or LF.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<&mut Self> {
        self.ensure_pending()?;
        let name = name.into();
        let value = value.into();
        if !is_token(&name) {
            return Err(Error::InvalidHeader(format!("header name {:?}", name)));
        }
        if !is_field_value(&value) {
            return Err(Error::InvalidHeader(format!("value of header {}", name)));
        }
        match self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.headers.push((name, value)),
        }
        Ok(self)
    }

    /// Queue a `Set-Cookie` header. See [`Cookie::validate`].
    pub fn add_cookie(&mut self, cookie: Cookie) -> Result<&mut Self> {
        self.ensure_pending()?;
        cookie.validate()?;
        self.cookies.push(cookie);
        Ok(self)
    }

    /// The cookies queued so far.
    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    /// Finalize with a `text/plain` body.
    pub fn send(&mut self, text: impl Into<String>) -> Result<()> {
        self.send_as(text.into(), "text/plain")
    }

    /// Finalize with a body of the given content type.
    pub fn send_as(&mut self, body: impl Into<Vec<u8>>, content_type: &str) -> Result<()> {
        self.ensure_pending()?;
        check_content_type(content_type)?;
        self.finish(body.into(), content_type, false);
        Ok(())
    }

    /// Finalize with a JSON body.
    pub fn json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.ensure_pending()?;
        let body = serde_json::to_vec(value)?;
        self.finish(body, "application/json", false);
        Ok(())
    }

    /// Finalize with the contents of a file.
    ///
    /// The head and the file are written separately. If the file cannot be
    /// read the response stays pending and [`Error::FileUnavailable`] is
    /// returned.
    pub async fn send_file(&mut self, path: impl AsRef<Path>, content_type: &str) -> Result<()> {
        self.ensure_pending()?;
        check_content_type(content_type)?;
        let (body, len) = read_binary(path).await?;
        log::trace!("sending {} byte file", len);
        self.finish(body, content_type, true);
        Ok(())
    }

    /// Whether the response has been finalized.
    pub fn is_sent(&self) -> bool {
        matches!(self.state, State::Sent(_))
    }

    /// Take the wire bytes of a finalized response.
    ///
    /// Returns `None` while pending, and after the first call.
    pub(crate) fn take_payload(&mut self) -> Option<Payload> {
        match &mut self.state {
            State::Sent(payload) => payload.take(),
            State::Pending => None,
        }
    }

    /// Render an error into a fresh, finalized response.
    pub(crate) fn from_error(err: &Error) -> Self {
        let mut res = Response::new();
        res.status = err.status();
        match err.body().map(|body| serde_json::to_vec(&body)) {
            Some(Ok(body)) => res.finish(body, "application/json", false),
            Some(Err(e)) => {
                log::error!("could not serialize error body: {}", e);
                res.finish(Vec::new(), "text/plain", false)
            }
            None => res.finish(Vec::new(), "text/plain", false),
        }
        res
    }

    fn ensure_pending(&self) -> Result<()> {
        match self.state {
            State::Pending => Ok(()),
            State::Sent(_) => Err(Error::AlreadySent),
        }
    }

    fn finish(&mut self, body: Vec<u8>, content_type: &str, split: bool) {
        let mut head = encode_head(
            self.status,
            content_type,
            body.len(),
            &self.headers,
            &self.cookies,
        );
        let payload = if split {
            Payload::Split { head, body }
        } else {
            head.extend_from_slice(&body);
            Payload::Single(head)
        };
        self.state = State::Sent(Some(payload));
    }
}

fn check_content_type(content_type: &str) -> Result<()> {
    if is_field_value(content_type) {
        Ok(())
    } else {
        Err(Error::InvalidHeader("content type".to_owned()))
    }
}

/// Read a file as UTF-8 text, returning the text and its byte length.
pub async fn read_text(path: impl AsRef<Path>) -> Result<(String, usize)> {
    let path = path.as_ref().to_owned();
    let (bytes, len) = read_binary(&path).await?;
    let text = String::from_utf8(bytes).map_err(|e| Error::FileUnavailable {
        path,
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
    })?;
    Ok((text, len))
}

/// Read a file as raw bytes, returning the bytes and their length.
pub async fn read_binary(path: impl AsRef<Path>) -> Result<(Vec<u8>, usize)> {
    let path: PathBuf = path.as_ref().to_owned();
    let read_path = path.clone();
    match async_global_executor::spawn_blocking(move || std::fs::read(read_path)).await {
        Ok(bytes) => {
            let len = bytes.len();
            Ok((bytes, len))
        }
        Err(source) => Err(Error::FileUnavailable { path, source }),
    }
}
