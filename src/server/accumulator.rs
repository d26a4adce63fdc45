//! Buffer connection bytes until one full request has arrived.

use super::decode::{body_length, find_head_end};
use crate::{Error, Result};

/// Where the accumulator is in reading a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// The blank line ending the head has not been seen.
    AwaitingHeaders,
    /// The head is complete; `remaining` body bytes are still expected.
    AwaitingBody {
        /// Body bytes still missing.
        remaining: usize,
    },
    /// A full request is buffered.
    Complete,
}

/// An incremental per-connection request buffer.
///
/// Bytes are fed as they arrive. Once the head is complete the
/// `Content-Length` header decides how many more bytes belong to the request;
/// anything past that is discarded. Without the header the request completes
/// with the head, keeping whatever arrived alongside it as the body.
#[derive(Debug)]
pub struct Accumulator {
    buf: Vec<u8>,
    state: State,
    head_len: usize,
    body_len: Option<usize>,
    max_head_length: usize,
    max_request_length: usize,
}

impl Accumulator {
    /// Create an empty accumulator with the given limits.
    pub fn new(max_head_length: usize, max_request_length: usize) -> Self {
        Self {
            buf: Vec::new(),
            state: State::AwaitingHeaders,
            head_len: 0,
            body_len: None,
            max_head_length,
            max_request_length,
        }
    }

    /// The current state.
    pub fn state(&self) -> State {
        self.state
    }

    /// Whether no bytes have been fed yet.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The buffered request so far.
    pub fn buffer(&self) -> &[u8] {
        &self.buf
    }

    /// Take the buffered request.
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    /// Feed newly read bytes.
    ///
    /// Fails with [`Error::HeadTooLarge`] or [`Error::RequestTooLarge`] when a
    /// limit is exceeded. Malformed `Content-Length` or `Transfer-Encoding`
    /// headers fail with [`Error::MalformedRequest`].
    pub fn feed(&mut self, bytes: &[u8]) -> Result<State> {
        if self.state == State::Complete {
            return Ok(self.state);
        }

        let searched = self.buf.len();
        self.buf.extend_from_slice(bytes);

        if self.state == State::AwaitingHeaders {
            match find_head_end(&self.buf, searched) {
                Some(head_len) if head_len > self.max_head_length => {
                    return Err(Error::HeadTooLarge(self.max_head_length))
                }
                Some(head_len) => {
                    let body_len = body_length(&self.buf[..head_len])?;
                    if head_len.saturating_add(body_len.unwrap_or(0)) > self.max_request_length {
                        return Err(Error::RequestTooLarge(self.max_request_length));
                    }
                    log::trace!("head complete after {} bytes, body length {:?}", head_len, body_len);
                    self.head_len = head_len;
                    self.body_len = body_len;
                    self.state = State::AwaitingBody {
                        remaining: body_len.unwrap_or(0),
                    };
                }
                None if self.buf.len() > self.max_head_length => {
                    return Err(Error::HeadTooLarge(self.max_head_length))
                }
                None => return Ok(self.state),
            }
        }

        if let State::AwaitingBody { .. } = self.state {
            let received = self.buf.len() - self.head_len;
            self.state = match self.body_len {
                None => State::Complete,
                Some(len) if received >= len => {
                    self.buf.truncate(self.head_len + len);
                    State::Complete
                }
                Some(len) => State::AwaitingBody {
                    remaining: len - received,
                },
            };
        }

        Ok(self.state)
    }
}
