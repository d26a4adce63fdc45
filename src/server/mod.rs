//! Process HTTP connections on the server.

use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;

use async_io::{Async, Timer};
use futures_lite::io::{self, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use http_types::StatusCode;
use log::{debug, error, info, trace};

use crate::future::timeout;
use crate::response::Payload;
use crate::{Error, Response, Result, Router, MAX_HEAD_LENGTH, MAX_REQUEST_LENGTH};

pub mod accumulator;
mod decode;
pub(crate) mod encode;

pub use accumulator::Accumulator;
pub use decode::decode;

/// Bytes requested from the transport per read.
const READ_CHUNK: usize = 8 * 1024;

/// Longest pause between retries after consecutive accept failures.
const MAX_ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// Configure the server.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Timeout to receive a full request. Defaults to 60s.
    read_timeout: Option<Duration>,
    /// Cap on the request head. Defaults to 8 KiB.
    max_head_length: usize,
    /// Cap on head plus body. Defaults to 1 MiB.
    max_request_length: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            read_timeout: Some(Duration::from_secs(60)),
            max_head_length: MAX_HEAD_LENGTH,
            max_request_length: MAX_REQUEST_LENGTH,
        }
    }
}

impl ServerOptions {
    /// Set the time allowed to receive a full request. `None` waits forever.
    pub fn with_read_timeout(mut self, read_timeout: Option<Duration>) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Set the cap on the request head.
    pub fn with_max_head_length(mut self, max_head_length: usize) -> Self {
        self.max_head_length = max_head_length;
        self
    }

    /// Set the cap on the whole buffered request.
    pub fn with_max_request_length(mut self, max_request_length: usize) -> Self {
        self.max_request_length = max_request_length;
        self
    }

    /// The time allowed to receive a full request.
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    /// The cap on the request head.
    pub fn max_head_length(&self) -> usize {
        self.max_head_length
    }

    /// The cap on the whole buffered request.
    pub fn max_request_length(&self) -> usize {
        self.max_request_length
    }
}

/// The outcome of serving one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// A response with this status was written.
    Responded(StatusCode),
    /// The peer closed the connection before sending anything.
    Closed,
}

/// Serve one request from a connection, then close it.
pub async fn accept<RW>(io: RW, router: &Router) -> Result<ConnectionStatus>
where
    RW: AsyncRead + AsyncWrite + Unpin,
{
    accept_with_opts(io, router, &ServerOptions::default()).await
}

/// Serve one request from a connection, with custom options.
///
/// Malformed requests are answered with `400`. Oversized or slow requests
/// and transport failures return an error without writing anything.
pub async fn accept_with_opts<RW>(
    io: RW,
    router: &Router,
    opts: &ServerOptions,
) -> Result<ConnectionStatus>
where
    RW: AsyncRead + AsyncWrite + Unpin,
{
    serve(io, None, router, opts).await
}

/// Bind `addr` and serve connections. Only returns if binding fails.
pub async fn listen(addr: SocketAddr, router: Arc<Router>, opts: ServerOptions) -> Result<()> {
    let listener = Async::<TcpListener>::bind(addr)?;
    info!("listening on {}", listener.get_ref().local_addr()?);
    serve_listener(listener, router, opts).await
}

/// Serve connections from an already bound listener, one task each.
pub async fn serve_listener(
    listener: Async<TcpListener>,
    router: Arc<Router>,
    opts: ServerOptions,
) -> Result<()> {
    let opts = Arc::new(opts);
    let mut failures: u32 = 0;
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(conn) => {
                failures = 0;
                conn
            }
            Err(e) => {
                let pause = accept_backoff(failures);
                failures = failures.saturating_add(1);
                error!("failed to accept connection, retrying in {:?}: {}", pause, e);
                Timer::after(pause).await;
                continue;
            }
        };
        trace!("accepted connection from {}", peer_addr);

        let router = router.clone();
        let opts = opts.clone();
        async_global_executor::spawn(async move {
            match serve(stream, Some(peer_addr), &router, &opts).await {
                Ok(status) => trace!("connection from {} done: {:?}", peer_addr, status),
                Err(err) => debug!("connection from {} aborted: {}", peer_addr, err),
            }
        })
        .detach();
    }
}

async fn serve<RW>(
    mut io: RW,
    peer_addr: Option<SocketAddr>,
    router: &Router,
    opts: &ServerOptions,
) -> Result<ConnectionStatus>
where
    RW: AsyncRead + AsyncWrite + Unpin,
{
    let read = read_request(&mut io, opts);
    let read = match opts.read_timeout {
        Some(dur) => timeout(dur, read).await,
        None => read.await,
    };

    let mut res = match read {
        Ok(None) => {
            trace!("connection closed before a request arrived");
            return Ok(ConnectionStatus::Closed);
        }
        Ok(Some(buf)) => match decode(&buf) {
            Ok(mut req) => {
                req.set_peer_addr(peer_addr);
                let res = router.dispatch(&mut req).await;
                info!("{} {} {}", req.method(), req.path(), res.status());
                res
            }
            Err(err) => malformed(err),
        },
        Err(err) if err.is_transport() => return Err(err),
        Err(err) => malformed(err),
    };

    let status = res.status();
    let payload = res.take_payload().or_else(|| {
        error!("response was never finalized");
        Response::from_error(&Error::middleware("response was never finalized")).take_payload()
    });
    match payload {
        Some(Payload::Single(bytes)) => io.write_all(&bytes).await?,
        Some(Payload::Split { head, body }) => {
            io.write_all(&head).await?;
            io.write_all(&body).await?;
        }
        None => {}
    }
    io.flush().await?;
    io.close().await?;

    Ok(ConnectionStatus::Responded(status))
}

/// Read until one full request is buffered. `None` if the peer closed first.
async fn read_request<R>(reader: &mut R, opts: &ServerOptions) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut acc = Accumulator::new(opts.max_head_length, opts.max_request_length);
    let mut chunk = vec![0; READ_CHUNK];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            if acc.is_empty() {
                return Ok(None);
            }
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed mid-request",
            )));
        }
        if acc.feed(&chunk[..n])? == accumulator::State::Complete {
            return Ok(Some(acc.into_inner()));
        }
    }
}

/// The pause after `failures` earlier consecutive accept errors: 5ms,
/// doubling up to [`MAX_ACCEPT_BACKOFF`].
fn accept_backoff(failures: u32) -> Duration {
    let millis = 5u64 << failures.min(10);
    Duration::from_millis(millis).min(MAX_ACCEPT_BACKOFF)
}

fn malformed(err: Error) -> Response {
    debug!("rejecting request: {}", err);
    Response::from_error(&err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn accept_backoff_doubles_up_to_a_cap() {
        assert_eq!(accept_backoff(0), Duration::from_millis(5));
        assert_eq!(accept_backoff(1), Duration::from_millis(10));
        assert_eq!(accept_backoff(4), Duration::from_millis(80));
        assert_eq!(accept_backoff(8), MAX_ACCEPT_BACKOFF);
        assert_eq!(accept_backoff(u32::MAX), MAX_ACCEPT_BACKOFF);
    }
}
