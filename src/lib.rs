//! Minimal HTTP/1.x request/response engine.
//!
//! Bytes arrive from a transport, get buffered until one full request is
//! available, are decoded into a [`Request`], run through an ordered
//! middleware pipeline and a per-path handler chain, and the finalized
//! [`Response`] is written back as wire bytes.
//!
//! ```txt
//!   transport bytes
//!        |
//!   accumulate -> decode -> Request
//!                              |
//!        global middleware -> route handlers (auth gate, terminal)
//!                              |
//!   transport bytes <- encode <- Response
//! ```
//!
//! # Example
//!
//! ```no_run
//! use snail_api::{App, Handler, ServerOptions};
//!
//! let mut app = App::new();
//! app.route(
//!     "/about",
//!     [Handler::terminal(|_req, res| {
//!         Box::pin(async move { res.send("Hello from SnailAPI!") })
//!     })],
//! );
//!
//! async_global_executor::block_on(app.listen(([127, 0, 0, 1], 4221), ServerOptions::default()))
//!     .unwrap();
//! ```

#![forbid(unsafe_code, rust_2018_idioms)]
#![deny(missing_debug_implementations, nonstandard_style)]
#![warn(missing_docs, unreachable_pub)]

/// The maximum length of a request head (request line plus headers).
const MAX_HEAD_LENGTH: usize = 8 * 1024;

/// The default cap on the bytes buffered for one request, head and body.
const MAX_REQUEST_LENGTH: usize = 1024 * 1024;

pub mod auth;
pub mod cookie;
pub mod error;
pub mod request;
pub mod response;
pub mod router;
pub mod server;
pub mod store;
pub mod token;

mod future;

pub use auth::{Auth, AuthConfig};
pub use cookie::{Cookie, SameSite};
pub use error::{Error, Result};
pub use request::{Claims, Request};
pub use response::Response;
pub use router::{App, BoxFuture, Flow, Handler, Router};
pub use server::{ConnectionStatus, ServerOptions};
pub use store::Store;
