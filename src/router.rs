//! Route requests through global middleware and per-path handler chains.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use crate::server::{self, ServerOptions};
use crate::{Error, Request, Response, Result};

/// A boxed future returned by handlers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

type TerminalFn =
    dyn for<'a> Fn(&'a mut Request, &'a mut Response) -> BoxFuture<'a, Result<()>> + Send + Sync;
type PassThroughFn =
    dyn for<'a> Fn(&'a mut Request, &'a mut Response) -> BoxFuture<'a, Flow> + Send + Sync;

/// What a pass-through handler wants the pipeline to do next.
#[derive(Debug)]
pub enum Flow {
    /// Run the next handler.
    Continue,
    /// The handler finalized the response; stop here.
    Respond,
    /// The handler failed; stop with a `500` that carries the error message.
    Fail(Error),
}

/// One step in a handler chain.
///
/// Whether a handler ends the chain is fixed when it is created: a
/// `Terminal` handler must finalize the response, a `PassThrough` handler
/// decides through the [`Flow`] it returns.
#[derive(Clone)]
pub enum Handler {
    /// Ends the chain.
    Terminal(Arc<TerminalFn>),
    /// Runs and then lets the chain continue, respond or fail.
    PassThrough(Arc<PassThroughFn>),
}

impl Handler {
    /// Create a terminal handler.
    pub fn terminal<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Request, &'a mut Response) -> BoxFuture<'a, Result<()>>
            + Send
            + Sync
            + 'static,
    {
        Handler::Terminal(Arc::new(f))
    }

    /// Create a pass-through handler.
    pub fn pass_through<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Request, &'a mut Response) -> BoxFuture<'a, Flow>
            + Send
            + Sync
            + 'static,
    {
        Handler::PassThrough(Arc::new(f))
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Terminal(_) => f.write_str("Handler::Terminal"),
            Handler::PassThrough(_) => f.write_str("Handler::PassThrough"),
        }
    }
}

/// Registers middleware and routes, then freezes them into a [`Router`].
#[derive(Debug, Default)]
pub struct App {
    middleware: Vec<Handler>,
    routes: HashMap<String, Vec<Handler>>,
}

impl App {
    /// Create an empty app.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a global middleware, run for every request before route handlers.
    pub fn middleware(&mut self, handler: Handler) -> &mut Self {
        self.middleware.push(handler);
        self
    }

    /// Register the handler chain for `path`. A second registration for the
    /// same path replaces the first.
    pub fn route(
        &mut self,
        path: impl Into<String>,
        handlers: impl IntoIterator<Item = Handler>,
    ) -> &mut Self {
        let path = path.into();
        let handlers: Vec<Handler> = handlers.into_iter().collect();
        if handlers.is_empty() {
            log::warn!("route {} has no handlers", path);
        }
        if let Some(previous) = self.routes.insert(path.clone(), handlers) {
            log::warn!(
                "route {} registered twice; replacing {} handler(s)",
                path,
                previous.len()
            );
        }
        self
    }

    /// Freeze the registrations.
    pub fn into_router(self) -> Router {
        Router {
            middleware: self.middleware,
            routes: self.routes,
        }
    }

    /// Freeze the registrations and serve them on `addr`.
    pub async fn listen(self, addr: impl Into<SocketAddr>, opts: ServerOptions) -> Result<()> {
        server::listen(addr.into(), Arc::new(self.into_router()), opts).await
    }
}

/// The immutable routing table shared by every connection.
#[derive(Debug)]
pub struct Router {
    middleware: Vec<Handler>,
    routes: HashMap<String, Vec<Handler>>,
}

#[derive(Debug)]
enum Stage<'r> {
    Global(usize),
    Route(&'r [Handler], usize),
    Done,
}

enum Step {
    Next,
    Halt,
    Failed(Error),
}

impl Router {
    /// Whether a chain is registered for `path`.
    pub fn has_route(&self, path: &str) -> bool {
        self.routes.contains_key(path)
    }

    /// Run `req` through the pipeline and return the finalized response.
    ///
    /// The returned response is always finalized. Unknown paths yield `404`.
    /// Errors returned by terminal handlers are rendered by their status,
    /// while [`Flow::Fail`] and a chain that ends without sending anything
    /// yield `500`.
    pub async fn dispatch(&self, req: &mut Request) -> Response {
        let mut res = Response::new();
        let mut stage = Stage::Global(0);

        loop {
            stage = match stage {
                Stage::Global(i) => match self.middleware.get(i) {
                    Some(handler) => match run(handler, req, &mut res).await {
                        Step::Next => Stage::Global(i + 1),
                        Step::Halt => Stage::Done,
                        Step::Failed(err) => return fail(res, err),
                    },
                    None => match self.routes.get(req.path()) {
                        Some(chain) => Stage::Route(chain, 0),
                        None => {
                            log::debug!("no route for {} {}", req.method(), req.path());
                            return Response::from_error(&Error::RouteNotFound(
                                req.path().to_owned(),
                            ));
                        }
                    },
                },
                Stage::Route(chain, i) => match chain.get(i) {
                    Some(handler) => match run(handler, req, &mut res).await {
                        Step::Next => Stage::Route(chain, i + 1),
                        Step::Halt => Stage::Done,
                        Step::Failed(err) => return fail(res, err),
                    },
                    None => {
                        let err = Error::middleware(format!(
                            "handler chain for {} ended without a response",
                            req.path()
                        ));
                        return fail(res, err);
                    }
                },
                Stage::Done => break,
            };
        }

        res
    }
}

async fn run(handler: &Handler, req: &mut Request, res: &mut Response) -> Step {
    match handler {
        Handler::Terminal(f) => match f(req, res).await {
            Ok(()) if res.is_sent() => Step::Halt,
            Ok(()) => Step::Failed(Error::middleware(
                "terminal handler returned without sending a response",
            )),
            Err(err) => Step::Failed(err),
        },
        Handler::PassThrough(f) => match f(req, res).await {
            Flow::Continue if res.is_sent() => {
                log::warn!(
                    "handler for {} sent a response and asked to continue; stopping",
                    req.path()
                );
                Step::Halt
            }
            Flow::Continue => Step::Next,
            Flow::Respond if res.is_sent() => Step::Halt,
            Flow::Respond => Step::Failed(Error::middleware(
                "handler asked to respond without sending a response",
            )),
            Flow::Fail(err @ Error::MiddlewareFailure(_)) => Step::Failed(err),
            Flow::Fail(err) => Step::Failed(Error::MiddlewareFailure(err.to_string())),
        },
    }
}

fn fail(res: Response, err: Error) -> Response {
    if res.is_sent() {
        log::error!("handler failed after sending a response: {}", err);
        return res;
    }
    if err.status().is_server_error() {
        log::error!("{}", err);
    } else {
        log::debug!("{}", err);
    }
    Response::from_error(&err)
}
