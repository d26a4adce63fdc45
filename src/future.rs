//! Future combinators used by the server.

mod timeout;

pub(crate) use timeout::timeout;
