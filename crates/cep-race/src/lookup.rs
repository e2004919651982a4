use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::cancel::Signal;

/// Why a single lookup produced no record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The request could not be built, e.g. the key made the URL invalid.
    Request(String),
    /// Connection, DNS or TLS failure.
    Transport(String),
    /// The response body could not be read to the end.
    Body(String),
    /// The body was not the JSON shape the provider promises.
    Decode(String),
    /// The race was decided before this lookup finished.
    Cancelled,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request(msg) => write!(f, "request error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Body(msg) => write!(f, "body error: {msg}"),
            Self::Decode(msg) => write!(f, "decode error: {msg}"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

impl std::error::Error for Error {}

/// Boxed future returned by [`Lookup::fetch`].
pub type LookupFuture<'a, T> = Pin<Box<dyn Future<Output = exn::Result<T, Error>> + Send + 'a>>;

/// One provider able to resolve a key into a structured record.
pub trait Lookup: Send + Sync + 'static {
    /// Decoded record this provider returns.
    type Record: Send + 'static;

    /// Human-readable provider name, used in logs and failure reports.
    fn name(&self) -> &str;

    /// Fetch and decode the record for `key`.
    ///
    /// Implementations must stop their in-flight work and resolve to
    /// [`Error::Cancelled`] once `cancel` fires.
    fn fetch(&self, key: String, cancel: Signal) -> LookupFuture<'_, Self::Record>;
}

/// Resolve to [`Error::Cancelled`] once `cancel` fires.
///
/// Meant to be raced against a fetch with `futures_lite::future::or`, so the
/// fetch future is dropped, and its request torn down, on cancellation.
pub async fn until_cancelled<T>(cancel: &Signal) -> exn::Result<T, Error> {
    cancel.cancelled().await;
    Err(Error::Cancelled.into())
}
