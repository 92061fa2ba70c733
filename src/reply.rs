//! Uniform handler output
//!
//! Effects and mailbox handlers may answer with one value or with an
//! asynchronous sequence. [`Reply`] is the single sum type for both, and
//! [`drain`] is the one place that tells them apart.

use crate::error::HandlerError;
use futures::future::FutureExt;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::fmt;
use std::future::Future;

pub type ReplyStream<T> = BoxStream<'static, Result<T, HandlerError>>;

/// Output of an effect or mailbox handler
pub enum Reply<T> {
    /// Exactly one value
    Single(T),
    /// Zero or more values, possibly arriving later. An `Err` item ends the
    /// sequence.
    Sequence(ReplyStream<T>),
}

impl<T: Send + 'static> Reply<T> {
    #[must_use]
    pub fn single(value: T) -> Self {
        Reply::Single(value)
    }

    /// An empty sequence
    #[must_use]
    pub fn none() -> Self {
        Reply::Sequence(stream::empty().boxed())
    }

    #[must_use]
    pub fn many(values: impl IntoIterator<Item = T>) -> Self {
        let values: Vec<T> = values.into_iter().collect();
        Reply::Sequence(stream::iter(values.into_iter().map(Ok)).boxed())
    }

    #[must_use]
    pub fn stream<S>(values: S) -> Self
    where
        S: Stream<Item = Result<T, HandlerError>> + Send + 'static,
    {
        Reply::Sequence(values.boxed())
    }

    /// A sequence of one value produced by a future
    #[must_use]
    pub fn future<F>(value: F) -> Self
    where
        F: Future<Output = Result<T, HandlerError>> + Send + 'static,
    {
        Reply::Sequence(stream::once(value).boxed())
    }
}

impl<T: fmt::Debug> fmt::Debug for Reply<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Single(value) => f.debug_tuple("Single").field(value).finish(),
            Reply::Sequence(_) => f.write_str("Sequence(..)"),
        }
    }
}

/// Hands every value of `reply` to `deliver`, in emission order.
///
/// Values that are ready now are delivered before this returns. If the
/// sequence is still pending, the remainder is driven on a spawned tokio
/// task. The first error ends the sequence and goes to `on_error`.
pub(crate) fn drain<T, D, E>(reply: Reply<T>, mut deliver: D, on_error: E)
where
    T: Send + 'static,
    D: FnMut(T) + Send + 'static,
    E: FnOnce(HandlerError) + Send + 'static,
{
    let mut values = match reply {
        Reply::Single(value) => {
            deliver(value);
            return;
        }
        Reply::Sequence(values) => values,
    };

    loop {
        match values.next().now_or_never() {
            Some(Some(Ok(value))) => deliver(value),
            Some(Some(Err(err))) => {
                on_error(err);
                return;
            }
            Some(None) => return,
            None => break,
        }
    }

    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        on_error(HandlerError::new(
            "asynchronous reply is pending but no tokio runtime is running",
        ));
        return;
    };

    handle.spawn(async move {
        while let Some(next) = values.next().await {
            match next {
                Ok(value) => deliver(value),
                Err(err) => {
                    on_error(err);
                    return;
                }
            }
        }
    });
}
