//! Request/reply mailbox
//!
//! A mailbox wraps one [`Actor`] and routes each incoming message to
//! exactly one of its handlers by the method segment of the action type
//! (`user.load` -> `load`). Replies carry the request's id so the caller can
//! match them up. A failing handler is logged and produces no reply.

mod actor;
mod message;

pub use actor::{Actor, HandlerFn, MethodFn};
pub use message::{IncomingMessage, MessageId, OutgoingMessage};

use crate::error::HandlerError;
use crate::registry::Registry;
use crate::reply::{drain, Reply};
use actor::Route;
use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

type Subscribers = Registry<mpsc::UnboundedSender<OutgoingMessage>>;

/// Clones share the actor and the outgoing subscribers
#[derive(Clone)]
pub struct Mailbox {
    actor: Arc<Actor>,
    outgoing: Arc<Subscribers>,
}

impl Mailbox {
    #[must_use]
    pub fn new(actor: Actor) -> Self {
        Self {
            actor: Arc::new(actor),
            outgoing: Arc::new(Registry::new()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.actor.name
    }

    /// Replies to every message sent from now on. Replies produced while
    /// nobody is subscribed are dropped.
    #[must_use]
    pub fn outgoing(&self) -> UnboundedReceiverStream<OutgoingMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.outgoing.push(tx);
        UnboundedReceiverStream::new(rx)
    }

    /// Routes `message` to its handler. Replies that are ready right away are
    /// published before this returns.
    pub fn send(&self, message: IncomingMessage) {
        let payload = message.action.payload_or_null();
        let reply = match self.actor.route(&message) {
            Route::Method(method) => method(payload, &message).map(Reply::Single),
            Route::Effect(handler) | Route::Missing(handler) => handler(payload, &message),
            Route::Unrouted => {
                tracing::debug!(actor = %self.actor.name, action = %message.action.kind, "No handler for message");
                return;
            }
        };

        let reply = match reply {
            Ok(reply) => reply,
            Err(err) => {
                report(&self.actor.name, &err);
                return;
            }
        };

        let outgoing = Arc::clone(&self.outgoing);
        let resp_id = message.id;
        let actor = self.actor.name.clone();
        drain(
            reply,
            move |response| {
                publish(
                    &outgoing,
                    &OutgoingMessage {
                        response,
                        resp_id: resp_id.clone(),
                    },
                );
            },
            move |err| report(&actor, &err),
        );
    }

    /// Sends `message` and resolves with its first reply, or `None` if the
    /// handler produced nothing synchronously and the mailbox is dropped.
    /// Never times out.
    pub fn request(
        &self,
        message: IncomingMessage,
    ) -> impl Future<Output = Option<OutgoingMessage>> + Send + 'static {
        let id = message.id.clone();
        let mut replies = self.outgoing();
        self.send(message);
        async move {
            while let Some(reply) = replies.next().await {
                if reply.resp_id == id {
                    return Some(reply);
                }
            }
            None
        }
    }
}

impl std::fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox")
            .field("actor", &self.actor)
            .field("subscribers", &self.outgoing.len())
            .finish()
    }
}

fn publish(subscribers: &Subscribers, message: &OutgoingMessage) {
    let current = subscribers.snapshot();
    if current.is_empty() {
        tracing::debug!(resp_id = %message.resp_id, "No subscriber for reply, dropping");
        return;
    }
    let mut saw_closed = false;
    for tx in current.iter() {
        saw_closed |= tx.send(message.clone()).is_err();
    }
    if saw_closed {
        subscribers.retain(|tx| !tx.is_closed());
    }
}

fn report(actor: &str, err: &HandlerError) {
    tracing::error!(actor = %actor, error = %err.message, "Mailbox handler failed");
}
