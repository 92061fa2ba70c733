//! Staunch - reactive action/state store
//!
//! A single current state tree is changed only by dispatching actions
//! through reducers. Effects observe committed actions and answer with more
//! actions, synchronously or as async sequences. Response rules forward a
//! slice of state as a new action whenever a trigger action is committed.
//! Mailboxes route a tagged request to one handler of an actor and tag each
//! reply with the request's id.
//!
//! ```text
//! dispatch ──► projector ──► new snapshot
//!    ▲                          │
//!    │          ┌───────────────┼────────────────┐
//!    │          ▼               ▼                ▼
//!    │    response router    effects      subscribers / once / changes
//!    │          │               │
//!    └──────────┴───────────────┘
//! ```

pub mod action;
pub mod config;
pub mod error;
pub mod mailbox;
mod registry;
pub mod reply;
pub mod store;
pub mod tree;

pub use action::{Action, ActionWithState};
pub use config::StoreConfig;
pub use error::{HandlerError, ReducerError, StoreError};
pub use mailbox::{Actor, IncomingMessage, Mailbox, MessageId, OutgoingMessage};
pub use reply::Reply;
pub use store::{
    Effect, EffectContext, MappedReducer, Reducer, ReducerInput, Registration, ResponseRule,
    Store, StoreBuilder,
};
pub use tree::{IntoPath, Tree};
