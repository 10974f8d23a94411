//! Per-unit request/response exchange between a command issuer and a
//! back-end handler.
//!
//! The issuing side enqueues a [`Request`] and blocks on its [`Hint`]; the
//! handler runs a transact loop that acknowledges the previous request and
//! fetches the next one in a single call. Closing the channel cancels every
//! blocked caller.

pub mod channel;
pub mod request;

pub use channel::TransactChannel;
pub use request::{
    DataBuffer, Hint, Request, RequestKind, Response, TransactKind, TransactStatus,
};
