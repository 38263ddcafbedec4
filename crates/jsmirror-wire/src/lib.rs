//! Wire layer for jsmirror.
//!
//! This crate speaks to a suspended JavaScript VM. It knows two payload
//! dialects: the V8 debugger protocol (short field tags, numeric handles) and
//! the WebKit inspector protocol (named JSON fields, string object ids). Both
//! reduce to [`HandlePayload`], the shape the mirror layer in `jsmirror`
//! consumes.
//!
//! Request correlation lives in [`Dispatcher`]: it implements the
//! [`MessageChannel`] contract (one terminal callback per request, sync or
//! async) on top of any frame sink. [`tcp::V8Connection`] wires a dispatcher to
//! a real socket.

mod channel;
pub mod codec;
mod dispatcher;
mod poison;
pub mod request;
pub mod tcp;
mod types;
pub mod v8;
pub mod wip;

pub use channel::{ChannelError, MessageChannel, SendMode, Terminal, TerminalResult};
pub use dispatcher::{Dispatcher, DispatcherConfig, FrameSink};
pub use request::{Envelope, Request};
pub use types::{HandlePayload, PropertyRef, Result, ValueType, WireError};

/// VM-assigned identifier of one remote object, valid for a single suspension.
pub type Handle = u64;

// The in-memory VM is only needed for tests and downstream integration suites.
// Compile it for this crate's own unit tests unconditionally (via `cfg(test)`), while keeping
// it behind the `test-support` feature for normal builds and for downstream crates.
#[cfg(any(test, feature = "test-support"))]
pub mod mock;
