//! Lazily resolved mirrors of a suspended JavaScript VM's values.
//!
//! The VM names objects by handles that are only valid while it stays
//! suspended. A [`DebugSession`] turns a backtrace into [`CallFrame`]s whose
//! [`Variable`]s resolve on demand: [`Variable::expand`] creates child nodes
//! for an object's properties, answers what it can from the [`HandleCache`]
//! and fetches the rest with one batched `lookup`.
//!
//! Requests go through any [`jsmirror_wire::MessageChannel`]; the wire crate
//! supplies a TCP connection and an in-memory mock VM.

mod cache;
mod error;
mod frame;
mod mirror;
mod resolver;
mod session;
mod state;
mod variable;

pub use cache::HandleCache;
pub use error::{MirrorError, MirrorResult};
pub use frame::{CallFrame, FrameContext, ResolverOptions};
pub use mirror::{ValueMirror, ERROR_RETRIEVING_VALUE, MALFORMED_VALUE};
pub use session::DebugSession;
pub use state::Resolution;
pub use variable::{JsValue, Variable};

pub use jsmirror_wire as wire;
pub use jsmirror_wire::{Handle, ValueType};
