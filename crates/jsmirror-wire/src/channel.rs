use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::request::{Envelope, Request};

/// How a request waits for its reply.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendMode {
    /// `send` returns only after the terminal callback has run.
    #[default]
    Sync,
    /// `send` returns immediately; the terminal runs later, on whichever
    /// thread receives the reply.
    Async,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("connection closed")]
    ConnectionClosed,
    #[error("timed out waiting for reply")]
    Timeout,
    #[error("message could not be dispatched: {0}")]
    Dispatch(String),
    #[error("request was dropped without a reply")]
    Dropped,
}

pub type TerminalResult = std::result::Result<Envelope, ChannelError>;

type Callback = Box<dyn FnOnce(TerminalResult) + Send + 'static>;

/// Single-shot completion handle for one request.
///
/// A terminal is consumed by [`Terminal::complete`], so it can fire at most
/// once. Dropping a terminal that was never completed fires
/// [`ChannelError::Dropped`], so it also fires at least once.
pub struct Terminal {
    callback: Option<Callback>,
}

impl Terminal {
    pub fn new(callback: impl FnOnce(TerminalResult) + Send + 'static) -> Self {
        Self {
            callback: Some(Box::new(callback)),
        }
    }

    pub fn succeed(self, reply: Envelope) {
        self.complete(Ok(reply));
    }

    pub fn fail(self, error: ChannelError) {
        self.complete(Err(error));
    }

    pub fn complete(mut self, result: TerminalResult) {
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            callback(Err(ChannelError::Dropped));
        }
    }
}

impl std::fmt::Debug for Terminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Terminal")
            .field("pending", &self.callback.is_some())
            .finish()
    }
}

/// Transport-facing side of the resolver.
///
/// Implementations must complete `terminal` exactly once. When `send`
/// returns `Err`, the terminal has already been failed with the same error;
/// callers may treat the two signals interchangeably.
pub trait MessageChannel: Send + Sync {
    fn send(
        &self,
        request: Request,
        mode: SendMode,
        terminal: Terminal,
    ) -> std::result::Result<(), ChannelError>;
}

impl<T: MessageChannel + ?Sized> MessageChannel for std::sync::Arc<T> {
    fn send(
        &self,
        request: Request,
        mode: SendMode,
        terminal: Terminal,
    ) -> std::result::Result<(), ChannelError> {
        (**self).send(request, mode, terminal)
    }
}
