use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        mpsc, Mutex,
    },
    time::Duration,
};

use crate::{
    channel::{ChannelError, MessageChannel, SendMode, Terminal},
    codec,
    poison::lock,
    request::{Envelope, Request},
};

/// Where encoded frames go. The TCP transport backs this with a writer task;
/// tests can back it with a plain queue.
pub trait FrameSink: Send + Sync {
    fn send_frame(&self, frame: Vec<u8>) -> Result<(), ChannelError>;
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// How long a [`SendMode::Sync`] send waits before failing with
    /// [`ChannelError::Timeout`].
    pub reply_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            reply_timeout: Duration::from_secs(10),
        }
    }
}

/// Correlates outgoing requests with incoming responses by sequence number.
pub struct Dispatcher {
    sink: Box<dyn FrameSink>,
    pending: Mutex<HashMap<u64, Terminal>>,
    next_seq: AtomicU64,
    closed: AtomicBool,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(sink: Box<dyn FrameSink>, config: DispatcherConfig) -> Self {
        Self {
            sink,
            pending: Mutex::new(HashMap::new()),
            next_seq: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            config,
        }
    }

    pub fn pending_len(&self) -> usize {
        lock(&self.pending, "Dispatcher.pending_len").len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Routes one decoded message.
    ///
    /// Responses complete their pending terminal and return `None`; anything
    /// else (events, VM-initiated requests) is handed back to the caller.
    pub fn handle_message(&self, envelope: Envelope) -> Option<Envelope> {
        if !envelope.is_response() {
            return Some(envelope);
        }

        let Some(request_seq) = envelope.request_seq else {
            tracing::warn!(
                target: "jsmirror.wire",
                seq = envelope.seq,
                "response without request_seq; ignoring"
            );
            return None;
        };

        // Run the terminal outside the lock: callbacks commonly send follow-up requests.
        let terminal = lock(&self.pending, "Dispatcher.handle_message").remove(&request_seq);
        match terminal {
            Some(terminal) => terminal.succeed(envelope),
            None => tracing::debug!(
                target: "jsmirror.wire",
                request_seq,
                "reply for unknown or timed out request; ignoring"
            ),
        }
        None
    }

    /// Fails every pending request with [`ChannelError::ConnectionClosed`] and
    /// rejects further sends.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let pending = std::mem::take(&mut *lock(&self.pending, "Dispatcher.close"));
        if !pending.is_empty() {
            tracing::debug!(
                target: "jsmirror.wire",
                pending = pending.len(),
                "failing pending requests on close"
            );
        }
        for (_seq, terminal) in pending {
            terminal.fail(ChannelError::ConnectionClosed);
        }
    }

    fn dispatch(&self, seq: u64, request: &Request, terminal: Terminal) -> Result<(), ChannelError> {
        let frame = match codec::encode_message(&request.to_envelope(seq)) {
            Ok(frame) => frame,
            Err(err) => {
                let err = ChannelError::Dispatch(err.to_string());
                terminal.fail(err.clone());
                return Err(err);
            }
        };

        // Register before writing: the reply may arrive before `send_frame` returns.
        lock(&self.pending, "Dispatcher.dispatch").insert(seq, terminal);

        if let Err(err) = self.sink.send_frame(frame) {
            if let Some(terminal) = lock(&self.pending, "Dispatcher.dispatch").remove(&seq) {
                terminal.fail(err.clone());
            }
            return Err(err);
        }
        Ok(())
    }
}

impl MessageChannel for Dispatcher {
    fn send(
        &self,
        request: Request,
        mode: SendMode,
        terminal: Terminal,
    ) -> Result<(), ChannelError> {
        if self.is_closed() {
            terminal.fail(ChannelError::ConnectionClosed);
            return Err(ChannelError::ConnectionClosed);
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(
            target: "jsmirror.wire",
            seq,
            command = request.command(),
            ?mode,
            "sending request"
        );

        match mode {
            SendMode::Async => self.dispatch(seq, &request, terminal),
            SendMode::Sync => {
                let (tx, rx) = mpsc::sync_channel(1);
                let relay = Terminal::new(move |result| {
                    let _ = tx.send(result);
                });
                if let Err(err) = self.dispatch(seq, &request, relay) {
                    terminal.fail(err.clone());
                    return Err(err);
                }

                match rx.recv_timeout(self.config.reply_timeout) {
                    Ok(result) => terminal.complete(result),
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        // A late reply finds no pending entry and is dropped.
                        lock(&self.pending, "Dispatcher.send").remove(&seq);
                        tracing::warn!(target: "jsmirror.wire", seq, "request timed out");
                        terminal.fail(ChannelError::Timeout);
                    }
                    Err(mpsc::RecvTimeoutError::Disconnected) => {
                        terminal.fail(ChannelError::ConnectionClosed);
                    }
                }
                Ok(())
            }
        }
    }
}
