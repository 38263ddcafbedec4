use std::{collections::HashMap, sync::Mutex};

use serde_json::{Map, Value};

use crate::{
    channel::{ChannelError, MessageChannel, SendMode, Terminal},
    poison::lock,
    request::{Envelope, Request},
    Handle,
};

/// How the mock answers the next requests.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum MockBehavior {
    /// Answer immediately on the calling thread.
    #[default]
    Reply,
    /// Park the terminal until [`MockVm::release_deferred`] or
    /// [`MockVm::fail_deferred`].
    Defer,
    /// Complete the terminal with [`ChannelError::ConnectionClosed`].
    TransportFailure,
    /// Refuse the message synchronously (`send` returns `Err`).
    SendError,
    /// Reply with `success: false`.
    Unsuccessful,
}

#[derive(Default)]
struct MockState {
    handles: HashMap<Handle, Value>,
    backtrace: Option<(Value, Vec<Value>)>,
    behavior: MockBehavior,
    requests: Vec<Request>,
    deferred: Vec<(Request, Terminal)>,
    next_seq: u64,
}

/// Deterministic, in-memory VM test double.
///
/// Handle payloads are stored in V8 wire form and served through `lookup`;
/// every request is recorded so tests can count round-trips.
#[derive(Default)]
pub struct MockVm {
    state: Mutex<MockState>,
}

impl MockVm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_handle(&self, handle: Handle, payload: Value) {
        lock(&self.state, "MockVm.insert_handle")
            .handles
            .insert(handle, payload);
    }

    pub fn remove_handle(&self, handle: Handle) {
        lock(&self.state, "MockVm.remove_handle")
            .handles
            .remove(&handle);
    }

    pub fn set_backtrace(&self, body: Value, refs: Vec<Value>) {
        lock(&self.state, "MockVm.set_backtrace").backtrace = Some((body, refs));
    }

    pub fn set_behavior(&self, behavior: MockBehavior) {
        lock(&self.state, "MockVm.set_behavior").behavior = behavior;
    }

    pub fn requests(&self) -> Vec<Request> {
        lock(&self.state, "MockVm.requests").requests.clone()
    }

    /// Handle sets of every `lookup` sent so far, in order.
    pub fn lookup_calls(&self) -> Vec<Vec<Handle>> {
        lock(&self.state, "MockVm.lookup_calls")
            .requests
            .iter()
            .filter_map(|r| r.lookup_handles().map(<[Handle]>::to_vec))
            .collect()
    }

    pub fn lookup_count(&self) -> usize {
        self.lookup_calls().len()
    }

    /// Number of lookups that asked for `handle`.
    pub fn lookups_for(&self, handle: Handle) -> usize {
        self.lookup_calls()
            .iter()
            .filter(|handles| handles.contains(&handle))
            .count()
    }

    pub fn deferred_len(&self) -> usize {
        lock(&self.state, "MockVm.deferred_len").deferred.len()
    }

    /// Answers every parked request from the current handle table.
    pub fn release_deferred(&self) -> usize {
        let deferred = std::mem::take(&mut lock(&self.state, "MockVm.release_deferred").deferred);
        let count = deferred.len();
        for (request, terminal) in deferred {
            let reply = self.reply_for(&request);
            terminal.succeed(reply);
        }
        count
    }

    pub fn fail_deferred(&self, error: ChannelError) -> usize {
        let deferred = std::mem::take(&mut lock(&self.state, "MockVm.fail_deferred").deferred);
        let count = deferred.len();
        for (_request, terminal) in deferred {
            terminal.fail(error.clone());
        }
        count
    }

    fn reply_for(&self, request: &Request) -> Envelope {
        let mut state = lock(&self.state, "MockVm.reply_for");
        state.next_seq += 1;
        let request_seq = state.next_seq;
        match request {
            Request::Lookup { handles, .. } => {
                let mut body = Map::new();
                for handle in handles {
                    if let Some(payload) = state.handles.get(handle) {
                        body.insert(handle.to_string(), payload.clone());
                    }
                }
                Envelope::response(request_seq, "lookup", true, Some(Value::Object(body)))
            }
            Request::Backtrace { .. } => {
                let (body, refs) = state
                    .backtrace
                    .clone()
                    .unwrap_or_else(|| (serde_json::json!({"totalFrames": 0}), Vec::new()));
                Envelope {
                    refs: Some(refs),
                    ..Envelope::response(request_seq, "backtrace", true, Some(body))
                }
            }
            Request::Continue => Envelope {
                running: Some(true),
                ..Envelope::response(request_seq, "continue", true, None)
            },
        }
    }
}

impl MessageChannel for MockVm {
    fn send(
        &self,
        request: Request,
        _mode: SendMode,
        terminal: Terminal,
    ) -> Result<(), ChannelError> {
        let behavior = {
            let mut state = lock(&self.state, "MockVm.send");
            state.requests.push(request.clone());
            state.behavior.clone()
        };

        // Terminals run without the state lock held: resolvers send nested
        // requests from inside their callbacks.
        match behavior {
            MockBehavior::Reply => {
                let reply = self.reply_for(&request);
                terminal.succeed(reply);
                Ok(())
            }
            MockBehavior::Defer => {
                lock(&self.state, "MockVm.send")
                    .deferred
                    .push((request, terminal));
                Ok(())
            }
            MockBehavior::TransportFailure => {
                terminal.fail(ChannelError::ConnectionClosed);
                Ok(())
            }
            MockBehavior::SendError => {
                let err = ChannelError::Dispatch("mock VM refused the message".to_string());
                terminal.fail(err.clone());
                Err(err)
            }
            MockBehavior::Unsuccessful => {
                let mut reply = self.reply_for(&request);
                reply.success = Some(false);
                reply.body = None;
                terminal.succeed(reply);
                Ok(())
            }
        }
    }
}
