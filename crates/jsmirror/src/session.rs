use std::sync::Arc;

use jsmirror_wire::{
    v8::{self, FrameVariable},
    wip::{self, CallFunctionOnData, GetPropertiesData, RemoteObject, WipHandleTable},
    ChannelError, Envelope, Handle, MessageChannel, Request, SendMode, Terminal, TerminalResult,
    WireError,
};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::{
    cache::HandleCache,
    error::{MirrorError, MirrorResult},
    frame::{CallFrame, FrameContext, ResolverOptions},
};

/// Debugger-side state for one connected VM.
///
/// A session owns the handle cache and the frames of the current
/// suspension. When the VM resumes, [`DebugSession::resumed`] retires both:
/// the cache moves to a new generation and outstanding replies for the old
/// frames become no-ops.
pub struct DebugSession {
    channel: Arc<dyn MessageChannel>,
    cache: Arc<HandleCache>,
    options: ResolverOptions,
    frames: RwLock<Vec<Arc<CallFrame>>>,
    wip_handles: Mutex<WipHandleTable>,
}

impl DebugSession {
    pub fn new(channel: Arc<dyn MessageChannel>, options: ResolverOptions) -> Self {
        Self {
            channel,
            cache: Arc::new(HandleCache::new()),
            options,
            frames: RwLock::new(Vec::new()),
            wip_handles: Mutex::new(WipHandleTable::new()),
        }
    }

    pub fn handle_cache(&self) -> &Arc<HandleCache> {
        &self.cache
    }

    pub fn options(&self) -> ResolverOptions {
        self.options
    }

    fn context(&self) -> Arc<FrameContext> {
        FrameContext::new(self.channel.clone(), self.cache.clone(), self.options)
    }

    /// Adds a frame built from already decoded bindings.
    pub fn create_frame(
        &self,
        index: u32,
        function_name: impl Into<String>,
        bindings: &[FrameVariable],
    ) -> Arc<CallFrame> {
        let frame = Arc::new(CallFrame::new(
            self.context(),
            index,
            function_name.into(),
            bindings,
        ));
        self.frames.write().push(frame.clone());
        frame
    }

    /// Replaces the current frames with those of a `backtrace` body. `refs`
    /// are seeded into the handle cache first.
    pub fn materialize_backtrace(
        &self,
        body: &Value,
        refs: &[Value],
    ) -> MirrorResult<Vec<Arc<CallFrame>>> {
        let parsed = v8::parse_backtrace(body)?;
        let context = self.context();
        let seeded = self.cache.seed(context.generation(), v8::parse_refs(refs));

        let frames: Vec<Arc<CallFrame>> = parsed
            .iter()
            .map(|frame| Arc::new(CallFrame::from_backtrace(context.clone(), frame)))
            .collect();
        tracing::debug!(
            target: "jsmirror.session",
            frames = frames.len(),
            seeded,
            "materialized backtrace"
        );
        *self.frames.write() = frames.clone();
        Ok(frames)
    }

    /// Fetches frames `from_frame..to_frame` synchronously.
    ///
    /// Blocks the calling thread; do not call from an async executor thread.
    pub fn request_backtrace(
        &self,
        from_frame: u32,
        to_frame: u32,
    ) -> MirrorResult<Vec<Arc<CallFrame>>> {
        let slot: Arc<Mutex<Option<TerminalResult>>> = Arc::default();
        let sink = slot.clone();
        let terminal = Terminal::new(move |result| {
            *sink.lock() = Some(result);
        });
        let request = Request::Backtrace {
            from_frame,
            to_frame,
            inline_refs: self.options.inline_refs,
        };
        // A send error also fails the terminal; the slot carries the outcome.
        let _ = self.channel.send(request, SendMode::Sync, terminal);

        let outcome = slot.lock().take();
        let envelope = match outcome {
            Some(Ok(envelope)) => envelope,
            Some(Err(err)) => return Err(err.into()),
            None => {
                return Err(MirrorError::Channel(ChannelError::Dispatch(
                    "channel returned before completing a synchronous request".to_string(),
                )))
            }
        };
        if !envelope.is_successful() {
            return Err(WireError::Protocol(
                envelope
                    .message
                    .unwrap_or_else(|| "backtrace request failed".to_string()),
            )
            .into());
        }

        let body = envelope.body.unwrap_or(Value::Null);
        self.materialize_backtrace(&body, envelope.refs.as_deref().unwrap_or_default())
    }

    pub fn frames(&self) -> Vec<Arc<CallFrame>> {
        self.frames.read().clone()
    }

    pub fn frame(&self, index: u32) -> MirrorResult<Arc<CallFrame>> {
        self.frames
            .read()
            .iter()
            .find(|frame| frame.index() == index)
            .cloned()
            .ok_or(MirrorError::UnknownFrame(index))
    }

    /// Retires the current suspension: invalidates the cache and drops all
    /// frames and WIP object ids.
    pub fn resumed(&self) {
        let dropped = std::mem::take(&mut *self.frames.write()).len();
        self.cache.invalidate_all();
        self.wip_handles.lock().clear();
        tracing::info!(target: "jsmirror.session", frames = dropped, "suspension retired");
    }

    /// Asks the VM to continue and retires the suspension.
    pub fn resume(&self) -> MirrorResult<()> {
        let terminal = Terminal::new(|result| {
            if let Err(err) = result {
                tracing::warn!(target: "jsmirror.session", error = %err, "continue failed");
            }
        });
        self.channel
            .send(Request::Continue, SendMode::Async, terminal)?;
        self.resumed();
        Ok(())
    }

    /// Reacts to an unsolicited VM message. A running VM, or a fresh break,
    /// invalidates everything captured before it.
    pub fn handle_vm_message(&self, envelope: &Envelope) {
        let new_break = envelope.is_event()
            && matches!(envelope.event.as_deref(), Some("break" | "exception"));
        if envelope.running == Some(true) || new_break {
            self.resumed();
        }
    }

    /// Reduces a WIP remote object to a frame binding.
    ///
    /// Compound objects expand from whatever [`DebugSession::absorb_wip_properties`]
    /// seeded for their object id.
    pub fn wip_variable(&self, name: impl Into<String>, object: &RemoteObject) -> FrameVariable {
        let payload = wip::reduce_remote_object(object, &mut self.wip_handles.lock());
        FrameVariable {
            name: name.into(),
            value: payload,
        }
    }

    /// Seeds a WIP `getProperties` reply for `parent` into the cache, so the
    /// parent expands without a round-trip. Returns the parent's handle.
    pub fn absorb_wip_properties(
        &self,
        parent: &RemoteObject,
        data: &GetPropertiesData,
    ) -> Option<Handle> {
        let (parent_payload, children) =
            wip::reduce_properties(parent, data, &mut self.wip_handles.lock());
        let handle = parent_payload.handle;
        let generation = self.cache.generation();
        self.cache.seed(generation, children);
        self.cache.seed(generation, [parent_payload]);
        handle
    }

    /// Reduces a `callFunctionOn` result; a thrown result becomes an error
    /// value.
    pub fn wip_call_result(
        &self,
        name: impl Into<String>,
        data: &CallFunctionOnData,
    ) -> FrameVariable {
        let payload = wip::reduce_call_result(data, &mut self.wip_handles.lock());
        FrameVariable {
            name: name.into(),
            value: payload,
        }
    }
}
