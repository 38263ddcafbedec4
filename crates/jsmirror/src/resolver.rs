//! Property resolution: turns property references into child variables,
//! batching every handle the cache cannot answer into one `lookup`.
//!
//! Callbacks hold only weak references to nodes and check the suspension
//! generation first, so a reply that arrives after a resume (or after the
//! frame was dropped) changes nothing.

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};

use jsmirror_wire::{
    v8::{self, LookupReply},
    Envelope, Handle, HandlePayload, PropertyRef, Request, Terminal, TerminalResult,
};

use crate::{
    frame::FrameContext,
    state::{Event, Resolution},
    variable::Variable,
};

type Awaited = Vec<(Handle, Weak<Variable>)>;

pub(crate) fn is_index(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit())
}

/// Hidden-properties entries have no name; VM internals start with `.`.
pub(crate) fn is_hidden(name: &str) -> bool {
    name.is_empty() || name.starts_with('.')
}

pub(crate) fn child_fqn(parent: &str, name: &str) -> Option<String> {
    if is_hidden(name) {
        return None;
    }
    if is_index(name) {
        Some(format!("{parent}[{name}]"))
    } else {
        Some(format!("{parent}.{name}"))
    }
}

/// Creates children for `refs` under a `Pending` parent and resolves them.
pub(crate) fn populate(parent: &Arc<Variable>, refs: Vec<PropertyRef>) {
    let ctx = parent.context().clone();
    let mut children = Vec::with_capacity(refs.len());
    let mut awaited = Awaited::new();
    let mut handles = BTreeSet::new();

    for property in refs {
        let Some(fqn) = child_fqn(parent.fully_qualified_name(), &property.name) else {
            tracing::trace!(
                target: "jsmirror.resolve",
                parent = parent.fully_qualified_name(),
                name = %property.name,
                "skipping hidden property"
            );
            continue;
        };
        let child = Variable::new(ctx.clone(), property.name, fqn, Some(property.handle), true);
        match ctx.cache().get(property.handle) {
            Some(payload) => child.fill(&payload),
            None => {
                handles.insert(property.handle);
                awaited.push((property.handle, Arc::downgrade(&child)));
            }
        }
        children.push(child);
    }

    // Install before sending: a synchronous reply is distributed before
    // `send` returns.
    parent.install_view(children);

    if handles.is_empty() {
        parent.record(Event::Replied);
        return;
    }
    request_batch(&ctx, handles, awaited, Some(Arc::downgrade(parent)));
}

/// Issues one `lookup` for `handles` and fills each awaited node from the
/// reply. `parent`, when given, completes once the reply is distributed.
pub(crate) fn request_batch(
    ctx: &Arc<FrameContext>,
    handles: BTreeSet<Handle>,
    awaited: Awaited,
    parent: Option<Weak<Variable>>,
) {
    tracing::debug!(
        target: "jsmirror.resolve",
        handles = handles.len(),
        awaited = awaited.len(),
        "requesting lookup batch"
    );
    let request = Request::lookup(handles, ctx.options().inline_refs);
    let callback_ctx = ctx.clone();
    let terminal = Terminal::new(move |result| distribute(&callback_ctx, result, awaited, parent));
    if let Err(err) = ctx.channel().send(request, ctx.options().send_mode, terminal) {
        // The terminal has already failed the batch.
        tracing::debug!(target: "jsmirror.resolve", error = %err, "lookup not sent");
    }
}

fn distribute(
    ctx: &FrameContext,
    result: TerminalResult,
    awaited: Awaited,
    parent: Option<Weak<Variable>>,
) {
    if !ctx.is_current() {
        tracing::debug!(
            target: "jsmirror.resolve",
            generation = ctx.generation(),
            "discarding lookup reply from an earlier suspension"
        );
        return;
    }
    let parent = parent.and_then(|parent| parent.upgrade());

    let envelope = match successful(result) {
        Ok(envelope) => envelope,
        Err(reason) => {
            tracing::warn!(
                target: "jsmirror.resolve",
                parent = parent.as_ref().map(|p| p.fully_qualified_name()),
                %reason,
                "lookup batch failed"
            );
            if let Some(parent) = &parent {
                parent.record(Event::Failed);
            }
            for (_, child) in &awaited {
                if let Some(child) = child.upgrade() {
                    child.record(Event::Failed);
                }
            }
            return;
        }
    };

    seed_refs(ctx, &envelope);
    let reply = LookupReply::from_envelope(&envelope);
    for (handle, child) in &awaited {
        let Some(child) = child.upgrade() else {
            continue;
        };
        let Some(payload) = reply.get(*handle) else {
            tracing::trace!(target: "jsmirror.resolve", handle, "reply omitted handle");
            continue;
        };
        let Some(payload) = ctx
            .cache()
            .put_if_current(ctx.generation(), *handle, payload.clone())
        else {
            tracing::debug!(target: "jsmirror.resolve", "suspension ended mid-reply");
            return;
        };
        child.fill(&payload);
    }

    if let Some(parent) = parent {
        parent.record(Event::Replied);
    }
}

/// Looks up a compound node's own handle, then expands it from the reply.
pub(crate) fn lookup_own(node: &Arc<Variable>, handle: Handle) {
    let ctx = node.context().clone();
    let callback_ctx = ctx.clone();
    let weak = Arc::downgrade(node);
    let terminal = Terminal::new(move |result| {
        let ctx = callback_ctx;
        if !ctx.is_current() {
            tracing::debug!(target: "jsmirror.resolve", handle, "discarding stale lookup reply");
            return;
        }
        let Some(node) = weak.upgrade() else {
            return;
        };
        let envelope = match successful(result) {
            Ok(envelope) => envelope,
            Err(reason) => {
                tracing::warn!(
                    target: "jsmirror.resolve",
                    fqn = node.fully_qualified_name(),
                    handle,
                    %reason,
                    "lookup failed"
                );
                node.record(Event::Failed);
                return;
            }
        };

        seed_refs(&ctx, &envelope);
        let reply = LookupReply::from_envelope(&envelope);
        let Some(payload) = reply.get(handle) else {
            tracing::debug!(
                target: "jsmirror.resolve",
                fqn = node.fully_qualified_name(),
                handle,
                "reply omitted the requested handle"
            );
            node.record(Event::Failed);
            return;
        };
        if let Some(payload) = ctx
            .cache()
            .put_if_current(ctx.generation(), handle, payload.clone())
        {
            settle_own_payload(&node, &payload);
        }
    });

    let request = Request::lookup([handle], ctx.options().inline_refs);
    if let Err(err) = ctx.channel().send(request, ctx.options().send_mode, terminal) {
        tracing::debug!(target: "jsmirror.resolve", handle, error = %err, "lookup not sent");
    }
}

/// Applies a `Pending` node's own payload and, if it is still compound,
/// expands it with the payload's property references.
pub(crate) fn settle_own_payload(node: &Arc<Variable>, payload: &HandlePayload) {
    node.fill(payload);
    if node.resolution() == Resolution::Pending {
        populate(node, payload.properties.clone());
    }
}

fn successful(result: TerminalResult) -> Result<Envelope, String> {
    match result {
        Ok(envelope) if envelope.is_successful() => Ok(envelope),
        Ok(envelope) => Err(envelope
            .message
            .unwrap_or_else(|| "unsuccessful response".to_string())),
        Err(err) => Err(err.to_string()),
    }
}

fn seed_refs(ctx: &FrameContext, envelope: &Envelope) {
    if let Some(refs) = envelope.refs.as_deref() {
        ctx.cache().seed(ctx.generation(), v8::parse_refs(refs));
    }
}
