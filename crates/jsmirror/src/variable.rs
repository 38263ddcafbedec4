use std::fmt;
use std::sync::Arc;

use jsmirror_wire::{Handle, HandlePayload, PropertyRef, ValueType};
use parking_lot::Mutex;

use crate::{
    error::{MirrorError, MirrorResult},
    frame::FrameContext,
    mirror::ValueMirror,
    resolver,
    state::{Event, Resolution},
};

/// The materialized view of a variable's value.
#[derive(Clone, Debug)]
pub enum JsValue {
    Primitive {
        value_type: ValueType,
        text: String,
    },
    /// Objects, functions and errors.
    Object {
        value_type: ValueType,
        class_name: Option<String>,
        properties: Vec<Arc<Variable>>,
    },
    Array {
        class_name: Option<String>,
        elements: Vec<Arc<Variable>>,
    },
}

impl JsValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            JsValue::Primitive { value_type, .. } | JsValue::Object { value_type, .. } => {
                *value_type
            }
            JsValue::Array { .. } => ValueType::Array,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            JsValue::Primitive { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn class_name(&self) -> Option<&str> {
        match self {
            JsValue::Primitive { .. } => None,
            JsValue::Object { class_name, .. } | JsValue::Array { class_name, .. } => {
                class_name.as_deref()
            }
        }
    }

    pub fn children(&self) -> &[Arc<Variable>] {
        match self {
            JsValue::Primitive { .. } => &[],
            JsValue::Object { properties, .. } => properties,
            JsValue::Array { elements, .. } => elements,
        }
    }

    /// Looks a child up by its raw property name (`"x"`, `"0"`, `"length"`).
    pub fn property(&self, name: &str) -> Option<&Arc<Variable>> {
        self.children()
            .iter()
            .find(|child| child.property_name() == name)
    }
}

struct NodeState {
    mirror: ValueMirror,
    resolution: Resolution,
    /// Set on children created by an expansion: their first payload must not
    /// record property references.
    wait_drilling: bool,
    value: Option<JsValue>,
}

impl NodeState {
    fn apply(&mut self, event: Event, fqn: &str) -> bool {
        let Some(next) = self.resolution.on(event) else {
            return false;
        };
        tracing::trace!(
            target: "jsmirror.resolve",
            fqn,
            from = ?self.resolution,
            to = ?next,
            ?event,
            "node transition"
        );
        self.resolution = next;
        true
    }
}

/// A named binding in a suspended frame: a local, an argument, or a
/// property of another variable.
pub struct Variable {
    context: Arc<FrameContext>,
    name: String,
    fqn: String,
    state: Mutex<NodeState>,
}

impl Variable {
    pub(crate) fn new(
        context: Arc<FrameContext>,
        name: String,
        fqn: String,
        handle: Option<Handle>,
        wait_drilling: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            context,
            state: Mutex::new(NodeState {
                mirror: ValueMirror::new(name.clone(), handle),
                resolution: Resolution::Unresolved,
                wait_drilling,
                value: None,
            }),
            name,
            fqn,
        })
    }

    /// A frame-level binding. Scalars the VM already described are resolved
    /// immediately; compound and untyped values wait for expansion.
    pub(crate) fn top_level(
        context: Arc<FrameContext>,
        name: &str,
        payload: &HandlePayload,
    ) -> Arc<Self> {
        let node = Self::new(context, name.to_string(), name.to_string(), payload.handle, false);
        let described = payload.is_error()
            || payload
                .value_type()
                .is_some_and(|ty| ty.is_compound() || payload.text.is_some());
        if described {
            node.fill(payload);
        }
        node
    }

    /// Display name: array indices render as `[3]`.
    pub fn name(&self) -> String {
        if resolver::is_index(&self.name) {
            format!("[{}]", self.name)
        } else {
            self.name.clone()
        }
    }

    pub fn property_name(&self) -> &str {
        &self.name
    }

    /// Path from the frame root, e.g. `a.b[3].x`.
    pub fn fully_qualified_name(&self) -> &str {
        &self.fqn
    }

    pub fn handle(&self) -> Option<Handle> {
        self.state.lock().mirror.handle()
    }

    pub fn declared_type(&self) -> Option<ValueType> {
        self.state.lock().mirror.value_type()
    }

    pub fn class_name(&self) -> Option<String> {
        self.state.lock().mirror.class_name().map(str::to_string)
    }

    pub fn mirror(&self) -> ValueMirror {
        self.state.lock().mirror.clone()
    }

    pub fn resolution(&self) -> Resolution {
        self.state.lock().resolution
    }

    /// The value view, or `None` while unresolved or after a failure.
    ///
    /// A compound value being expanded already lists its children; their own
    /// values fill in as replies arrive.
    pub fn value(&self) -> Option<JsValue> {
        let state = self.state.lock();
        match state.resolution {
            Resolution::Unresolved | Resolution::Failed => None,
            Resolution::Pending | Resolution::Resolved => state.value.clone(),
        }
    }

    pub fn children(&self) -> Vec<Arc<Variable>> {
        self.state
            .lock()
            .value
            .as_ref()
            .map(|value| value.children().to_vec())
            .unwrap_or_default()
    }

    pub fn is_mutable(&self) -> bool {
        false
    }

    /// Remote values cannot be edited.
    pub fn set_value(&self, _text: &str) -> MirrorResult<()> {
        Err(MirrorError::ReadOnly)
    }

    /// False once the VM has resumed past the suspension this node belongs to.
    pub fn is_valid(&self) -> bool {
        self.context.is_current()
    }

    /// Starts resolving this node's properties.
    ///
    /// Only the first call on an unresolved compound (or untyped) node does
    /// anything; concurrent and repeated calls return immediately. With a
    /// synchronous channel the expansion has finished when this returns.
    pub fn expand(self: &Arc<Self>) {
        let (handle, known_refs) = {
            let mut state = self.state.lock();
            let expandable = match state.mirror.value_type() {
                Some(ty) => ty.is_compound(),
                None => state.mirror.handle().is_some(),
            };
            if !expandable || !state.apply(Event::Expand, &self.fqn) {
                return;
            }
            (
                state.mirror.handle(),
                state.mirror.properties().map(<[PropertyRef]>::to_vec),
            )
        };

        if let Some(refs) = known_refs {
            resolver::populate(self, refs);
            return;
        }
        let Some(handle) = handle else {
            // Nothing to look up: render as an empty compound.
            resolver::populate(self, Vec::new());
            return;
        };
        match self.context.cache().get(handle) {
            Some(payload) => resolver::settle_own_payload(self, &payload),
            None => resolver::lookup_own(self, handle),
        }
    }

    /// Materializes children for `refs`, which the caller obtained elsewhere
    /// (for instance from a WIP `getProperties` reply).
    pub fn ensure_properties(self: &Arc<Self>, refs: Vec<PropertyRef>) {
        {
            let mut state = self.state.lock();
            if state.mirror.value_type().is_some_and(|ty| !ty.is_compound()) {
                return;
            }
            if !state.apply(Event::Expand, &self.fqn) {
                return;
            }
        }
        resolver::populate(self, refs);
    }

    pub(crate) fn context(&self) -> &Arc<FrameContext> {
        &self.context
    }

    /// Applies this node's own payload. Settled nodes ignore it.
    pub(crate) fn fill(&self, payload: &HandlePayload) {
        let mut state = self.state.lock();
        if state.resolution.is_terminal() {
            tracing::trace!(
                target: "jsmirror.resolve",
                fqn = %self.fqn,
                "ignoring payload for settled node"
            );
            return;
        }

        let include_properties = !std::mem::replace(&mut state.wait_drilling, false);
        state.mirror.fill(payload, include_properties);
        match state.mirror.value_type() {
            Some(ty) if ty.is_compound() => {}
            ty => {
                state.value = Some(JsValue::Primitive {
                    value_type: ty.unwrap_or(ValueType::Unknown),
                    text: state.mirror.text().unwrap_or_default().to_string(),
                });
                state.apply(Event::Filled, &self.fqn);
            }
        }
    }

    pub(crate) fn install_view(&self, children: Vec<Arc<Variable>>) {
        let mut state = self.state.lock();
        let class_name = state.mirror.class_name().map(str::to_string);
        state.value = Some(match state.mirror.value_type() {
            Some(ValueType::Array) => JsValue::Array {
                class_name,
                elements: children,
            },
            ty => JsValue::Object {
                value_type: ty.unwrap_or(ValueType::Object),
                class_name,
                properties: children,
            },
        });
    }

    pub(crate) fn record(&self, event: Event) -> bool {
        self.state.lock().apply(event, &self.fqn)
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Variable")
            .field("fqn", &self.fqn)
            .field("type", &state.mirror.value_type())
            .field("resolution", &state.resolution)
            .finish()
    }
}
