//! WebKit inspector protocol (WIP) payloads.
//!
//! WIP names remote objects by opaque string ids and returns property values
//! inline. [`WipHandleTable`] interns those ids to numeric handles so WIP
//! replies reduce to the same [`HandlePayload`]s as V8 lookups.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    types::{HandlePayload, PropertyRef},
    Handle,
};

/// Synthetic handles (inline primitives) are allocated from the top half of
/// the handle space so they never collide with interned object ids.
const SYNTHETIC_HANDLE_BASE: Handle = 1 << 63;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    #[serde(rename = "type")]
    pub object_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<RemoteObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub was_thrown: Option<bool>,
}

/// `Runtime.getProperties` result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GetPropertiesData {
    pub result: Vec<PropertyDescriptor>,
}

/// `Runtime.callFunctionOn` result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFunctionOnData {
    pub result: RemoteObject,
    /// True iff the result was thrown during the evaluation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub was_thrown: Option<bool>,
}

/// Interns WIP object ids into numeric handles for one suspension.
#[derive(Debug, Default)]
pub struct WipHandleTable {
    next_handle: Handle,
    next_synthetic: Handle,
    by_object_id: HashMap<String, Handle>,
    by_handle: HashMap<Handle, String>,
}

impl WipHandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, object_id: &str) -> Handle {
        if let Some(handle) = self.by_object_id.get(object_id).copied() {
            return handle;
        }
        self.next_handle += 1;
        let handle = self.next_handle;
        self.by_object_id.insert(object_id.to_string(), handle);
        self.by_handle.insert(handle, object_id.to_string());
        handle
    }

    pub fn synthetic(&mut self) -> Handle {
        self.next_synthetic += 1;
        SYNTHETIC_HANDLE_BASE + self.next_synthetic
    }

    pub fn handle_for(&self, object_id: &str) -> Option<Handle> {
        self.by_object_id.get(object_id).copied()
    }

    pub fn object_id(&self, handle: Handle) -> Option<&str> {
        self.by_handle.get(&handle).map(String::as_str)
    }

    /// WIP object ids die with the suspension, exactly like V8 handles.
    pub fn clear(&mut self) {
        self.by_object_id.clear();
        self.by_handle.clear();
    }

    pub fn len(&self) -> usize {
        self.by_object_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_object_id.is_empty()
    }
}

fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some("null".to_string()),
        _ => None,
    }
}

/// Maps WIP `type`/`subtype` onto the V8 type tags and class names used by
/// [`HandlePayload`].
fn v8_type_and_class(object: &RemoteObject) -> (String, Option<String>) {
    let class_name = object.class_name.clone();
    match (object.object_type.as_str(), object.subtype.as_deref()) {
        ("object", Some("null")) => ("null".to_string(), None),
        ("object", Some("array")) => ("object".to_string(), Some("Array".to_string())),
        ("object", Some("date")) => ("object".to_string(), Some("Date".to_string())),
        ("object", Some("error")) => ("object".to_string(), Some("Error".to_string())),
        ("object", Some("regexp")) => ("regexp".to_string(), class_name),
        (ty, _) => (ty.to_string(), class_name),
    }
}

/// Reduces one remote object. Objects get an interned handle, inline
/// primitives a synthetic one.
pub fn reduce_remote_object(object: &RemoteObject, handles: &mut WipHandleTable) -> HandlePayload {
    let handle = match object.object_id.as_deref() {
        Some(id) => handles.intern(id),
        None => handles.synthetic(),
    };
    let (type_name, class_name) = v8_type_and_class(object);
    let text = object
        .value
        .as_ref()
        .and_then(render_value)
        .or_else(|| object.description.clone())
        // serde folds a JSON `null` value into `None`.
        .or_else(|| matches!(type_name.as_str(), "undefined" | "null").then(|| type_name.clone()));
    HandlePayload {
        handle: Some(handle),
        type_name: Some(type_name),
        text,
        class_name,
        properties: Vec::new(),
    }
}

/// Reduces a `getProperties` reply for `parent`.
///
/// Returns the parent's payload (now carrying property references) and one
/// payload per property value; callers seed the latter into the handle cache
/// so the expansion resolves without further round-trips.
pub fn reduce_properties(
    parent: &RemoteObject,
    data: &GetPropertiesData,
    handles: &mut WipHandleTable,
) -> (HandlePayload, Vec<HandlePayload>) {
    let mut parent_payload = reduce_remote_object(parent, handles);
    let mut children = Vec::with_capacity(data.result.len());
    for descriptor in &data.result {
        let child = match (&descriptor.value, descriptor.was_thrown) {
            (Some(value), Some(true)) => {
                let handle = handles.synthetic();
                HandlePayload::error(Some(handle), value.description.clone())
            }
            (Some(value), _) => reduce_remote_object(value, handles),
            // Accessor properties without a materialized value.
            (None, _) => continue,
        };
        let Some(handle) = child.handle else {
            continue;
        };
        parent_payload
            .properties
            .push(PropertyRef::new(descriptor.name.clone(), handle));
        children.push(child);
    }
    (parent_payload, children)
}

/// A thrown result reduces to an error payload carrying the exception text.
pub fn reduce_call_result(data: &CallFunctionOnData, handles: &mut WipHandleTable) -> HandlePayload {
    let payload = reduce_remote_object(&data.result, handles);
    if data.was_thrown.unwrap_or(false) {
        return HandlePayload::error(payload.handle, payload.text);
    }
    payload
}
