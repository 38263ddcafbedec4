//! V8 debugger protocol payloads.
//!
//! Handle payloads use short field tags (`handle`, `type`, `className`,
//! `text`, `value`, `properties`, `ref`). Lookup replies key their body by
//! the decimal handle.

use std::collections::HashMap;

use serde_json::Value;

use crate::{
    request::Envelope,
    types::{HandlePayload, PropertyRef, Result},
    Handle, WireError,
};

pub const REF_HANDLE: &str = "handle";
pub const REF_REF: &str = "ref";
pub const REF_TYPE: &str = "type";
pub const REF_CLASSNAME: &str = "className";
pub const REF_TEXT: &str = "text";
pub const REF_VALUE: &str = "value";
pub const REF_PROPERTIES: &str = "properties";
pub const REF_PROP_NAME: &str = "name";

fn as_handle(value: Option<&Value>) -> Option<Handle> {
    match value? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn as_string(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(str::to_string)
}

/// Renders a V8 `value` field the way a debugger UI displays it.
fn render_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some("null".to_string()),
        _ => None,
    }
}

/// Property names are usually strings, but V8 reports array indices as numbers.
fn property_name(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn extract_object_properties(object: &Value) -> Vec<PropertyRef> {
    let Some(props) = object.get(REF_PROPERTIES).and_then(Value::as_array) else {
        return Vec::new();
    };
    props
        .iter()
        .filter_map(|prop| {
            let name = property_name(prop.get(REF_PROP_NAME))?;
            let handle = as_handle(prop.get(REF_REF))?;
            Some(PropertyRef { name, handle })
        })
        .collect()
}

/// Reduces one handle object (a lookup entry, a `refs` entry or an inlined
/// value) to a [`HandlePayload`].
pub fn parse_handle_payload(object: &Value) -> Option<HandlePayload> {
    if !object.is_object() {
        return None;
    }
    let type_name = as_string(object.get(REF_TYPE));
    let text = as_string(object.get(REF_TEXT)).or_else(|| {
        object.get(REF_VALUE).and_then(render_scalar).or_else(|| {
            // `undefined` and `null` may carry neither `text` nor `value`.
            type_name
                .clone()
                .filter(|ty| matches!(ty.as_str(), "undefined" | "null"))
        })
    });
    Some(HandlePayload {
        handle: as_handle(object.get(REF_HANDLE)).or_else(|| as_handle(object.get(REF_REF))),
        type_name,
        text,
        class_name: as_string(object.get(REF_CLASSNAME)),
        properties: extract_object_properties(object),
    })
}

pub fn parse_refs(refs: &[Value]) -> Vec<HandlePayload> {
    refs.iter().filter_map(parse_handle_payload).collect()
}

/// A decoded `lookup` response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LookupReply {
    pub success: bool,
    pub message: Option<String>,
    pub payloads: HashMap<Handle, HandlePayload>,
}

impl LookupReply {
    pub fn from_envelope(envelope: &Envelope) -> Self {
        if !envelope.is_successful() {
            return Self {
                success: false,
                message: envelope.message.clone(),
                payloads: HashMap::new(),
            };
        }

        let mut payloads = HashMap::new();
        if let Some(body) = envelope.body.as_ref().and_then(Value::as_object) {
            for (key, object) in body {
                let Ok(handle) = key.parse::<Handle>() else {
                    continue;
                };
                if let Some(mut payload) = parse_handle_payload(object) {
                    payload.handle.get_or_insert(handle);
                    payloads.insert(handle, payload);
                }
            }
        }
        Self {
            success: true,
            message: None,
            payloads,
        }
    }

    pub fn get(&self, handle: Handle) -> Option<&HandlePayload> {
        self.payloads.get(&handle)
    }
}

/// One named binding reported in a backtrace frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameVariable {
    pub name: String,
    pub value: HandlePayload,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktraceFrame {
    pub index: u32,
    pub function_name: String,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub source_line: Option<String>,
    pub arguments: Vec<FrameVariable>,
    pub locals: Vec<FrameVariable>,
}

fn frame_variables(frame: &Value, key: &str) -> Vec<FrameVariable> {
    let Some(entries) = frame.get(key).and_then(Value::as_array) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let name = as_string(entry.get("name"))?;
            let value = entry
                .get("value")
                .and_then(parse_handle_payload)
                .unwrap_or_default();
            Some(FrameVariable { name, value })
        })
        .collect()
}

fn function_name(frame: &Value) -> String {
    let func = frame.get("func");
    func.and_then(|f| as_string(f.get("name")))
        .filter(|name| !name.is_empty())
        .or_else(|| func.and_then(|f| as_string(f.get("inferredName"))))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "<anonymous>".to_string())
}

/// Decodes a `backtrace` response body.
pub fn parse_backtrace(body: &Value) -> Result<Vec<BacktraceFrame>> {
    let Some(frames) = body.get("frames") else {
        // V8 omits `frames` entirely when the stack is empty.
        return Ok(Vec::new());
    };
    let frames = frames
        .as_array()
        .ok_or_else(|| WireError::Protocol("backtrace `frames` is not an array".to_string()))?;

    Ok(frames
        .iter()
        .enumerate()
        .map(|(pos, frame)| BacktraceFrame {
            index: frame
                .get("index")
                .and_then(Value::as_u64)
                .map(|i| i as u32)
                .unwrap_or(pos as u32),
            function_name: function_name(frame),
            line: frame.get("line").and_then(Value::as_u64).map(|l| l as u32),
            column: frame.get("column").and_then(Value::as_u64).map(|c| c as u32),
            source_line: as_string(frame.get("sourceLineText")),
            arguments: frame_variables(frame, "arguments"),
            locals: frame_variables(frame, "locals"),
        })
        .collect())
}
