use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::Handle;

/// A V8 debugger protocol message (request, response or event).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub seq: u64,
    #[serde(rename = "type", default)]
    pub message_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_seq: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refs: Option<Vec<Value>>,
}

impl Envelope {
    pub fn is_response(&self) -> bool {
        self.message_type == "response"
    }

    pub fn is_event(&self) -> bool {
        self.message_type == "event"
    }

    /// A response without an explicit `success: true` is treated as failed.
    pub fn is_successful(&self) -> bool {
        self.success.unwrap_or(false)
    }

    pub fn response(request_seq: u64, command: &str, success: bool, body: Option<Value>) -> Self {
        Self {
            message_type: "response".to_string(),
            command: Some(command.to_string()),
            request_seq: Some(request_seq),
            success: Some(success),
            running: Some(false),
            body,
            ..Self::default()
        }
    }
}

/// Debugger commands this client issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Batched handle lookup.
    Lookup {
        handles: Vec<Handle>,
        inline_refs: bool,
    },
    Backtrace {
        from_frame: u32,
        to_frame: u32,
        inline_refs: bool,
    },
    Continue,
}

impl Request {
    pub fn lookup(handles: impl IntoIterator<Item = Handle>, inline_refs: bool) -> Self {
        Request::Lookup {
            handles: handles.into_iter().collect(),
            inline_refs,
        }
    }

    pub fn command(&self) -> &'static str {
        match self {
            Request::Lookup { .. } => "lookup",
            Request::Backtrace { .. } => "backtrace",
            Request::Continue => "continue",
        }
    }

    pub fn arguments(&self) -> Option<Value> {
        match self {
            Request::Lookup {
                handles,
                inline_refs,
            } => Some(json!({
                "handles": handles,
                "includeSource": false,
                "inlineRefs": inline_refs,
            })),
            Request::Backtrace {
                from_frame,
                to_frame,
                inline_refs,
            } => Some(json!({
                "fromFrame": from_frame,
                "toFrame": to_frame,
                "inlineRefs": inline_refs,
            })),
            Request::Continue => None,
        }
    }

    pub fn lookup_handles(&self) -> Option<&[Handle]> {
        match self {
            Request::Lookup { handles, .. } => Some(handles),
            _ => None,
        }
    }

    pub fn to_envelope(&self, seq: u64) -> Envelope {
        Envelope {
            seq,
            message_type: "request".to_string(),
            command: Some(self.command().to_string()),
            arguments: self.arguments(),
            ..Envelope::default()
        }
    }
}
