use std::io;

use thiserror::Error;

use crate::Handle;

pub type Result<T> = std::result::Result<T, WireError>;

#[derive(Debug, Error)]
pub enum WireError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("V8 protocol error: {0}")]
    Protocol(String),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("timed out waiting for VM")]
    Timeout,
    #[error("request cancelled")]
    Cancelled,
    #[error("message of {size} bytes exceeds maximum allowed size {max}")]
    MessageTooLarge { size: usize, max: usize },
}

/// Declared type of a remote value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    Number,
    String,
    Boolean,
    Undefined,
    Null,
    Date,
    Object,
    Array,
    Function,
    Error,
    Unknown,
}

impl ValueType {
    /// Maps a V8 `type` tag plus optional `className` onto a [`ValueType`].
    ///
    /// Returns `None` when the VM did not report a type at all. The `"error"`
    /// tag is a per-handle failure marker, not a value type; callers check
    /// [`HandlePayload::is_error`] before getting here.
    pub fn from_json_type_and_class_name(
        type_name: Option<&str>,
        class_name: Option<&str>,
    ) -> Option<Self> {
        let ty = match type_name? {
            "number" => ValueType::Number,
            "string" => ValueType::String,
            "boolean" => ValueType::Boolean,
            "undefined" => ValueType::Undefined,
            "null" => ValueType::Null,
            "function" => ValueType::Function,
            "regexp" => ValueType::Object,
            "object" => match class_name {
                Some("Date") => ValueType::Date,
                Some("Array") => ValueType::Array,
                Some("Error") => ValueType::Error,
                _ => ValueType::Object,
            },
            _ => ValueType::Unknown,
        };
        Some(ty)
    }

    /// Compound values are expanded through property lookups instead of
    /// being rendered as text.
    pub fn is_compound(self) -> bool {
        matches!(
            self,
            ValueType::Object | ValueType::Array | ValueType::Function | ValueType::Error
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ValueType::Number => "number",
            ValueType::String => "string",
            ValueType::Boolean => "boolean",
            ValueType::Undefined => "undefined",
            ValueType::Null => "null",
            ValueType::Date => "date",
            ValueType::Object => "object",
            ValueType::Array => "array",
            ValueType::Function => "function",
            ValueType::Error => "error",
            ValueType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One property of a compound value as enumerated by the VM.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PropertyRef {
    pub name: String,
    pub handle: Handle,
}

impl PropertyRef {
    pub fn new(name: impl Into<String>, handle: Handle) -> Self {
        Self {
            name: name.into(),
            handle,
        }
    }
}

/// Dialect-independent description of one handle's referent.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HandlePayload {
    pub handle: Option<Handle>,
    /// Raw protocol type tag (`"number"`, `"object"`, `"error"`, ...).
    pub type_name: Option<String>,
    pub text: Option<String>,
    pub class_name: Option<String>,
    pub properties: Vec<PropertyRef>,
}

impl HandlePayload {
    pub fn is_error(&self) -> bool {
        self.type_name.as_deref() == Some("error")
    }

    pub fn value_type(&self) -> Option<ValueType> {
        ValueType::from_json_type_and_class_name(
            self.type_name.as_deref(),
            self.class_name.as_deref(),
        )
    }

    pub fn error(handle: Option<Handle>, message: Option<String>) -> Self {
        Self {
            handle,
            type_name: Some("error".to_string()),
            text: message,
            ..Self::default()
        }
    }
}
