use jsmirror_wire::{Handle, HandlePayload, PropertyRef, ValueType};

/// Text shown for a property the VM could not evaluate and gave no reason for.
pub const ERROR_RETRIEVING_VALUE: &str = "An error occurred while retrieving the value.";

/// Text shown for a payload that carries no usable type.
pub const MALFORMED_VALUE: &str = "<Error>";

/// Everything known about one remote value.
///
/// A mirror starts out with only a name and (usually) a handle. Replies fill
/// in the type and text; compound values additionally learn their property
/// references once expanded.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValueMirror {
    name: String,
    handle: Option<Handle>,
    value_type: Option<ValueType>,
    text: Option<String>,
    class_name: Option<String>,
    properties: Option<Vec<PropertyRef>>,
}

impl ValueMirror {
    pub fn new(name: impl Into<String>, handle: Option<Handle>) -> Self {
        Self {
            name: name.into(),
            handle,
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> Option<Handle> {
        self.handle
    }

    pub fn value_type(&self) -> Option<ValueType> {
        self.value_type
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn class_name(&self) -> Option<&str> {
        self.class_name.as_deref()
    }

    /// Property references, present only once an expansion delivered them.
    pub fn properties(&self) -> Option<&[PropertyRef]> {
        self.properties.as_deref()
    }

    fn is_scalar(&self) -> bool {
        self.value_type.is_some_and(|ty| !ty.is_compound())
    }

    pub fn set_type(&mut self, value_type: ValueType) {
        self.value_type = Some(value_type);
    }

    /// No-op while the mirror is typed as a compound value.
    pub fn set_value(&mut self, text: impl Into<String>) {
        if self.value_type.is_some_and(ValueType::is_compound) {
            return;
        }
        self.text = Some(text.into());
    }

    /// Ignored on scalar mirrors.
    pub fn set_properties(&mut self, class_name: Option<String>, properties: Vec<PropertyRef>) {
        if self.is_scalar() {
            return;
        }
        self.class_name = class_name;
        self.properties = Some(properties);
    }

    /// Applies one payload.
    ///
    /// With `include_properties` unset, a compound payload only contributes
    /// its type and class name. An empty property list is not recorded: it is
    /// indistinguishable from a payload that did not enumerate properties.
    pub(crate) fn fill(&mut self, payload: &HandlePayload, include_properties: bool) {
        if self.handle.is_none() {
            self.handle = payload.handle;
        }

        if payload.is_error() {
            self.set_type(ValueType::String);
            self.set_value(
                payload
                    .text
                    .clone()
                    .unwrap_or_else(|| ERROR_RETRIEVING_VALUE.to_string()),
            );
            return;
        }

        match payload.value_type() {
            Some(ty) if ty.is_compound() => {
                self.set_type(ty);
                self.class_name = payload.class_name.clone();
                if include_properties && !payload.properties.is_empty() {
                    self.set_properties(payload.class_name.clone(), payload.properties.clone());
                }
            }
            Some(ty) if payload.text.is_some() => {
                self.set_type(ty);
                self.set_value(payload.text.clone().unwrap_or_default());
            }
            // Scalars need display text; without it the payload is unusable.
            _ => {
                self.set_type(ValueType::String);
                self.set_value(MALFORMED_VALUE);
            }
        }
    }
}
