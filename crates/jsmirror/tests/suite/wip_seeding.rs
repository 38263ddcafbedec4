use std::sync::Arc;

use jsmirror::{
    wire::{
        mock::MockVm,
        wip::{CallFunctionOnData, GetPropertiesData, RemoteObject},
    },
    Resolution, ValueType,
};
use serde_json::json;

use super::support::*;

fn remote(value: serde_json::Value) -> RemoteObject {
    serde_json::from_value(value).unwrap()
}

#[test]
fn absorbed_properties_expand_without_lookups() {
    let vm = Arc::new(MockVm::new());
    let session = session(&vm);
    let point = remote(json!({
        "type": "object",
        "className": "Point",
        "description": "Point",
        "objectId": "{\"injectedScriptId\":1,\"id\":7}"
    }));
    let data: GetPropertiesData = serde_json::from_value(json!({
        "result": [
            {"name": "x", "value": {"type": "number", "value": 1, "description": "1"}},
            {"name": "label", "value": {"type": "string", "value": "origin"}},
            {"name": "next", "value": {"type": "object", "subtype": "null", "value": null}}
        ]
    }))
    .unwrap();

    let handle = session.absorb_wip_properties(&point, &data);
    let binding = session.wip_variable("p", &point);
    assert_eq!(binding.value.handle, handle);

    let frame = session.create_frame(0, "main", &[binding]);
    let p = frame.variable("p").unwrap();
    p.expand();

    assert_eq!(vm.lookup_count(), 0);
    assert_eq!(p.resolution(), Resolution::Resolved);
    assert_eq!(child(&p, "x").value().unwrap().text(), Some("1"));
    assert_eq!(child(&p, "label").value().unwrap().text(), Some("origin"));
    let next = child(&p, "next").value().unwrap();
    assert_eq!(next.value_type(), ValueType::Null);
}

#[test]
fn thrown_call_result_is_an_error_string() {
    let vm = Arc::new(MockVm::new());
    let session = session(&vm);
    let data: CallFunctionOnData = serde_json::from_value(json!({
        "result": {"type": "object", "className": "TypeError",
                   "description": "TypeError: x is undefined", "objectId": "e1"},
        "wasThrown": true
    }))
    .unwrap();

    let binding = session.wip_call_result("result", &data);
    let frame = session.create_frame(0, "eval", &[binding]);
    let result = frame.variable("result").unwrap();

    let value = result.value().unwrap();
    assert_eq!(value.value_type(), ValueType::String);
    assert_eq!(value.text(), Some("TypeError: x is undefined"));
}

#[test]
fn object_ids_do_not_survive_resume() {
    let vm = Arc::new(MockVm::new());
    let session = session(&vm);
    let object = remote(json!({"type": "object", "objectId": "o-1"}));

    let before = session.wip_variable("o", &object).value.handle;
    session.resumed();
    let after = session.wip_variable("o", &object).value.handle;

    assert!(before.is_some());
    assert_ne!(before, after, "a new suspension must not reuse old handles");
}
