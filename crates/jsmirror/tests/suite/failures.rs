use std::sync::Arc;

use jsmirror::{
    wire::{
        mock::{MockBehavior, MockVm},
        ChannelError,
    },
    MirrorError, Resolution, ValueType, ERROR_RETRIEVING_VALUE, MALFORMED_VALUE,
};
use serde_json::json;

use super::support::*;

#[test]
fn unsuccessful_batch_fails_every_awaited_child() {
    let vm = Arc::new(MockVm::new());
    vm.insert_handle(10, number(10, 1));
    vm.set_behavior(MockBehavior::Unsuccessful);
    let session = session(&vm);
    let (_frame, a) =
        single_variable_frame(&session, "a", object(1, "Object", &[("x", 10), ("y", 11)]));

    a.expand();

    assert_eq!(a.resolution(), Resolution::Failed);
    assert!(a.value().is_none());
    for name in ["x", "y"] {
        let node = child(&a, name);
        assert_eq!(node.resolution(), Resolution::Failed, "{name}");
        assert!(node.value().is_none());
    }
}

#[test]
fn cached_children_survive_a_failed_batch() {
    let vm = Arc::new(MockVm::new());
    vm.set_behavior(MockBehavior::TransportFailure);
    let session = session(&vm);
    session
        .handle_cache()
        .put(10, jsmirror::wire::v8::parse_handle_payload(&number(10, 9)).unwrap());
    let (_frame, a) =
        single_variable_frame(&session, "a", object(1, "Object", &[("x", 10), ("y", 11)]));

    a.expand();

    assert_eq!(vm.lookup_calls(), vec![vec![11]]);
    assert_eq!(a.resolution(), Resolution::Failed);
    assert_eq!(child(&a, "x").value().unwrap().text(), Some("9"));
    assert_eq!(child(&a, "y").resolution(), Resolution::Failed);
}

#[test]
fn synchronous_send_error_fails_the_expansion() {
    let vm = Arc::new(MockVm::new());
    vm.set_behavior(MockBehavior::SendError);
    let session = session(&vm);
    let (_frame, a) = single_variable_frame(&session, "a", object(1, "Object", &[("x", 10)]));

    a.expand();

    assert_eq!(a.resolution(), Resolution::Failed);
    assert_eq!(child(&a, "x").resolution(), Resolution::Failed);
}

#[test]
fn deferred_transport_failure_after_release() {
    let vm = Arc::new(MockVm::new());
    vm.set_behavior(MockBehavior::Defer);
    let session = async_session(&vm);
    let (_frame, a) = single_variable_frame(&session, "a", object(1, "Object", &[("x", 10)]));

    a.expand();
    assert_eq!(a.resolution(), Resolution::Pending);
    assert_eq!(vm.fail_deferred(ChannelError::ConnectionClosed), 1);

    assert_eq!(a.resolution(), Resolution::Failed);
    assert_eq!(child(&a, "x").resolution(), Resolution::Failed);
}

#[test]
fn own_handle_missing_from_reply_fails_the_node() {
    let vm = Arc::new(MockVm::new());
    let session = session(&vm);
    let (_frame, o) = single_variable_frame(
        &session,
        "o",
        json!({"ref": 1, "type": "object", "className": "Object"}),
    );

    o.expand();

    assert_eq!(vm.lookup_calls(), vec![vec![1]]);
    assert_eq!(o.resolution(), Resolution::Failed);
    assert!(o.value().is_none());
}

#[test]
fn per_handle_errors_render_as_strings() {
    let vm = Arc::new(MockVm::new());
    vm.insert_handle(
        10,
        json!({"handle": 10, "type": "error", "text": "ReferenceError: boom"}),
    );
    vm.insert_handle(11, json!({"handle": 11, "type": "error"}));
    vm.insert_handle(12, json!({"handle": 12}));
    let session = session(&vm);
    let (_frame, a) = single_variable_frame(
        &session,
        "a",
        object(1, "Object", &[("thrown", 10), ("silent", 11), ("odd", 12)]),
    );

    a.expand();

    assert_eq!(a.resolution(), Resolution::Resolved);
    let expected = [
        ("thrown", "ReferenceError: boom"),
        ("silent", ERROR_RETRIEVING_VALUE),
        ("odd", MALFORMED_VALUE),
    ];
    for (name, text) in expected {
        let value = child(&a, name).value().unwrap();
        assert_eq!(value.value_type(), ValueType::String, "{name}");
        assert_eq!(value.text(), Some(text), "{name}");
    }
}

#[test]
fn textless_scalar_in_lookup_reply_renders_error_marker() {
    let vm = Arc::new(MockVm::new());
    vm.insert_handle(10, json!({"handle": 10, "type": "number"}));
    vm.insert_handle(11, number(11, 4));
    let session = session(&vm);
    let (_frame, a) =
        single_variable_frame(&session, "a", object(1, "Object", &[("n", 10), ("m", 11)]));

    a.expand();

    let n = child(&a, "n");
    assert_eq!(n.resolution(), Resolution::Resolved);
    let value = n.value().unwrap();
    assert_eq!(value.value_type(), ValueType::String);
    assert_eq!(value.text(), Some(MALFORMED_VALUE));
    assert_eq!(child(&a, "m").value().unwrap().text(), Some("4"));
}

#[test]
fn resume_before_reply_discards_the_reply() {
    let vm = Arc::new(MockVm::new());
    vm.insert_handle(10, number(10, 1));
    vm.set_behavior(MockBehavior::Defer);
    let session = async_session(&vm);
    let (frame, a) = single_variable_frame(&session, "a", object(1, "Object", &[("x", 10)]));

    a.expand();
    session.resumed();
    assert_eq!(vm.release_deferred(), 1);

    assert!(session.handle_cache().is_empty());
    assert!(!frame.is_valid());
    assert!(!a.is_valid());
    assert_eq!(a.resolution(), Resolution::Pending);
    assert_eq!(child(&a, "x").resolution(), Resolution::Unresolved);
    assert!(matches!(
        frame.ensure_variables(),
        Err(MirrorError::StaleSuspension)
    ));
}

#[test]
fn reply_after_frame_is_dropped_is_harmless() {
    let vm = Arc::new(MockVm::new());
    vm.insert_handle(10, number(10, 1));
    vm.set_behavior(MockBehavior::Defer);
    let session = async_session(&vm);
    {
        let (_frame, a) = single_variable_frame(&session, "a", object(1, "Object", &[("x", 10)]));
        a.expand();
    }
    session.resumed();
    assert_eq!(vm.release_deferred(), 1);
    assert!(session.frames().is_empty());
}
