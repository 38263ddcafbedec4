use std::sync::Arc;

use jsmirror::{
    wire::mock::{MockBehavior, MockVm},
    JsValue, Resolution, ValueType,
};
use serde_json::json;

use super::support::*;

#[test]
fn concurrent_expands_issue_one_lookup() {
    let vm = Arc::new(MockVm::new());
    vm.insert_handle(10, number(10, 1));
    vm.insert_handle(11, string(11, "two"));
    vm.set_behavior(MockBehavior::Defer);
    let session = async_session(&vm);
    let (_frame, a) =
        single_variable_frame(&session, "a", object(1, "Object", &[("x", 10), ("y", 11)]));

    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| a.expand());
        }
    });

    assert_eq!(vm.lookup_count(), 1);
    assert_eq!(vm.lookup_calls(), vec![vec![10, 11]]);
    assert_eq!(a.resolution(), Resolution::Pending);

    assert_eq!(vm.release_deferred(), 1);
    assert_eq!(a.resolution(), Resolution::Resolved);
    assert_eq!(child(&a, "x").value().unwrap().text(), Some("1"));
    assert_eq!(child(&a, "y").value().unwrap().text(), Some("two"));

    a.expand();
    assert_eq!(vm.lookup_count(), 1);
}

#[test]
fn cached_properties_resolve_without_round_trips() {
    let vm = Arc::new(MockVm::new());
    let session = session(&vm);
    let body = json!({
        "frames": [{
            "index": 0,
            "func": {"name": "main"},
            "locals": [{"name": "a", "value": {"ref": 1, "type": "object", "className": "Object"}}]
        }]
    });
    let refs = vec![
        object(1, "Object", &[("x", 10), ("y", 11)]),
        number(10, 7),
        string(11, "seven"),
    ];
    let frames = session.materialize_backtrace(&body, &refs).unwrap();
    let a = frames[0].variable("a").unwrap();

    a.expand();

    assert_eq!(vm.lookup_count(), 0);
    assert_eq!(a.resolution(), Resolution::Resolved);
    let value = a.value().unwrap();
    assert_eq!(value.class_name(), Some("Object"));
    assert_eq!(value.property("x").unwrap().value().unwrap().text(), Some("7"));
    assert_eq!(
        value.property("y").unwrap().resolution(),
        Resolution::Resolved
    );
}

#[test]
fn child_names_follow_index_and_dot_notation() {
    let vm = Arc::new(MockVm::new());
    vm.insert_handle(2, object(2, "Object", &[("3", 20), ("x", 21)]));
    vm.insert_handle(20, number(20, 3));
    vm.insert_handle(21, number(21, 4));
    let session = session(&vm);
    let (_frame, a) = single_variable_frame(&session, "a", object(1, "Object", &[("b", 2)]));

    a.expand();
    let b = child(&a, "b");
    assert_eq!(b.fully_qualified_name(), "a.b");
    assert_eq!(b.declared_type(), Some(ValueType::Object));
    // The first fill of a drilled child records no property references.
    assert!(b.mirror().properties().is_none());
    assert_eq!(b.resolution(), Resolution::Unresolved);

    b.expand();
    let names: Vec<_> = b
        .children()
        .iter()
        .map(|c| (c.name(), c.fully_qualified_name().to_string()))
        .collect();
    assert_eq!(
        names,
        vec![
            ("[3]".to_string(), "a.b[3]".to_string()),
            ("x".to_string(), "a.b.x".to_string()),
        ]
    );
    // `b` expanded from its cached payload: no lookup for handle 2 itself.
    assert_eq!(vm.lookups_for(2), 1);
    assert_eq!(vm.lookup_calls(), vec![vec![2], vec![20, 21]]);
}

#[test]
fn missing_payloads_leave_children_unresolved() {
    let vm = Arc::new(MockVm::new());
    vm.insert_handle(10, number(10, 42));
    let session = session(&vm);
    let (_frame, arr) =
        single_variable_frame(&session, "arr", object(1, "Array", &[("len", 5), ("0", 10)]));

    arr.expand();

    let Some(JsValue::Array { elements, .. }) = arr.value() else {
        panic!("expected an array view, got {:?}", arr.value());
    };
    assert_eq!(elements.len(), 2);
    let first = child(&arr, "0");
    assert_eq!(first.name(), "[0]");
    assert_eq!(first.resolution(), Resolution::Resolved);
    let value = first.value().unwrap();
    assert_eq!(value.value_type(), ValueType::Number);
    assert_eq!(value.text(), Some("42"));

    let len = child(&arr, "len");
    assert_eq!(len.resolution(), Resolution::Unresolved);
    assert!(len.value().is_none());
    assert_eq!(arr.resolution(), Resolution::Resolved);
}

#[test]
fn hidden_properties_produce_no_children() {
    let vm = Arc::new(MockVm::new());
    vm.insert_handle(10, number(10, 1));
    let session = session(&vm);
    let (_frame, a) = single_variable_frame(
        &session,
        "a",
        object(1, "Object", &[("", 7), (".arguments", 8), ("x", 10)]),
    );

    a.expand();

    let children = a.children();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].fully_qualified_name(), "a.x");
    assert_eq!(vm.lookup_calls(), vec![vec![10]]);
    assert_eq!(children[0].value().unwrap().text(), Some("1"));
}

#[test]
fn shared_handles_are_requested_once() {
    let vm = Arc::new(MockVm::new());
    vm.insert_handle(10, string(10, "same"));
    let session = session(&vm);
    let (_frame, a) =
        single_variable_frame(&session, "a", object(1, "Object", &[("p", 10), ("q", 10)]));

    a.expand();

    assert_eq!(vm.lookup_calls(), vec![vec![10]]);
    assert_eq!(child(&a, "p").value().unwrap().text(), Some("same"));
    assert_eq!(child(&a, "q").value().unwrap().text(), Some("same"));
}

#[test]
fn reference_only_object_looks_up_its_own_handle() {
    let vm = Arc::new(MockVm::new());
    vm.insert_handle(1, object(1, "Point", &[("x", 10)]));
    vm.insert_handle(10, number(10, 3));
    let session = session(&vm);
    let (_frame, p) = single_variable_frame(
        &session,
        "p",
        json!({"ref": 1, "type": "object", "className": "Point"}),
    );
    assert_eq!(p.class_name().as_deref(), Some("Point"));
    assert!(p.value().is_none());

    p.expand();

    assert_eq!(vm.lookup_calls(), vec![vec![1], vec![10]]);
    assert_eq!(p.resolution(), Resolution::Resolved);
    assert_eq!(child(&p, "x").value().unwrap().text(), Some("3"));
}

#[test]
fn empty_object_resolves_with_no_children() {
    let vm = Arc::new(MockVm::new());
    vm.insert_handle(1, object(1, "Object", &[]));
    let session = session(&vm);
    let (_frame, o) = single_variable_frame(
        &session,
        "o",
        json!({"ref": 1, "type": "object", "className": "Object"}),
    );

    o.expand();

    assert_eq!(o.resolution(), Resolution::Resolved);
    assert!(o.children().is_empty());
    assert_eq!(vm.lookup_count(), 1);
}

#[test]
fn functions_expand_like_objects() {
    let vm = Arc::new(MockVm::new());
    vm.insert_handle(10, string(10, "f"));
    let session = session(&vm);
    let (_frame, f) = single_variable_frame(
        &session,
        "f",
        json!({"handle": 1, "type": "function", "className": "Function",
               "properties": [{"name": "name", "ref": 10}]}),
    );

    f.expand();

    let value = f.value().unwrap();
    assert_eq!(value.value_type(), ValueType::Function);
    assert_eq!(value.property("name").unwrap().value().unwrap().text(), Some("f"));
}

#[test]
fn scalars_ignore_expand_and_reject_writes() {
    let vm = Arc::new(MockVm::new());
    let session = session(&vm);
    let (_frame, n) = single_variable_frame(&session, "n", number(3, 5));

    n.expand();

    assert_eq!(vm.lookup_count(), 0);
    assert_eq!(n.value().unwrap().text(), Some("5"));
    assert!(n.set_value("6").is_err());
    assert_eq!(n.value().unwrap().text(), Some("5"));
}

mod over_dispatcher {
    use std::sync::mpsc;
    use std::time::Duration;

    use jsmirror::{
        wire::{codec, ChannelError, Dispatcher, DispatcherConfig, Envelope, FrameSink, SendMode},
        DebugSession, ResolverOptions,
    };

    use super::*;

    struct QueueSink(mpsc::Sender<Vec<u8>>);

    impl FrameSink for QueueSink {
        fn send_frame(&self, frame: Vec<u8>) -> Result<(), ChannelError> {
            self.0
                .send(frame)
                .map_err(|_| ChannelError::ConnectionClosed)
        }
    }

    /// Decodes each request frame (skipping the header) and answers lookups
    /// on a separate thread, the way a receive loop would.
    fn spawn_responder(dispatcher: Arc<Dispatcher>, frames: mpsc::Receiver<Vec<u8>>) {
        std::thread::spawn(move || {
            for frame in frames {
                let split = frame.windows(4).position(|w| w == b"\r\n\r\n").unwrap();
                let request = codec::decode_envelope(&frame[split + 4..]).unwrap();
                let handles = request.arguments.unwrap()["handles"].clone();
                let mut body = serde_json::Map::new();
                for handle in handles.as_array().unwrap() {
                    let handle = handle.as_u64().unwrap();
                    body.insert(handle.to_string(), number(handle, handle as i64 * 10));
                }
                let reply = Envelope::response(request.seq, "lookup", true, Some(body.into()));
                dispatcher.handle_message(reply);
            }
        });
    }

    #[test]
    fn replies_arrive_on_the_receive_thread() {
        for send_mode in [SendMode::Sync, SendMode::Async] {
            let (tx, rx) = mpsc::channel();
            let dispatcher = Arc::new(Dispatcher::new(
                Box::new(QueueSink(tx)),
                DispatcherConfig {
                    reply_timeout: Duration::from_secs(5),
                },
            ));
            spawn_responder(dispatcher.clone(), rx);
            let session = DebugSession::new(
                dispatcher.clone(),
                ResolverOptions {
                    send_mode,
                    ..ResolverOptions::default()
                },
            );
            let (_frame, a) = single_variable_frame(
                &session,
                "a",
                object(1, "Object", &[("x", 4), ("y", 5)]),
            );

            a.expand();
            if send_mode == SendMode::Async {
                let deadline = std::time::Instant::now() + Duration::from_secs(5);
                while a.resolution() != Resolution::Resolved {
                    assert!(std::time::Instant::now() < deadline, "reply never landed");
                    std::thread::sleep(Duration::from_millis(5));
                }
            }

            assert_eq!(a.resolution(), Resolution::Resolved, "{send_mode:?}");
            assert_eq!(child(&a, "x").value().unwrap().text(), Some("40"));
            assert_eq!(child(&a, "y").value().unwrap().text(), Some("50"));
            assert_eq!(dispatcher.pending_len(), 0);
        }
    }
}
