use std::collections::BTreeSet;
use std::sync::Arc;

use jsmirror::{
    wire::{mock::MockVm, v8},
    Resolution,
};
use proptest::prelude::*;

use super::support::*;

const PROPTEST_CASES: u32 = 128;

fn arb_name() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => "[a-z][a-z0-9_]{0,3}",
        3 => (0u32..40).prop_map(|index| index.to_string()),
        1 => prop::sample::select(vec!["", ".arguments", ".this"]).prop_map(str::to_string),
    ]
}

/// Property lists over a small handle range, so handles repeat, plus the
/// subset of that range already in the cache.
fn arb_object() -> impl Strategy<Value = (Vec<(String, u64)>, BTreeSet<u64>)> {
    (
        prop::collection::vec((arb_name(), 10u64..22), 1..16),
        prop::collection::btree_set(10u64..22, 0..12),
    )
}

fn is_hidden(name: &str) -> bool {
    name.is_empty() || name.starts_with('.')
}

fn expected_fqn(name: &str) -> String {
    if name.bytes().all(|b| b.is_ascii_digit()) {
        format!("a[{name}]")
    } else {
        format!("a.{name}")
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: PROPTEST_CASES, .. ProptestConfig::default() })]

    #[test]
    fn expansion_batches_exactly_the_uncached_handles((properties, cached) in arb_object()) {
        let vm = Arc::new(MockVm::new());
        for handle in 10u64..22 {
            vm.insert_handle(handle, number(handle, handle as i64));
        }
        let session = session(&vm);
        for &handle in &cached {
            let payload = v8::parse_handle_payload(&number(handle, handle as i64)).unwrap();
            session.handle_cache().put(handle, payload);
        }
        let refs: Vec<(&str, u64)> = properties
            .iter()
            .map(|(name, handle)| (name.as_str(), *handle))
            .collect();
        let (_frame, a) = single_variable_frame(&session, "a", object(1, "Object", &refs));

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| a.expand());
            }
        });

        let visible: Vec<&(String, u64)> =
            properties.iter().filter(|(name, _)| !is_hidden(name)).collect();
        let uncached: Vec<u64> = visible
            .iter()
            .map(|(_, handle)| *handle)
            .filter(|handle| !cached.contains(handle))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let calls = vm.lookup_calls();
        prop_assert!(calls.len() <= 1);
        if uncached.is_empty() {
            prop_assert!(calls.is_empty());
        } else {
            prop_assert_eq!(&calls, &vec![uncached]);
        }

        prop_assert_eq!(a.resolution(), Resolution::Resolved);
        let children = a.children();
        prop_assert_eq!(children.len(), visible.len());
        for (child, (name, handle)) in children.iter().zip(&visible) {
            prop_assert_eq!(child.property_name(), name.as_str());
            prop_assert_eq!(child.fully_qualified_name(), expected_fqn(name));
            prop_assert_eq!(child.resolution(), Resolution::Resolved);
            let text = child.value().and_then(|value| value.text().map(str::to_string));
            prop_assert_eq!(text, Some(handle.to_string()));
        }
    }
}
