use std::collections::HashMap;
use std::sync::Arc;

use jsmirror_wire::{Handle, HandlePayload};
use parking_lot::RwLock;

#[derive(Default)]
struct Entries {
    generation: u64,
    payloads: HashMap<Handle, Arc<HandlePayload>>,
}

/// Session-scoped map from handle to the last payload the VM reported for it.
///
/// Handles are only meaningful for one suspension. [`HandleCache::invalidate_all`]
/// drops every entry and bumps the generation; writers that captured an older
/// generation are refused by [`HandleCache::put_if_current`].
#[derive(Default)]
pub struct HandleCache {
    entries: RwLock<Entries>,
}

impl HandleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, handle: Handle) -> Option<Arc<HandlePayload>> {
        self.entries.read().payloads.get(&handle).cloned()
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.entries.read().payloads.contains_key(&handle)
    }

    /// Stores `payload` under `handle`, replacing any earlier entry.
    pub fn put(&self, handle: Handle, payload: HandlePayload) -> Arc<HandlePayload> {
        let payload = Arc::new(payload);
        self.entries
            .write()
            .payloads
            .insert(handle, payload.clone());
        payload
    }

    /// Like [`HandleCache::put`], but only while `generation` is still current.
    ///
    /// Returns `None` (and stores nothing) for a reply that outlived its
    /// suspension.
    pub fn put_if_current(
        &self,
        generation: u64,
        handle: Handle,
        payload: HandlePayload,
    ) -> Option<Arc<HandlePayload>> {
        let mut entries = self.entries.write();
        if entries.generation != generation {
            return None;
        }
        let payload = Arc::new(payload);
        entries.payloads.insert(handle, payload.clone());
        Some(payload)
    }

    /// Bulk insert of side-channel payloads (V8 `refs`, WIP inline values).
    ///
    /// Payloads without a handle are skipped. Returns the number stored.
    pub fn seed(&self, generation: u64, payloads: impl IntoIterator<Item = HandlePayload>) -> usize {
        let mut entries = self.entries.write();
        if entries.generation != generation {
            return 0;
        }
        let mut stored = 0;
        for payload in payloads {
            if let Some(handle) = payload.handle {
                entries.payloads.insert(handle, Arc::new(payload));
                stored += 1;
            }
        }
        stored
    }

    pub fn invalidate_all(&self) {
        let mut entries = self.entries.write();
        entries.generation += 1;
        entries.payloads.clear();
        tracing::debug!(
            target: "jsmirror.session",
            generation = entries.generation,
            "handle cache invalidated"
        );
    }

    pub fn generation(&self) -> u64 {
        self.entries.read().generation
    }

    pub fn len(&self) -> usize {
        self.entries.read().payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().payloads.is_empty()
    }
}
