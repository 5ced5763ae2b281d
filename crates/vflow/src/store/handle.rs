// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reference-holding handles into the object store.

use super::{ObjectStore, StoredValue};
use crate::array::ArrayData;
use crate::object::ObjectData;
use std::sync::Arc;

/// Arena slot address: index plus the generation the slot had when allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

/// Detached reference encoded as `generation << 32 | index`.
///
/// Owns one reference count until it is passed to [`ObjectStore::adopt`].
pub type RawRef = u64;

impl SlotId {
    pub(crate) fn to_raw(self) -> RawRef {
        (u64::from(self.generation) << 32) | u64::from(self.index)
    }

    pub(crate) fn from_raw(raw: RawRef) -> Self {
        Self {
            index: (raw & 0xFFFF_FFFF) as u32,
            generation: (raw >> 32) as u32,
        }
    }
}

/// One counted reference on a store entry.
pub struct Handle {
    store: ObjectStore,
    id: SlotId,
    name: String,
}

impl Handle {
    pub(super) fn from_parts(store: ObjectStore, id: SlotId, name: String) -> Self {
        Self { store, id, name }
    }

    /// Name of the referenced entry.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn id(&self) -> SlotId {
        self.id
    }

    /// Store this handle belongs to.
    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    /// Current reference count of the entry.
    pub fn refcount(&self) -> u32 {
        self.store.refcount_of(self.id)
    }

    pub fn is_object(&self) -> bool {
        matches!(self.store.value(self.id), Some(StoredValue::Object(_)))
    }

    pub fn is_array(&self) -> bool {
        matches!(self.store.value(self.id), Some(StoredValue::Array(_)))
    }

    pub fn object(&self) -> Option<Arc<ObjectData>> {
        match self.store.value(self.id)? {
            StoredValue::Object(o) => Some(o),
            StoredValue::Array(_) => None,
        }
    }

    pub fn array(&self) -> Option<Arc<ArrayData>> {
        match self.store.value(self.id)? {
            StoredValue::Array(a) => Some(a),
            StoredValue::Object(_) => None,
        }
    }

    /// Detach the reference from this handle without releasing it.
    pub fn into_raw(self) -> RawRef {
        // The extra acquire is balanced by the release in `drop(self)`.
        self.store.acquire(self.id);
        self.id.to_raw()
    }

    /// Whether both handles reference the same entry.
    pub fn same_entry(&self, other: &Handle) -> bool {
        self.id == other.id && self.store.same_store(&other.store)
    }
}

impl Clone for Handle {
    fn clone(&self) -> Self {
        self.store.acquire(self.id);
        Self {
            store: self.store.clone(),
            id: self.id,
            name: self.name.clone(),
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.store.release(self.id);
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("name", &self.name)
            .field("slot", &self.id)
            .finish()
    }
}
