// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reference-counted object store.
//!
//! Every object and array lives in a generation-checked arena slot and is
//! reachable by its process-unique name. References are only ever taken and
//! dropped through [`Handle`]:
//!
//! - `Handle::clone` acquires one reference
//! - dropping a `Handle` releases one reference
//! - the entry (and the references it holds on its children) is destroyed when
//!   the count reaches zero
//!
//! A reference that has to cross a fixed-size control message is detached with
//! [`Handle::into_raw`] and picked up on the other side with
//! [`ObjectStore::adopt`], which checks the slot generation so a stale id can
//! never resurrect a recycled slot.
//!
//! ```text
//!   names: HashMap<String, SlotId>
//!        |
//!        v
//!   slots: [ gen 3 | Entry{refcount 2, Object, children[..]} ]
//!          [ gen 1 | free ]
//!          [ gen 7 | Entry{refcount 1, Array} ]
//! ```

mod handle;

pub use handle::{Handle, RawRef, SlotId};

use crate::array::ArrayData;
use crate::error::{Error, Result};
use crate::object::ObjectData;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Payload held by a store entry.
#[derive(Debug, Clone)]
pub enum StoredValue {
    Object(Arc<ObjectData>),
    Array(Arc<ArrayData>),
}

struct Entry {
    name: String,
    refcount: u32,
    value: StoredValue,
    /// References this entry holds on the entries it depends on.
    children: Vec<Handle>,
}

#[derive(Default)]
struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

#[derive(Default)]
struct StoreInner {
    slots: Vec<Slot>,
    free: Vec<u32>,
    names: HashMap<String, SlotId>,
    counter: u64,
}

impl StoreInner {
    fn entry(&self, id: SlotId) -> Option<&Entry> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    fn entry_mut(&mut self, id: SlotId) -> Option<&mut Entry> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_mut())
    }

    fn allocate(&mut self, entry: Entry) -> SlotId {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.entry = Some(entry);
        SlotId {
            index,
            generation: slot.generation,
        }
    }
}

/// Handle to a process-local object store.
///
/// Cloning the store is cheap; all clones share the same arena.
#[derive(Clone)]
pub struct ObjectStore {
    inner: Arc<Mutex<StoreInner>>,
    prefix: Arc<str>,
}

impl ObjectStore {
    /// Create an empty store; generated names start with `prefix`.
    pub fn new(prefix: &str) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreInner::default())),
            prefix: Arc::from(prefix),
        }
    }

    /// Generate a collision-free name for a new entry of the given kind.
    pub fn generate_name(&self, kind: &str) -> String {
        let mut inner = self.inner.lock();
        inner.counter += 1;
        format!("{}_{}_{}", self.prefix, kind, inner.counter)
    }

    /// Insert an object; the returned handle owns the first reference.
    pub fn insert_object(&self, object: ObjectData) -> Result<Handle> {
        let name = object.name().to_owned();
        self.insert(name, StoredValue::Object(Arc::new(object)))
    }

    /// Insert an array under `name`; the returned handle owns the first reference.
    pub fn insert_array(&self, name: &str, array: ArrayData) -> Result<Handle> {
        self.insert(name.to_owned(), StoredValue::Array(Arc::new(array)))
    }

    fn insert(&self, name: String, value: StoredValue) -> Result<Handle> {
        let mut inner = self.inner.lock();
        if inner.names.contains_key(&name) {
            return Err(Error::AlreadyExists(name));
        }
        let id = inner.allocate(Entry {
            name: name.clone(),
            refcount: 1,
            value,
            children: Vec::new(),
        });
        inner.names.insert(name.clone(), id);
        log::debug!("[store] insert {} at {:?}", name, id);
        Ok(Handle::from_parts(self.clone(), id, name))
    }

    /// Look up an entry by name, acquiring a reference on success.
    pub fn lookup(&self, name: &str) -> Option<Handle> {
        let mut inner = self.inner.lock();
        let id = *inner.names.get(name)?;
        let entry = inner.entry_mut(id)?;
        entry.refcount += 1;
        Some(Handle::from_parts(self.clone(), id, name.to_owned()))
    }

    /// Whether an entry with this name is live.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.lock().names.contains_key(name)
    }

    /// Current reference count of the named entry.
    pub fn refcount(&self, name: &str) -> Option<u32> {
        let inner = self.inner.lock();
        let id = *inner.names.get(name)?;
        inner.entry(id).map(|e| e.refcount)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.inner.lock().names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take over a reference previously detached with [`Handle::into_raw`].
    ///
    /// The reference count is not changed: ownership moves from the raw id to
    /// the returned handle.
    pub fn adopt(&self, raw: RawRef) -> Result<Handle> {
        let id = SlotId::from_raw(raw);
        let inner = self.inner.lock();
        let entry = inner.entry(id).ok_or(Error::StaleReference)?;
        let name = entry.name.clone();
        Ok(Handle::from_parts(self.clone(), id, name))
    }

    /// Make `parent` hold references on `children` until it is destroyed.
    pub fn attach_children(&self, parent: &Handle, children: Vec<Handle>) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.entry_mut(parent.id()) {
            Some(entry) => {
                entry.children.extend(children);
                Ok(())
            }
            None => {
                drop(inner);
                drop(children);
                Err(Error::StaleReference)
            }
        }
    }

    pub(crate) fn value(&self, id: SlotId) -> Option<StoredValue> {
        self.inner.lock().entry(id).map(|e| e.value.clone())
    }

    pub(crate) fn refcount_of(&self, id: SlotId) -> u32 {
        self.inner.lock().entry(id).map_or(0, |e| e.refcount)
    }

    pub(crate) fn acquire(&self, id: SlotId) {
        if let Some(entry) = self.inner.lock().entry_mut(id) {
            entry.refcount += 1;
        }
    }

    pub(crate) fn release(&self, id: SlotId) {
        let destroyed = {
            let mut inner = self.inner.lock();
            let Some(entry) = inner.entry_mut(id) else {
                log::warn!("[store] release of stale slot {:?}", id);
                return;
            };
            entry.refcount = entry.refcount.saturating_sub(1);
            if entry.refcount > 0 {
                return;
            }
            let slot = &mut inner.slots[id.index as usize];
            let entry = slot.entry.take();
            slot.generation = slot.generation.wrapping_add(1);
            inner.free.push(id.index);
            if let Some(ref e) = entry {
                inner.names.remove(&e.name);
                log::debug!("[store] destroy {}", e.name);
            }
            entry
        };
        // Children are released outside the lock; each drop re-enters `release`.
        drop(destroyed);
    }

    pub(crate) fn same_store(&self, other: &ObjectStore) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore")
            .field("prefix", &self.prefix)
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::ArrayData;
    use crate::object::{Dependency, ObjectData, ObjectMeta};

    fn sample_object(name: &str, deps: Vec<Dependency>) -> ObjectData {
        ObjectData::new(name, 7, ObjectMeta::default(), vec![1, 2, 3], deps)
    }

    #[test]
    fn test_insert_lookup_release() {
        let store = ObjectStore::new("t");
        let handle = store.insert_array("a1", ArrayData::F32(vec![1.0, 2.0])).unwrap();
        assert_eq!(store.refcount("a1"), Some(1));

        let second = store.lookup("a1").expect("array is live");
        assert_eq!(store.refcount("a1"), Some(2));

        drop(second);
        assert_eq!(store.refcount("a1"), Some(1));
        drop(handle);
        assert!(!store.contains("a1"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let store = ObjectStore::new("t");
        let _h = store.insert_array("dup", ArrayData::U8(vec![0])).unwrap();
        assert!(matches!(
            store.insert_array("dup", ArrayData::U8(vec![1])),
            Err(Error::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_clone_acquires_reference() {
        let store = ObjectStore::new("t");
        let h = store.insert_object(sample_object("o1", vec![])).unwrap();
        let h2 = h.clone();
        assert_eq!(h.refcount(), 2);
        drop(h);
        assert_eq!(h2.refcount(), 1);
    }

    #[test]
    fn test_children_released_with_parent() {
        let store = ObjectStore::new("t");
        let child = store.insert_array("coords", ArrayData::F64(vec![0.5])).unwrap();
        let parent = store
            .insert_object(sample_object(
                "grid",
                vec![Dependency::array("coords", crate::array::ArrayType::F64)],
            ))
            .unwrap();

        store.attach_children(&parent, vec![child.clone()]).unwrap();
        drop(child);
        assert_eq!(store.refcount("coords"), Some(1));

        drop(parent);
        assert!(!store.contains("grid"));
        assert!(!store.contains("coords"));
    }

    #[test]
    fn test_raw_round_trip_keeps_count() {
        let store = ObjectStore::new("t");
        let h = store.insert_object(sample_object("o2", vec![])).unwrap();
        let raw = h.into_raw();
        assert_eq!(store.refcount("o2"), Some(1));

        let adopted = store.adopt(raw).unwrap();
        assert_eq!(adopted.name(), "o2");
        assert_eq!(adopted.refcount(), 1);
        drop(adopted);
        assert!(!store.contains("o2"));
    }

    #[test]
    fn test_stale_raw_reference_rejected() {
        let store = ObjectStore::new("t");
        let h = store.insert_array("gone", ArrayData::I32(vec![1])).unwrap();
        let raw = h.clone().into_raw();
        // Release both references: the raw one by adopting and dropping it.
        drop(store.adopt(raw).unwrap());
        drop(h);

        // Slot is recycled with a new generation
        let _other = store.insert_array("new", ArrayData::I32(vec![2])).unwrap();
        assert!(matches!(store.adopt(raw), Err(Error::StaleReference)));
    }

    #[test]
    fn test_generated_names_unique() {
        let store = ObjectStore::new("r0");
        let a = store.generate_name("obj");
        let b = store.generate_name("obj");
        assert_ne!(a, b);
        assert!(a.starts_with("r0_obj_"));
    }
}
