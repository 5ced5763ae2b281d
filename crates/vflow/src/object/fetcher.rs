// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dependency resolution during object loading.

use crate::array::ArrayType;
use crate::error::{Error, Result};
use crate::store::{Handle, ObjectStore};

/// Outcome of asking a [`Fetcher`] for a dependency.
#[derive(Debug)]
pub enum Fetched {
    /// Already in the local store; the handle owns one reference.
    Local(Handle),
    /// Not local yet; a fetch is outstanding and completes later.
    Deferred,
}

/// Capability handed to [`ObjectData::load`](super::ObjectData::load).
///
/// Implementations count every `Deferred` answer; the object being loaded is
/// complete only once each of those fetches has finished.
pub trait Fetcher {
    fn request_array(&mut self, name: &str, elem: ArrayType) -> Result<Fetched>;
    fn request_object(&mut self, name: &str) -> Result<Fetched>;
}

/// Fetcher that only consults the local store and never defers.
pub struct LocalFetcher<'a> {
    store: &'a ObjectStore,
}

impl<'a> LocalFetcher<'a> {
    pub fn new(store: &'a ObjectStore) -> Self {
        Self { store }
    }

    fn lookup(&self, name: &str) -> Result<Fetched> {
        self.store
            .lookup(name)
            .map(Fetched::Local)
            .ok_or_else(|| Error::NotFound(name.to_owned()))
    }
}

impl Fetcher for LocalFetcher<'_> {
    fn request_array(&mut self, name: &str, elem: ArrayType) -> Result<Fetched> {
        let fetched = self.lookup(name)?;
        if let Fetched::Local(ref handle) = fetched {
            let actual = handle.array().map(|a| a.element_type());
            if actual != Some(elem) {
                return Err(Error::Protocol(format!(
                    "dependency {} is not an array of {}",
                    name, elem
                )));
            }
        }
        Ok(fetched)
    }

    fn request_object(&mut self, name: &str) -> Result<Fetched> {
        self.lookup(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::ArrayData;

    #[test]
    fn test_local_fetcher_checks_element_type() {
        let store = ObjectStore::new("f");
        let _h = store.insert_array("v", ArrayData::F64(vec![1.0])).unwrap();
        let mut fetcher = LocalFetcher::new(&store);

        assert!(matches!(
            fetcher.request_array("v", ArrayType::F64),
            Ok(Fetched::Local(_))
        ));
        assert!(fetcher.request_array("v", ArrayType::I32).is_err());
        assert_eq!(store.refcount("v"), Some(1));
    }
}
