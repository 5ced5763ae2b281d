// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fetcher that turns missing dependencies into bulk-data requests.

use std::collections::HashSet;

use super::pending::Waiter;
use super::DataManager;
use crate::array::ArrayType;
use crate::error::{Error, Result};
use crate::message::AddObject;
use crate::object::{Fetched, Fetcher};

/// Where the bytes of the object being loaded came from.
#[derive(Debug, Clone)]
pub(crate) enum Origin {
    /// Pull serving a forwarded handoff.
    Add(AddObject),
    /// Plain pull from `(hub, rank)` on behalf of `referrer`.
    Peer {
        referrer: String,
        hub: i32,
        rank: i32,
    },
}

impl Origin {
    fn referrer(&self) -> &str {
        match self {
            Origin::Add(add) => &add.object_name,
            Origin::Peer { referrer, .. } => referrer,
        }
    }

    fn target(&self) -> (i32, i32) {
        match self {
            Origin::Add(add) => (add.sender_hub, add.sender_rank),
            Origin::Peer { hub, rank, .. } => (*hub, *rank),
        }
    }
}

/// Resolves the dependencies of `parent` against the local store, deferring
/// anything missing to a nested request whose completion is routed back to
/// `parent`.
///
/// A dependency on any name in `lineage` (the parent and every pending
/// object waiting on it) would never complete and is rejected.
pub(crate) struct RemoteFetcher<'a> {
    dm: &'a mut DataManager,
    lineage: HashSet<String>,
    parent: String,
    origin: Origin,
    requests: usize,
}

impl<'a> RemoteFetcher<'a> {
    pub fn new(
        dm: &'a mut DataManager,
        lineage: HashSet<String>,
        parent: &str,
        origin: Origin,
    ) -> Self {
        Self {
            dm,
            lineage,
            parent: parent.to_owned(),
            origin,
            requests: 0,
        }
    }

    fn check_acyclic(&self, name: &str) -> Result<()> {
        if self.lineage.contains(name) {
            return Err(Error::Protocol(format!(
                "{} depends on {}, which waits on it",
                self.parent, name
            )));
        }
        Ok(())
    }

    /// Nested requests still outstanding for the parent.
    pub fn requests(&self) -> usize {
        self.requests
    }

    fn fetched(&mut self, local: Option<crate::store::Handle>) -> Fetched {
        match local {
            Some(handle) => Fetched::Local(handle),
            None => {
                self.requests += 1;
                Fetched::Deferred
            }
        }
    }
}

impl Fetcher for RemoteFetcher<'_> {
    fn request_array(&mut self, name: &str, elem: ArrayType) -> Result<Fetched> {
        self.check_acyclic(name)?;
        let referrer = self.origin.referrer().to_owned();
        let target = self.origin.target();
        let waiter = Waiter::Parent(self.parent.clone());
        let local = self.dm.fetch_array(&referrer, name, elem, target, waiter)?;
        Ok(self.fetched(local))
    }

    fn request_object(&mut self, name: &str) -> Result<Fetched> {
        self.check_acyclic(name)?;
        let referrer = self.origin.referrer().to_owned();
        let target = self.origin.target();
        let waiter = Waiter::Parent(self.parent.clone());
        let local = self.dm.fetch_object(&referrer, name, target, None, waiter)?;
        Ok(self.fetched(local))
    }
}
