// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Data Manager: bulk-data transfer and request correlation.
//!
//! Owns the rank's [`BulkConnection`] and the correlation tables that keep
//! the cross-process object graph consistent:
//!
//! ```text
//!   arrays      name -> PendingArray { target, waiters }       one wire request per name
//!   objects     name -> PendingObject { target, waiters, load }
//!   adds        AddObject -> [object ids still to arrive]      forwarded handoffs
//!   requests    object id -> AddObject                         reverse of `adds`
//!   in_transit  TransferKey -> Handle                          extra ref until AddObjectCompleted
//! ```
//!
//! All table mutation happens on the thread that calls [`DataManager::dispatch`].
//! Requesters get a [`Ticket`]; completions travel back over a channel and
//! never hold references into the tables.
//!
//! Loading an object hands a fetcher to the deserializer. Every dependency that
//! is not local becomes a nested request with the object as its parent waiter;
//! the object completes only after its outstanding count drops to zero.

mod fetcher;
mod pending;

#[cfg(test)]
mod tests;

pub use pending::{Completion, FailReason, Request, Ticket};

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};

use crate::array::{ArrayCodecRegistry, ArrayData, ArrayType};
use crate::config::{BulkConfig, NodeConfig};
use crate::error::{Error, Result};
use crate::message::{
    AddObject, AddObjectCompleted, BulkMessage, Identity, Route, TransferKey,
};
use crate::object::ObjectData;
use crate::ser::{ArchiveWriter, Cursor};
use crate::store::{Handle, ObjectStore};
use crate::transport::{BulkConnection, Incoming};

use fetcher::{Origin, RemoteFetcher};
use pending::{LoadState, PendingArray, PendingObject, Waiter};

type Outcome = std::result::Result<Handle, FailReason>;
type Resolution = (String, Outcome, Vec<Waiter>);

/// Notification for the local cluster orchestrator.
#[derive(Debug)]
pub enum ClusterEvent {
    /// Forward to the original sender of a handoff.
    AddObjectCompleted(AddObjectCompleted),
    /// A forwarded object is fully local; deliver it as if produced here.
    ObjectReceived { add: AddObject, object: Handle },
    /// A forwarded object could not be fetched.
    TransferFailed { add: AddObject, reason: FailReason },
}

/// Data Manager counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataManagerStats {
    /// `RequestObject` messages put on the wire
    pub requests_sent: u64,
    /// Requests attached to an already outstanding entry
    pub requests_coalesced: u64,
    /// `SendObject` responses served to other ranks
    pub requests_served: u64,
    /// Requests that could not be served
    pub serve_failures: u64,
    /// `SendObject` responses consumed
    pub responses_received: u64,
    /// Messages dropped as protocol violations
    pub protocol_violations: u64,
}

/// Bulk-data manager for one rank.
pub struct DataManager {
    hub: i32,
    rank: i32,
    store: ObjectStore,
    registry: ArrayCodecRegistry,
    conn: Option<BulkConnection>,

    arrays: HashMap<String, PendingArray>,
    objects: HashMap<String, PendingObject>,
    adds: HashMap<AddObject, Vec<String>>,
    requests: HashMap<String, AddObject>,
    in_transit: HashMap<TransferKey, Handle>,

    events_tx: Sender<ClusterEvent>,
    events_rx: Receiver<ClusterEvent>,
    stats: DataManagerStats,
}

impl DataManager {
    /// Create a manager supporting every built-in array element type.
    pub fn new(hub: i32, rank: i32, store: ObjectStore) -> Self {
        Self::with_registry(hub, rank, store, ArrayCodecRegistry::with_builtin_types())
    }

    pub fn from_config(node: &NodeConfig, store: ObjectStore) -> Self {
        Self::new(node.hub, node.rank, store)
    }

    pub fn with_registry(
        hub: i32,
        rank: i32,
        store: ObjectStore,
        registry: ArrayCodecRegistry,
    ) -> Self {
        let (events_tx, events_rx) = channel::unbounded();
        Self {
            hub,
            rank,
            store,
            registry,
            conn: None,
            arrays: HashMap::new(),
            objects: HashMap::new(),
            adds: HashMap::new(),
            requests: HashMap::new(),
            in_transit: HashMap::new(),
            events_tx,
            events_rx,
            stats: DataManagerStats::default(),
        }
    }

    pub fn hub(&self) -> i32 {
        self.hub
    }

    pub fn rank(&self) -> i32 {
        self.rank
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    pub fn stats(&self) -> &DataManagerStats {
        &self.stats
    }

    /// Orchestrator notifications. Events hold object references, so the
    /// receiver must be drained.
    pub fn events(&self) -> Receiver<ClusterEvent> {
        self.events_rx.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.conn.as_ref().is_some_and(BulkConnection::is_connected)
    }

    /// Number of outstanding array requests.
    pub fn pending_arrays(&self) -> usize {
        self.arrays.len()
    }

    /// Number of outstanding object requests (including loads gated on
    /// nested fetches).
    pub fn pending_objects(&self) -> usize {
        self.objects.len()
    }

    /// Number of forwarded handoffs still waiting for their objects.
    pub fn outstanding_adds(&self) -> usize {
        self.adds.len()
    }

    /// Number of transfers holding an extra reference.
    pub fn in_transit(&self) -> usize {
        self.in_transit.len()
    }

    // ========================================================================
    // Connection
    // ========================================================================

    /// Connect to the per-node bulk-data hub.
    ///
    /// Failure is logged and returned; the rank keeps running without bulk
    /// transfers.
    pub fn connect(&mut self, config: &BulkConfig) -> Result<()> {
        match BulkConnection::connect(config) {
            Ok(conn) => {
                self.attach(conn);
                Ok(())
            }
            Err(e) => {
                log::error!(
                    "[data {}/{}] cannot connect to bulk-data hub {}: {}",
                    self.hub,
                    self.rank,
                    config.endpoint,
                    e
                );
                Err(e)
            }
        }
    }

    /// Use an established connection.
    pub fn attach(&mut self, conn: BulkConnection) {
        log::debug!("[data {}/{}] attached to {}", self.hub, self.rank, conn.peer());
        self.conn = Some(conn);
    }

    fn conn(&self) -> Result<&BulkConnection> {
        self.conn.as_ref().ok_or(Error::NotConnected)
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Request an array owned by `(hub, rank)`.
    ///
    /// Concurrent requests for the same name share one wire request.
    pub fn request_array(
        &mut self,
        referrer: &str,
        name: &str,
        elem: ArrayType,
        hub: i32,
        rank: i32,
    ) -> Result<Request> {
        let (ticket, waiter) = Ticket::new(name);
        match self.fetch_array(referrer, name, elem, (hub, rank), waiter)? {
            Some(handle) => Ok(Request::Present(handle)),
            None => Ok(Request::Pending(ticket)),
        }
    }

    /// Pull the object of a forwarded handoff from its sender.
    ///
    /// Once the object and all of its dependencies are local, an
    /// [`ClusterEvent::AddObjectCompleted`] and an
    /// [`ClusterEvent::ObjectReceived`] are emitted.
    pub fn request_object(&mut self, add: &AddObject) -> Result<Request> {
        let name = add.object_name.clone();
        let (ticket, waiter) = Ticket::new(&name);
        let target = (add.sender_hub, add.sender_rank);
        match self.fetch_object("", &name, target, Some(add.clone()), waiter)? {
            Some(handle) => Ok(Request::Present(handle)),
            None => {
                let ids = self.adds.entry(add.clone()).or_default();
                if !ids.contains(&name) {
                    ids.push(name.clone());
                }
                self.requests.insert(name, add.clone());
                Ok(Request::Pending(ticket))
            }
        }
    }

    /// Pull an object owned by `(hub, rank)` on behalf of `referrer`.
    pub fn request_object_from(
        &mut self,
        referrer: &str,
        name: &str,
        hub: i32,
        rank: i32,
    ) -> Result<Request> {
        let (ticket, waiter) = Ticket::new(name);
        match self.fetch_object(referrer, name, (hub, rank), None, waiter)? {
            Some(handle) => Ok(Request::Present(handle)),
            None => Ok(Request::Pending(ticket)),
        }
    }

    /// Local handle, or `None` after registering `waiter` on a (possibly new)
    /// pending entry.
    pub(crate) fn fetch_array(
        &mut self,
        referrer: &str,
        name: &str,
        elem: ArrayType,
        target: (i32, i32),
        waiter: Waiter,
    ) -> Result<Option<Handle>> {
        if let Some(entry) = self.arrays.get_mut(name) {
            entry.waiters.push(waiter);
            self.stats.requests_coalesced += 1;
            log::debug!("[data {}/{}] array {} already requested", self.hub, self.rank, name);
            return Ok(None);
        }
        if let Some(handle) = self.store.lookup(name) {
            return Ok(Some(handle));
        }
        self.send_request(referrer, name, Some(elem.tag()), target, None)?;
        self.arrays.insert(
            name.to_owned(),
            PendingArray {
                target,
                elem,
                waiters: vec![waiter],
                issued_at: Instant::now(),
            },
        );
        Ok(None)
    }

    pub(crate) fn fetch_object(
        &mut self,
        referrer: &str,
        name: &str,
        target: (i32, i32),
        add: Option<AddObject>,
        waiter: Waiter,
    ) -> Result<Option<Handle>> {
        if let Some(entry) = self.objects.get_mut(name) {
            entry.waiters.push(waiter);
            self.stats.requests_coalesced += 1;
            log::debug!("[data {}/{}] object {} already requested", self.hub, self.rank, name);
            return Ok(None);
        }
        if let Some(handle) = self.store.lookup(name) {
            return Ok(Some(handle));
        }
        self.send_request(referrer, name, None, target, add)?;
        let mut entry = PendingObject::new(target);
        entry.waiters.push(waiter);
        self.objects.insert(name.to_owned(), entry);
        Ok(None)
    }

    fn send_request(
        &mut self,
        referrer: &str,
        name: &str,
        array_type: Option<u32>,
        target: (i32, i32),
        add: Option<AddObject>,
    ) -> Result<()> {
        let msg = BulkMessage::RequestObject {
            route: Route::new((self.hub, self.rank), target),
            referrer: referrer.to_owned(),
            object_id: name.to_owned(),
            array_type,
            add,
        };
        self.conn()?.send(&msg)?;
        self.stats.requests_sent += 1;
        log::debug!(
            "[data {}/{}] requested {} from {}/{}",
            self.hub,
            self.rank,
            name,
            target.0,
            target.1
        );
        Ok(())
    }

    // ========================================================================
    // Forwarding
    // ========================================================================

    /// Keep the object of `add` alive until its `AddObjectCompleted` arrives.
    ///
    /// Calling this again for an equal descriptor is a no-op.
    pub fn prepare_transfer(&mut self, add: &AddObject) -> Result<()> {
        let key = add.key();
        if self.in_transit.contains_key(&key) {
            return Ok(());
        }
        let Some(handle) = self.store.lookup(&add.object_name) else {
            log::warn!(
                "[data {}/{}] cannot prepare transfer of {}: not in store",
                self.hub,
                self.rank,
                add.object_name
            );
            return Err(Error::NotFound(add.object_name.clone()));
        };
        self.in_transit.insert(key, handle);
        Ok(())
    }

    /// Release the reference taken by [`prepare_transfer`](Self::prepare_transfer).
    ///
    /// Returns `false` (and logs) if no transfer was tracked for `done`.
    pub fn complete_transfer(&mut self, done: &AddObjectCompleted) -> bool {
        match self.in_transit.remove(&done.key()) {
            Some(handle) => {
                log::debug!("[data {}/{}] transfer of {} complete", self.hub, self.rank, handle.name());
                true
            }
            None => {
                log::warn!(
                    "[data {}/{}] AddObjectCompleted for untracked transfer of {} from {}",
                    self.hub,
                    self.rank,
                    done.object_name,
                    done.original_sender_id
                );
                false
            }
        }
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Poll the connection once and handle at most one message.
    ///
    /// Returns `Ok(true)` if a message was consumed. Protocol violations are
    /// logged and dropped. A payload whose size contradicts its header fails
    /// the matching entry with [`FailReason::Malformed`] and is returned. A
    /// transport error fails out every pending entry with
    /// [`FailReason::ConnectionLost`] and is returned.
    pub fn dispatch(&mut self) -> Result<bool> {
        let polled = self.conn()?.poll();
        match polled {
            Err(Error::PayloadMismatch {
                object_id,
                array_type,
                expected,
                received,
            }) => {
                self.stats.protocol_violations += 1;
                log::warn!(
                    "[data {}/{}] payload of {} announced {} bytes, received {}",
                    self.hub,
                    self.rank,
                    object_id,
                    expected,
                    received
                );
                self.reject_payload(&object_id, array_type);
                Err(Error::PayloadMismatch {
                    object_id,
                    array_type,
                    expected,
                    received,
                })
            }
            Ok(Some(incoming)) => {
                if let Err(e) = self.handle(incoming) {
                    if is_transport_error(&e) {
                        self.connection_lost(&e);
                    }
                    return Err(e);
                }
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) if !is_transport_error(&e) => {
                self.stats.protocol_violations += 1;
                log::warn!("[data {}/{}] dropped bulk message: {}", self.hub, self.rank, e);
                Ok(true)
            }
            Err(e) => {
                self.connection_lost(&e);
                Err(e)
            }
        }
    }

    /// Dispatch until no complete message is available.
    pub fn dispatch_all(&mut self) -> Result<usize> {
        let mut handled = 0;
        while self.dispatch()? {
            handled += 1;
        }
        Ok(handled)
    }

    /// Route one incoming message.
    pub fn handle(&mut self, incoming: Incoming) -> Result<()> {
        match incoming.header {
            BulkMessage::Identify {
                identity: Identity::Unknown,
                ..
            } => {
                let reply = BulkMessage::Identify {
                    identity: Identity::LocalBulkData,
                    hub: self.hub,
                    rank: self.rank,
                };
                self.conn()?.send(&reply)
            }
            BulkMessage::Identify { hub, rank, .. } => {
                log::debug!("[data {}/{}] peer identified as {}/{}", self.hub, self.rank, hub, rank);
                Ok(())
            }
            BulkMessage::RequestObject {
                route,
                referrer,
                object_id,
                array_type,
                ..
            } => self.serve(route, referrer, object_id, array_type),
            BulkMessage::SendObject {
                route,
                referrer,
                object_id,
                array_type,
                ..
            } => {
                self.stats.responses_received += 1;
                let payload = incoming.payload.unwrap_or_default();
                match array_type {
                    Some(tag) => self.consume_array(object_id, tag, &payload),
                    None => self.consume_object(route, referrer, object_id, &payload),
                }
                Ok(())
            }
            BulkMessage::PeerGone { hub, rank } => {
                let failed = self.fail_matching(|target, _| target == (hub, rank), FailReason::PeerGone);
                log::warn!(
                    "[data {}/{}] peer {}/{} gone, failed {} pending requests",
                    self.hub,
                    self.rank,
                    hub,
                    rank,
                    failed
                );
                Ok(())
            }
        }
    }

    /// Fail the entry a size-mismatched payload was meant for.
    fn reject_payload(&mut self, name: &str, array_type: Option<u32>) {
        if array_type.is_some() {
            if let Some(entry) = self.arrays.remove(name) {
                self.resolve(vec![(name.to_owned(), Err(FailReason::Malformed), entry.waiters)]);
            }
            return;
        }
        match self.objects.remove(name) {
            Some(entry) if matches!(entry.load, LoadState::Requested) => {
                self.fail_object(name.to_owned(), entry.waiters, FailReason::Malformed);
            }
            // Bytes already consumed; the duplicate changes nothing.
            Some(entry) => {
                self.objects.insert(name.to_owned(), entry);
            }
            None => {}
        }
    }

    /// Answer a `RequestObject` for an entry owned by this rank.
    ///
    /// Objects still pending here are refused: a loading object is already
    /// in the store but lacks the dependencies that have not arrived yet.
    fn serve(
        &mut self,
        route: Route,
        referrer: String,
        object_id: String,
        array_type: Option<u32>,
    ) -> Result<()> {
        let (hub, rank) = route.sender();
        if self.objects.contains_key(&object_id) {
            self.stats.serve_failures += 1;
            log::warn!(
                "[data {}/{}] request for {} from {}/{}: still loading",
                self.hub,
                self.rank,
                object_id,
                hub,
                rank
            );
            return Ok(());
        }
        let Some(handle) = self.store.lookup(&object_id) else {
            self.stats.serve_failures += 1;
            log::warn!(
                "[data {}/{}] request for {} from {}/{}: not found",
                self.hub,
                self.rank,
                object_id,
                hub,
                rank
            );
            return Ok(());
        };

        let mut w = ArchiveWriter::new();
        let saved = match (array_type, handle.array(), handle.object()) {
            (Some(tag), Some(array), _) => self.registry.save(&object_id, tag, &array, &mut w),
            (None, _, Some(object)) => object.save(&mut w).map_err(Error::from),
            _ => Err(Error::Protocol(format!(
                "{} requested as {}",
                object_id,
                if array_type.is_some() { "array" } else { "object" }
            ))),
        };
        drop(handle);
        if let Err(e) = saved {
            self.stats.serve_failures += 1;
            log::warn!(
                "[data {}/{}] cannot serve {} to {}/{}: {}",
                self.hub,
                self.rank,
                object_id,
                hub,
                rank,
                e
            );
            return Ok(());
        }

        let payload = w.into_inner();
        let reply = BulkMessage::SendObject {
            route: route.reply(),
            referrer,
            object_id,
            array_type,
            payload_size: payload.len() as u64,
        };
        match self.conn()?.send_with_payload(&reply, &payload) {
            Ok(()) => {
                self.stats.requests_served += 1;
                Ok(())
            }
            Err(e @ Error::MessageTooLarge { .. }) => {
                self.stats.serve_failures += 1;
                log::warn!("[data {}/{}] cannot serve {}/{}: {}", self.hub, self.rank, hub, rank, e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn consume_array(&mut self, name: String, tag: u32, payload: &[u8]) {
        let Some(entry) = self.arrays.remove(&name) else {
            self.stats.protocol_violations += 1;
            log::warn!("[data {}/{}] array {} was not requested", self.hub, self.rank, name);
            return;
        };

        let outcome = if tag != entry.elem.tag() {
            log::warn!(
                "[data {}/{}] array {} arrived with tag {}, requested {}",
                self.hub,
                self.rank,
                name,
                tag,
                entry.elem
            );
            Err(FailReason::Malformed)
        } else {
            match self.registry.load(&name, tag, &mut Cursor::new(payload)) {
                Ok(data) => self.insert_array(&name, data),
                Err(e) => {
                    log::warn!("[data {}/{}] cannot load array {}: {}", self.hub, self.rank, name, e);
                    Err(FailReason::Malformed)
                }
            }
        };
        self.resolve(vec![(name, outcome, entry.waiters)]);
    }

    fn consume_object(&mut self, route: Route, referrer: String, name: String, payload: &[u8]) {
        let Some(mut entry) = self.objects.remove(&name) else {
            self.stats.protocol_violations += 1;
            log::warn!("[data {}/{}] object {} was not requested", self.hub, self.rank, name);
            return;
        };
        if !matches!(entry.load, LoadState::Requested) {
            self.stats.protocol_violations += 1;
            log::warn!("[data {}/{}] duplicate response for object {}", self.hub, self.rank, name);
            self.objects.insert(name, entry);
            return;
        }

        let origin = match self.requests.get(&name) {
            Some(add) => Origin::Add(add.clone()),
            None => Origin::Peer {
                referrer,
                hub: route.sender_hub,
                rank: route.sender_rank,
            },
        };
        let lineage = self.lineage(&name, &entry.waiters);
        let loaded = {
            let mut fetcher = RemoteFetcher::new(self, lineage, &name, origin);
            let result = ObjectData::load(&mut Cursor::new(payload), &mut fetcher);
            let outstanding = fetcher.requests();
            result.map(|loaded| (loaded, outstanding))
        };

        let (loaded, outstanding) = match loaded {
            Ok((loaded, _)) if loaded.object.name() != name => {
                log::warn!(
                    "[data {}/{}] response for {} holds object {}",
                    self.hub,
                    self.rank,
                    name,
                    loaded.object.name()
                );
                self.fail_object(name, entry.waiters, FailReason::Malformed);
                return;
            }
            Ok(ok) => ok,
            Err(e) => {
                log::warn!("[data {}/{}] cannot load object {}: {}", self.hub, self.rank, name, e);
                self.fail_object(name, entry.waiters, FailReason::Malformed);
                return;
            }
        };
        debug_assert_eq!(outstanding, loaded.deferred);

        let handle = match self.insert_object(loaded.object) {
            Ok(handle) => handle,
            Err(reason) => {
                self.fail_object(name, entry.waiters, reason);
                return;
            }
        };
        if let Err(e) = self.store.attach_children(&handle, loaded.resolved) {
            log::warn!("[data {}/{}] {}: {}", self.hub, self.rank, name, e);
        }

        if outstanding == 0 {
            let outcome = self.finish_object(&name, handle);
            self.resolve(vec![(name, outcome, entry.waiters)]);
        } else {
            log::debug!(
                "[data {}/{}] object {} waiting for {} dependencies",
                self.hub,
                self.rank,
                name,
                outstanding
            );
            entry.load = LoadState::Loading {
                handle,
                outstanding,
            };
            self.objects.insert(name, entry);
        }
    }

    /// `name` and every pending object that waits on it, directly or through
    /// other pending objects.
    fn lineage(&self, name: &str, waiters: &[Waiter]) -> HashSet<String> {
        let mut seen = HashSet::from([name.to_owned()]);
        let mut queue: Vec<&str> = waiters.iter().filter_map(Waiter::parent).collect();
        while let Some(parent) = queue.pop() {
            if !seen.insert(parent.to_owned()) {
                continue;
            }
            if let Some(entry) = self.objects.get(parent) {
                queue.extend(entry.waiters.iter().filter_map(Waiter::parent));
            }
        }
        seen
    }

    fn insert_array(&self, name: &str, data: ArrayData) -> Outcome {
        match self.store.insert_array(name, data) {
            Ok(handle) => Ok(handle),
            Err(Error::AlreadyExists(_)) => self.store.lookup(name).ok_or(FailReason::Malformed),
            Err(_) => Err(FailReason::Malformed),
        }
    }

    fn insert_object(&self, object: ObjectData) -> Outcome {
        let name = object.name().to_owned();
        match self.store.insert_object(object) {
            Ok(handle) => Ok(handle),
            Err(Error::AlreadyExists(_)) => self.store.lookup(&name).ok_or(FailReason::Malformed),
            Err(_) => Err(FailReason::Malformed),
        }
    }

    // ========================================================================
    // Completion
    // ========================================================================

    /// Check a fully loaded object and settle its handoff, if any.
    fn finish_object(&mut self, name: &str, handle: Handle) -> Outcome {
        let checked = handle.object().map(|object| object.check(&self.store));
        let outcome = match checked {
            Some(Ok(())) => Ok(handle),
            _ => {
                log::warn!("[data {}/{}] object {} failed its check", self.hub, self.rank, name);
                Err(FailReason::CheckFailed)
            }
        };
        self.settle_add(name, &outcome);
        outcome
    }

    fn fail_object(&mut self, name: String, waiters: Vec<Waiter>, reason: FailReason) {
        let outcome = Err(reason);
        self.settle_add(&name, &outcome);
        self.resolve(vec![(name, outcome, waiters)]);
    }

    /// Drop `name` from the handoff it serves; emit the orchestrator events
    /// once the handoff has nothing left to wait for.
    fn settle_add(&mut self, name: &str, outcome: &Outcome) {
        let Some(add) = self.requests.remove(name) else {
            return;
        };
        let drained = match self.adds.get_mut(&add) {
            Some(ids) => {
                ids.retain(|id| id != name);
                ids.is_empty()
            }
            None => true,
        };
        if drained {
            self.adds.remove(&add);
        }

        match outcome {
            Ok(handle) if drained => {
                log::debug!(
                    "[data {}/{}] handoff of {} from {} complete",
                    self.hub,
                    self.rank,
                    add.object_name,
                    add.sender_id
                );
                self.emit(ClusterEvent::AddObjectCompleted(add.completed()));
                self.emit(ClusterEvent::ObjectReceived {
                    add,
                    object: handle.clone(),
                });
            }
            Ok(_) => {}
            Err(reason) => {
                self.emit(ClusterEvent::TransferFailed {
                    add,
                    reason: *reason,
                });
            }
        }
    }

    fn emit(&self, event: ClusterEvent) {
        // `events_rx` is owned by `self`, so the channel never disconnects.
        let _ = self.events_tx.send(event);
    }

    /// Deliver outcomes to their waiters, cascading into parents whose loads
    /// complete or fail as a result.
    fn resolve(&mut self, work: Vec<Resolution>) {
        let mut queue: VecDeque<Resolution> = work.into();
        while let Some((name, outcome, waiters)) = queue.pop_front() {
            for waiter in waiters {
                match waiter {
                    Waiter::External(tx) => {
                        let _ = tx.send(Completion::from_outcome(&name, &outcome));
                    }
                    Waiter::Parent(parent) => self.notify_parent(&parent, &outcome, &mut queue),
                }
            }
            // `outcome` holds the bookkeeping reference; it goes here.
        }
    }

    fn notify_parent(&mut self, parent: &str, outcome: &Outcome, queue: &mut VecDeque<Resolution>) {
        let Some(entry) = self.objects.get_mut(parent) else {
            log::debug!("[data {}/{}] parent {} no longer pending", self.hub, self.rank, parent);
            return;
        };
        let LoadState::Loading {
            handle,
            outstanding,
        } = &mut entry.load
        else {
            log::warn!("[data {}/{}] dependency of {} before its bytes", self.hub, self.rank, parent);
            return;
        };

        let child = match outcome {
            Ok(child) => child,
            Err(reason) => {
                log::warn!(
                    "[data {}/{}] dependency of {} failed: {}",
                    self.hub,
                    self.rank,
                    parent,
                    reason
                );
                if let Some(entry) = self.objects.remove(parent) {
                    let outcome = Err(FailReason::DependencyFailed);
                    self.settle_add(parent, &outcome);
                    queue.push_back((parent.to_owned(), outcome, entry.waiters));
                }
                return;
            }
        };

        if let Err(e) = self.store.attach_children(handle, vec![child.clone()]) {
            log::warn!("[data {}/{}] {}: {}", self.hub, self.rank, parent, e);
        }
        *outstanding = outstanding.saturating_sub(1);
        if *outstanding > 0 {
            return;
        }

        let Some(entry) = self.objects.remove(parent) else {
            return;
        };
        let LoadState::Loading { handle, .. } = entry.load else {
            return;
        };
        let outcome = self.finish_object(parent, handle);
        queue.push_back((parent.to_owned(), outcome, entry.waiters));
    }

    // ========================================================================
    // Failure
    // ========================================================================

    /// Fail every pending entry older than `max_age` with [`FailReason::Expired`].
    ///
    /// Returns the number of entries failed directly (cascaded parents are
    /// not counted). No request is retried.
    pub fn expire_pending(&mut self, max_age: Duration) -> usize {
        let now = Instant::now();
        self.fail_matching(
            |_, issued_at| now.saturating_duration_since(issued_at) >= max_age,
            FailReason::Expired,
        )
    }

    fn connection_lost(&mut self, err: &Error) {
        if let Some(conn) = self.conn.take() {
            conn.close();
        }
        let failed = self.fail_matching(|_, _| true, FailReason::ConnectionLost);
        log::error!(
            "[data {}/{}] bulk connection lost ({}), failed {} pending requests",
            self.hub,
            self.rank,
            err,
            failed
        );
    }

    fn fail_matching<F>(&mut self, pred: F, reason: FailReason) -> usize
    where
        F: Fn((i32, i32), Instant) -> bool,
    {
        let arrays: Vec<String> = self
            .arrays
            .iter()
            .filter(|(_, e)| pred(e.target, e.issued_at))
            .map(|(name, _)| name.clone())
            .collect();
        let objects: Vec<String> = self
            .objects
            .iter()
            .filter(|(_, e)| pred(e.target, e.issued_at))
            .map(|(name, _)| name.clone())
            .collect();

        let mut work = Vec::with_capacity(arrays.len() + objects.len());
        for name in arrays {
            if let Some(entry) = self.arrays.remove(&name) {
                work.push((name, Err(reason), entry.waiters));
            }
        }
        for name in objects {
            if let Some(entry) = self.objects.remove(&name) {
                let outcome = Err(reason);
                self.settle_add(&name, &outcome);
                work.push((name, outcome, entry.waiters));
            }
        }
        let failed = work.len();
        self.resolve(work);
        failed
    }
}

impl std::fmt::Debug for DataManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataManager")
            .field("hub", &self.hub)
            .field("rank", &self.rank)
            .field("connected", &self.is_connected())
            .field("pending_arrays", &self.arrays.len())
            .field("pending_objects", &self.objects.len())
            .field("in_transit", &self.in_transit.len())
            .finish()
    }
}

fn is_transport_error(e: &Error) -> bool {
    matches!(
        e,
        Error::IoError(_) | Error::ConnectionClosed | Error::NotConnected | Error::ConnectFailed(_)
    )
}
