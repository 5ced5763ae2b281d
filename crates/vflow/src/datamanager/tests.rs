// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::*;
use crate::object::{Dependency, LocalFetcher, ObjectMeta};
use crate::transport::byte_stream::mock::MockStream;
use crate::transport::FrameCodec;

const LOCAL: (i32, i32) = (0, 0);
const REMOTE: (i32, i32) = (1, 0);

struct Harness {
    dm: DataManager,
    wire: MockStream,
    store: ObjectStore,
}

fn harness() -> Harness {
    let store = ObjectStore::new("h0r0");
    let wire = MockStream::new();
    let conn = BulkConnection::from_stream(Box::new(wire.clone()), 1 << 20).unwrap();
    let mut dm = DataManager::new(LOCAL.0, LOCAL.1, store.clone());
    dm.attach(conn);
    Harness { dm, wire, store }
}

fn split_frames(bytes: &[u8]) -> Vec<Vec<u8>> {
    let mut frames = Vec::new();
    let mut rest = bytes;
    while rest.len() >= 4 {
        let len = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
        frames.push(rest[4..4 + len].to_vec());
        rest = &rest[4 + len..];
    }
    assert!(rest.is_empty(), "trailing partial frame");
    frames
}

/// Messages written by the manager since the last call, payloads attached.
fn sent(wire: &MockStream) -> Vec<(BulkMessage, Option<Vec<u8>>)> {
    let mut frames = split_frames(&wire.take_written_data()).into_iter();
    let mut out = Vec::new();
    while let Some(frame) = frames.next() {
        let msg = BulkMessage::decode(&frame).unwrap();
        let payload = msg.payload_size().map(|_| frames.next().unwrap());
        out.push((msg, payload));
    }
    out
}

fn requested_names(wire: &MockStream) -> Vec<String> {
    sent(wire)
        .into_iter()
        .map(|(msg, _)| match msg {
            BulkMessage::RequestObject { object_id, .. } => object_id,
            other => panic!("expected RequestObject, got {:?}", other),
        })
        .collect()
}

fn deliver(wire: &MockStream, msg: &BulkMessage, payload: Option<&[u8]>) {
    wire.feed_read_data(&FrameCodec::encode(&msg.encode().unwrap()));
    if let Some(p) = payload {
        wire.feed_read_data(&FrameCodec::encode(p));
    }
}

fn respond(wire: &MockStream, name: &str, array_type: Option<u32>, payload: &[u8]) {
    let msg = BulkMessage::SendObject {
        route: Route::new(REMOTE, LOCAL),
        referrer: String::new(),
        object_id: name.to_owned(),
        array_type,
        payload_size: payload.len() as u64,
    };
    deliver(wire, &msg, Some(payload));
}

fn respond_array(wire: &MockStream, name: &str, data: &ArrayData) {
    let tag = data.element_type().tag();
    let mut w = ArchiveWriter::new();
    ArrayCodecRegistry::with_builtin_types()
        .save(name, tag, data, &mut w)
        .unwrap();
    respond(wire, name, Some(tag), w.as_slice());
}

fn object_bytes(object: &ObjectData) -> Vec<u8> {
    let mut w = ArchiveWriter::new();
    object.save(&mut w).unwrap();
    w.into_inner()
}

fn respond_object(wire: &MockStream, object: &ObjectData) {
    respond(wire, object.name(), None, &object_bytes(object));
}

fn object(name: &str, deps: Vec<Dependency>) -> ObjectData {
    ObjectData::new(name, 7, ObjectMeta::default(), b"cells".to_vec(), deps)
}

fn add_for(name: &str) -> AddObject {
    AddObject {
        sender_id: 3,
        sender_hub: REMOTE.0,
        sender_rank: REMOTE.1,
        sender_port: "grid_out".into(),
        object_name: name.into(),
        object_type: 7,
        dest_id: 9,
        dest_rank: LOCAL.1,
        dest_port: "grid_in".into(),
    }
}

fn pending_ticket(request: Request) -> Ticket {
    match request {
        Request::Pending(ticket) => ticket,
        Request::Present(h) => panic!("{} unexpectedly present", h.name()),
    }
}

fn failure(ticket: &Ticket) -> FailReason {
    match ticket.try_take() {
        Some(Completion::Failed { reason, .. }) => reason,
        other => panic!("expected failure, got {:?}", other),
    }
}

// ============================================================================
// Request coalescing
// ============================================================================

#[test]
fn test_concurrent_array_requests_share_one_wire_request() {
    let mut h = harness();
    let tickets: Vec<Ticket> = (0..3)
        .map(|_| {
            pending_ticket(
                h.dm.request_array("grid", "coords", ArrayType::F32, REMOTE.0, REMOTE.1)
                    .unwrap(),
            )
        })
        .collect();

    assert_eq!(requested_names(&h.wire), vec!["coords".to_string()]);
    assert_eq!(h.dm.stats().requests_coalesced, 2);
    assert!(tickets.iter().all(|t| t.try_take().is_none()));

    respond_array(&h.wire, "coords", &ArrayData::F32(vec![0.5, 1.5]));
    assert_eq!(h.dm.dispatch_all().unwrap(), 1);
    assert_eq!(h.dm.pending_arrays(), 0);

    let completions: Vec<Completion> = tickets.iter().map(|t| t.try_take().unwrap()).collect();
    assert!(completions.iter().all(|c| matches!(c, Completion::Array(_))));
    assert_eq!(h.store.refcount("coords"), Some(3));
    let array = completions[0].handle().unwrap().array().unwrap();
    assert_eq!(*array, ArrayData::F32(vec![0.5, 1.5]));

    drop(array);
    drop(completions);
    assert!(!h.store.contains("coords"));
}

#[test]
fn test_concurrent_object_requests_share_one_wire_request() {
    let mut h = harness();
    let a = pending_ticket(h.dm.request_object_from("", "grid", REMOTE.0, REMOTE.1).unwrap());
    let b = pending_ticket(h.dm.request_object_from("", "grid", REMOTE.0, REMOTE.1).unwrap());
    assert_eq!(requested_names(&h.wire).len(), 1);

    respond_object(&h.wire, &object("grid", vec![]));
    h.dm.dispatch_all().unwrap();
    assert!(matches!(a.try_take(), Some(Completion::Object(_))));
    assert!(matches!(b.try_take(), Some(Completion::Object(_))));
    assert_eq!(h.dm.pending_objects(), 0);
}

#[test]
fn test_present_entry_needs_no_wire_traffic() {
    let mut h = harness();
    let _coords = h.store.insert_array("coords", ArrayData::I32(vec![1])).unwrap();

    let request = h
        .dm
        .request_array("grid", "coords", ArrayType::I32, REMOTE.0, REMOTE.1)
        .unwrap();
    assert!(request.is_present());
    assert!(h.wire.get_written_data().is_empty());
    assert_eq!(h.store.refcount("coords"), Some(2));
}

#[test]
fn test_request_without_connection_fails() {
    let mut dm = DataManager::new(0, 0, ObjectStore::new("x"));
    assert!(matches!(
        dm.request_array("", "a", ArrayType::U8, 1, 0),
        Err(Error::NotConnected)
    ));
    assert_eq!(dm.pending_arrays(), 0);
}

// ============================================================================
// Transfer bookkeeping
// ============================================================================

#[test]
fn test_prepare_transfer_is_idempotent() {
    let mut h = harness();
    let grid = h.store.insert_object(object("grid", vec![])).unwrap();
    let add = add_for("grid");

    h.dm.prepare_transfer(&add).unwrap();
    h.dm.prepare_transfer(&add).unwrap();
    assert_eq!(grid.refcount(), 2);
    assert_eq!(h.dm.in_transit(), 1);

    assert!(h.dm.complete_transfer(&add.completed()));
    assert_eq!(grid.refcount(), 1);
    assert!(!h.dm.complete_transfer(&add.completed()));
    assert_eq!(grid.refcount(), 1);
}

#[test]
fn test_untracked_completion_leaves_refcounts_alone() {
    let mut h = harness();
    let grid = h.store.insert_object(object("grid", vec![])).unwrap();
    let other = h.store.insert_object(object("other", vec![])).unwrap();
    h.dm.prepare_transfer(&add_for("other")).unwrap();

    assert!(!h.dm.complete_transfer(&add_for("grid").completed()));
    assert_eq!(grid.refcount(), 1);
    assert_eq!(other.refcount(), 2);
}

#[test]
fn test_prepare_transfer_of_missing_object() {
    let mut h = harness();
    assert!(matches!(
        h.dm.prepare_transfer(&add_for("ghost")),
        Err(Error::NotFound(_))
    ));
    assert_eq!(h.dm.in_transit(), 0);
}

// ============================================================================
// Serving requests
// ============================================================================

fn request_from_remote(name: &str, array_type: Option<u32>) -> BulkMessage {
    BulkMessage::RequestObject {
        route: Route::new(REMOTE, LOCAL),
        referrer: "consumer".into(),
        object_id: name.into(),
        array_type,
        add: None,
    }
}

#[test]
fn test_serves_array_request() {
    let mut h = harness();
    let data = ArrayData::F64(vec![1.0, 2.0, 3.0]);
    let _p = h.store.insert_array("pressure", data.clone()).unwrap();

    deliver(&h.wire, &request_from_remote("pressure", Some(ArrayType::F64.tag())), None);
    assert!(h.dm.dispatch().unwrap());

    let mut out = sent(&h.wire);
    assert_eq!(out.len(), 1);
    let (msg, payload) = out.remove(0);
    let BulkMessage::SendObject {
        route,
        referrer,
        object_id,
        array_type,
        ..
    } = msg
    else {
        panic!("expected SendObject");
    };
    assert_eq!(route.target(), REMOTE);
    assert_eq!(route.sender(), LOCAL);
    assert_eq!(referrer, "consumer");
    assert_eq!(object_id, "pressure");

    let payload = payload.unwrap();
    let loaded = ArrayCodecRegistry::with_builtin_types()
        .load("pressure", array_type.unwrap(), &mut Cursor::new(&payload))
        .unwrap();
    assert_eq!(loaded, data);
    assert_eq!(h.dm.stats().requests_served, 1);
}

#[test]
fn test_serves_object_request() {
    let mut h = harness();
    let _x = h.store.insert_array("x", ArrayData::U8(vec![1, 2])).unwrap();
    let original = object("grid", vec![Dependency::array("x", ArrayType::U8)]);
    let _grid = h.store.insert_object(original.clone()).unwrap();

    deliver(&h.wire, &request_from_remote("grid", None), None);
    h.dm.dispatch().unwrap();

    let (_, payload) = sent(&h.wire).remove(0);
    let payload = payload.unwrap();
    let mut fetcher = LocalFetcher::new(&h.store);
    let loaded = ObjectData::load(&mut Cursor::new(&payload), &mut fetcher).unwrap();
    assert_eq!(loaded.object, original);
    assert_eq!(loaded.resolved.len(), 1);
}

#[test]
fn test_unmatched_type_tag_sends_no_response() {
    let mut h = harness();
    let _p = h.store.insert_array("pressure", ArrayData::F32(vec![1.0])).unwrap();

    deliver(&h.wire, &request_from_remote("pressure", Some(99)), None);
    assert!(h.dm.dispatch().unwrap());
    assert!(h.wire.get_written_data().is_empty());
    assert_eq!(h.dm.stats().serve_failures, 1);
    assert_eq!(h.dm.stats().requests_served, 0);
}

#[test]
fn test_request_stays_pending_without_response() {
    let mut h = harness();
    let ticket = pending_ticket(
        h.dm.request_array("", "pressure", ArrayType::F32, REMOTE.0, REMOTE.1)
            .unwrap(),
    );
    h.wire.take_written_data();

    assert_eq!(h.dm.dispatch_all().unwrap(), 0);
    assert!(ticket.try_take().is_none());
    assert_eq!(h.dm.pending_arrays(), 1);
}

#[test]
fn test_request_for_unknown_entry_is_dropped() {
    let mut h = harness();
    deliver(&h.wire, &request_from_remote("ghost", None), None);
    assert!(h.dm.dispatch().unwrap());
    assert!(h.wire.get_written_data().is_empty());
    assert_eq!(h.dm.stats().serve_failures, 1);
}

#[test]
fn test_identify_is_answered() {
    let mut h = harness();
    let hello = BulkMessage::Identify {
        identity: Identity::Unknown,
        hub: -1,
        rank: -1,
    };
    deliver(&h.wire, &hello, None);
    h.dm.dispatch().unwrap();

    let out = sent(&h.wire);
    assert_eq!(
        out[0].0,
        BulkMessage::Identify {
            identity: Identity::LocalBulkData,
            hub: LOCAL.0,
            rank: LOCAL.1,
        }
    );
}

// ============================================================================
// Responses
// ============================================================================

#[test]
fn test_unrequested_response_is_dropped() {
    let mut h = harness();
    respond_array(&h.wire, "stray", &ArrayData::U8(vec![1]));
    assert!(h.dm.dispatch().unwrap());
    assert!(!h.store.contains("stray"));
    assert_eq!(h.dm.stats().protocol_violations, 1);
}

#[test]
fn test_undecodable_header_keeps_connection() {
    let mut h = harness();
    h.wire.feed_read_data(&FrameCodec::encode(&[0xff, 0xff, 0xff, 0xff]));
    assert!(h.dm.dispatch().unwrap());
    assert!(h.dm.is_connected());
    assert_eq!(h.dm.stats().protocol_violations, 1);
}

#[test]
fn test_array_with_wrong_element_type_fails() {
    let mut h = harness();
    let ticket = pending_ticket(
        h.dm.request_array("", "pressure", ArrayType::F32, REMOTE.0, REMOTE.1)
            .unwrap(),
    );
    respond_array(&h.wire, "pressure", &ArrayData::I64(vec![5]));
    h.dm.dispatch_all().unwrap();

    assert_eq!(failure(&ticket), FailReason::Malformed);
    assert!(!h.store.contains("pressure"));
}

#[test]
fn test_payload_size_mismatch_fails_request() {
    let mut h = harness();
    let pressure = pending_ticket(
        h.dm.request_array("", "pressure", ArrayType::F32, REMOTE.0, REMOTE.1)
            .unwrap(),
    );
    let grid = pending_ticket(h.dm.request_object_from("", "grid", REMOTE.0, REMOTE.1).unwrap());
    h.wire.take_written_data();

    let bytes = object_bytes(&object("grid", vec![]));
    let short = BulkMessage::SendObject {
        route: Route::new(REMOTE, LOCAL),
        referrer: String::new(),
        object_id: "grid".into(),
        array_type: None,
        payload_size: bytes.len() as u64 + 10,
    };
    deliver(&h.wire, &short, Some(bytes.as_slice()));
    match h.dm.dispatch() {
        Err(Error::PayloadMismatch {
            object_id,
            array_type,
            ..
        }) => assert_eq!((object_id.as_str(), array_type), ("grid", None)),
        other => panic!("expected payload mismatch, got {:?}", other),
    }
    assert_eq!(failure(&grid), FailReason::Malformed);
    assert_eq!(h.dm.pending_objects(), 0);
    assert!(h.dm.is_connected());

    let long = BulkMessage::SendObject {
        route: Route::new(REMOTE, LOCAL),
        referrer: String::new(),
        object_id: "pressure".into(),
        array_type: Some(ArrayType::F32.tag()),
        payload_size: 2,
    };
    deliver(&h.wire, &long, Some(&[0u8; 12][..]));
    assert!(matches!(h.dm.dispatch(), Err(Error::PayloadMismatch { .. })));
    assert_eq!(failure(&pressure), FailReason::Malformed);
    assert_eq!(h.dm.pending_arrays(), 0);
    assert_eq!(h.dm.stats().protocol_violations, 2);
    assert!(h.store.is_empty());

    // Framing survived; the next message is handled normally.
    deliver(&h.wire, &request_from_remote("ghost", None), None);
    assert!(h.dm.dispatch().unwrap());
}

#[test]
fn test_self_referencing_object_fails() {
    let mut h = harness();
    let ticket = pending_ticket(h.dm.request_object_from("", "grid", REMOTE.0, REMOTE.1).unwrap());
    h.wire.take_written_data();

    respond_object(&h.wire, &object("grid", vec![Dependency::object("grid")]));
    h.dm.dispatch_all().unwrap();

    assert_eq!(failure(&ticket), FailReason::Malformed);
    assert_eq!(h.dm.pending_objects(), 0);
    assert!(h.wire.get_written_data().is_empty());
    assert!(h.store.is_empty());
}

#[test]
fn test_dependency_cycle_fails_both_objects() {
    let mut h = harness();
    let ticket = pending_ticket(h.dm.request_object_from("", "grid", REMOTE.0, REMOTE.1).unwrap());
    h.wire.take_written_data();

    respond_object(&h.wire, &object("grid", vec![Dependency::object("sub")]));
    h.dm.dispatch_all().unwrap();
    assert_eq!(requested_names(&h.wire), vec!["sub".to_string()]);

    respond_object(&h.wire, &object("sub", vec![Dependency::object("grid")]));
    h.dm.dispatch_all().unwrap();

    assert_eq!(failure(&ticket), FailReason::DependencyFailed);
    assert_eq!(h.dm.pending_objects(), 0);
    assert!(h.wire.get_written_data().is_empty());
    assert!(h.store.is_empty());
}

#[test]
fn test_loading_object_is_not_served() {
    let mut h = harness();
    let ticket = pending_ticket(h.dm.request_object_from("", "grid", REMOTE.0, REMOTE.1).unwrap());
    respond_object(&h.wire, &object("grid", vec![Dependency::array("x", ArrayType::U8)]));
    h.dm.dispatch_all().unwrap();
    assert!(h.store.contains("grid"));
    h.wire.take_written_data();

    deliver(&h.wire, &request_from_remote("grid", None), None);
    assert!(h.dm.dispatch().unwrap());
    assert!(h.wire.get_written_data().is_empty());
    assert_eq!(h.dm.stats().serve_failures, 1);

    respond_array(&h.wire, "x", &ArrayData::U8(vec![9]));
    h.dm.dispatch_all().unwrap();
    let _grid = ticket.try_take().unwrap().into_handle().unwrap();

    deliver(&h.wire, &request_from_remote("grid", None), None);
    h.dm.dispatch().unwrap();
    assert_eq!(sent(&h.wire).len(), 1);
    assert_eq!(h.dm.stats().requests_served, 1);
}

#[test]
fn test_nested_dependencies_in_any_arrival_order() {
    for _ in 0..16 {
        let mut h = harness();
        let _local = h.store.insert_array("local", ArrayData::U32(vec![4])).unwrap();
        let sub = object("sub", vec![Dependency::array("z", ArrayType::U64)]);
        let grid = object(
            "grid",
            vec![
                Dependency::array("x", ArrayType::F32),
                Dependency::array("y", ArrayType::I32),
                Dependency::array("local", ArrayType::U32),
                Dependency::object("sub"),
            ],
        );

        let ticket = pending_ticket(
            h.dm.request_object_from("", "grid", REMOTE.0, REMOTE.1)
                .unwrap(),
        );
        h.wire.take_written_data();

        respond_object(&h.wire, &grid);
        h.dm.dispatch_all().unwrap();
        let mut nested = requested_names(&h.wire);
        nested.sort();
        assert_eq!(nested, vec!["sub", "x", "y"]);

        let mut order = vec!["x", "y", "sub", "z"];
        fastrand::shuffle(&mut order);
        // "z" is only requested once "sub" has arrived.
        order.retain(|n| *n != "z");
        let at = order.iter().position(|n| *n == "sub").unwrap() + 1;
        let z_at = at + fastrand::usize(0..=order.len() - at);
        order.insert(z_at, "z");

        for name in &order {
            assert!(ticket.try_take().is_none(), "completed before {}", name);
            match *name {
                "x" => respond_array(&h.wire, "x", &ArrayData::F32(vec![1.0])),
                "y" => respond_array(&h.wire, "y", &ArrayData::I32(vec![2])),
                "z" => respond_array(&h.wire, "z", &ArrayData::U64(vec![3])),
                _ => respond_object(&h.wire, &sub),
            }
            h.dm.dispatch_all().unwrap();
            if *name == "sub" {
                assert_eq!(requested_names(&h.wire), vec!["z".to_string()]);
            }
        }

        let done = ticket.try_take().unwrap();
        let handle = done.handle().unwrap();
        assert_eq!(handle.name(), "grid");
        handle.object().unwrap().check(&h.store).unwrap();
        assert_eq!(h.dm.pending_arrays(), 0);
        assert_eq!(h.dm.pending_objects(), 0);

        // Only the parent graph holds the fetched entries now.
        for name in ["x", "y", "sub", "z"] {
            assert_eq!(h.store.refcount(name), Some(1), "{}", name);
        }
        drop(done);
        drop(_local);
        assert!(h.store.is_empty());
    }
}

#[test]
fn test_failed_dependency_fails_parent() {
    let mut h = harness();
    let grid = object("grid", vec![Dependency::array("x", ArrayType::F32)]);
    let ticket = pending_ticket(
        h.dm.request_object_from("", "grid", REMOTE.0, REMOTE.1)
            .unwrap(),
    );
    respond_object(&h.wire, &grid);
    h.dm.dispatch_all().unwrap();
    assert!(h.store.contains("grid"));

    respond(&h.wire, "x", Some(ArrayType::F32.tag()), &[1, 2, 3]);
    h.dm.dispatch_all().unwrap();

    assert_eq!(failure(&ticket), FailReason::DependencyFailed);
    assert_eq!(h.dm.pending_objects(), 0);
    assert!(!h.store.contains("grid"));
}

#[test]
fn test_checksum_mismatch_fails_object() {
    let mut h = harness();
    let ticket = pending_ticket(
        h.dm.request_object_from("", "grid", REMOTE.0, REMOTE.1)
            .unwrap(),
    );
    let mut bytes = object_bytes(&object("grid", vec![]));
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    respond(&h.wire, "grid", None, &bytes);
    h.dm.dispatch_all().unwrap();

    assert_eq!(failure(&ticket), FailReason::CheckFailed);
    assert!(h.store.is_empty());
}

// ============================================================================
// Forwarded handoffs
// ============================================================================

#[test]
fn test_handoff_completes_with_events() {
    let mut h = harness();
    let events = h.dm.events();
    let add = add_for("grid");

    let ticket = pending_ticket(h.dm.request_object(&add).unwrap());
    let out = sent(&h.wire);
    assert!(matches!(
        &out[0].0,
        BulkMessage::RequestObject { add: Some(a), .. } if a.key() == add.key()
    ));
    assert_eq!(h.dm.outstanding_adds(), 1);

    respond_object(&h.wire, &object("grid", vec![Dependency::array("x", ArrayType::U8)]));
    h.dm.dispatch_all().unwrap();
    assert!(events.try_recv().is_err());

    // Nested fetches of a handoff use the handoff object as referrer.
    let out = sent(&h.wire);
    assert!(matches!(
        &out[0].0,
        BulkMessage::RequestObject { referrer, route, .. }
            if referrer == "grid" && route.target() == REMOTE
    ));

    respond_array(&h.wire, "x", &ArrayData::U8(vec![9]));
    h.dm.dispatch_all().unwrap();

    match events.try_recv().unwrap() {
        ClusterEvent::AddObjectCompleted(done) => assert_eq!(done, add.completed()),
        other => panic!("unexpected {:?}", other),
    }
    match events.try_recv().unwrap() {
        ClusterEvent::ObjectReceived { add: a, object } => {
            assert_eq!(a.key(), add.key());
            assert_eq!(object.name(), "grid");
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(ticket.try_take(), Some(Completion::Object(_))));
    assert_eq!(h.dm.outstanding_adds(), 0);
}

#[test]
fn test_handoff_failure_is_reported() {
    let mut h = harness();
    let events = h.dm.events();
    let add = add_for("grid");
    let _ticket = h.dm.request_object(&add).unwrap();

    deliver(&h.wire, &BulkMessage::PeerGone { hub: 1, rank: 0 }, None);
    h.dm.dispatch_all().unwrap();

    match events.try_recv().unwrap() {
        ClusterEvent::TransferFailed { add: a, reason } => {
            assert_eq!(a.key(), add.key());
            assert_eq!(reason, FailReason::PeerGone);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(h.dm.outstanding_adds(), 0);
}

#[test]
fn test_handoff_of_present_object() {
    let mut h = harness();
    let _grid = h.store.insert_object(object("grid", vec![])).unwrap();
    assert!(h.dm.request_object(&add_for("grid")).unwrap().is_present());
    assert_eq!(h.dm.outstanding_adds(), 0);
    assert!(h.wire.get_written_data().is_empty());
}

// ============================================================================
// Failure paths
// ============================================================================

#[test]
fn test_connection_loss_fails_everything() {
    let mut h = harness();
    let a = pending_ticket(h.dm.request_array("", "a", ArrayType::U8, 1, 0).unwrap());
    let b = pending_ticket(h.dm.request_object_from("", "b", 2, 0).unwrap());

    h.wire.disconnect();
    assert!(matches!(h.dm.dispatch(), Err(Error::ConnectionClosed)));
    assert_eq!(failure(&a), FailReason::ConnectionLost);
    assert_eq!(failure(&b), FailReason::ConnectionLost);
    assert!(!h.dm.is_connected());
    assert!(matches!(h.dm.dispatch(), Err(Error::NotConnected)));
}

#[test]
fn test_peer_gone_fails_only_that_peer() {
    let mut h = harness();
    let a = pending_ticket(h.dm.request_array("", "a", ArrayType::U8, 1, 0).unwrap());
    let b = pending_ticket(h.dm.request_array("", "b", ArrayType::U8, 2, 0).unwrap());

    deliver(&h.wire, &BulkMessage::PeerGone { hub: 1, rank: 0 }, None);
    h.dm.dispatch_all().unwrap();
    assert_eq!(failure(&a), FailReason::PeerGone);
    assert!(b.try_take().is_none());
    assert_eq!(h.dm.pending_arrays(), 1);
}

#[test]
fn test_expire_pending() {
    let mut h = harness();
    let a = pending_ticket(h.dm.request_array("", "a", ArrayType::U8, 1, 0).unwrap());

    assert_eq!(h.dm.expire_pending(Duration::from_secs(3600)), 0);
    assert_eq!(h.dm.expire_pending(Duration::ZERO), 1);
    assert_eq!(failure(&a), FailReason::Expired);
    assert_eq!(h.dm.pending_arrays(), 0);
}

// ============================================================================
// Two managers
// ============================================================================

#[test]
fn test_two_managers_exchange_object_graph() {
    let (wire_a, wire_b) = MockStream::pair();
    let store_a = ObjectStore::new("h0r0");
    let store_b = ObjectStore::new("h1r0");
    let mut a = DataManager::new(0, 0, store_a.clone());
    let mut b = DataManager::new(1, 0, store_b.clone());
    a.attach(BulkConnection::from_stream(Box::new(wire_a), 1 << 20).unwrap());
    b.attach(BulkConnection::from_stream(Box::new(wire_b), 1 << 20).unwrap());

    let _x = store_b
        .insert_array("x", ArrayData::F32(vec![1.0, 2.0]))
        .unwrap();
    let _grid = store_b
        .insert_object(object("grid", vec![Dependency::array("x", ArrayType::F32)]))
        .unwrap();

    let ticket = pending_ticket(a.request_object_from("", "grid", 1, 0).unwrap());
    let mut done = None;
    for _ in 0..8 {
        b.dispatch_all().unwrap();
        a.dispatch_all().unwrap();
        if let Some(c) = ticket.try_take() {
            done = Some(c);
            break;
        }
    }

    let done = done.unwrap();
    assert_eq!(done.handle().unwrap().name(), "grid");
    assert_eq!(store_a.refcount("x"), Some(1));
    assert_eq!(b.stats().requests_served, 2);
    assert_eq!(a.stats().responses_received, 2);
}
