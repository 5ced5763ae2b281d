// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Correlation table entries and completion values.

use std::fmt;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};

use crate::array::ArrayType;
use crate::error::{Error, Result};
use crate::store::Handle;

/// Why a pending request did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailReason {
    /// The bulk-data connection dropped.
    ConnectionLost,
    /// The hub reported the owning rank gone.
    PeerGone,
    /// The caller expired the request.
    Expired,
    /// Response bytes could not be decoded.
    Malformed,
    /// The object arrived but failed its consistency check.
    CheckFailed,
    /// A nested dependency failed.
    DependencyFailed,
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailReason::ConnectionLost => "connection lost",
            FailReason::PeerGone => "peer gone",
            FailReason::Expired => "expired",
            FailReason::Malformed => "malformed response",
            FailReason::CheckFailed => "consistency check failed",
            FailReason::DependencyFailed => "dependency failed",
        };
        f.write_str(s)
    }
}

/// Value delivered to an external requester.
#[derive(Debug)]
pub enum Completion {
    Array(Handle),
    Object(Handle),
    Failed { name: String, reason: FailReason },
}

impl Completion {
    pub(crate) fn from_outcome(name: &str, outcome: &std::result::Result<Handle, FailReason>) -> Self {
        match outcome {
            Ok(handle) if handle.is_array() => Completion::Array(handle.clone()),
            Ok(handle) => Completion::Object(handle.clone()),
            Err(reason) => Completion::Failed {
                name: name.to_owned(),
                reason: *reason,
            },
        }
    }

    /// The delivered handle, if the request succeeded.
    pub fn handle(&self) -> Option<&Handle> {
        match self {
            Completion::Array(h) | Completion::Object(h) => Some(h),
            Completion::Failed { .. } => None,
        }
    }

    pub fn into_handle(self) -> Option<Handle> {
        match self {
            Completion::Array(h) | Completion::Object(h) => Some(h),
            Completion::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Completion::Failed { .. })
    }
}

/// Receiving end of one queued completion.
#[derive(Debug)]
pub struct Ticket {
    name: String,
    rx: Receiver<Completion>,
}

impl Ticket {
    pub(crate) fn new(name: &str) -> (Self, Waiter) {
        let (tx, rx) = channel::bounded(1);
        (
            Self {
                name: name.to_owned(),
                rx,
            },
            Waiter::External(tx),
        )
    }

    /// Name of the requested object or array.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Take the completion if it has been delivered.
    pub fn try_take(&self) -> Option<Completion> {
        self.rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the completion.
    ///
    /// Completions are only produced by `DataManager::dispatch`, so this must
    /// not be called from the thread driving it.
    pub fn wait(&self, timeout: Duration) -> Result<Option<Completion>> {
        match self.rx.recv_timeout(timeout) {
            Ok(c) => Ok(Some(c)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(Error::ChannelClosed),
        }
    }
}

/// Outcome of a request call.
#[derive(Debug)]
pub enum Request {
    /// Already in the local store; no wire traffic.
    Present(Handle),
    /// A completion will be delivered to the ticket.
    Pending(Ticket),
}

impl Request {
    pub fn is_present(&self) -> bool {
        matches!(self, Request::Present(_))
    }

    pub fn ticket(&self) -> Option<&Ticket> {
        match self {
            Request::Pending(t) => Some(t),
            Request::Present(_) => None,
        }
    }
}

/// Who is waiting on a pending entry.
#[derive(Debug)]
pub(crate) enum Waiter {
    External(Sender<Completion>),
    /// An object whose load is gated on this entry.
    Parent(String),
}

impl Waiter {
    pub fn parent(&self) -> Option<&str> {
        match self {
            Waiter::Parent(name) => Some(name),
            Waiter::External(_) => None,
        }
    }
}

#[derive(Debug)]
pub(crate) struct PendingArray {
    pub target: (i32, i32),
    pub elem: ArrayType,
    pub waiters: Vec<Waiter>,
    pub issued_at: Instant,
}

#[derive(Debug)]
pub(crate) enum LoadState {
    /// Request sent, no bytes yet.
    Requested,
    /// Object is in the store; `outstanding` nested fetches remain.
    ///
    /// The store already resolves the name, so anything that looks it up
    /// there sees an object whose children are incomplete. Serving checks
    /// the pending table first.
    Loading { handle: Handle, outstanding: usize },
}

#[derive(Debug)]
pub(crate) struct PendingObject {
    pub target: (i32, i32),
    pub waiters: Vec<Waiter>,
    pub issued_at: Instant,
    pub load: LoadState,
}

impl PendingObject {
    pub fn new(target: (i32, i32)) -> Self {
        Self {
            target,
            waiters: Vec::new(),
            issued_at: Instant::now(),
            load: LoadState::Requested,
        }
    }
}
