// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Local control channel.
//!
//! A bounded, ordered, blocking queue pair between a module and its
//! coordinator. Only fixed-size [`ControlMessage`] frames travel on it; a
//! full queue blocks the sender (backpressure) instead of dropping.
//!
//! ```text
//!   coordinator endpoint            module endpoint
//!   send() ----[frame; 512] x N----> recv()
//!   recv() <---[frame; 512] x N----- send()
//! ```

use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::error::{Error, Result};
use crate::message::{ControlMessage, MESSAGE_SIZE};

type Frame = Box<[u8; MESSAGE_SIZE]>;

/// Constructor for connected endpoint pairs.
pub struct ControlChannel;

impl ControlChannel {
    /// Create two connected endpoints, each direction holding `capacity` frames.
    pub fn pair(capacity: usize) -> (ControlEndpoint, ControlEndpoint) {
        let (a_tx, a_rx) = channel::bounded(capacity);
        let (b_tx, b_rx) = channel::bounded(capacity);
        (
            ControlEndpoint {
                sender: a_tx,
                receiver: b_rx,
            },
            ControlEndpoint {
                sender: b_tx,
                receiver: a_rx,
            },
        )
    }
}

/// One side of a control channel.
#[derive(Debug, Clone)]
pub struct ControlEndpoint {
    sender: Sender<Frame>,
    receiver: Receiver<Frame>,
}

impl ControlEndpoint {
    /// Send a message, blocking while the queue is full.
    pub fn send(&self, msg: &ControlMessage) -> Result<()> {
        let frame = Box::new(msg.encode()?);
        self.sender.send(frame).map_err(|_| Error::ChannelClosed)
    }

    /// Block until the next message arrives.
    pub fn recv(&self) -> Result<ControlMessage> {
        let frame = self.receiver.recv().map_err(|_| Error::ChannelClosed)?;
        ControlMessage::decode(&frame[..])
    }

    /// Receive without blocking.
    pub fn try_recv(&self) -> Result<Option<ControlMessage>> {
        match self.receiver.try_recv() {
            Ok(frame) => ControlMessage::decode(&frame[..]).map(Some),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(Error::ChannelClosed),
        }
    }

    /// Receive, giving up after `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<ControlMessage>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(frame) => ControlMessage::decode(&frame[..]).map(Some),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(Error::ChannelClosed),
        }
    }

    /// Number of messages waiting to be received.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}
