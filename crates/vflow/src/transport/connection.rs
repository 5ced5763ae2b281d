// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Framed bulk-data connection.
//!
//! [`BulkConnection`] wraps a non-blocking [`ByteStream`] with:
//! - a [`FrameCodec`] for length-prefix framing
//! - a send queue flushed opportunistically on every send and poll
//! - pairing of a `SendObject` header with the payload frame that follows it
//!
//! Reads and writes share a single lock, so one logical message (header plus
//! payload) is always queued and consumed as a unit.
//!
//! ```text
//!      +----------+
//!      |Connected |--(EOF / I/O error)--> Closed
//!      +----+-----+
//!           | close()
//!           v
//!      +----------+
//!      |  Closed  |
//!      +----------+
//! ```

use std::collections::VecDeque;
use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Instant;

use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, TcpKeepalive, Type};

use super::byte_stream::ByteStream;
use super::frame_codec::FrameCodec;
use crate::config::BulkConfig;
use crate::error::{Error, Result};
use crate::message::BulkMessage;

/// Connection state machine states.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Connected,
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Closed => write!(f, "Closed"),
        }
    }
}

/// Result of a flush operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushResult {
    /// All queued data was sent
    Complete,
    /// Some data remains in the queue (would block)
    WouldBlock,
}

/// Statistics for a bulk connection.
#[derive(Clone, Debug, Default)]
pub struct ConnectionStats {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub payload_bytes_sent: u64,
    pub payload_bytes_received: u64,
    pub last_recv_time: Option<Instant>,
}

/// One logical message read from the connection.
#[derive(Debug)]
pub struct Incoming {
    pub header: BulkMessage,
    /// Payload of a `SendObject`; `None` for every other kind.
    pub payload: Option<Vec<u8>>,
}

struct ConnectionInner {
    stream: Box<dyn ByteStream>,
    codec: FrameCodec,
    state: ConnectionState,
    send_queue: VecDeque<Vec<u8>>,
    /// Partial send in progress (buffer, offset)
    pending_send: Option<(Vec<u8>, usize)>,
    /// Header whose payload frame has not arrived yet
    awaiting_payload: Option<BulkMessage>,
    stats: ConnectionStats,
}

impl ConnectionInner {
    fn check_operational(&self) -> Result<()> {
        match self.state {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Closed => Err(Error::NotConnected),
        }
    }

    fn fail(&mut self, e: io::Error) -> Error {
        self.state = ConnectionState::Closed;
        self.send_queue.clear();
        self.pending_send = None;
        Error::from(e)
    }

    fn flush(&mut self) -> Result<FlushResult> {
        loop {
            let (buf, offset) = match self.pending_send.take() {
                Some(partial) => partial,
                None => match self.send_queue.pop_front() {
                    Some(frame) => (frame, 0),
                    None => break,
                },
            };

            match self.stream.write(&buf[offset..]) {
                Ok(0) => {
                    return Err(self.fail(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "connection closed",
                    )));
                }
                Ok(n) if offset + n >= buf.len() => {}
                Ok(n) => {
                    self.pending_send = Some((buf, offset + n));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.pending_send = Some((buf, offset));
                    return Ok(FlushResult::WouldBlock);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    self.pending_send = Some((buf, offset));
                }
                Err(e) => return Err(self.fail(e)),
            }
        }
        let _ = self.stream.flush();
        Ok(FlushResult::Complete)
    }

    fn recv_frame(&mut self) -> Result<Option<Vec<u8>>> {
        match self.codec.decode(&mut *self.stream) {
            Ok(frame) => Ok(frame),
            Err(e) => Err(self.fail(e)),
        }
    }
}

/// Framed, non-blocking connection to the bulk-data hub.
pub struct BulkConnection {
    inner: Mutex<ConnectionInner>,
    peer: String,
}

impl BulkConnection {
    /// Connect to the hub named in `config`.
    ///
    /// The connect itself blocks for at most `connect_timeout`; the
    /// established socket is switched to non-blocking mode.
    pub fn connect(config: &BulkConfig) -> Result<Self> {
        let addr = resolve(&config.endpoint)?;
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| Error::ConnectFailed(format!("{}: {}", config.endpoint, e)))?;
        socket
            .connect_timeout(&addr.into(), config.connect_timeout())
            .map_err(|e| Error::ConnectFailed(format!("{}: {}", config.endpoint, e)))?;
        socket.set_nodelay(config.nodelay)?;
        if config.keepalive {
            socket.set_tcp_keepalive(&TcpKeepalive::new())?;
        }
        let stream: TcpStream = socket.into();
        log::info!("[bulk] connected to {}", addr);
        Self::from_stream(Box::new(stream), config.max_message_size)
    }

    /// Wrap an already connected stream.
    pub fn from_stream(stream: Box<dyn ByteStream>, max_message_size: usize) -> Result<Self> {
        stream.set_nonblocking(true)?;
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "<unknown>".to_string());
        Ok(Self {
            inner: Mutex::new(ConnectionInner {
                stream,
                codec: FrameCodec::new(max_message_size),
                state: ConnectionState::Connected,
                send_queue: VecDeque::new(),
                pending_send: None,
                awaiting_payload: None,
                stats: ConnectionStats::default(),
            }),
            peer,
        })
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn stats(&self) -> ConnectionStats {
        self.inner.lock().stats.clone()
    }

    /// Queue a header-only message and try to flush.
    pub fn send(&self, msg: &BulkMessage) -> Result<()> {
        if msg.payload_size().is_some() {
            return Err(Error::Protocol(format!(
                "{} must be sent with its payload",
                msg.kind_name()
            )));
        }
        let mut inner = self.inner.lock();
        inner.check_operational()?;
        inner.send_queue.push_back(FrameCodec::encode(&msg.encode()?));
        inner.stats.messages_sent += 1;
        inner.flush()?;
        Ok(())
    }

    /// Queue a `SendObject` header together with its payload and try to flush.
    pub fn send_with_payload(&self, msg: &BulkMessage, payload: &[u8]) -> Result<()> {
        match msg.payload_size() {
            Some(size) if size == payload.len() as u64 => {}
            declared => {
                return Err(Error::Protocol(format!(
                    "{} declares payload {:?}, got {} bytes",
                    msg.kind_name(),
                    declared,
                    payload.len()
                )));
            }
        }
        let mut inner = self.inner.lock();
        inner.check_operational()?;
        let max = inner.codec.max_size();
        if payload.len() > max {
            return Err(Error::MessageTooLarge {
                size: payload.len(),
                max,
            });
        }
        inner.send_queue.push_back(FrameCodec::encode(&msg.encode()?));
        inner.send_queue.push_back(FrameCodec::encode(payload));
        inner.stats.messages_sent += 1;
        inner.stats.payload_bytes_sent += payload.len() as u64;
        inner.flush()?;
        Ok(())
    }

    /// Write as much of the send queue as the socket accepts.
    pub fn flush(&self) -> Result<FlushResult> {
        let mut inner = self.inner.lock();
        inner.check_operational()?;
        inner.flush()
    }

    /// Poll for one complete logical message without blocking.
    ///
    /// A `SendObject` header is only returned once its payload frame has
    /// arrived as well.
    pub fn poll(&self) -> Result<Option<Incoming>> {
        let mut inner = self.inner.lock();
        inner.check_operational()?;
        inner.flush()?;

        if inner.awaiting_payload.is_none() {
            let Some(frame) = inner.recv_frame()? else {
                return Ok(None);
            };
            let header = match BulkMessage::decode(&frame) {
                Ok(header) => header,
                Err(e) => {
                    // Framing is intact, so the stream stays usable.
                    log::warn!("[bulk] undecodable header from {}: {}", self.peer, e);
                    return Err(e);
                }
            };
            inner.stats.messages_received += 1;
            inner.stats.last_recv_time = Some(Instant::now());
            if header.payload_size().is_none() {
                return Ok(Some(Incoming {
                    header,
                    payload: None,
                }));
            }
            inner.awaiting_payload = Some(header);
        }

        let Some(payload) = inner.recv_frame()? else {
            return Ok(None);
        };
        let Some(header) = inner.awaiting_payload.take() else {
            return Ok(None);
        };
        if let BulkMessage::SendObject {
            object_id,
            array_type,
            payload_size,
            ..
        } = &header
        {
            if payload.len() as u64 != *payload_size {
                return Err(Error::PayloadMismatch {
                    object_id: object_id.clone(),
                    array_type: *array_type,
                    expected: *payload_size,
                    received: payload.len(),
                });
            }
        }
        inner.stats.payload_bytes_received += payload.len() as u64;
        Ok(Some(Incoming {
            header,
            payload: Some(payload),
        }))
    }

    /// Shut the stream down; further sends fail with `NotConnected`.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        if inner.state == ConnectionState::Connected {
            let _ = inner.stream.shutdown(Shutdown::Both);
            inner.state = ConnectionState::Closed;
            inner.send_queue.clear();
            inner.pending_send = None;
            inner.awaiting_payload = None;
        }
    }
}

impl std::fmt::Debug for BulkConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkConnection")
            .field("peer", &self.peer)
            .field("state", &self.state())
            .finish()
    }
}

fn resolve(endpoint: &str) -> Result<SocketAddr> {
    endpoint
        .to_socket_addrs()
        .map_err(|e| Error::ConnectFailed(format!("{}: {}", endpoint, e)))?
        .next()
        .ok_or_else(|| Error::ConnectFailed(format!("{}: no address", endpoint)))
}
