// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Length-prefix framing codec for the bulk-data stream.
//!
//! ```text
//! +----------------+-------------------+
//! | Length (4B BE) | Frame body        |
//! +----------------+-------------------+
//! ```
//!
//! A frame body is either a bulk message header or the raw payload that
//! follows a `SendObject` header.

use std::io::{self, Read};

/// Frame header size (4 bytes for length).
pub const FRAME_HEADER_SIZE: usize = 4;

/// Incremental frame decoder.
///
/// Survives `WouldBlock` at any byte boundary, so it can be driven from a
/// non-blocking stream: call [`decode`](Self::decode) again once more bytes
/// are available.
#[derive(Debug)]
pub struct FrameCodec {
    prefix: [u8; FRAME_HEADER_SIZE],
    prefix_filled: usize,
    /// Body being filled, present once the prefix is complete.
    body: Option<PartialBody>,
    max_size: usize,
    frames_decoded: u64,
    frames_rejected: u64,
}

#[derive(Debug)]
struct PartialBody {
    bytes: Vec<u8>,
    filled: usize,
}

/// Read into `buf[*filled..]` until it is full.
///
/// `Ok(false)` means the reader ran dry; `*filled` records the progress.
fn fill<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8], filled: &mut usize) -> io::Result<bool> {
    while *filled < buf.len() {
        match reader.read(&mut buf[*filled..]) {
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => *filled += n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

fn eof(what: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, what)
}

impl FrameCodec {
    pub fn new(max_size: usize) -> Self {
        Self {
            prefix: [0; FRAME_HEADER_SIZE],
            prefix_filled: 0,
            body: None,
            max_size,
            frames_decoded: 0,
            frames_rejected: 0,
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    pub fn frames_rejected(&self) -> u64 {
        self.frames_rejected
    }

    /// Frame `body` as `[length: u32 BE][body]`.
    pub fn encode(body: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + body.len());
        frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
        frame.extend_from_slice(body);
        frame
    }

    /// Decode the next frame body.
    ///
    /// `Ok(None)` when the reader would block before the frame is complete.
    /// EOF, oversized lengths and I/O failures are errors.
    pub fn decode<R: Read + ?Sized>(&mut self, reader: &mut R) -> io::Result<Option<Vec<u8>>> {
        if self.body.is_none() {
            match fill(reader, &mut self.prefix, &mut self.prefix_filled) {
                Ok(true) => {}
                Ok(false) => return Ok(None),
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Err(if self.prefix_filled == 0 {
                        eof("connection closed")
                    } else {
                        eof("incomplete frame header")
                    });
                }
                Err(e) => return Err(e),
            }
            self.prefix_filled = 0;

            let len = u32::from_be_bytes(self.prefix) as usize;
            if len > self.max_size {
                self.frames_rejected += 1;
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("frame too large: {} bytes (max {})", len, self.max_size),
                ));
            }
            self.body = Some(PartialBody {
                bytes: vec![0; len],
                filled: 0,
            });
        }

        let Some(body) = self.body.as_mut() else {
            return Ok(None);
        };
        match fill(reader, &mut body.bytes, &mut body.filled) {
            Ok(true) => {}
            Ok(false) => return Ok(None),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(eof("incomplete frame body"));
            }
            Err(e) => return Err(e),
        }

        self.frames_decoded += 1;
        Ok(self.body.take().map(|b| b.bytes))
    }

    /// Whether some bytes of the next frame have been consumed already.
    pub fn is_partial(&self) -> bool {
        self.prefix_filled > 0 || self.body.is_some()
    }

    /// Drop any partially read frame.
    pub fn reset(&mut self) {
        self.prefix_filled = 0;
        self.body = None;
    }
}
