// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Framed reading and writing of bulk messages on a rank connection.
//!
//! The read and write halves are driven by separate tasks, so a partially
//! read frame is never abandoned by a `select!` on the outbound queue.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use vflow::BulkMessage;

/// Connection error types.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// One logical bulk message: a header and, for `SendObject`, its payload.
///
/// Relayed as a unit so payload bytes never interleave with other traffic.
#[derive(Debug, Clone, PartialEq)]
pub struct Relayed {
    pub header: BulkMessage,
    pub payload: Option<Vec<u8>>,
}

impl Relayed {
    pub fn header_only(header: BulkMessage) -> Self {
        Self {
            header,
            payload: None,
        }
    }

    /// Payload bytes carried by this unit.
    pub fn payload_len(&self) -> usize {
        self.payload.as_ref().map_or(0, Vec::len)
    }
}

/// Reading half of a rank connection.
pub struct FrameReader<R> {
    reader: R,
    max_message_size: usize,
    buffer: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R, max_message_size: usize) -> Self {
        Self {
            reader,
            max_message_size,
            buffer: Vec::with_capacity(4096),
        }
    }

    /// Read one length-prefixed frame.
    ///
    /// Returns `Ok(None)` if the connection is closed between frames.
    async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, ConnectionError> {
        // Read length prefix (4 bytes, big-endian)
        let mut len_buf = [0u8; 4];
        match self.reader.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        if len > self.max_message_size {
            return Err(ConnectionError::Protocol(format!(
                "Frame too large: {} > {}",
                len, self.max_message_size
            )));
        }

        self.buffer.clear();
        self.buffer.resize(len, 0);
        self.reader.read_exact(&mut self.buffer).await?;
        Ok(Some(std::mem::take(&mut self.buffer)))
    }

    /// Read one logical message, pulling the payload frame of a `SendObject`.
    pub async fn read_message(&mut self) -> Result<Option<Relayed>, ConnectionError> {
        let Some(frame) = self.read_frame().await? else {
            return Ok(None);
        };
        let header = BulkMessage::decode(&frame)
            .map_err(|e| ConnectionError::Protocol(format!("Invalid header: {}", e)))?;

        let Some(size) = header.payload_size() else {
            return Ok(Some(Relayed::header_only(header)));
        };
        let payload = self.read_frame().await?.ok_or_else(|| {
            ConnectionError::Protocol(format!("Closed before payload of {}", header.kind_name()))
        })?;
        if payload.len() as u64 != size {
            return Err(ConnectionError::Protocol(format!(
                "{} announced {} payload bytes, received {}",
                header.kind_name(),
                size,
                payload.len()
            )));
        }
        Ok(Some(Relayed {
            header,
            payload: Some(payload),
        }))
    }
}

/// Writing half of a rank connection.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    async fn write_frame(&mut self, body: &[u8]) -> Result<(), ConnectionError> {
        self.writer
            .write_all(&(body.len() as u32).to_be_bytes())
            .await?;
        self.writer.write_all(body).await?;
        Ok(())
    }

    /// Write a header and its payload back to back, then flush.
    pub async fn send(&mut self, msg: &Relayed) -> Result<(), ConnectionError> {
        let header = msg.header.encode().map_err(|e| {
            ConnectionError::Protocol(format!("Cannot encode {}: {}", msg.header.kind_name(), e))
        })?;
        self.write_frame(&header).await?;
        if let Some(payload) = &msg.payload {
            self.write_frame(payload).await?;
        }
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), ConnectionError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}
