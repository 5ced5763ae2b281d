// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! ByteStream trait for the bulk-data connection.
//!
//! Lets [`BulkConnection`](super::BulkConnection) run over a real
//! `TcpStream` or over the in-memory [`mock::MockStream`] used by tests.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};

/// A non-blocking, bidirectional byte stream.
///
/// Reads with nothing available return `WouldBlock`.
pub trait ByteStream: Read + Write + Send {
    fn shutdown(&mut self, how: Shutdown) -> io::Result<()>;

    fn peer_addr(&self) -> io::Result<SocketAddr>;

    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()>;
}

impl ByteStream for TcpStream {
    fn shutdown(&mut self, how: Shutdown) -> io::Result<()> {
        TcpStream::shutdown(self, how)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::peer_addr(self)
    }

    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        TcpStream::set_nonblocking(self, nonblocking)
    }
}

pub type BoxedByteStream = Box<dyn ByteStream>;


#[cfg(test)]
mod tests {
    use super::mock::MockStream;
    use super::*;

    #[test]
    fn test_empty_mock_would_block() {
        let mut stream = MockStream::new();
        let mut buf = [0u8; 8];
        assert_eq!(
            stream.read(&mut buf).unwrap_err().kind(),
            io::ErrorKind::WouldBlock
        );

        stream.feed_read_data(b"grid");
        assert_eq!(stream.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"grid");
    }

    #[test]
    fn test_pair_crosses_bytes() {
        let (mut a, mut b) = MockStream::pair();
        a.write_all(b"to b").unwrap();
        b.write_all(b"to a").unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(b.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"to b");
        assert_eq!(a.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"to a");

        assert_eq!(a.take_written_data(), b"to b");
        assert!(a.get_written_data().is_empty());
    }

    #[test]
    fn test_disconnect_drains_before_eof() {
        let mut stream = MockStream::new();
        let observer = stream.clone();
        observer.feed_read_data(b"last");
        observer.disconnect();

        let mut buf = [0u8; 8];
        assert_eq!(stream.read(&mut buf).unwrap(), 4);
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
        assert_eq!(
            stream.write(b"late").unwrap_err().kind(),
            io::ErrorKind::BrokenPipe
        );
    }
}
