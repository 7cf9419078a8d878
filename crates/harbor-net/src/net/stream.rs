use std::{
    io::{self, ErrorKind, Read, Write},
    net::SocketAddr,
};

use mio::{event::Source, Interest, Registry, Token};
use thiserror::Error;
use tracing::{event, Level};

/// Growth increment for the receive buffer, in bytes.
pub const SINGLE_READ_SIZE: usize = 4096;

/// Non-blocking TCP stream endpoint.
///
/// Writing to a peer that already closed surfaces as a `BrokenPipe` I/O
/// error rather than killing the process: the Rust runtime masks SIGPIPE
/// before `main` runs.
pub struct Stream {
    inner: mio::net::TcpStream,
    peer_addr: SocketAddr,
}

/// I/O failure on a [`Stream`].
#[derive(Error, Debug)]
pub enum StreamError {
    /// The peer closed the connection (zero-byte read).
    #[error("connection closed by peer")]
    Closed,
    /// A hard failure on the socket.
    #[error("socket i/o failed")]
    Io(#[from] io::Error),
}

impl Stream {
    pub(crate) fn new(inner: mio::net::TcpStream, peer_addr: SocketAddr) -> Self {
        Self { inner, peer_addr }
    }

    /// Address of the connected peer, for log lines.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Drain all currently available bytes from the socket.
    ///
    /// Reads until the kernel reports `WouldBlock`, growing the scratch
    /// buffer in [`SINGLE_READ_SIZE`] steps. May return an empty vector if
    /// a readiness edge turned out to be spurious.
    pub fn recv(&mut self) -> Result<Vec<u8>, StreamError> {
        let mut buffer = vec![0; SINGLE_READ_SIZE];
        let mut received = 0;

        loop {
            if received == buffer.len() {
                buffer.resize(buffer.len() + SINGLE_READ_SIZE, 0);
            }

            match self.inner.read(&mut buffer[received..]) {
                Ok(0) => return Err(StreamError::Closed),
                Ok(count) => received += count,
                Err(error) => match error.kind() {
                    ErrorKind::WouldBlock => break,
                    ErrorKind::Interrupted => continue,
                    _ => return Err(error.into()),
                },
            }
        }

        if received != 0 {
            event!(Level::TRACE, peer = %self.peer_addr, count = received, "received data");
        }

        buffer.truncate(received);
        Ok(buffer)
    }

    /// Write from `buf[from..]` until the kernel refuses more.
    ///
    /// Returns the number of bytes accepted, possibly zero; `WouldBlock` is
    /// not an error, the caller retries on the next writable edge.
    pub fn send(&mut self, buf: &[u8], from: usize) -> Result<usize, StreamError> {
        let mut sent = 0;

        while from + sent < buf.len() {
            match self.inner.write(&buf[from + sent..]) {
                Ok(0) => break,
                Ok(count) => sent += count,
                Err(error) => match error.kind() {
                    ErrorKind::WouldBlock => break,
                    ErrorKind::Interrupted => continue,
                    _ => return Err(error.into()),
                },
            }
        }

        if sent != 0 {
            event!(Level::TRACE, peer = %self.peer_addr, count = sent, "sent data");
        }

        Ok(sent)
    }
}

impl Source for Stream {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        self.inner.register(registry, token, interests)
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        self.inner.reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        self.inner.deregister(registry)
    }
}
