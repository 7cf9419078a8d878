use std::{io, net::SocketAddr};

use mio::{event::Source, Interest, Registry, Token};
use tracing::{event, Level};

use crate::net::{check_io, Stream};

/// Non-blocking TCP listener.
pub struct Listener {
    inner: mio::net::TcpListener,
    local_addr: SocketAddr,
}

impl Listener {
    /// Bind a non-blocking listening socket on the given address.
    ///
    /// The OS applies its own pending-connection backlog; mio does not
    /// expose `listen(2)`'s backlog parameter.
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let inner = mio::net::TcpListener::bind(addr)?;
        let local_addr = inner.local_addr()?;

        event!(Level::DEBUG, addr = %local_addr, "listening");

        let value = Self { inner, local_addr };
        Ok(value)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept every currently pending connection.
    ///
    /// Stops at `WouldBlock`. A hard accept error fails the whole call;
    /// sockets accepted earlier in the same call are dropped and closed.
    /// Accepted sockets are non-blocking.
    pub fn accept_all(&mut self) -> io::Result<Vec<Stream>> {
        let mut accepted = Vec::new();

        while let Some((stream, peer_addr)) = check_io(self.inner.accept())? {
            event!(Level::DEBUG, peer = %peer_addr, "stream accepted");
            accepted.push(Stream::new(stream, peer_addr));
        }

        Ok(accepted)
    }
}

impl Source for Listener {
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
