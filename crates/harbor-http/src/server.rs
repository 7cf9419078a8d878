use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::{Duration, Instant},
};

use anyhow::{Context as _, Error};
use mio::Token;
use thiserror::Error;
use thunderdome::{Arena, Index};
use tracing::{event, Level};

use harbor_net::{net::Listener, Poller};

use crate::config::ServerConfig;
use crate::connection::{Connection, RequestStatus};
use crate::logging;
use crate::request::Request;
use crate::response::Response;

/// The embedder's request callback.
///
/// Invoked on the event-loop thread, synchronously, exactly once per
/// request after the full body has been received. A long-running handler
/// blocks the entire server; that is the v1 contract.
pub type Handler = Box<dyn FnMut(&Request, &mut Response) + Send>;

/// Token reserved for the listening socket. Connection tokens encode
/// arena indices, whose bit representation is never zero.
const LISTENER: Token = Token(0);

/// How long one wait may block before the loop gets a chance to run the
/// idle sweep even when no socket shows activity.
const WAIT_TIMEOUT: Duration = Duration::from_secs(1);

/// Minimum interval between idle-connection sweeps.
const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// The server could not be constructed.
#[derive(Error, Debug)]
#[error("unable to create server")]
pub struct CreateServerError {
    #[from]
    source: Error,
}

/// Single-threaded HTTP/1.1 server.
///
/// Owns the listening socket, the readiness poller and every accepted
/// connection; nothing else may touch them while [`start`](Server::start) is
/// looping.
pub struct Server {
    listener: Listener,
    poller: Poller,
    connections: Arena<Connection>,
    handler: Handler,
    config: ServerConfig,
    last_sweep: Instant,
}

impl Server {
    /// Bind the listening socket and set up the readiness poller.
    pub fn new(config: ServerConfig, handler: Handler) -> Result<Self, CreateServerError> {
        if config.enable_logging {
            logging::init(config.external_logging);
        }

        Self::create(config, handler).map_err(|error| {
            event!(Level::ERROR, %error, "error creating server");
            error.into()
        })
    }

    fn create(config: ServerConfig, handler: Handler) -> Result<Self, Error> {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), config.port);
        let listener = Listener::bind(addr).context("failed to bind listening socket")?;

        // One extra event slot for the listener itself.
        let poller = Poller::new(config.max_concurrent_connections as usize + 1)
            .context("failed to create readiness poller")?;

        event!(Level::INFO, port = config.port, "server created");

        let value = Self {
            listener,
            poller,
            connections: Arena::new(),
            handler,
            config,
            last_sweep: Instant::now(),
        };
        Ok(value)
    }

    /// Address the listener is bound to; useful with port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    /// Run the event loop. Blocks until the process is terminated.
    ///
    /// Per-iteration failures (a refused accept, a poisoned connection)
    /// are logged and the loop continues; only a failing poller is fatal.
    pub fn start(&mut self) -> Result<(), Error> {
        self.poller
            .register(&mut self.listener, LISTENER)
            .context("failed to register listener")?;
        event!(Level::INFO, addr = %self.listener.local_addr(), "server listening");

        loop {
            let ready = self
                .poller
                .wait(Some(WAIT_TIMEOUT))
                .context("failed to wait for readiness")?;

            if self.poller.is_readable(LISTENER) {
                if let Err(error) = self.accept_pending() {
                    event!(Level::ERROR, %error, "accept failed");
                }
                self.poller.clear(LISTENER);
            }

            // First pass: latch readiness onto the connections, so a single
            // edge survives until the handling pass below gets to it.
            for &token in &ready {
                if token == LISTENER {
                    continue;
                }
                let readable = self.poller.is_readable(token);
                let writable = self.poller.is_writable(token);

                let Some(connection) = self.connection_mut(token) else {
                    continue;
                };
                if readable {
                    connection.mark_peer_readable();
                }
                if writable {
                    connection.mark_peer_writable();
                }
            }

            // Second pass: drive each ready connection.
            for &token in &ready {
                if token == LISTENER {
                    continue;
                }
                self.progress_connection(token);
            }

            self.sweep_inactive();
        }
    }

    fn connection_mut(&mut self, token: Token) -> Option<&mut Connection> {
        let index = Index::from_bits(token.0 as u64)?;
        self.connections.get_mut(index)
    }

    /// Drain the accept queue, registering every new connection.
    fn accept_pending(&mut self) -> Result<(), Error> {
        let accepted = self
            .listener
            .accept_all()
            .context("failed to accept connections")?;

        for stream in accepted {
            let peer = stream.peer_addr();
            let index = self.connections.insert(Connection::new(stream));
            let token = Token(index.to_bits() as usize);

            if let Some(connection) = self.connections.get_mut(index) {
                if let Err(error) = self.poller.register(connection.stream_mut(), token) {
                    event!(Level::ERROR, %peer, %error, "failed to register connection");
                    self.connections.remove(index);
                    continue;
                }
            }

            event!(Level::INFO, %peer, "connection accepted");
            let active = self.connections.len() as u32;
            if active > self.config.max_concurrent_connections {
                event!(
                    Level::WARN,
                    active,
                    limit = self.config.max_concurrent_connections,
                    "active connections above the configured soft bound"
                );
            }
        }

        Ok(())
    }

    /// Progress one connection and apply the resulting state: arm write
    /// interest once a response is pending, evict terminal connections.
    fn progress_connection(&mut self, token: Token) {
        let Some(index) = Index::from_bits(token.0 as u64) else {
            return;
        };
        let Some(connection) = self.connections.get_mut(index) else {
            return;
        };

        connection.progress(&mut self.handler);
        self.poller.clear(token);
        connection.clear_readiness();

        let status = connection.status();

        // A prepared response that could not be written yet needs a
        // writable edge to make progress; ask the poller to report one.
        let awaiting_write = status == RequestStatus::SendingResponse
            || (connection.response_ready()
                && matches!(
                    status,
                    RequestStatus::RequestReadingDone | RequestStatus::ServerError
                ));
        if awaiting_write {
            if let Err(error) = self.poller.enable_write(connection.stream_mut(), token) {
                event!(Level::ERROR, %error, "failed to enable write interest");
            }
        }

        if matches!(status, RequestStatus::Completed | RequestStatus::ClientError) {
            event!(Level::DEBUG, peer = %connection.peer_addr(), "connection finished");
            if let Err(error) = self.poller.unregister(connection.stream_mut(), token) {
                event!(Level::ERROR, %error, "failed to unregister connection");
            }
            self.connections.remove(index);
        }
    }

    /// Drop connections that have been idle past the configured timeout.
    /// Rate-limited so a busy loop does not rescan the table every turn.
    fn sweep_inactive(&mut self) {
        if self.last_sweep.elapsed() < SWEEP_INTERVAL {
            return;
        }
        self.last_sweep = Instant::now();

        let timeout = Duration::from_secs(self.config.inactive_connection_timeout_in_seconds);
        let expired: Vec<Index> = self
            .connections
            .iter()
            .filter(|(_, connection)| connection.idle_time() > timeout)
            .map(|(index, _)| index)
            .collect();

        for index in expired {
            if let Some(connection) = self.connections.get_mut(index) {
                event!(Level::INFO, peer = %connection.peer_addr(), "connection timed out");
                let token = Token(index.to_bits() as usize);
                if let Err(error) = self.poller.unregister(connection.stream_mut(), token) {
                    event!(Level::ERROR, %error, "failed to unregister timed out connection");
                }
            }
            self.connections.remove(index);
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        event!(Level::INFO, "server closed");
    }
}
