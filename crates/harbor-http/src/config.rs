use crate::constants::limits;

/// Configuration for a [`Server`](crate::Server).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind on all interfaces; 0 picks an ephemeral port.
    pub port: u16,
    /// Advisory bound on the pre-accept connection queue. The OS applies
    /// its own backlog to the listening socket.
    pub max_pending_connections: u32,
    /// Soft bound on concurrently served connections; sizes the poller's
    /// event buffer. Accepts continue past it.
    pub max_concurrent_connections: u32,
    /// Idle seconds after which a connection is dropped.
    pub inactive_connection_timeout_in_seconds: u64,
    /// Install the logging subscriber when the server is created.
    pub enable_logging: bool,
    /// Route log output to `server.log` instead of stdout.
    pub external_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            max_pending_connections: limits::DEFAULT_BACKLOG,
            max_concurrent_connections: 1024,
            inactive_connection_timeout_in_seconds: 60,
            enable_logging: true,
            external_logging: false,
        }
    }
}
