#![deny(unsafe_code)]

//! Embeddable single-threaded HTTP/1.1 server.
//!
//! A host constructs a [`Server`] from a [`ServerConfig`] and a single
//! request handler; the library owns the accept/parse/respond cycle on one
//! thread, multiplexing connections with edge-triggered readiness. Every
//! response is sent with `Connection: close`; there is no keep-alive, TLS,
//! or routing layer.
//!
//! ```no_run
//! use harbor_http::{Server, ServerConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = ServerConfig {
//!     port: 8080,
//!     ..ServerConfig::default()
//! };
//!
//! let mut server = Server::new(
//!     config,
//!     Box::new(|request, response| {
//!         response.status = 200;
//!         response.reason = "OK".into();
//!         response.set_body(format!("hello from {}", request.uri));
//!     }),
//! )?;
//!
//! server.start()
//! # }
//! ```

pub mod constants;
pub mod parser;

mod config;
mod connection;
mod logging;
mod request;
mod response;
mod server;

pub use self::{
    config::ServerConfig,
    request::Request,
    response::Response,
    server::{CreateServerError, Handler, Server},
};
