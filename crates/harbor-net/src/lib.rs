#![deny(unsafe_code)]

//! Non-blocking TCP plumbing for the harbor HTTP server.
//!
//! Everything in this crate is single-threaded and readiness-driven: the
//! [`Poller`] reports which registered sockets became readable or writable,
//! and [`net::Listener`] / [`net::Stream`] drain or fill the kernel buffers
//! until they would block.

pub mod net;
mod poller;

pub use self::poller::{Poller, Readiness};
