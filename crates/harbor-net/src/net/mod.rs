mod listener;
mod stream;

pub use self::{
    listener::Listener,
    stream::{Stream, StreamError, SINGLE_READ_SIZE},
};

use std::io::{self, ErrorKind};

/// Maps `WouldBlock` to `None`, leaving other errors intact.
///
/// The drain loops in this crate treat `WouldBlock` as "nothing left to
/// handle", not as a failure.
pub(crate) fn check_io<T>(value: io::Result<T>) -> io::Result<Option<T>> {
    match value {
        Ok(value) => Ok(Some(value)),
        Err(error) if error.kind() == ErrorKind::WouldBlock => Ok(None),
        Err(error) => Err(error),
    }
}
