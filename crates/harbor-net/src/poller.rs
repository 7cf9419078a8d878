use std::{
    collections::HashMap,
    io::{self, ErrorKind},
    time::Duration,
};

use mio::{event::Source, Events, Interest, Poll, Token};
use tracing::{event, Level};

/// Cached readiness bits for one registered source.
#[derive(Debug, Default, Clone, Copy)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
}

/// Edge-triggered readiness multiplexer over a set of registered sources.
///
/// Readiness reported by [`wait`](Poller::wait) is OR-ed into per-token bits
/// that stay set across calls until [`clear`](Poller::clear): a single edge
/// has to survive the separate accept and handle passes of one loop
/// iteration.
pub struct Poller {
    poll: Poll,
    events: Events,
    ready: HashMap<Token, Readiness>,
}

impl Poller {
    /// Create a poller whose kernel event buffer holds up to `max_events`
    /// events per wait call.
    pub fn new(max_events: usize) -> io::Result<Self> {
        let poll = Poll::new()?;

        let value = Self {
            poll,
            events: Events::with_capacity(max_events.max(1)),
            ready: HashMap::new(),
        };
        Ok(value)
    }

    /// Register `source` with read interest.
    ///
    /// The cached bits start out writable. A freshly accepted socket is
    /// almost always writable, so the first response attempt can go through
    /// without waiting for a writable edge; if the kernel disagrees the
    /// write simply comes back short.
    pub fn register<S>(&mut self, source: &mut S, token: Token) -> io::Result<()>
    where
        S: Source,
    {
        self.poll
            .registry()
            .register(source, token, Interest::READABLE)?;

        let initial = Readiness {
            readable: false,
            writable: true,
        };
        self.ready.insert(token, initial);

        Ok(())
    }

    /// Add write interest for an already registered source.
    pub fn enable_write<S>(&mut self, source: &mut S, token: Token) -> io::Result<()>
    where
        S: Source,
    {
        self.poll
            .registry()
            .reregister(source, token, Interest::READABLE | Interest::WRITABLE)
    }

    /// Remove a source and forget its cached bits.
    pub fn unregister<S>(&mut self, source: &mut S, token: Token) -> io::Result<()>
    where
        S: Source,
    {
        self.poll.registry().deregister(source)?;
        self.ready.remove(&token);
        Ok(())
    }

    /// Block until at least one source is ready or `timeout` elapses.
    ///
    /// `None` blocks indefinitely. Kernel-reported bits are OR-ed into the
    /// cached per-token bits, never replaced. An interrupted wait returns an
    /// empty set rather than an error.
    pub fn wait(&mut self, timeout: Option<Duration>) -> io::Result<Vec<Token>> {
        if let Err(error) = self.poll.poll(&mut self.events, timeout) {
            if error.kind() == ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            return Err(error);
        }

        let mut tokens = Vec::new();
        for event in self.events.iter() {
            let token = event.token();
            event!(
                Level::TRACE,
                token = token.0,
                readable = event.is_readable(),
                writable = event.is_writable(),
                "readiness event"
            );

            let bits = self.ready.entry(token).or_default();
            bits.readable |= event.is_readable();
            bits.writable |= event.is_writable();

            if !tokens.contains(&token) {
                tokens.push(token);
            }
        }

        Ok(tokens)
    }

    /// Whether a readable edge is cached for this token.
    pub fn is_readable(&self, token: Token) -> bool {
        self.ready.get(&token).is_some_and(|bits| bits.readable)
    }

    /// Whether a writable edge is cached for this token.
    pub fn is_writable(&self, token: Token) -> bool {
        self.ready.get(&token).is_some_and(|bits| bits.writable)
    }

    /// Zero the cached bits once I/O has been attempted for this token.
    pub fn clear(&mut self, token: Token) {
        if let Some(bits) = self.ready.get_mut(&token) {
            *bits = Readiness::default();
        }
    }
}
