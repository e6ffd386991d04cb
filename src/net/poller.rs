//! Readiness multiplexer over epoll.
//!
//! Registration is edge-triggered: each `add`/`modify` rearms interest, and
//! consumers must drain readable data in one pass before the next readiness
//! notification can arrive.

use std::io;
use std::time::Duration;

use mio::event::Source;
use mio::{Events, Interest, Poll, Token};

/// Capacity of the event buffer handed to the OS per wait.
const EVENT_CAPACITY: usize = 1024;

/// One readiness notification, copied out of the OS buffer so the caller
/// can mutate its own state while walking the batch.
#[derive(Debug, Clone, Copy)]
pub struct ReadyEvent {
    pub token: Token,
    pub readable: bool,
    pub writable: bool,
    pub error: bool,
    pub hangup: bool,
}

/// The facility the reactor blocks in. Single-threaded; wraps one epoll
/// instance which is disposed on drop.
#[derive(Debug)]
pub struct Poller {
    poll: Poll,
    events: Events,
}

impl Poller {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(EVENT_CAPACITY),
        })
    }

    /// Registers a descriptor for the given interest.
    pub fn add<S: Source>(&self, source: &mut S, token: Token, interest: Interest) -> io::Result<()> {
        self.poll.registry().register(source, token, interest)
    }

    /// Replaces a descriptor's interest, rearming edge-triggered readiness.
    pub fn modify<S: Source>(
        &self,
        source: &mut S,
        token: Token,
        interest: Interest,
    ) -> io::Result<()> {
        self.poll.registry().reregister(source, token, interest)
    }

    /// Deregisters a descriptor. Deregistering one that is already gone
    /// surfaces the OS error; callers log and continue.
    pub fn remove<S: Source>(&self, source: &mut S) -> io::Result<()> {
        self.poll.registry().deregister(source)
    }

    /// Blocks until at least one descriptor is ready (or the timeout, when
    /// one is given), then fills `ready` with the batch in delivery order.
    ///
    /// Interrupted waits are retried internally and never surface to the
    /// caller. Returns the number of events delivered.
    pub fn wait(
        &mut self,
        ready: &mut Vec<ReadyEvent>,
        timeout: Option<Duration>,
    ) -> io::Result<usize> {
        loop {
            match self.poll.poll(&mut self.events, timeout) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
            if self.events.is_empty() && timeout.is_none() {
                // Spurious wakeup with nothing ready; keep blocking.
                continue;
            }
            break;
        }

        ready.clear();
        for event in self.events.iter() {
            ready.push(ReadyEvent {
                token: event.token(),
                readable: event.is_readable(),
                writable: event.is_writable(),
                error: event.is_error(),
                // Hangup means both directions are closed. A peer that wrote
                // its data and shut down only its write half must still get
                // the readable dispatch.
                hangup: event.is_read_closed() && event.is_write_closed(),
            });
        }
        Ok(ready.len())
    }
}
