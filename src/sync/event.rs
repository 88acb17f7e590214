//! A single-slot wakeup shared by one notifier and one waiter.
//!
//! Notifications coalesce: any number of `notify()` calls made while nobody
//! waits wake the next `wait()` exactly once. Dropping either side closes the
//! event and fails every later call on the other side.
use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};

use event_listener::{Event, IntoNotification};
use thiserror::Error;

const PENDING: u8 = 1 << 0;
const CLOSED: u8 = 1 << 1;

/// The other side of the event has been dropped.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("event closed")]
pub(crate) struct Closed;

struct Shared {
    event: Event,
    state: AtomicU8,
}

impl Shared {
    /// Consumes a pending notification.
    fn take(&self) -> Result<bool, Closed> {
        let s = self.state.fetch_and(!PENDING, Ordering::AcqRel);
        if s & CLOSED != 0 {
            return Err(Closed);
        }
        Ok(s & PENDING != 0)
    }

    fn close(&self) {
        self.state.fetch_or(CLOSED, Ordering::AcqRel);
        self.event.notify(usize::MAX);
    }
}

pub(crate) fn new() -> (Notifier, Waiter) {
    let shared = Arc::new(Shared {
        event: Event::new(),
        state: AtomicU8::new(0),
    });
    (Notifier(shared.clone()), Waiter(shared))
}

pub(crate) struct Notifier(Arc<Shared>);

impl Notifier {
    pub(crate) fn notify(&self) -> Result<(), Closed> {
        let s = self.0.state.fetch_or(PENDING, Ordering::AcqRel);
        if s & CLOSED != 0 {
            return Err(Closed);
        }
        if s & PENDING == 0 {
            self.0.event.notify(1.additional().relaxed());
        }
        Ok(())
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        self.0.close();
    }
}

pub(crate) struct Waiter(Arc<Shared>);

impl Waiter {
    pub(crate) async fn wait(&self) -> Result<(), Closed> {
        loop {
            if self.0.take()? {
                return Ok(());
            }
            // Register before checking again so a notify in between is not lost
            let listener = self.0.event.listen();
            if self.0.take()? {
                return Ok(());
            }
            listener.await;
        }
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        self.0.close();
    }
}
