//! Application side of a connection.
//!
//! A [`Connection`] posts READ and WRITE operations into its work ring and
//! drains their completions. Progress on the wire is made by the dataplane,
//! either from a [`DataplaneTask`](crate::DataplaneTask) or from the
//! application's own calls to [`poll()`](Connection::poll).
use std::{
    sync::{
        Arc,
        atomic::{self, Ordering},
    },
    time::Duration,
};

use async_mutex::{Mutex, MutexGuard};
use tracing::debug;

use crate::{
    buffers::MemoryRegion,
    pipeline::{
        Dataplane, LOCAL_EPOCH,
        error::Error,
        ring::{Boundaries, WorkRing, dist},
    },
    protocol::{Completion, OpKind, WQE_SIZE, Wqe, WqeStatus},
    sync::event::{self, Waiter},
    transport::Transport,
};

/// Parameters of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Number of ring entries. One entry is always kept free, so at most
    /// `capacity - 1` operations are outstanding.
    pub capacity: u32,
    /// Length in bytes of the local memory region.
    pub mr_len: u32,
    /// Number of peer requests that may wait for their response.
    pub remote_capacity: u32,
    /// Upper bound on waiting for the connection lock.
    pub lock_timeout: Duration,
}

impl Config {
    pub const DEFAULT: Self = Self {
        capacity: 64,
        mr_len: 64 * 1024,
        remote_capacity: 64,
        lock_timeout: Duration::from_secs(1),
    };

    fn validate(&self) -> Result<(), Error> {
        if self.capacity < 2 {
            return Err(Error::InvalidConfig("capacity must be at least 2"));
        }
        if self.capacity.checked_mul(WQE_SIZE).is_none() {
            return Err(Error::InvalidConfig("capacity is too large"));
        }
        if self.remote_capacity == 0 {
            return Err(Error::InvalidConfig("remote capacity must not be zero"));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A connection exposing one memory region to its peer.
///
/// Posting and polling take `&mut self`: operations on one connection are
/// issued from one task at a time.
pub struct Connection<T> {
    ring: Arc<WorkRing>,
    mr: Arc<MemoryRegion>,
    dataplane: Arc<Mutex<Dataplane<T>>>,
    waiter: Waiter,
    /// Application-owned boundaries.
    wq_head: u32,
    cq_tail: u32,
    lock_timeout: Duration,
}

impl<T: Transport> Connection<T> {
    /// Creates a connection over `transport`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the parameters are out of range.
    pub fn new(config: Config, transport: T) -> Result<Self, Error> {
        config.validate()?;

        let ring = Arc::new(WorkRing::new(config.capacity));
        let mr = Arc::new(MemoryRegion::new(config.mr_len));
        let (notifier, waiter) = event::new();
        let dataplane = Dataplane::new(
            ring.clone(),
            mr.clone(),
            transport,
            config.remote_capacity as usize,
            notifier,
        );
        debug!(
            "New connection: {} entries, {} bytes of memory region",
            config.capacity, config.mr_len
        );

        Ok(Self {
            ring,
            mr,
            dataplane: Arc::new(Mutex::new(dataplane)),
            waiter,
            wq_head: 0,
            cq_tail: 0,
            lock_timeout: config.lock_timeout,
        })
    }

    pub(crate) fn dataplane(&self) -> Arc<Mutex<Dataplane<T>>> {
        self.dataplane.clone()
    }

    /// The local memory region.
    pub fn mr(&self) -> &MemoryRegion {
        &self.mr
    }

    /// Number of ring entries.
    pub fn capacity(&self) -> u32 {
        self.ring.len() / WQE_SIZE
    }

    /// Snapshot of the ring boundaries.
    pub fn boundaries(&self) -> Boundaries {
        Boundaries {
            wq_head: self.wq_head,
            cq_tail: self.cq_tail,
            ..self.ring.boundaries()
        }
    }

    /// Posts a READ of `len` bytes from the peer's region at `roff` into the local region at `loff`.
    ///
    /// Returns the operation id reported by its completion.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidOffset`]: `loff + len` exceeds the local region, nothing is sent.
    /// - [`Error::QueueFull`]: no free ring entry; drain completions and retry.
    /// - [`Error::Timeout`]: the connection lock could not be taken in time.
    /// - [`Error::ProtocolViolation`] / [`Error::TransportFailure`]: the connection has failed.
    pub async fn post_read(&mut self, len: u32, loff: u32, roff: u32) -> Result<u32, Error> {
        self.post(OpKind::Read, len, loff, roff).await
    }

    /// Posts a WRITE of `len` bytes from the local region at `loff` into the peer's region at `roff`.
    ///
    /// The payload is read from the local region when the dataplane sends it,
    /// not when the call is made. Do not modify it before the completion.
    ///
    /// # Errors
    ///
    /// Same as [`post_read()`](Self::post_read).
    pub async fn post_write(&mut self, len: u32, loff: u32, roff: u32) -> Result<u32, Error> {
        self.post(OpKind::Write, len, loff, roff).await
    }

    async fn post(&mut self, kind: OpKind, len: u32, loff: u32, roff: u32) -> Result<u32, Error> {
        let wqe = Wqe {
            id: self.wq_head / WQE_SIZE,
            kind,
            status: WqeStatus::Pending,
            loff,
            roff,
            len,
        };
        if !wqe.fits(self.mr.len()) {
            return Err(Error::InvalidOffset {
                offset: loff,
                len,
                mr_len: self.mr.len(),
            });
        }

        let next = self.ring.next(self.wq_head);
        if next == self.cq_tail {
            return Err(Error::QueueFull);
        }

        // The record must be visible before the boundary that covers it
        self.ring.store(self.wq_head, &wqe);
        atomic::fence(Ordering::Release);

        let mut dp = self.lock().await?;
        dp.bump(next, self.cq_tail)?;
        drop(dp);

        self.wq_head = next;
        Ok(wqe.id)
    }

    /// Drains up to `max` completions, waiting at most `timeout` for them.
    ///
    /// If fewer than `max` completions are visible, a dataplane pass is run and
    /// the call waits for more until `timeout` elapses. The returned entries
    /// are in posting order; fewer than `max`, even none, is not an error.
    ///
    /// # Errors
    ///
    /// Once the connection has failed, the entries it flushed are returned
    /// first; when none are left the failure itself is returned.
    pub async fn poll(&mut self, max: usize, timeout: Duration) -> Result<Vec<Wqe>, Error> {
        let start = LOCAL_EPOCH.elapsed();
        let mut failure = None;

        while self.ready() < max {
            if let Err(e) = self.lock().await?.poll() {
                failure = Some(e);
                break;
            }
            if self.ready() >= max {
                break;
            }

            let Some(remaining) = timeout.checked_sub(LOCAL_EPOCH.elapsed().saturating_sub(start)) else {
                break;
            };
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, self.waiter.wait()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) | Err(_) => break,
            }
        }

        let out = self.drain(max).await?;
        match failure {
            Some(e) if out.is_empty() => Err(e),
            _ => Ok(out),
        }
    }

    /// Waits at most `timeout` for the next completion.
    ///
    /// A zero timeout checks once without waiting.
    pub async fn poll_event(&mut self, timeout: Duration) -> Result<Option<Completion>, Error> {
        let mut out = self.poll(1, timeout).await?;
        Ok(out.pop().map(Completion::from))
    }

    /// Number of completed entries not drained yet.
    fn ready(&self) -> usize {
        (dist(self.ring.len(), self.cq_tail, self.ring.cq_head()) / WQE_SIZE) as usize
    }

    async fn drain(&mut self, max: usize) -> Result<Vec<Wqe>, Error> {
        let n = self.ready().min(max);
        if n == 0 {
            return Ok(vec![]);
        }

        let mut out = Vec::with_capacity(n);
        let mut tail = self.cq_tail;
        for _ in 0..n {
            out.push(self.ring.load(tail));
            tail = self.ring.next(tail);
        }

        self.lock().await?.bump(self.wq_head, tail)?;
        self.cq_tail = tail;
        Ok(out)
    }

    async fn lock(&self) -> Result<MutexGuard<'_, Dataplane<T>>, Error> {
        match self.dataplane.try_lock() {
            Some(dp) => Ok(dp),
            None => tokio::time::timeout(self.lock_timeout, self.dataplane.lock())
                .await
                .map_err(|_| Error::Timeout),
        }
    }
}
