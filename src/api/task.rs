//! Driving a connection over an async byte stream.
//!
//! [`connection()`] splits the work in two:
//!
//! - **[`Connection`]**: the application handle posting operations and draining completions.
//! - **[`DataplaneTask`]**: a background task moving bytes between the stream and the connection, running the
//!   dataplane passes in between.
#[cfg(feature = "stats")]
use std::sync::atomic::AtomicUsize;
use std::{
    sync::{Arc, atomic::Ordering},
    time::Duration,
};

use async_mutex::Mutex;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    select,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::connection::{Config, Connection};
use crate::{
    pipeline::{Dataplane, error::Error},
    sync::{
        AtomicDuration,
        event::{self, Waiter},
    },
    transport::Pipe,
};

/// Statistics tracking for the dataplane task (only available with the `stats` feature).
#[cfg(feature = "stats")]
struct DataplaneTaskStats {
    bytes_sent: AtomicUsize,
    bytes_received: AtomicUsize,
}

/// Shared state of the dataplane task, reachable from the [`DataplaneTask`] handle.
struct DataplaneTaskInner {
    /// Timeout for writes to the stream.
    write_timeout: AtomicDuration,
    /// Longest time between two dataplane passes.
    poll_interval: AtomicDuration,
    #[cfg(feature = "stats")]
    stats: DataplaneTaskStats,
}

/// Snapshot of the dataplane task statistics.
#[cfg(feature = "stats")]
#[non_exhaustive]
#[derive(Debug, Clone, Copy)]
pub struct DataplaneStats {
    /// Bytes written to the stream.
    pub bytes_sent: usize,
    /// Bytes read from the stream.
    pub bytes_received: usize,
}

/// Handle of the background task driving a [`Connection`].
///
/// The task ends when the stream reaches EOF or fails, when a write times out,
/// when the connection fails, or when [`stop()`](Self::stop) is called. In the
/// first three cases the connection is failed with
/// [`Error::TransportFailure`].
pub struct DataplaneTask<R, W> {
    handle: JoinHandle<(R, W)>,
    token: CancellationToken,
    inner: Arc<DataplaneTaskInner>,
}

impl<R, W> DataplaneTask<R, W> {
    /// Sets the timeout for writes to the stream.
    ///
    /// # Default
    ///
    /// The default write timeout is 10 seconds.
    pub fn set_write_timeout(&self, timeout: Duration) {
        self.inner.write_timeout.store(timeout, Ordering::Relaxed);
    }

    /// Sets the longest time between two dataplane passes when the stream is idle.
    ///
    /// # Default
    ///
    /// The default poll interval is 100 microseconds.
    pub fn set_poll_interval(&self, interval: Duration) {
        self.inner.poll_interval.store(interval, Ordering::Relaxed);
    }

    #[cfg(feature = "stats")]
    pub fn get_stats(&self) -> DataplaneStats {
        DataplaneStats {
            bytes_sent: self.inner.stats.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.inner.stats.bytes_received.load(Ordering::Relaxed),
        }
    }

    /// Returns `true` once the task has ended.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stops the task and returns a handle resolving to the stream halves.
    ///
    /// Bytes already queued for sending are flushed first.
    pub fn stop(self) -> JoinHandle<(R, W)> {
        let Self {
            handle,
            token,
            inner: _,
        } = self;
        token.cancel();
        handle
    }
}

/// Builder for a [`Connection`] and its [`DataplaneTask`].
pub struct ConnectionBuilder<R, W>
where
    R: AsyncReadExt + Send + Sync + Unpin + 'static,
    W: AsyncWriteExt + Send + Sync + Unpin + 'static,
{
    config: Config,
    remote_capacity: Option<u32>,
    tx_buffer: usize,
    rx_buffer: usize,
    reader: R,
    writer: W,
}

impl<R, W> ConnectionBuilder<R, W>
where
    R: AsyncReadExt + Send + Sync + Unpin + 'static,
    W: AsyncWriteExt + Send + Sync + Unpin + 'static,
{
    /// Sets the number of ring entries.
    ///
    /// At most `capacity - 1` operations can be outstanding at once.
    ///
    /// Default: 64 entries
    #[must_use]
    pub fn capacity(mut self, capacity: u32) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Sets the length of the local memory region.
    ///
    /// Default: 64 KiB
    #[must_use]
    pub fn mr_len(mut self, mr_len: u32) -> Self {
        self.config.mr_len = mr_len;
        self
    }

    /// Sets how many peer requests may wait for their response.
    ///
    /// Must be at least the peer's ring capacity minus one, otherwise a busy
    /// peer fails the connection.
    ///
    /// Default: same as [`capacity`](Self::capacity)
    #[must_use]
    pub fn remote_capacity(mut self, remote_capacity: u32) -> Self {
        self.remote_capacity = Some(remote_capacity);
        self
    }

    /// Sets the size of the send buffer between the dataplane and the stream.
    ///
    /// Default: 64 KiB
    #[must_use]
    pub fn tx_buffer(mut self, bytes: usize) -> Self {
        self.tx_buffer = bytes;
        self
    }

    /// Sets the size of the receive buffer between the stream and the dataplane.
    ///
    /// Default: 64 KiB
    #[must_use]
    pub fn rx_buffer(mut self, bytes: usize) -> Self {
        self.rx_buffer = bytes;
        self
    }

    /// Sets the upper bound on waiting for the connection lock in post and poll calls.
    ///
    /// Default: 1 second
    #[must_use]
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.config.lock_timeout = timeout;
        self
    }

    /// Builds the [`Connection`] and spawns its [`DataplaneTask`].
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the parameters are out of range.
    pub fn build(self) -> Result<(Connection<Pipe>, DataplaneTask<R, W>), Error> {
        let Self {
            mut config,
            remote_capacity,
            tx_buffer,
            rx_buffer,
            reader,
            writer,
        } = self;
        config.remote_capacity = remote_capacity.unwrap_or(config.capacity);
        if tx_buffer == 0 || rx_buffer == 0 {
            return Err(Error::InvalidConfig("stream buffers must not be empty"));
        }

        // Queued bytes wake the task through the pipe's credit hook
        let (credit, credit_waiter) = event::new();
        let pipe = Pipe::new(tx_buffer, rx_buffer).with_credit(credit);
        let conn = Connection::new(config, pipe)?;

        let token = CancellationToken::new();
        let inner = Arc::new(DataplaneTaskInner {
            write_timeout: AtomicDuration::new(Duration::from_secs(10)),
            poll_interval: AtomicDuration::new(Duration::from_micros(100)),
            #[cfg(feature = "stats")]
            stats: DataplaneTaskStats {
                bytes_sent: AtomicUsize::new(0),
                bytes_received: AtomicUsize::new(0),
            },
        });

        let handle = tokio::spawn(dataplane_task(
            conn.dataplane(),
            reader,
            writer,
            credit_waiter,
            rx_buffer,
            inner.clone(),
            token.clone(),
        ));
        Ok((conn, DataplaneTask { handle, token, inner }))
    }
}

/// Why one half of the stream task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    /// Stopped by the handle or by the other half.
    Stopped,
    /// The stream hit EOF, an I/O error or a write timeout.
    Broken,
    /// The connection failed on its own.
    Failed,
}

async fn dataplane_task<R, W>(
    dataplane: Arc<Mutex<Dataplane<Pipe>>>,
    mut reader: R,
    mut writer: W,
    credit: Waiter,
    rx_buffer: usize,
    inner: Arc<DataplaneTaskInner>,
    token: CancellationToken,
) -> (R, W)
where
    R: AsyncReadExt + Send + Sync + Unpin + 'static,
    W: AsyncWriteExt + Send + Sync + Unpin + 'static,
{
    // The halves run concurrently: a write stuck on a full stream must not
    // stop us from reading, or two busy peers wait on each other forever
    let done = token.child_token();
    let (rx, tx) = tokio::join!(
        async {
            let exit = read_task(&dataplane, &mut reader, rx_buffer, &inner, &done).await;
            done.cancel();
            exit
        },
        async {
            let exit = write_task(&dataplane, &mut writer, &credit, &inner, &done).await;
            done.cancel();
            exit
        },
    );

    if rx == Exit::Broken || tx == Exit::Broken {
        dataplane.lock().await.fail(Error::TransportFailure);
    } else {
        // Graceful stop: flush what is already queued
        let mut outbound = Vec::new();
        dataplane.lock().await.transport_mut().drain_tx(&mut outbound);
        if !outbound.is_empty() && write_out(&mut writer, &outbound, &inner).await.is_err() {
            warn!("Failed to flush {} bytes on stop", outbound.len());
        }
    }
    debug!("Dataplane task stopped");

    (reader, writer)
}

/// Writes `bytes` and flushes, bounded by the write timeout.
async fn write_out<W>(writer: &mut W, bytes: &[u8], inner: &DataplaneTaskInner) -> Result<(), Error>
where
    W: AsyncWriteExt + Unpin,
{
    let timeout = inner.write_timeout.load(Ordering::Relaxed);
    match tokio::time::timeout(timeout, async {
        writer.write_all(bytes).await?;
        writer.flush().await
    })
    .await
    {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            warn!("Stream write failed: {e}");
            Err(Error::TransportFailure)
        }
        Err(_) => {
            warn!("Stream write timed out after {timeout:?}");
            Err(Error::Timeout)
        }
    }
}

/// Feeds received bytes to the dataplane, running a pass after each read.
async fn read_task<R>(
    dataplane: &Mutex<Dataplane<Pipe>>,
    reader: &mut R,
    rx_buffer: usize,
    #[cfg_attr(not(feature = "stats"), allow(unused_variables))] inner: &DataplaneTaskInner,
    done: &CancellationToken,
) -> Exit
where
    R: AsyncReadExt + Unpin,
{
    let mut inbound = vec![0u8; rx_buffer];
    loop {
        let read = select! {
            res = reader.read(&mut inbound) => match res {
                Ok(0) => {
                    debug!("Stream closed by peer");
                    return Exit::Broken;
                }
                Ok(n) => n,
                Err(e) => {
                    warn!("Stream read failed: {e}");
                    return Exit::Broken;
                }
            },
            _ = done.cancelled() => return Exit::Stopped,
        };

        #[cfg(feature = "stats")]
        inner.stats.bytes_received.fetch_add(read, Ordering::Relaxed);

        // A successful pass empties the receive buffer, so every round makes room
        let mut dp = dataplane.lock().await;
        let mut pending = &inbound[..read];
        while !pending.is_empty() {
            let accepted = dp.transport_mut().push_rx(pending);
            pending = &pending[accepted..];
            if let Err(e) = dp.poll() {
                debug!("Read half stopping: {e}");
                return Exit::Failed;
            }
        }
    }
}

/// Runs periodic passes and sends whatever they queued.
async fn write_task<W>(
    dataplane: &Mutex<Dataplane<Pipe>>,
    writer: &mut W,
    credit: &Waiter,
    inner: &DataplaneTaskInner,
    done: &CancellationToken,
) -> Exit
where
    W: AsyncWriteExt + Unpin,
{
    let mut outbound: Vec<u8> = Vec::new();
    loop {
        let interval = inner.poll_interval.load(Ordering::Relaxed);
        select! {
            res = credit.wait() => if res.is_err() {
                return Exit::Stopped;
            },
            _ = tokio::time::sleep(interval) => {}
            _ = done.cancelled() => return Exit::Stopped,
        }

        let res = {
            let mut dp = dataplane.lock().await;
            let res = dp.poll();
            dp.transport_mut().drain_tx(&mut outbound);
            res
        };

        if !outbound.is_empty() {
            if write_out(writer, &outbound, inner).await.is_err() {
                return Exit::Broken;
            }
            #[cfg(feature = "stats")]
            inner.stats.bytes_sent.fetch_add(outbound.len(), Ordering::Relaxed);
            outbound.clear();
        }

        if let Err(e) = res {
            debug!("Write half stopping: {e}");
            return Exit::Failed;
        }
    }
}

/// Creates a connection driven over an async byte stream.
///
/// The returned builder spawns a [`DataplaneTask`] owning `reader` and
/// `writer` when built.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
///
/// use tokio::net::TcpStream;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let stream = TcpStream::connect("127.0.0.1:8080").await?;
/// let (reader, writer) = stream.into_split();
/// let (mut conn, task) = ringdma::connection(reader, writer).capacity(16).build()?;
///
/// conn.mr().write_at(0, b"hello")?;
/// let id = conn.post_write(5, 0, 0).await?;
/// let done = conn.poll(1, Duration::from_secs(1)).await?;
/// assert_eq!(done[0].id, id);
///
/// let (_reader, _writer) = task.stop().await?;
/// # Ok(())
/// # }
/// ```
pub fn connection<R, W>(reader: R, writer: W) -> ConnectionBuilder<R, W>
where
    R: AsyncReadExt + Send + Sync + Unpin + 'static,
    W: AsyncWriteExt + Send + Sync + Unpin + 'static,
{
    ConnectionBuilder {
        config: Config::DEFAULT,
        remote_capacity: None,
        tx_buffer: 64 * 1024,
        rx_buffer: 64 * 1024,
        reader,
        writer,
    }
}
