use thiserror::Error;

/// Error returned by connection operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// `offset + len` exceeds the length of the local memory region.
    ///
    /// This error is returned synchronously by the post and memory access
    /// calls and the operation never reaches the wire. It is recoverable:
    /// the caller may retry with a valid range.
    #[error("Range {offset}+{len} exceeds the memory region of {mr_len} bytes")]
    InvalidOffset {
        /// Requested start offset.
        offset: u32,
        /// Requested length.
        len: u32,
        /// Length of the memory region.
        mr_len: u32,
    },

    /// No free slot is left in the work queue.
    ///
    /// One slot is always kept free so that a full ring can be told apart
    /// from an empty one. Slots are recycled once their completions have been
    /// drained with [`poll()`](crate::Connection::poll), so the caller may
    /// retry after polling.
    #[error("The work queue is full")]
    QueueFull,

    /// The two ends of the connection no longer agree on the ring state.
    ///
    /// This error is unrecoverable for the connection: once raised, every
    /// subsequent operation on the same connection returns it again. The
    /// [`Violation`] describes what was detected.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(Violation),

    /// The underlying byte stream failed or was closed.
    ///
    /// Operations still in flight complete with
    /// [`WqeStatus::ConnFailure`](crate::WqeStatus::ConnFailure). This is a
    /// terminal state for the connection.
    #[error("The transport failed or was closed")]
    TransportFailure,

    /// Timed out while waiting for the connection lock or for the transport.
    ///
    /// This is **not** a terminal error, the operation may be retried.
    #[error("Timed out")]
    Timeout,

    /// The handle does not name a live connection.
    ///
    /// Returned by [`ConnectionTable`](crate::ConnectionTable) when the
    /// connection was removed or the slot has since been reused.
    #[error("Stale or unknown connection handle")]
    InvalidHandle,

    /// The connection parameters are out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

impl From<Violation> for Error {
    fn from(v: Violation) -> Self {
        Self::ProtocolViolation(v)
    }
}

/// Detail of a [`Error::ProtocolViolation`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Violation {
    /// A bump proposed boundaries that break the ring ordering.
    #[error(
        "invalid bump len={ring_len} wq_head={wq_head} wq_tail={wq_tail} cq_head={cq_head} cq_tail={cq_tail} \
         new_wq_head={new_wq_head} new_cq_tail={new_cq_tail}"
    )]
    Bump {
        ring_len: u32,
        wq_head: u32,
        wq_tail: u32,
        cq_head: u32,
        cq_tail: u32,
        new_wq_head: u32,
        new_cq_tail: u32,
    },

    /// A response arrived out of order.
    #[error("invalid response received={received} expected={expected}")]
    Correlation { expected: u32, received: u32 },

    /// A response arrived while no entry was awaiting one.
    #[error("unexpected response id={id}")]
    UnexpectedResponse { id: u32 },

    /// A read response does not match an outstanding read.
    #[error("read response id={id} does not match an outstanding read")]
    ReadResponse { id: u32 },

    /// The frame flags are not one of the four valid combinations.
    #[error("invalid frame flags {flags:#04x}")]
    UnknownFlags { flags: u8 },

    /// A response carried a non-terminal status.
    #[error("invalid response status {status:#04x}")]
    UnknownStatus { status: u8 },

    /// The peer has more requests outstanding than the remote queue holds.
    #[error("remote request queue overflow")]
    RemoteQueueFull,
}
