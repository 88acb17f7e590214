use std::fmt;

/// Size in bytes of one work queue record.
///
/// The ring capacity is always a multiple of this value and every ring
/// boundary is a byte offset aligned to it.
///
/// ```text
///  0       4   5   6       8      12      16      20
/// +-------+---+---+-------+-------+-------+-------+
/// |  id   | k | s |  pad  | loff  | roff  |  len  |
/// +-------+---+---+-------+-------+-------+-------+
/// ```
pub const WQE_SIZE: u32 = 20;

/// Kind of a one-sided operation.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// Copy `len` bytes from the peer's region at `roff` into the local region at `loff`.
    Read = 0,
    /// Copy `len` bytes from the local region at `loff` into the peer's region at `roff`.
    Write = 1,
}

impl OpKind {
    pub(crate) const fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Read),
            1 => Some(Self::Write),
            _ => None,
        }
    }
}

/// Status of a work queue entry.
///
/// [`Success`](Self::Success), [`ConnFailure`](Self::ConnFailure) and
/// [`OutOfBounds`](Self::OutOfBounds) are terminal and are the only values
/// the application ever observes in a completion. The remaining values track
/// the progress of an entry inside the dataplane.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WqeStatus {
    /// The operation completed and the peer acknowledged it.
    Success = 0,
    /// The connection failed before the operation could complete.
    ConnFailure = 1,
    /// `offset + len` exceeded the length of the memory region it targets.
    OutOfBounds = 2,
    /// Posted, not yet picked up by the dataplane.
    Pending = 0x80,
    /// Header sent, payload partially sent.
    TxPending = 0x81,
    /// Fully sent, waiting for the peer's response.
    RespPending = 0x82,
}

impl WqeStatus {
    /// Returns `true` if no further transition is possible.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::ConnFailure | Self::OutOfBounds)
    }

    pub(crate) const fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Success),
            1 => Some(Self::ConnFailure),
            2 => Some(Self::OutOfBounds),
            0x80 => Some(Self::Pending),
            0x81 => Some(Self::TxPending),
            0x82 => Some(Self::RespPending),
            _ => None,
        }
    }

    /// Decodes a status byte received in a response header.
    pub(crate) const fn from_wire(v: u8) -> Option<Self> {
        match Self::from_u8(v) {
            Some(s) if s.is_terminal() => Some(s),
            _ => None,
        }
    }
}

/// A work queue entry: one READ or WRITE operation.
///
/// Entries returned by [`Connection::poll`](crate::Connection::poll) are
/// copies; the ring storage is never exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wqe {
    /// Slot index the entry was posted at, returned by the post call.
    pub id: u32,
    /// Direction of the copy.
    pub kind: OpKind,
    /// Progress of the entry; terminal once it is handed to the application.
    pub status: WqeStatus,
    /// Offset into the local memory region.
    pub loff: u32,
    /// Offset into the peer's memory region.
    pub roff: u32,
    /// Number of bytes copied.
    pub len: u32,
}

impl Wqe {
    /// Returns `true` if `[loff, loff + len)` lies within a region of `mr_len` bytes.
    pub(crate) const fn fits(&self, mr_len: u32) -> bool {
        self.loff as u64 + self.len as u64 <= mr_len as u64
    }

    #[cfg(test)]
    pub(crate) fn rand() -> Self {
        use rand::Rng;

        let mut rng = rand::rng();
        Self {
            id: rng.random(),
            kind: if rng.random_bool(0.5) { OpKind::Read } else { OpKind::Write },
            status: WqeStatus::Pending,
            loff: rng.random(),
            roff: rng.random(),
            len: rng.random(),
        }
    }
}

/// Completion event handed to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// Identifier returned when the operation was posted.
    pub id: u32,
    /// Direction of the copy.
    pub kind: OpKind,
    /// How the operation ended.
    pub status: WqeStatus,
}

impl From<Wqe> for Completion {
    fn from(wqe: Wqe) -> Self {
        Self {
            id: wqe.id,
            kind: wqe.kind,
            status: wqe.status,
        }
    }
}

impl fmt::Display for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}#{} {:?}", self.kind, self.id, self.status)
    }
}
