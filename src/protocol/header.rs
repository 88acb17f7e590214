use super::{OpKind, Wqe, WqeStatus, flag};

/// The four frame kinds that may appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameKind {
    /// Asks the peer to send back `length` bytes. Header only.
    ReadRequest,
    /// Carries `length` bytes for the peer's region.
    WriteRequest,
    /// Carries the `length` bytes asked for by a read request.
    ReadResponse,
    /// Acknowledges a write request. Header only.
    WriteResponse,
}

impl FrameKind {
    pub(crate) const fn new(is_request: bool, kind: OpKind) -> Self {
        match (is_request, kind) {
            (true, OpKind::Read) => Self::ReadRequest,
            (true, OpKind::Write) => Self::WriteRequest,
            (false, OpKind::Read) => Self::ReadResponse,
            (false, OpKind::Write) => Self::WriteResponse,
        }
    }

    pub(crate) const fn from_flags(flags: u8) -> Option<Self> {
        match (flags & flag::DIRECTION, flags & flag::KIND) {
            (flag::REQUEST, flag::READ) => Some(Self::ReadRequest),
            (flag::REQUEST, flag::WRITE) => Some(Self::WriteRequest),
            (flag::RESPONSE, flag::READ) => Some(Self::ReadResponse),
            (flag::RESPONSE, flag::WRITE) => Some(Self::WriteResponse),
            _ => None,
        }
    }

    pub(crate) const fn flags(self) -> u8 {
        match self {
            Self::ReadRequest => flag::REQUEST | flag::READ,
            Self::WriteRequest => flag::REQUEST | flag::WRITE,
            Self::ReadResponse => flag::RESPONSE | flag::READ,
            Self::WriteResponse => flag::RESPONSE | flag::WRITE,
        }
    }

    /// Returns `true` if `length` payload bytes follow the header.
    #[cfg(test)]
    pub(crate) const fn has_payload(self) -> bool {
        matches!(self, Self::WriteRequest | Self::ReadResponse)
    }
}

/// Header preceding every frame on the byte stream.
///
/// All multi-byte fields are big-endian. The reserved field is written as
/// zero and ignored when decoding.
///
/// ```text
///  0       1       2               6              10              14      16              20
/// +-------+-------+---------------+---------------+---------------+-------+---------------+
/// | flags | status|    length     | remote_offset |      id       |  rsv  | local_offset  |
/// +-------+-------+---------------+---------------+---------------+-------+---------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RdmaHeader {
    pub(crate) flags: u8,
    pub(crate) status: u8,
    pub(crate) length: u32,
    pub(crate) remote_offset: u32,
    pub(crate) id: u32,
    pub(crate) local_offset: u32,
}

impl RdmaHeader {
    /// Encoded size in bytes.
    pub(crate) const LEN: usize = 20;

    /// Header opening the operation described by a locally posted entry.
    pub(crate) const fn request(wqe: &Wqe) -> Self {
        Self {
            flags: FrameKind::new(true, wqe.kind).flags(),
            status: 0,
            length: wqe.len,
            remote_offset: wqe.roff,
            id: wqe.id,
            local_offset: wqe.loff,
        }
    }

    /// Header answering a peer request held in the remote-request queue.
    ///
    /// A read that fell outside the region is answered without payload.
    pub(crate) const fn response(wqe: &Wqe) -> Self {
        let length = match (wqe.kind, wqe.status) {
            (OpKind::Read, WqeStatus::OutOfBounds) => 0,
            _ => wqe.len,
        };
        Self {
            flags: FrameKind::new(false, wqe.kind).flags(),
            status: wqe.status as u8,
            length,
            remote_offset: wqe.roff,
            id: wqe.id,
            local_offset: wqe.loff,
        }
    }

    pub(crate) const fn kind(&self) -> Option<FrameKind> {
        FrameKind::from_flags(self.flags)
    }

    /// Entry synthesized on the receiving side of a request.
    ///
    /// Offsets are mirrored: the sender's remote offset addresses our region.
    pub(crate) const fn to_remote_wqe(&self, kind: OpKind, mr_len: u32) -> Wqe {
        let mut wqe = Wqe {
            id: self.id,
            kind,
            status: WqeStatus::Pending,
            loff: self.remote_offset,
            roff: self.local_offset,
            len: self.length,
        };
        if !wqe.fits(mr_len) {
            wqe.status = WqeStatus::OutOfBounds;
        }
        wqe
    }

    #[cfg(test)]
    pub(crate) fn rand() -> Self {
        use rand::Rng;

        let mut rng = rand::rng();
        let kind = FrameKind::new(rng.random_bool(0.5), Wqe::rand().kind);
        Self {
            flags: kind.flags(),
            status: rng.random_range(0..=2),
            length: rng.random(),
            remote_offset: rng.random(),
            id: rng.random(),
            local_offset: rng.random(),
        }
    }
}
