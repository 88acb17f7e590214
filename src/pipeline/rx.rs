use tracing::{trace, warn};

use super::{CHUNK, Dataplane, error::{Error, Violation}};
use crate::{
    protocol::{FrameKind, OpKind, RdmaHeader, Wqe, WqeStatus},
    transport::Transport,
};

/// What to do once the payload of a frame has been received.
#[derive(Debug, Clone, Copy)]
pub(crate) enum OnPayload {
    /// Queue the write acknowledgment for the peer.
    Acknowledge(Wqe),
    /// Complete the local read.
    Complete { id: u32, status: WqeStatus },
}

/// Receive state carried across passes.
#[derive(Debug, Clone, Copy)]
pub(crate) enum RxState {
    AwaitingHeader {
        buf: [u8; RdmaHeader::LEN],
        got: usize,
    },
    AwaitingPayload {
        then: OnPayload,
        /// Destination offset in the region of the next byte.
        at: u32,
        remaining: u32,
        /// Drop the bytes instead of copying them.
        discard: bool,
    },
}

impl Default for RxState {
    fn default() -> Self {
        Self::AwaitingHeader {
            buf: [0; RdmaHeader::LEN],
            got: 0,
        }
    }
}

impl<T: Transport> Dataplane<T> {
    /// Consumes every received byte, stopping in the middle of a frame when the input runs dry.
    pub(super) fn rx_pass(&mut self) -> Result<(), Error> {
        loop {
            match self.rx {
                RxState::AwaitingHeader { mut buf, got } => {
                    let n = (RdmaHeader::LEN - got).min(self.transport.rx_avail());
                    if n == 0 {
                        return Ok(());
                    }
                    let n = self.transport.rx_copy(0, &mut buf[got..got + n]);
                    self.transport.rx_consume(n);

                    let got = got + n;
                    if got < RdmaHeader::LEN {
                        self.rx = RxState::AwaitingHeader { buf, got };
                        return Ok(());
                    }

                    self.rx = RxState::default();
                    let header = RdmaHeader::decode(&buf).map_err(|_| Error::TransportFailure)?;
                    self.rx_header(&header)?;
                }
                RxState::AwaitingPayload {
                    then,
                    at,
                    remaining,
                    discard,
                } => {
                    if remaining == 0 {
                        self.rx = RxState::default();
                        self.rx_finish(then)?;
                        continue;
                    }

                    let n = (remaining as usize).min(self.transport.rx_avail()).min(CHUNK);
                    if n == 0 {
                        return Ok(());
                    }
                    let mut scratch = [0u8; CHUNK];
                    let n = self.transport.rx_copy(0, &mut scratch[..n]);
                    if !discard {
                        self.mr.write_at(at, &scratch[..n])?;
                    }
                    self.transport.rx_consume(n);

                    self.rx = RxState::AwaitingPayload {
                        then,
                        at: at.wrapping_add(n as u32),
                        remaining: remaining - n as u32,
                        discard,
                    };
                }
            }
        }
    }

    fn rx_header(&mut self, header: &RdmaHeader) -> Result<(), Error> {
        let kind = header.kind().ok_or(Violation::UnknownFlags { flags: header.flags })?;
        trace!("RX {kind:?} id={} len={}", header.id, header.length);

        let mr_len = self.mr.len();
        match kind {
            FrameKind::ReadRequest => {
                let mut wqe = header.to_remote_wqe(OpKind::Read, mr_len);
                if wqe.status == WqeStatus::Pending {
                    wqe.status = WqeStatus::Success;
                } else {
                    warn!("Peer read {}+{} out of bounds", wqe.loff, wqe.len);
                }
                self.rq.push(wqe)?;
            }
            FrameKind::WriteRequest => {
                let wqe = header.to_remote_wqe(OpKind::Write, mr_len);
                let discard = wqe.status == WqeStatus::OutOfBounds;
                if discard {
                    warn!("Peer write {}+{} out of bounds, discarding payload", wqe.loff, wqe.len);
                }
                self.rx_expect(OnPayload::Acknowledge(wqe), wqe.loff, header.length, discard);
            }
            FrameKind::ReadResponse => {
                let status = self.rx_status(header)?;
                let off = self.pending(header.id)?;
                let local = self.ring.load(off);
                if local.kind != OpKind::Read || local.len < header.length {
                    return Err(Violation::ReadResponse { id: header.id }.into());
                }
                let then = OnPayload::Complete { id: header.id, status };
                self.rx_expect(then, local.loff, header.length, false);
            }
            FrameKind::WriteResponse => {
                let status = self.rx_status(header)?;
                self.complete(header.id, status)?;
            }
        }
        Ok(())
    }

    fn rx_status(&self, header: &RdmaHeader) -> Result<WqeStatus, Violation> {
        WqeStatus::from_wire(header.status).ok_or(Violation::UnknownStatus { status: header.status })
    }

    fn rx_expect(&mut self, then: OnPayload, at: u32, len: u32, discard: bool) {
        self.rx = RxState::AwaitingPayload {
            then,
            at,
            remaining: len,
            discard,
        };
    }

    fn rx_finish(&mut self, then: OnPayload) -> Result<(), Error> {
        match then {
            OnPayload::Acknowledge(mut wqe) => {
                if wqe.status == WqeStatus::Pending {
                    wqe.status = WqeStatus::Success;
                }
                self.rq.push(wqe)?;
            }
            OnPayload::Complete { id, status } => self.complete(id, status)?,
        }
        Ok(())
    }
}
