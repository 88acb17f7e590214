use tracing::{trace, warn};

use super::{CHUNK, Dataplane, error::Error};
use crate::{
    protocol::{OpKind, RdmaHeader, WqeStatus},
    transport::Transport,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Source {
    /// Entries posted on this side, `[wq_tail, wq_head)`.
    #[default]
    Local,
    /// Responses owed to the peer.
    Remote,
}

impl Source {
    const fn other(self) -> Self {
        match self {
            Self::Local => Self::Remote,
            Self::Remote => Self::Local,
        }
    }
}

enum Progress {
    /// The front entry of the source is done.
    Done,
    /// Out of send buffer.
    Blocked,
}

/// Transmit state carried across passes.
#[derive(Debug, Default)]
pub(crate) struct TxState {
    /// Source served next when both have work.
    turn: Source,
    /// Bytes of the front local entry already queued, header included.
    local_sent: usize,
    /// Bytes of the front remote response already queued, header included.
    remote_sent: usize,
}

impl<T: Transport> Dataplane<T> {
    /// Serializes ready entries until both sources are empty or the send buffer is full.
    pub(super) fn tx_pass(&mut self) -> Result<(), Error> {
        loop {
            let local = self.bounds.wq_tail != self.bounds.wq_head;
            let remote = !self.rq.is_empty();

            // An entry started in an earlier pass is finished first
            let src = match (local, remote) {
                (false, false) => return Ok(()),
                _ if local && self.tx.local_sent > 0 => Source::Local,
                _ if remote && self.tx.remote_sent > 0 => Source::Remote,
                (true, true) => self.tx.turn,
                (true, false) => Source::Local,
                (false, true) => Source::Remote,
            };

            let progress = match src {
                Source::Local => self.tx_local()?,
                Source::Remote => self.tx_remote()?,
            };
            match progress {
                Progress::Done => self.tx.turn = src.other(),
                Progress::Blocked => return Ok(()),
            }
        }
    }

    fn tx_local(&mut self) -> Result<Progress, Error> {
        let off = self.bounds.wq_tail;
        let wqe = self.ring.load(off);

        if self.tx.local_sent == 0 {
            // Never sent, so it does not wait for room
            if !wqe.fits(self.mr.len()) {
                warn!("Entry {} out of bounds: {}+{} > {}", wqe.id, wqe.loff, wqe.len, self.mr.len());
                self.ring.set_status(off, WqeStatus::OutOfBounds);
                self.bounds.wq_tail = self.ring.next(off);
                return Ok(Progress::Done);
            }
            if self.transport.tx_free() < RdmaHeader::LEN {
                return Ok(Progress::Blocked);
            }

            let header = RdmaHeader::request(&wqe);
            self.transport.tx_copy(&header.encode());
            trace!("TX request {:?} id={} len={}", wqe.kind, wqe.id, wqe.len);

            if wqe.kind == OpKind::Read {
                self.ring.set_status(off, WqeStatus::RespPending);
                self.bounds.wq_tail = self.ring.next(off);
                return Ok(Progress::Done);
            }
            self.ring.set_status(off, WqeStatus::TxPending);
            self.tx.local_sent = RdmaHeader::LEN;
        }

        let done = (self.tx.local_sent - RdmaHeader::LEN) as u32;
        self.tx.local_sent += self.tx_payload(wqe.loff + done, wqe.len - done)?;
        if self.tx.local_sent - RdmaHeader::LEN < wqe.len as usize {
            return Ok(Progress::Blocked);
        }

        self.ring.set_status(off, WqeStatus::RespPending);
        self.bounds.wq_tail = self.ring.next(off);
        self.tx.local_sent = 0;
        Ok(Progress::Done)
    }

    fn tx_remote(&mut self) -> Result<Progress, Error> {
        let Some(wqe) = self.rq.front().copied() else {
            return Ok(Progress::Done);
        };
        let header = RdmaHeader::response(&wqe);

        if self.tx.remote_sent == 0 {
            if self.transport.tx_free() < RdmaHeader::LEN {
                return Ok(Progress::Blocked);
            }
            self.transport.tx_copy(&header.encode());
            self.tx.remote_sent = RdmaHeader::LEN;
            trace!("TX response {:?} id={} status={:?}", wqe.kind, wqe.id, wqe.status);
        }

        // Only a read response carries payload, and only when in bounds
        let len = if wqe.kind == OpKind::Read { header.length } else { 0 };
        let done = (self.tx.remote_sent - RdmaHeader::LEN) as u32;
        if done < len {
            self.tx.remote_sent += self.tx_payload(wqe.loff + done, len - done)?;
            if self.tx.remote_sent - RdmaHeader::LEN < len as usize {
                return Ok(Progress::Blocked);
            }
        }

        self.rq.pop();
        self.tx.remote_sent = 0;
        Ok(Progress::Done)
    }

    /// Queues up to `len` bytes of the region starting at `loff`, returning how many were queued.
    fn tx_payload(&mut self, loff: u32, len: u32) -> Result<usize, Error> {
        let mut scratch = [0u8; CHUNK];
        let mut sent = 0usize;
        while sent < len as usize {
            let n = (len as usize - sent).min(CHUNK).min(self.transport.tx_free());
            if n == 0 {
                break;
            }
            self.mr.read_at(loff + sent as u32, &mut scratch[..n])?;
            let w = self.transport.tx_copy(&scratch[..n]);
            sent += w;
            if w < n {
                break;
            }
        }
        Ok(sent)
    }

    /// Completes leading out-of-bounds entries, which never get a response.
    pub(super) fn settle(&mut self) {
        while self.bounds.cq_head != self.bounds.wq_tail
            && self.ring.status(self.bounds.cq_head) == WqeStatus::OutOfBounds
        {
            self.bounds.cq_head = self.ring.next(self.bounds.cq_head);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        pipeline::tests::{LEN, MR_LEN, dataplane, post, sent_headers},
        protocol::FrameKind,
        transport::Pipe,
    };

    /// Queues the response to a peer read of `len` bytes at `loff`.
    fn queue_read_response(dp: &mut Dataplane<Pipe>, id: u32, loff: u32, len: u32) {
        let mut wqe = RdmaHeader {
            flags: FrameKind::ReadRequest.flags(),
            status: 0,
            length: len,
            remote_offset: loff,
            id,
            local_offset: 0,
        }
        .to_remote_wqe(OpKind::Read, MR_LEN);
        wqe.status = WqeStatus::Success;
        dp.rq.push(wqe).unwrap();
    }

    /// Splits a sent byte stream into frames.
    fn frames(mut out: &[u8]) -> Vec<(FrameKind, u32, Vec<u8>)> {
        let mut frames = vec![];
        while !out.is_empty() {
            let h = RdmaHeader::decode(out).unwrap();
            let kind = h.kind().unwrap();
            let len = if kind.has_payload() { h.length as usize } else { 0 };
            let end = RdmaHeader::LEN + len;
            frames.push((kind, h.id, out[RdmaHeader::LEN..end].to_vec()));
            out = &out[end..];
        }
        frames
    }

    #[test]
    fn tx_round_robin() {
        let (mut dp, _waiter) = dataplane(Pipe::new(1 << 16, 1 << 16));

        // Two local reads and two peer read requests waiting for a response
        let mut head = 0;
        for i in 0..2 {
            head = post(&dp, head, OpKind::Read, 4, i * 4, 0);
        }
        for id in [7, 8] {
            let mut wqe = RdmaHeader {
                flags: FrameKind::ReadRequest.flags(),
                status: 0,
                length: 4,
                remote_offset: 0,
                id,
                local_offset: 0,
            }
            .to_remote_wqe(OpKind::Read, MR_LEN);
            wqe.status = WqeStatus::Success;
            dp.rq.push(wqe).unwrap();
        }
        dp.bounds = dp.bounds.bump(LEN, head, 0).unwrap();
        dp.tx_pass().unwrap();

        let kinds: Vec<_> = sent_headers(&mut dp).iter().map(|h| (h.kind().unwrap(), h.id)).collect();
        assert_eq!(
            kinds,
            vec![
                (FrameKind::ReadRequest, 0),
                (FrameKind::ReadResponse, 7),
                (FrameKind::ReadRequest, 1),
                (FrameKind::ReadResponse, 8),
            ]
        );
    }

    #[test]
    fn tx_resumes_partial_write() {
        const PAYLOAD: u32 = 100;

        // Room for the header and 30 payload bytes
        let mut dp = dataplane(Pipe::new(RdmaHeader::LEN + 30, 64)).0;
        let data: Vec<u8> = (0..PAYLOAD as u8).collect();
        dp.mr.write_at(0, &data).unwrap();

        let head = post(&dp, 0, OpKind::Write, PAYLOAD, 0, 512);
        dp.bounds = dp.bounds.bump(LEN, head, 0).unwrap();

        dp.tx_pass().unwrap();
        assert_eq!(dp.ring.status(0), WqeStatus::TxPending);
        assert_eq!(dp.bounds.wq_tail, 0);

        // Drain and resume until the whole payload went out
        let mut out = vec![];
        while dp.ring.status(0) == WqeStatus::TxPending {
            dp.transport.drain_tx(&mut out);
            dp.tx_pass().unwrap();
        }
        dp.transport.drain_tx(&mut out);

        assert_eq!(dp.ring.status(0), WqeStatus::RespPending);
        assert_eq!(dp.bounds.wq_tail, dp.ring.next(0));
        let header = RdmaHeader::decode(&out[..RdmaHeader::LEN]).unwrap();
        assert_eq!(header.kind(), Some(FrameKind::WriteRequest));
        assert_eq!(header.remote_offset, 512);
        assert_eq!(&out[RdmaHeader::LEN..], &data[..]);
    }

    #[test]
    fn tx_header_needs_room() {
        let mut dp = dataplane(Pipe::new(RdmaHeader::LEN - 1, 64)).0;
        let head = post(&dp, 0, OpKind::Read, 4, 0, 0);
        dp.bounds = dp.bounds.bump(LEN, head, 0).unwrap();

        // Nothing fits, nothing moves
        dp.tx_pass().unwrap();
        assert_eq!(dp.transport.tx_len(), 0);
        assert_eq!(dp.ring.status(0), WqeStatus::Pending);
    }

    #[test]
    fn tx_out_of_bounds_settles() {
        let mut dp = dataplane(Pipe::new(1 << 12, 64)).0;

        // Forge an entry the post path would have refused
        let mut head = post(&dp, 0, OpKind::Write, 8, MR_LEN - 4, 0);
        head = post(&dp, head, OpKind::Read, 4, 0, 0);
        dp.bounds = dp.bounds.bump(LEN, head, 0).unwrap();

        dp.tx_pass().unwrap();
        dp.settle();

        // Only the read went out; the bad write is complete at cq_head
        let headers = sent_headers(&mut dp);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].kind(), Some(FrameKind::ReadRequest));
        assert_eq!(dp.ring.status(0), WqeStatus::OutOfBounds);
        assert_eq!(dp.bounds.cq_head, dp.ring.next(0));
    }

    #[test]
    fn tx_resumes_partial_response() {
        // Room for the header and 30 payload bytes
        let mut dp = dataplane(Pipe::new(RdmaHeader::LEN + 30, 64)).0;
        let data: Vec<u8> = (0..100).collect();
        dp.mr.write_at(200, &data).unwrap();

        // Local read, peer read response of 100 bytes, then another local read
        let mut head = post(&dp, 0, OpKind::Read, 4, 0, 0);
        head = post(&dp, head, OpKind::Read, 4, 4, 0);
        queue_read_response(&mut dp, 7, 200, 100);
        dp.bounds = dp.bounds.bump(LEN, head, 0).unwrap();

        dp.tx_pass().unwrap();
        assert!(!dp.rq.is_empty());
        assert!(dp.tx.remote_sent > 0);

        // The response resumes ahead of the waiting local read
        let mut out = vec![];
        while !dp.rq.is_empty() {
            dp.transport.drain_tx(&mut out);
            dp.tx_pass().unwrap();
        }
        dp.transport.drain_tx(&mut out);
        dp.tx_pass().unwrap();
        dp.transport.drain_tx(&mut out);

        assert_eq!(
            frames(&out),
            vec![
                (FrameKind::ReadRequest, 0, vec![]),
                (FrameKind::ReadResponse, 7, data),
                (FrameKind::ReadRequest, 1, vec![]),
            ]
        );
        assert_eq!(dp.bounds.wq_tail, head);
        assert_eq!(dp.tx.remote_sent, 0);
    }

    #[test]
    fn tx_partial_write_holds_response() {
        let mut dp = dataplane(Pipe::new(RdmaHeader::LEN + 30, 64)).0;
        let data: Vec<u8> = (100..200).collect();
        dp.mr.write_at(0, &data).unwrap();
        dp.mr.write_at(512, &[0xee; 8]).unwrap();

        let head = post(&dp, 0, OpKind::Write, 100, 0, 0);
        dp.bounds = dp.bounds.bump(LEN, head, 0).unwrap();
        dp.tx_pass().unwrap();
        assert_eq!(dp.ring.status(0), WqeStatus::TxPending);

        // A response shows up while the write is half sent
        queue_read_response(&mut dp, 3, 512, 8);
        let mut out = vec![];
        while !dp.rq.is_empty() {
            dp.transport.drain_tx(&mut out);
            dp.tx_pass().unwrap();
        }
        dp.transport.drain_tx(&mut out);

        assert_eq!(
            frames(&out),
            vec![
                (FrameKind::WriteRequest, 0, data),
                (FrameKind::ReadResponse, 3, vec![0xee; 8]),
            ]
        );
        assert_eq!(dp.ring.status(0), WqeStatus::RespPending);
    }

    #[test]
    fn tx_out_of_bounds_ignores_full_buffer() {
        let mut dp = dataplane(Pipe::new(RdmaHeader::LEN, 64)).0;
        assert_eq!(dp.transport.tx_copy(&[0; RdmaHeader::LEN]), RdmaHeader::LEN);

        let head = post(&dp, 0, OpKind::Read, 8, MR_LEN, 0);
        dp.bounds = dp.bounds.bump(LEN, head, 0).unwrap();
        dp.tx_pass().unwrap();
        dp.settle();

        // Completed without waiting for send room
        assert_eq!(dp.ring.status(0), WqeStatus::OutOfBounds);
        assert_eq!(dp.bounds.wq_tail, head);
        assert_eq!(dp.bounds.cq_head, head);
        assert_eq!(dp.transport.tx_len(), RdmaHeader::LEN);
    }
}
