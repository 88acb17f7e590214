use std::{
    fmt,
    sync::atomic::{AtomicU8, AtomicU32, Ordering},
};

use crossbeam_utils::CachePadded;

use super::error::Violation;
use crate::protocol::{OpKind, WQE_SIZE, Wqe, WqeStatus};

/// Cyclic distance from `a` to `b` on a ring of `len` bytes.
#[inline]
pub(crate) const fn dist(len: u32, a: u32, b: u32) -> u32 {
    ((b as u64 + len as u64 - a as u64) % len as u64) as u32
}

/// Snapshot of the four ring boundaries, in bytes.
///
/// Walking forward from `cq_tail` the boundaries are always met in the order
/// `cq_tail`, `cq_head`, `wq_tail`, `wq_head`:
///
/// ```text
///          cq_tail       cq_head       wq_tail       wq_head
///             |  completed  |   in flight  |    posted   |     free
///  ...--------+-------------+--------------+-------------+-------------...
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Boundaries {
    /// Next slot the application posts into.
    pub wq_head: u32,
    /// First posted entry the dataplane has not fully sent.
    pub wq_tail: u32,
    /// First sent entry still waiting for a response.
    pub cq_head: u32,
    /// First completed entry the application has not drained.
    pub cq_tail: u32,
}

impl Boundaries {
    /// Returns `true` if the four boundaries are ordered on a ring of `len` bytes.
    pub(crate) const fn is_ordered(&self, len: u32) -> bool {
        let completed = dist(len, self.cq_tail, self.cq_head) as u64;
        let inflight = dist(len, self.cq_head, self.wq_tail) as u64;
        let posted = dist(len, self.wq_tail, self.wq_head) as u64;
        completed + inflight + posted < len as u64
    }

    /// Validates the application boundaries proposed by a bump.
    ///
    /// `new_wq_head` may only move forward and must leave one slot free before
    /// `new_cq_tail`; `new_cq_tail` may only move forward up to `cq_head`.
    pub(crate) fn bump(&self, len: u32, new_wq_head: u32, new_cq_tail: u32) -> Result<Self, Violation> {
        let aligned = |v: u32| v < len && v % WQE_SIZE == 0;

        let ok = aligned(new_wq_head)
            && aligned(new_cq_tail)
            && dist(len, self.cq_tail, new_cq_tail) <= dist(len, self.cq_tail, self.cq_head)
            && dist(len, self.wq_tail, self.wq_head) <= dist(len, self.wq_tail, new_wq_head)
            && (dist(len, new_cq_tail, self.cq_head) as u64
                + dist(len, self.cq_head, self.wq_tail) as u64
                + dist(len, self.wq_tail, new_wq_head) as u64)
                < len as u64;

        if !ok {
            return Err(Violation::Bump {
                ring_len: len,
                wq_head: self.wq_head,
                wq_tail: self.wq_tail,
                cq_head: self.cq_head,
                cq_tail: self.cq_tail,
                new_wq_head,
                new_cq_tail,
            });
        }

        Ok(Self {
            wq_head: new_wq_head,
            cq_tail: new_cq_tail,
            ..*self
        })
    }
}

/// Dataplane-owned boundaries published after a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RingUpdate {
    pub(crate) wq_tail: u32,
    pub(crate) cq_head: u32,
}

/// One ring record. Every field is atomic so that both sides may touch it.
struct Slot {
    id: AtomicU32,
    kind: AtomicU8,
    status: AtomicU8,
    loff: AtomicU32,
    roff: AtomicU32,
    len: AtomicU32,
}

impl Slot {
    fn new() -> Self {
        Self {
            id: AtomicU32::new(0),
            kind: AtomicU8::new(OpKind::Read as u8),
            status: AtomicU8::new(WqeStatus::Success as u8),
            loff: AtomicU32::new(0),
            roff: AtomicU32::new(0),
            len: AtomicU32::new(0),
        }
    }
}

/// The shared WQ/CQ ring.
///
/// The application owns `wq_head` and `cq_tail`, the dataplane owns `wq_tail`
/// and `cq_head`. A side writes a slot only while the slot lies in a region it
/// owns and publishes its boundaries with release ordering after the slot
/// stores, so the other side never observes a boundary ahead of the data.
pub(crate) struct WorkRing {
    slots: Box<[Slot]>,
    wq_head: CachePadded<AtomicU32>,
    wq_tail: CachePadded<AtomicU32>,
    cq_head: CachePadded<AtomicU32>,
    cq_tail: CachePadded<AtomicU32>,
}

impl WorkRing {
    pub(crate) fn new(entries: u32) -> Self {
        Self {
            slots: (0..entries).map(|_| Slot::new()).collect(),
            wq_head: CachePadded::new(AtomicU32::new(0)),
            wq_tail: CachePadded::new(AtomicU32::new(0)),
            cq_head: CachePadded::new(AtomicU32::new(0)),
            cq_tail: CachePadded::new(AtomicU32::new(0)),
        }
    }

    /// Capacity in bytes.
    pub(crate) fn len(&self) -> u32 {
        self.slots.len() as u32 * WQE_SIZE
    }

    /// Offset of the record following the one at `off`.
    #[inline]
    pub(crate) fn next(&self, off: u32) -> u32 {
        let next = off + WQE_SIZE;
        if next >= self.len() { 0 } else { next }
    }

    #[inline]
    fn slot(&self, off: u32) -> &Slot {
        &self.slots[(off / WQE_SIZE) as usize % self.slots.len()]
    }

    pub(crate) fn load(&self, off: u32) -> Wqe {
        let s = self.slot(off);
        Wqe {
            id: s.id.load(Ordering::Relaxed),
            kind: OpKind::from_u8(s.kind.load(Ordering::Relaxed)).unwrap_or(OpKind::Read),
            status: self.status(off),
            loff: s.loff.load(Ordering::Relaxed),
            roff: s.roff.load(Ordering::Relaxed),
            len: s.len.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn store(&self, off: u32, wqe: &Wqe) {
        let s = self.slot(off);
        s.id.store(wqe.id, Ordering::Relaxed);
        s.kind.store(wqe.kind as u8, Ordering::Relaxed);
        s.loff.store(wqe.loff, Ordering::Relaxed);
        s.roff.store(wqe.roff, Ordering::Relaxed);
        s.len.store(wqe.len, Ordering::Relaxed);
        s.status.store(wqe.status as u8, Ordering::Release);
    }

    pub(crate) fn status(&self, off: u32) -> WqeStatus {
        let v = self.slot(off).status.load(Ordering::Acquire);
        WqeStatus::from_u8(v).unwrap_or(WqeStatus::ConnFailure)
    }

    pub(crate) fn set_status(&self, off: u32, status: WqeStatus) {
        self.slot(off).status.store(status as u8, Ordering::Release);
    }

    pub(crate) fn boundaries(&self) -> Boundaries {
        Boundaries {
            wq_head: self.wq_head.load(Ordering::Acquire),
            wq_tail: self.wq_tail.load(Ordering::Acquire),
            cq_head: self.cq_head.load(Ordering::Acquire),
            cq_tail: self.cq_tail.load(Ordering::Acquire),
        }
    }

    pub(crate) fn cq_head(&self) -> u32 {
        self.cq_head.load(Ordering::Acquire)
    }

    /// Publishes the application boundaries accepted by a bump.
    pub(crate) fn publish_bump(&self, wq_head: u32, cq_tail: u32) {
        self.wq_head.store(wq_head, Ordering::Release);
        self.cq_tail.store(cq_tail, Ordering::Release);
    }

    /// Publishes the dataplane boundaries.
    pub(crate) fn publish(&self, update: RingUpdate) {
        self.wq_tail.store(update.wq_tail, Ordering::Release);
        self.cq_head.store(update.cq_head, Ordering::Release);
    }
}

impl fmt::Debug for WorkRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkRing")
            .field("len", &self.len())
            .field("boundaries", &self.boundaries())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const ENTRIES: u32 = 4;
    const LEN: u32 = ENTRIES * WQE_SIZE;

    const fn at(i: u32) -> u32 {
        i * WQE_SIZE
    }

    #[test]
    fn ring_slot_store_load() {
        let ring = WorkRing::new(ENTRIES);
        assert_eq!(ring.len(), LEN);
        assert_eq!(ring.next(at(3)), 0);

        let wqe = Wqe {
            id: 2,
            kind: OpKind::Write,
            status: WqeStatus::Pending,
            loff: 7,
            roff: 11,
            len: 13,
        };
        ring.store(at(2), &wqe);
        assert_eq!(ring.load(at(2)), wqe);

        ring.set_status(at(2), WqeStatus::RespPending);
        assert_eq!(ring.load(at(2)).status, WqeStatus::RespPending);
    }

    #[test]
    fn ring_bump_accepts_forward_moves() {
        let b = Boundaries::default();

        // Post three, one slot stays free
        let b = b.bump(LEN, at(3), 0).unwrap();
        assert_eq!(b.wq_head, at(3));

        // A fourth post would reach cq_tail
        assert!(b.bump(LEN, 0, 0).is_err());

        // Nothing completed yet: cq_tail can't move
        assert!(b.bump(LEN, at(3), at(1)).is_err());

        // Two completed, drain one, then post across the wrap
        let b = Boundaries {
            cq_head: at(2),
            wq_tail: at(3),
            ..b
        };
        let b = b.bump(LEN, at(3), at(1)).unwrap();
        let b = b.bump(LEN, 0, at(1)).unwrap();
        assert!(b.is_ordered(LEN));
    }

    #[test]
    fn ring_bump_rejects_backward_and_misaligned() {
        let b = Boundaries {
            wq_head: at(3),
            wq_tail: at(2),
            cq_head: at(1),
            cq_tail: at(1),
        };

        // wq_head behind wq_tail
        let err = b.bump(LEN, at(1), at(1)).unwrap_err();
        assert_eq!(
            err,
            Violation::Bump {
                ring_len: LEN,
                wq_head: at(3),
                wq_tail: at(2),
                cq_head: at(1),
                cq_tail: at(1),
                new_wq_head: at(1),
                new_cq_tail: at(1),
            }
        );

        // Not a record boundary, or out of range
        assert!(b.bump(LEN, at(3) + 1, at(1)).is_err());
        assert!(b.bump(LEN, LEN, at(1)).is_err());

        // Unchanged boundaries are always fine
        assert_eq!(b.bump(LEN, at(3), at(1)).unwrap(), b);
    }

    #[derive(Debug, Clone, Copy)]
    enum Step {
        Post,
        Send,
        Complete,
        Drain,
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![Just(Step::Post), Just(Step::Send), Just(Step::Complete), Just(Step::Drain)]
    }

    proptest! {
        // Random interleavings of both sides never break the ordering, and a
        // forged bump is always rejected without touching the boundaries.
        #[test]
        fn ring_ordering_holds(entries in 2u32..9, steps in prop::collection::vec((step(), any::<u32>(), any::<u32>()), 1..200)) {
            let len = entries * WQE_SIZE;
            let next = |o: u32| (o + WQE_SIZE) % len;
            let mut b = Boundaries::default();

            for (step, fh, ft) in steps {
                match step {
                    Step::Post if next(b.wq_head) != b.cq_tail => {
                        b = b.bump(len, next(b.wq_head), b.cq_tail).unwrap();
                    }
                    Step::Send if b.wq_tail != b.wq_head => b.wq_tail = next(b.wq_tail),
                    Step::Complete if b.cq_head != b.wq_tail => b.cq_head = next(b.cq_head),
                    Step::Drain if b.cq_tail != b.cq_head => {
                        b = b.bump(len, b.wq_head, next(b.cq_tail)).unwrap();
                    }
                    _ => {}
                }
                prop_assert!(b.is_ordered(len));

                // Forged boundaries either keep the order or are refused
                let forged = (fh % (len + 1), ft % (len + 1));
                if let Ok(n) = b.bump(len, forged.0, forged.1) {
                    prop_assert!(n.is_ordered(len));
                }
            }
        }
    }
}
