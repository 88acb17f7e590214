use tracing::trace;

use super::{Dataplane, error::Violation};
use crate::{protocol::WqeStatus, transport::Transport};

impl<T: Transport> Dataplane<T> {
    /// Offset of the entry the next response must answer.
    ///
    /// Responses arrive in posting order, so the answered entry is always the
    /// first one in `[cq_head, wq_tail)` still waiting for its response.
    pub(super) fn pending(&self, id: u32) -> Result<u32, Violation> {
        let mut off = self.bounds.cq_head;
        while off != self.bounds.wq_tail {
            if self.ring.status(off) == WqeStatus::RespPending {
                let expected = self.ring.load(off).id;
                if expected != id {
                    return Err(Violation::Correlation { expected, received: id });
                }
                return Ok(off);
            }
            off = self.ring.next(off);
        }
        Err(Violation::UnexpectedResponse { id })
    }

    /// Completes entry `id` with `status` and moves `cq_head` past it.
    pub(super) fn complete(&mut self, id: u32, status: WqeStatus) -> Result<(), Violation> {
        let off = self.pending(id)?;
        self.ring.set_status(off, status);
        self.bounds.cq_head = self.ring.next(off);
        trace!("Completed id={id} status={status:?}");
        Ok(())
    }
}
