//! The single, process-wide state record (`spec.md` §3).

use crate::handler::Attributes;
use crate::state::{DfuState, DfuStatus};

/// Everything the state machine mutates, held in one place so that
/// transitions are expressed as a single assignment rather than scattered
/// field updates (mirrors the teacher crate's own `DFUStatus` struct).
pub(crate) struct DfuContext {
    pub state: DfuState,
    pub status: DfuStatus,
    pub attributes: Attributes,
    /// Cached from `DfuHandler::detach_timeout_ms`/`transfer_size` at
    /// construction and after every bus reset, since the `UsbClass`
    /// descriptor-emission methods take `&self` and cannot call back into a
    /// `&mut` handler.
    pub detach_timeout_ms: u16,
    pub transfer_size: u16,
    pub last_block_num: u16,
    pub last_transfer_len: u16,
    pub blk_transfer_in_proc: bool,
}

impl DfuContext {
    pub fn new(attributes: Attributes, detach_timeout_ms: u16, transfer_size: u16) -> Self {
        Self {
            state: DfuState::AppDetach,
            status: DfuStatus::Ok,
            attributes,
            detach_timeout_ms,
            transfer_size,
            last_block_num: 0,
            last_transfer_len: 0,
            blk_transfer_in_proc: false,
        }
    }

    /// Sets `state` and `status` together, the only sanctioned way to move
    /// the state machine: a transition always carries its resulting status
    /// alongside it so the two never drift out of sync across a match arm.
    pub fn transition(&mut self, state: DfuState, status: DfuStatus) {
        self.state = state;
        self.status = status;
    }

    /// Clears block bookkeeping, per the invariant in `spec.md` §3 that it
    /// is valid only while `blk_transfer_in_proc` is set.
    pub fn clear_block_bookkeeping(&mut self) {
        self.last_block_num = 0;
        self.last_transfer_len = 0;
        self.blk_transfer_in_proc = false;
    }
}

/// Builds the 6-byte `DFU_GETSTATUS` payload (`spec.md` §4.9).
pub(crate) fn status_payload(status: DfuStatus, poll_timeout: [u8; 3], state: DfuState, istring: u8) -> [u8; 6] {
    [
        status.into(),
        poll_timeout[0],
        poll_timeout[1],
        poll_timeout[2],
        state.into(),
        istring,
    ]
}
