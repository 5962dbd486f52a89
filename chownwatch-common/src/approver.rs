//! Cheap early filters run before any expensive resolution work.

use crate::event::{Basename, EventType, FileFields};
use crate::policy::{PolicyFlags, PolicyMode};
use crate::syscall::SyscallRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Approval {
    Approved,
    Discarded,
}

/// Predicate deciding whether a call on `candidate` is worth processing.
pub trait Approver {
    fn approve(&self, record: &SyscallRecord, candidate: &FileFields, event_type: EventType) -> bool;
}

/// Basename to event mask lookup, backed by the `APPROVER_BASENAMES` map in
/// the kernel.
pub trait BasenameLookup {
    fn event_mask(&self, basename: &Basename) -> Option<u64>;
}

/// Passes a candidate whose basename is registered for the event type.
pub struct BasenameApprover<L> {
    lookup: L,
}

impl<L: BasenameLookup> BasenameApprover<L> {
    pub const fn new(lookup: L) -> Self {
        Self { lookup }
    }
}

impl<L: BasenameLookup> Approver for BasenameApprover<L> {
    fn approve(&self, _record: &SyscallRecord, candidate: &FileFields, event_type: EventType) -> bool {
        if candidate.basename.is_empty() {
            return false;
        }
        self.lookup
            .event_mask(&candidate.basename)
            .is_some_and(|mask| mask & event_type.mask() != 0)
    }
}

/// Applies the record's policy snapshot: `Deny` requires a configured and
/// matching approver, the other modes always pass.
pub fn approve_syscall<A: Approver>(record: &SyscallRecord, candidate: &FileFields, approver: &A) -> Approval {
    match record.policy.mode() {
        PolicyMode::NoFilter | PolicyMode::Accept => Approval::Approved,
        PolicyMode::Deny => {
            if record.policy.flags.contains(PolicyFlags::BASENAME)
                && approver.approve(record, candidate, record.event_type)
            {
                Approval::Approved
            } else {
                Approval::Discarded
            }
        }
    }
}
