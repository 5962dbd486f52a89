//! Entry, resolution and exit handling shared by every syscall family.
//!
//! A family plugs in through [`SyscallFamily`]: how to turn raw arguments
//! into a record payload and how to turn a completed record into an event.
//! The handlers below own the rest of the lifecycle, so every entry point of
//! a family (path, fd, dirfd relative, legacy forms) funnels into the same
//! three functions.

use crate::approver::{Approval, Approver, approve_syscall};
use crate::event::{ContainerContext, EventType, FileFields, KEvent, ProcessContext, SpanContext};
use crate::policy::{PolicyMode, PolicyStore, ProcessDiscarders};
use crate::syscall::{SyscallPayload, SyscallRecord};
use crate::table::{SyscallCache, TaskId};

const EPERM: i64 = 1;
const EACCES: i64 = 13;

/// Identity, policy and classification services available to a probe.
pub trait ProbeEnv: PolicyStore + ProcessDiscarders {
    /// Handle returned by the process cache, handed back for the container
    /// lookup.
    type ProcEntry;

    fn current_task(&self) -> TaskId;

    fn now_ns(&self) -> u64;

    fn is_pipefs_mount_id(&self, mount_id: u32) -> bool;

    /// Best effort; a cache miss leaves `out` partially filled.
    fn fill_process_context(&self, out: &mut ProcessContext) -> Option<Self::ProcEntry>;

    fn fill_container_context(&self, entry: Option<&Self::ProcEntry>, out: &mut ContainerContext);

    fn fill_span_context(&self, out: &mut SpanContext);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// The filler gave up and the slot was released.
    Aborted,
    /// The transport had no room.
    Dropped,
}

/// Fire and forget delivery of events built in place inside the transport's
/// buffer.
pub trait EventSink<E: AuditEvent> {
    /// Hands `fill` a zeroed event slot. The slot is committed when `fill`
    /// returns true and released otherwise.
    fn send_with<F>(&mut self, event_type: EventType, fill: F) -> Delivery
    where
        F: FnOnce(&mut E) -> bool;
}

/// Event sections filled by context enrichment.
///
/// # Safety
///
/// Implementors must be plain data for which the all-zero bit pattern is a
/// valid value; sinks hand out zeroed slots of transport memory.
pub unsafe trait AuditEvent {
    fn header_mut(&mut self) -> &mut KEvent;
    fn process_mut(&mut self) -> &mut ProcessContext;
    fn container_mut(&mut self) -> &mut ContainerContext;
    fn span_mut(&mut self) -> &mut SpanContext;
}

pub trait SyscallFamily {
    const EVENT_TYPE: EventType;

    /// Raw arguments of any entry point of the family.
    type Args;

    type Event: AuditEvent;

    /// Normalizes raw arguments into the family's canonical payload.
    fn payload(args: &Self::Args) -> SyscallPayload;

    /// Writes the family's sections of a completed call into a zeroed event.
    /// False when the record does not carry this family's payload.
    fn fill_event(record: &SyscallRecord, retval: i64, event: &mut Self::Event) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    Discarded,
    Cached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The task has no in-flight record of this family.
    Untracked,
    /// A file was already attached by an earlier resolution.
    AlreadyResolved,
    Approved,
    /// The approvers rejected the file and the record was dropped.
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    NoRecord,
    /// The probe could not read the return value; the record was consumed.
    UnreadableReturn,
    UnhandledError,
    /// Under `Deny` the call never reached an approver.
    Unapproved,
    PipeFs,
    Malformed,
    Dropped,
    Sent,
}

/// Errors that are not worth an event. Permission failures are reported,
/// every other error is dropped.
pub const fn is_unhandled_error(retval: i64) -> bool {
    retval < 0 && retval != -EACCES && retval != -EPERM
}

pub fn trace_sys_entry<F, E, C>(env: &E, cache: &mut C, args: &F::Args) -> EntryOutcome
where
    F: SyscallFamily,
    E: ProbeEnv,
    C: SyscallCache,
{
    let policy = env.fetch_policy(F::EVENT_TYPE);
    if env.is_discarded_by_process(policy.mode(), F::EVENT_TYPE) {
        return EntryOutcome::Discarded;
    }

    let record = SyscallRecord::new(F::EVENT_TYPE, policy, F::payload(args));
    cache.push(env.current_task(), record);
    EntryOutcome::Cached
}

/// Attaches the resolved file to the task's in-flight record and runs the
/// approvers on it. `candidate` is only evaluated when a record is waiting.
pub fn resolve_file<F, C, A>(
    cache: &mut C,
    task: TaskId,
    dentry: u64,
    candidate: impl FnOnce() -> FileFields,
    approver: &A,
) -> Resolution
where
    F: SyscallFamily,
    C: SyscallCache,
    A: Approver,
{
    let approval = {
        let Some(record) = cache.peek_mut(task, F::EVENT_TYPE) else {
            return Resolution::Untracked;
        };
        let Some(args) = record.set_attr_mut() else {
            return Resolution::Untracked;
        };
        if args.is_resolved() {
            return Resolution::AlreadyResolved;
        }

        let file = candidate();
        args.dentry = dentry;
        args.file = file;

        approve_syscall(record, &file, approver)
    };

    match approval {
        Approval::Approved => Resolution::Approved,
        Approval::Discarded => {
            cache.pop(task, F::EVENT_TYPE);
            Resolution::Discarded
        }
    }
}

pub fn sys_exit<F, E, C, S>(env: &E, cache: &mut C, sink: &mut S, retval: i64) -> ExitOutcome
where
    F: SyscallFamily,
    E: ProbeEnv,
    C: SyscallCache,
    S: EventSink<F::Event>,
{
    let Some(record) = cache.pop(env.current_task(), F::EVENT_TYPE) else {
        return ExitOutcome::NoRecord;
    };

    if is_unhandled_error(retval) {
        return ExitOutcome::UnhandledError;
    }

    // Approvers only run on resolution, so an unresolved call under `Deny`
    // was never approved.
    if record.policy.mode() == PolicyMode::Deny && !record.is_resolved() {
        return ExitOutcome::Unapproved;
    }

    if let Some(file) = record.file() {
        if env.is_pipefs_mount_id(file.path_key.mount_id) {
            return ExitOutcome::PipeFs;
        }
    }

    let delivery = sink.send_with(F::EVENT_TYPE, |event| {
        if !F::fill_event(&record, retval, event) {
            return false;
        }

        let header = event.header_mut();
        header.flags &= !KEvent::ASYNC;
        header.timestamp_ns = env.now_ns();

        let entry = env.fill_process_context(event.process_mut());
        env.fill_container_context(entry.as_ref(), event.container_mut());
        env.fill_span_context(event.span_mut());
        true
    });

    match delivery {
        Delivery::Sent => ExitOutcome::Sent,
        Delivery::Aborted => ExitOutcome::Malformed,
        Delivery::Dropped => ExitOutcome::Dropped,
    }
}

/// Exit whose return value could not be read. The record is consumed so it
/// cannot outlive the call, and nothing is emitted.
pub fn sys_exit_unreadable<F, E, C>(env: &E, cache: &mut C) -> ExitOutcome
where
    F: SyscallFamily,
    E: ProbeEnv,
    C: SyscallCache,
{
    match cache.pop(env.current_task(), F::EVENT_TYPE) {
        Some(_) => ExitOutcome::UnreadableReturn,
        None => ExitOutcome::NoRecord,
    }
}
