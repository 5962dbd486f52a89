//! Kernel side implementations of the engine collaborators, backed by BPF
//! helpers and the maps in [`crate::maps`].

use aya_ebpf::{
    helpers::{
        bpf_get_current_cgroup_id, bpf_get_current_comm, bpf_get_current_pid_tgid,
        bpf_get_current_uid_gid, bpf_ktime_get_ns,
    },
    maps::RingBuf,
};
use chownwatch_common::{
    AuditEvent, Basename, BasenameLookup, ContainerContext, Delivery, EventSink, EventType, Policy, PolicyMode,
    PolicyStore, ProbeConfig, ProbeEnv, ProcessContext, ProcessDiscarders, SpanContext,
    SyscallCache, SyscallRecord, TaskId,
};

use crate::maps::{
    APPROVER_BASENAMES, CONFIG, DISCARDED_PIDS, PIPEFS_MOUNT_ID, POLICIES, SPAN_CONTEXTS, SYSCALLS,
};

pub struct KernelEnv;

impl PolicyStore for KernelEnv {
    #[inline(always)]
    fn fetch_policy(&self, event_type: EventType) -> Policy {
        POLICIES.get(event_type as u32).copied().unwrap_or_default()
    }
}

impl ProcessDiscarders for KernelEnv {
    #[inline(always)]
    fn is_discarded_by_process(&self, mode: PolicyMode, event_type: EventType) -> bool {
        if mode == PolicyMode::NoFilter {
            return false;
        }
        let tgid = (bpf_get_current_pid_tgid() >> 32) as u32;
        match unsafe { DISCARDED_PIDS.get(&tgid) } {
            Some(mask) => *mask & event_type.mask() != 0,
            None => false,
        }
    }
}

impl ProbeEnv for KernelEnv {
    type ProcEntry = ();

    #[inline(always)]
    fn current_task(&self) -> TaskId {
        bpf_get_current_pid_tgid()
    }

    #[inline(always)]
    fn now_ns(&self) -> u64 {
        unsafe { bpf_ktime_get_ns() }
    }

    #[inline(always)]
    fn is_pipefs_mount_id(&self, mount_id: u32) -> bool {
        match PIPEFS_MOUNT_ID.get(0) {
            Some(&pipefs) => pipefs != 0 && pipefs == mount_id,
            None => false,
        }
    }

    #[inline(always)]
    fn fill_process_context(&self, out: &mut ProcessContext) -> Option<()> {
        let pid_tgid = bpf_get_current_pid_tgid();
        let uid_gid = bpf_get_current_uid_gid();
        out.pid = (pid_tgid >> 32) as u32;
        out.tid = pid_tgid as u32;
        out.uid = uid_gid as u32;
        out.gid = (uid_gid >> 32) as u32;
        out.cgroup_id = unsafe { bpf_get_current_cgroup_id() };
        out.comm = bpf_get_current_comm().ok()?;
        Some(())
    }

    #[inline(always)]
    fn fill_container_context(&self, _entry: Option<&()>, _out: &mut ContainerContext) {
        // The container id is resolved in userspace from the cgroup.
    }

    #[inline(always)]
    fn fill_span_context(&self, out: &mut SpanContext) {
        let pid_tgid = bpf_get_current_pid_tgid();
        if let Some(span) = unsafe { SPAN_CONTEXTS.get(&pid_tgid) } {
            *out = *span;
        }
    }
}

#[inline(always)]
pub fn probe_config() -> ProbeConfig {
    CONFIG.get(0).copied().unwrap_or_default()
}

/// `SYSCALLS` seen through the engine's cache interface.
pub struct InFlight;

impl SyscallCache for InFlight {
    #[inline(always)]
    fn push(&mut self, task: TaskId, record: SyscallRecord) {
        let _ = SYSCALLS.insert(&task, &record, 0);
    }

    #[inline(always)]
    fn pop(&mut self, task: TaskId, event_type: EventType) -> Option<SyscallRecord> {
        let record = *unsafe { SYSCALLS.get(&task) }?;
        if !record.event_type.matches(event_type) {
            return None;
        }
        let _ = SYSCALLS.remove(&task);
        Some(record)
    }

    #[inline(always)]
    fn peek_mut(&mut self, task: TaskId, event_type: EventType) -> Option<&mut SyscallRecord> {
        let record = unsafe { &mut *SYSCALLS.get_ptr_mut(&task)? };
        if record.event_type.matches(event_type) {
            Some(record)
        } else {
            None
        }
    }
}

pub struct MapBasenames;

impl BasenameLookup for MapBasenames {
    #[inline(always)]
    fn event_mask(&self, basename: &Basename) -> Option<u64> {
        unsafe { APPROVER_BASENAMES.get(basename) }.copied()
    }
}

/// Ring buffer transport. Events are written straight into a reserved slot;
/// a full buffer drops the event.
pub struct RingBufSink(pub &'static RingBuf);

impl<E: AuditEvent + 'static> EventSink<E> for RingBufSink {
    #[inline(always)]
    fn send_with<F>(&mut self, _event_type: EventType, fill: F) -> Delivery
    where
        F: FnOnce(&mut E) -> bool,
    {
        let Some(mut slot) = self.0.reserve::<E>(0) else {
            return Delivery::Dropped;
        };

        let event = slot.as_mut_ptr();
        // SAFETY: the slot is ours until submit/discard and `AuditEvent`
        // types are valid when zeroed.
        let event = unsafe {
            core::ptr::write_bytes(event, 0, 1);
            &mut *event
        };

        if fill(event) {
            slot.submit(0);
            Delivery::Sent
        } else {
            slot.discard(0);
            Delivery::Aborted
        }
    }
}
