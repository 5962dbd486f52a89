//! Types and logic shared by the chownwatch eBPF programs and the userspace
//! agent.
//!
//! Everything in this crate is `no_std`, allocation free and bounded, so the
//! same correlation engine runs inside the kernel probes and in host tests.
#![cfg_attr(not(test), no_std)]

pub mod approver;
pub mod chown;
pub mod config;
pub mod engine;
pub mod event;
pub mod policy;
pub mod syscall;
pub mod table;

#[cfg(test)]
pub(crate) mod testing;

pub use approver::{Approval, Approver, BasenameApprover, BasenameLookup, approve_syscall};
pub use chown::{Chown, ChownArgs, ChownVariant, CompatPrograms, CHOWN_VARIANTS};
pub use config::ProbeConfig;
pub use engine::{
    AuditEvent, Delivery, EntryOutcome, EventSink, ExitOutcome, ProbeEnv, Resolution,
    SyscallFamily, is_unhandled_error, resolve_file, sys_exit, sys_exit_unreadable,
    trace_sys_entry,
};
pub use event::{
    Basename, ChownEvent, ContainerContext, EventType, FileFields, KEvent, PathKey,
    ProcessContext, SpanContext, SyscallContext,
};
pub use policy::{Policy, PolicyFlags, PolicyMode, PolicyStore, ProcessDiscarders};
pub use syscall::{SetAttrArgs, SyscallPayload, SyscallRecord};
pub use table::{CorrelationTable, SyscallCache, TaskId};

/// Length of the process name reported by `bpf_get_current_comm`.
pub const COMM_LEN: usize = 16;

/// Fixed size of a file basename carried in records and events.
pub const BASENAME_LEN: usize = 64;

/// Fixed size of a container id (hex sha256).
pub const CONTAINER_ID_LEN: usize = 64;

/// Capacity of the in-kernel in-flight syscall map.
pub const MAX_IN_FLIGHT: u32 = 10240;

/// Capacity of the basename approver map.
pub const MAX_APPROVERS: u32 = 128;

/// Capacity of the per-process discarder map.
pub const MAX_DISCARDERS: u32 = 1024;
