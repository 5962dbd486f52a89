//! Probes of the chown family.
//!
//! Every syscall variant gets an entry kprobe plus two exit forms (return
//! probe and `syscalls:sys_exit_*` tracepoint); userspace attaches one of the
//! exit forms. Variants with 32-bit ids also get an entry/return pair for
//! their ia32 entry point. All of them funnel into the shared engine, the
//! resolution kprobe on `chown_common` sits in between.

use aya_ebpf::{
    helpers::bpf_get_current_pid_tgid,
    macros::{kprobe, kretprobe, tracepoint},
    programs::{ProbeContext, RetProbeContext, TracePointContext},
};
use aya_log_ebpf::debug;
use chownwatch_common::{
    BasenameApprover, Chown, ChownArgs, ChownVariant, EntryOutcome, ExitOutcome, Resolution,
    resolve_file, sys_exit, sys_exit_unreadable, trace_sys_entry,
};

use super::kernel::{path_dentry, read_file_fields, syscall_registers};
use super::syscall_types::SYS_EXIT_RET_OFFSET;
use crate::env::{InFlight, KernelEnv, MapBasenames, RingBufSink};
use crate::maps::CHOWN_EVENTS;

/// `compat` selects the ia32 register convention.
#[inline(always)]
fn trace_sys_chown(ctx: &ProbeContext, variant: ChownVariant, compat: bool) -> u32 {
    let Some(regs) = syscall_registers(ctx, compat) else {
        return 0;
    };
    let args = ChownArgs::from_registers(variant, &regs);

    if trace_sys_entry::<Chown, _, _>(&KernelEnv, &mut InFlight, &args) == EntryOutcome::Discarded {
        debug!(ctx, "chown entry discarded by process");
    }
    0
}

#[inline(always)]
fn sys_chown_ret<C: aya_ebpf::EbpfContext>(ctx: &C, retval: i64) -> u32 {
    let mut sink = RingBufSink(&CHOWN_EVENTS);
    match sys_exit::<Chown, _, _, _>(&KernelEnv, &mut InFlight, &mut sink, retval) {
        ExitOutcome::Dropped => debug!(ctx, "chown event dropped: ring buffer full"),
        ExitOutcome::Malformed => debug!(ctx, "chown record without setattr payload"),
        ExitOutcome::Unapproved => debug!(ctx, "chown dropped: deny policy, file never resolved"),
        _ => {}
    }
    0
}

#[inline(always)]
fn sys_chown_kretprobe(ctx: &RetProbeContext) -> u32 {
    match ctx.ret::<i64>() {
        Some(retval) => sys_chown_ret(ctx, retval),
        None => {
            sys_exit_unreadable::<Chown, _, _>(&KernelEnv, &mut InFlight);
            0
        }
    }
}

macro_rules! chown_probes {
    ($variant:expr, $entry:ident, $kretprobe:ident, $tracepoint:ident) => {
        #[kprobe]
        pub fn $entry(ctx: ProbeContext) -> u32 {
            trace_sys_chown(&ctx, $variant, $variant.is_legacy16())
        }

        #[kretprobe]
        pub fn $kretprobe(ctx: RetProbeContext) -> u32 {
            sys_chown_kretprobe(&ctx)
        }

        #[tracepoint]
        pub fn $tracepoint(ctx: TracePointContext) -> u32 {
            match unsafe { ctx.read_at::<i64>(SYS_EXIT_RET_OFFSET) } {
                Ok(retval) => sys_chown_ret(&ctx, retval),
                Err(_) => {
                    sys_exit_unreadable::<Chown, _, _>(&KernelEnv, &mut InFlight);
                    0
                }
            }
        }
    };
}

/// `__ia32_sys_*` entry points of the variants with 32-bit ids.
macro_rules! compat_chown_probes {
    ($variant:expr, $entry:ident, $kretprobe:ident) => {
        #[kprobe]
        pub fn $entry(ctx: ProbeContext) -> u32 {
            trace_sys_chown(&ctx, $variant, true)
        }

        #[kretprobe]
        pub fn $kretprobe(ctx: RetProbeContext) -> u32 {
            sys_chown_kretprobe(&ctx)
        }
    };
}

chown_probes!(ChownVariant::Chown, kprobe_sys_chown, kretprobe_sys_chown, tracepoint_sys_exit_chown);
chown_probes!(ChownVariant::Fchown, kprobe_sys_fchown, kretprobe_sys_fchown, tracepoint_sys_exit_fchown);
chown_probes!(ChownVariant::Lchown, kprobe_sys_lchown, kretprobe_sys_lchown, tracepoint_sys_exit_lchown);
chown_probes!(ChownVariant::Chown16, kprobe_sys_chown16, kretprobe_sys_chown16, tracepoint_sys_exit_chown16);
chown_probes!(ChownVariant::Fchown16, kprobe_sys_fchown16, kretprobe_sys_fchown16, tracepoint_sys_exit_fchown16);
chown_probes!(ChownVariant::Lchown16, kprobe_sys_lchown16, kretprobe_sys_lchown16, tracepoint_sys_exit_lchown16);
chown_probes!(ChownVariant::Fchownat, kprobe_sys_fchownat, kretprobe_sys_fchownat, tracepoint_sys_exit_fchownat);

compat_chown_probes!(ChownVariant::Chown, kprobe_compat_sys_chown, kretprobe_compat_sys_chown);
compat_chown_probes!(ChownVariant::Fchown, kprobe_compat_sys_fchown, kretprobe_compat_sys_fchown);
compat_chown_probes!(ChownVariant::Lchown, kprobe_compat_sys_lchown, kretprobe_compat_sys_lchown);
compat_chown_probes!(ChownVariant::Fchownat, kprobe_compat_sys_fchownat, kretprobe_compat_sys_fchownat);

/// int chown_common(const struct path *path, uid_t user, gid_t group)
#[kprobe]
pub fn kprobe_chown_common(ctx: ProbeContext) -> u32 {
    match try_resolve_chown(&ctx) {
        Ok(ret) => ret,
        Err(_) => 0,
    }
}

#[inline(always)]
fn try_resolve_chown(ctx: &ProbeContext) -> Result<u32, u32> {
    let path: u64 = ctx.arg(0).ok_or(1u32)?;
    if path == 0 {
        return Ok(0);
    }
    let dentry = path_dentry(path)?;
    if dentry == 0 {
        return Ok(0);
    }

    let approver = BasenameApprover::new(MapBasenames);
    let task = bpf_get_current_pid_tgid();
    let resolution = resolve_file::<Chown, _, _>(
        &mut InFlight,
        task,
        dentry,
        || read_file_fields(path, dentry),
        &approver,
    );
    if resolution == Resolution::Discarded {
        debug!(ctx, "chown discarded by approvers");
    }

    Ok(0)
}
