//! The chown syscall family: `chown`, `fchown`, `lchown`, their legacy
//! 16-bit forms and `fchownat`.

use crate::engine::{AuditEvent, SyscallFamily};
use crate::event::{
    ChownEvent, ContainerContext, EventType, KEvent, ProcessContext, SpanContext, SyscallContext,
};
use crate::syscall::{SetAttrArgs, SyscallPayload, SyscallRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChownVariant {
    Chown,
    Fchown,
    Lchown,
    Chown16,
    Fchown16,
    Lchown16,
    Fchownat,
}

/// Every entry point of the family. Probes are attached from this table.
pub const CHOWN_VARIANTS: [ChownVariant; 7] = [
    ChownVariant::Chown,
    ChownVariant::Fchown,
    ChownVariant::Lchown,
    ChownVariant::Chown16,
    ChownVariant::Fchown16,
    ChownVariant::Lchown16,
    ChownVariant::Fchownat,
];

impl ChownVariant {
    /// Kernel syscall name, without the arch prefix.
    pub const fn syscall(self) -> &'static str {
        match self {
            ChownVariant::Chown => "chown",
            ChownVariant::Fchown => "fchown",
            ChownVariant::Lchown => "lchown",
            ChownVariant::Chown16 => "chown16",
            ChownVariant::Fchown16 => "fchown16",
            ChownVariant::Lchown16 => "lchown16",
            ChownVariant::Fchownat => "fchownat",
        }
    }

    pub const fn is_legacy16(self) -> bool {
        matches!(
            self,
            ChownVariant::Chown16 | ChownVariant::Fchown16 | ChownVariant::Lchown16
        )
    }

    /// Name of the entry kprobe program.
    pub const fn entry_program(self) -> &'static str {
        match self {
            ChownVariant::Chown => "kprobe_sys_chown",
            ChownVariant::Fchown => "kprobe_sys_fchown",
            ChownVariant::Lchown => "kprobe_sys_lchown",
            ChownVariant::Chown16 => "kprobe_sys_chown16",
            ChownVariant::Fchown16 => "kprobe_sys_fchown16",
            ChownVariant::Lchown16 => "kprobe_sys_lchown16",
            ChownVariant::Fchownat => "kprobe_sys_fchownat",
        }
    }

    /// Name of the return probe program.
    pub const fn kretprobe_program(self) -> &'static str {
        match self {
            ChownVariant::Chown => "kretprobe_sys_chown",
            ChownVariant::Fchown => "kretprobe_sys_fchown",
            ChownVariant::Lchown => "kretprobe_sys_lchown",
            ChownVariant::Chown16 => "kretprobe_sys_chown16",
            ChownVariant::Fchown16 => "kretprobe_sys_fchown16",
            ChownVariant::Lchown16 => "kretprobe_sys_lchown16",
            ChownVariant::Fchownat => "kretprobe_sys_fchownat",
        }
    }

    /// Programs hooked on the ia32 entry of a variant whose native entry
    /// takes 32-bit ids. `None` for the legacy forms, whose only entry
    /// already is the ia32 one.
    pub const fn compat_programs(self) -> Option<CompatPrograms> {
        let (entry, kretprobe) = match self {
            ChownVariant::Chown => ("kprobe_compat_sys_chown", "kretprobe_compat_sys_chown"),
            ChownVariant::Fchown => ("kprobe_compat_sys_fchown", "kretprobe_compat_sys_fchown"),
            ChownVariant::Lchown => ("kprobe_compat_sys_lchown", "kretprobe_compat_sys_lchown"),
            ChownVariant::Fchownat => {
                ("kprobe_compat_sys_fchownat", "kretprobe_compat_sys_fchownat")
            }
            ChownVariant::Chown16 | ChownVariant::Fchown16 | ChownVariant::Lchown16 => {
                return None;
            }
        };
        Some(CompatPrograms { entry, kretprobe })
    }

    /// Name of the `syscalls:sys_exit_*` tracepoint program.
    pub const fn tracepoint_program(self) -> &'static str {
        match self {
            ChownVariant::Chown => "tracepoint_sys_exit_chown",
            ChownVariant::Fchown => "tracepoint_sys_exit_fchown",
            ChownVariant::Lchown => "tracepoint_sys_exit_lchown",
            ChownVariant::Chown16 => "tracepoint_sys_exit_chown16",
            ChownVariant::Fchown16 => "tracepoint_sys_exit_fchown16",
            ChownVariant::Lchown16 => "tracepoint_sys_exit_lchown16",
            ChownVariant::Fchownat => "tracepoint_sys_exit_fchownat",
        }
    }
}

/// Entry and return programs of an ia32 entry point. `sys_exit_*`
/// tracepoints do not fire for compat tasks, so the exit is always a return
/// probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompatPrograms {
    pub entry: &'static str,
    pub kretprobe: &'static str,
}

/// Raw arguments as the different entry points receive them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChownArgs {
    Path { filename: u64, user: u32, group: u32 },
    Fd { fd: i32, user: u32, group: u32 },
    At { dirfd: i32, filename: u64, user: u32, group: u32, flags: i32 },
    Legacy16 { target: u64, user: u16, group: u16 },
}

impl ChownArgs {
    /// Decodes syscall argument registers for `variant`.
    pub fn from_registers(variant: ChownVariant, regs: &[u64; 5]) -> Self {
        match variant {
            ChownVariant::Chown | ChownVariant::Lchown => ChownArgs::Path {
                filename: regs[0],
                user: regs[1] as u32,
                group: regs[2] as u32,
            },
            ChownVariant::Fchown => ChownArgs::Fd {
                fd: regs[0] as i32,
                user: regs[1] as u32,
                group: regs[2] as u32,
            },
            ChownVariant::Chown16 | ChownVariant::Fchown16 | ChownVariant::Lchown16 => {
                ChownArgs::Legacy16 {
                    target: regs[0],
                    user: regs[1] as u16,
                    group: regs[2] as u16,
                }
            }
            ChownVariant::Fchownat => ChownArgs::At {
                dirfd: regs[0] as i32,
                filename: regs[1],
                user: regs[2] as u32,
                group: regs[3] as u32,
                flags: regs[4] as i32,
            },
        }
    }

    /// Requested owner and group, whatever the argument shape.
    pub fn ids(&self) -> (u32, u32) {
        match *self {
            ChownArgs::Path { user, group, .. }
            | ChownArgs::Fd { user, group, .. }
            | ChownArgs::At { user, group, .. } => (user, group),
            ChownArgs::Legacy16 { user, group, .. } => (widen16(user), widen16(group)),
        }
    }
}

/// `(u16)-1` means "leave unchanged" and keeps that meaning at 32 bits.
fn widen16(id: u16) -> u32 {
    if id == u16::MAX { u32::MAX } else { id as u32 }
}

pub struct Chown;

impl SyscallFamily for Chown {
    const EVENT_TYPE: EventType = EventType::Chown;

    type Args = ChownArgs;
    type Event = ChownEvent;

    fn payload(args: &ChownArgs) -> SyscallPayload {
        let (user, group) = args.ids();
        SyscallPayload::SetAttr(SetAttrArgs::new(user, group))
    }

    fn fill_event(record: &SyscallRecord, retval: i64, event: &mut ChownEvent) -> bool {
        let Some(args) = record.set_attr() else {
            return false;
        };
        event.event = KEvent::new(EventType::Chown);
        event.syscall = SyscallContext { retval };
        event.file = args.file;
        event.uid = args.user;
        event.gid = args.group;
        true
    }
}

// SAFETY: every section is integers and byte arrays.
unsafe impl AuditEvent for ChownEvent {
    fn header_mut(&mut self) -> &mut KEvent {
        &mut self.event
    }

    fn process_mut(&mut self) -> &mut ProcessContext {
        &mut self.process
    }

    fn container_mut(&mut self) -> &mut ContainerContext {
        &mut self.container
    }

    fn span_mut(&mut self) -> &mut SpanContext {
        &mut self.span
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approver::BasenameApprover;
    use crate::engine::{
        EntryOutcome, ExitOutcome, Resolution, resolve_file, sys_exit, sys_exit_unreadable,
        trace_sys_entry,
    };
    use crate::event::{Basename, FileFields, PathKey};
    use crate::policy::{Policy, PolicyFlags, PolicyMode};
    use crate::table::{CorrelationTable, SyscallCache};
    use crate::testing::{FakeBasenames, FakeEnv, FakeSink};

    const EFAULT: i64 = 14;
    const EPERM: i64 = 1;
    const EACCES: i64 = 13;

    type Table = CorrelationTable<64>;

    fn path_args(user: u32, group: u32) -> ChownArgs {
        ChownArgs::Path {
            filename: 0x7fff_0000,
            user,
            group,
        }
    }

    fn file(name: &str, mount_id: u32) -> FileFields {
        FileFields {
            path_key: PathKey {
                ino: 4242,
                mount_id,
                path_id: 1,
            },
            basename: Basename::from_bytes(name.as_bytes()),
            ..FileFields::default()
        }
    }

    fn run_call(
        env: &FakeEnv,
        table: &mut Table,
        sink: &mut FakeSink<ChownEvent>,
        args: ChownArgs,
        retval: i64,
    ) -> (EntryOutcome, ExitOutcome) {
        let entry = trace_sys_entry::<Chown, _, _>(env, table, &args);
        let exit = sys_exit::<Chown, _, _, _>(env, table, sink, retval);
        (entry, exit)
    }

    #[test]
    fn chown_success_emits_one_event() {
        let env = FakeEnv::default();
        let mut table = Table::new();
        let mut sink = FakeSink::default();

        let outcome = run_call(&env, &mut table, &mut sink, path_args(1000, 1000), 0);

        assert_eq!(outcome, (EntryOutcome::Cached, ExitOutcome::Sent));
        assert_eq!(sink.events.len(), 1);
        let (ty, event) = sink.events[0];
        assert_eq!(ty, EventType::Chown);
        assert_eq!(event.syscall.retval, 0);
        assert_eq!((event.uid, event.gid), (1000, 1000));
        assert_eq!(event.event.event_type, EventType::Chown as u32);
        assert!(!event.event.is_async());
        assert_eq!(event.event.timestamp_ns, env.now);
        assert!(table.is_empty());
    }

    #[test]
    fn discarded_process_leaves_no_trace() {
        let env = FakeEnv {
            discarded_mask: EventType::Chown.mask(),
            ..FakeEnv::default()
        }
        .with_policy(EventType::Chown, Policy::new(PolicyMode::Accept, PolicyFlags::NONE));
        let mut table = Table::new();
        let mut sink = FakeSink::default();

        let args = ChownArgs::Fd {
            fd: 3,
            user: 0,
            group: 0,
        };
        let outcome = run_call(&env, &mut table, &mut sink, args, 0);

        assert_eq!(outcome, (EntryOutcome::Discarded, ExitOutcome::NoRecord));
        assert!(sink.events.is_empty());
        assert!(table.is_empty());
    }

    #[test]
    fn discarders_are_ignored_without_filtering() {
        let env = FakeEnv {
            discarded_mask: EventType::Chown.mask(),
            ..FakeEnv::default()
        };
        let mut table = Table::new();
        let mut sink = FakeSink::default();

        let outcome = run_call(&env, &mut table, &mut sink, path_args(1, 1), 0);
        assert_eq!(outcome.1, ExitOutcome::Sent);
    }

    #[test]
    fn benign_error_is_dropped_silently() {
        let env = FakeEnv::default();
        let mut table = Table::new();
        let mut sink = FakeSink::default();

        let args = ChownArgs::Path {
            filename: 0,
            user: 1,
            group: 1,
        };
        let outcome = run_call(&env, &mut table, &mut sink, args, -EFAULT);

        assert_eq!(outcome.1, ExitOutcome::UnhandledError);
        assert!(sink.events.is_empty());
        assert!(table.is_empty());
    }

    #[test]
    fn permission_denied_is_reported_with_its_code() {
        let env = FakeEnv::default();
        let mut table = Table::new();
        let mut sink = FakeSink::default();

        let outcome = run_call(&env, &mut table, &mut sink, path_args(0, 0), -EPERM);

        assert_eq!(outcome.1, ExitOutcome::Sent);
        assert_eq!(sink.events[0].1.syscall.retval, -EPERM);
    }

    #[test]
    fn every_variant_reports_the_requested_ids() {
        let env = FakeEnv::default();

        for variant in CHOWN_VARIANTS {
            let mut table = Table::new();
            let mut sink = FakeSink::default();
            let regs = if variant == ChownVariant::Fchownat {
                [u64::MAX - 99, 0x1000, 1234, 5678, 0]
            } else {
                [0x1000, 1234, 5678, 0, 0]
            };
            let args = ChownArgs::from_registers(variant, &regs);

            let outcome = run_call(&env, &mut table, &mut sink, args, 0);

            assert_eq!(outcome, (EntryOutcome::Cached, ExitOutcome::Sent), "{variant:?}");
            assert_eq!(sink.events.len(), 1, "{variant:?}");
            let event = sink.events[0].1;
            assert_eq!((event.uid, event.gid), (1234, 5678), "{variant:?}");
        }
    }

    #[test]
    fn legacy_unchanged_sentinel_widens() {
        let args = ChownArgs::from_registers(ChownVariant::Lchown16, &[0, 0xFFFF, 42, 0, 0]);
        assert_eq!(args.ids(), (u32::MAX, 42));

        let args = ChownArgs::from_registers(ChownVariant::Chown, &[0, u32::MAX as u64, 7, 0, 0]);
        assert_eq!(args.ids(), (u32::MAX, 7));
    }

    #[test]
    fn fchownat_reads_ids_after_the_path() {
        let args = ChownArgs::from_registers(ChownVariant::Fchownat, &[100, 0x2000, 1, 2, 0x100]);
        assert_eq!(
            args,
            ChownArgs::At {
                dirfd: 100,
                filename: 0x2000,
                user: 1,
                group: 2,
                flags: 0x100
            }
        );
    }

    #[test]
    fn spurious_exit_is_a_no_op() {
        let env = FakeEnv::default();
        let mut table = Table::new();
        let mut sink = FakeSink::default();

        let outcome = sys_exit::<Chown, _, _, _>(&env, &mut table, &mut sink, 0);
        assert_eq!(outcome, ExitOutcome::NoRecord);

        run_call(&env, &mut table, &mut sink, path_args(1, 2), 0);
        let again = sys_exit::<Chown, _, _, _>(&env, &mut table, &mut sink, 0);
        assert_eq!(again, ExitOutcome::NoRecord);
        assert_eq!(sink.events.len(), 1);
    }

    #[test]
    fn rejected_file_never_reaches_transport() {
        let env = FakeEnv::default()
            .with_policy(EventType::Chown, Policy::new(PolicyMode::Deny, PolicyFlags::BASENAME));
        let approver = BasenameApprover::new(FakeBasenames::default().with("shadow", EventType::Chown.mask()));
        let mut table = Table::new();
        let mut sink = FakeSink::default();
        let task = env.current_task_id();

        trace_sys_entry::<Chown, _, _>(&env, &mut table, &path_args(0, 0));
        let resolution =
            resolve_file::<Chown, _, _>(&mut table, task, 0xffff_8888, || file("motd", 20), &approver);
        assert_eq!(resolution, Resolution::Discarded);

        let exit = sys_exit::<Chown, _, _, _>(&env, &mut table, &mut sink, 0);
        assert_eq!(exit, ExitOutcome::NoRecord);
        assert!(sink.events.is_empty());
    }

    #[test]
    fn approved_file_is_carried_into_the_event() {
        let env = FakeEnv::default()
            .with_policy(EventType::Chown, Policy::new(PolicyMode::Deny, PolicyFlags::BASENAME));
        let approver = BasenameApprover::new(FakeBasenames::default().with("shadow", EventType::Chown.mask()));
        let mut table = Table::new();
        let mut sink = FakeSink::default();
        let task = env.current_task_id();

        trace_sys_entry::<Chown, _, _>(&env, &mut table, &path_args(0, 42));
        let first = resolve_file::<Chown, _, _>(&mut table, task, 0x1, || file("shadow", 20), &approver);
        // A nested lookup must not replace the first resolved file.
        let second = resolve_file::<Chown, _, _>(&mut table, task, 0x2, || file("motd", 21), &approver);
        assert_eq!((first, second), (Resolution::Approved, Resolution::AlreadyResolved));

        sys_exit::<Chown, _, _, _>(&env, &mut table, &mut sink, 0);
        let event = sink.events[0].1;
        assert_eq!(event.file, file("shadow", 20));
        assert_eq!((event.uid, event.gid), (0, 42));
    }

    #[test]
    fn resolution_without_record_is_untracked() {
        let approver = BasenameApprover::new(FakeBasenames::default());
        let mut table = Table::new();
        let mut evaluated = false;

        let resolution = resolve_file::<Chown, _, _>(
            &mut table,
            77,
            0x1,
            || {
                evaluated = true;
                FileFields::default()
            },
            &approver,
        );

        assert_eq!(resolution, Resolution::Untracked);
        assert!(!evaluated);
    }

    #[test]
    fn pipefs_targets_are_filtered() {
        let env = FakeEnv {
            pipefs_mount_id: 13,
            ..FakeEnv::default()
        };
        let approver = BasenameApprover::new(FakeBasenames::default());
        let mut table = Table::new();
        let mut sink = FakeSink::default();
        let task = env.current_task_id();

        trace_sys_entry::<Chown, _, _>(&env, &mut table, &ChownArgs::Fd { fd: 4, user: 1, group: 1 });
        resolve_file::<Chown, _, _>(&mut table, task, 0x1, || file("pipe:[1234]", 13), &approver);

        let exit = sys_exit::<Chown, _, _, _>(&env, &mut table, &mut sink, 0);
        assert_eq!(exit, ExitOutcome::PipeFs);
        assert!(sink.events.is_empty());
    }

    #[test]
    fn process_cache_miss_still_emits() {
        let env = FakeEnv {
            process: None,
            container_id: Some(b"abcdef"),
            span: SpanContext {
                span_id: 5,
                trace_id: 6,
            },
            ..FakeEnv::default()
        };
        env.on_task((10u64 << 32) | 11);
        let mut table = Table::new();
        let mut sink = FakeSink::default();

        run_call(&env, &mut table, &mut sink, path_args(3, 4), 0);

        let event = sink.events[0].1;
        assert_eq!((event.process.pid, event.process.tid), (10, 11));
        assert_eq!(event.process.comm(), b"");
        // Without a process entry there is nothing to key the container on.
        assert!(event.container.is_empty());
        assert_eq!(event.span, SpanContext { span_id: 5, trace_id: 6 });
    }

    #[test]
    fn process_cache_hit_fills_identity() {
        let mut comm = [0u8; crate::COMM_LEN];
        comm[..5].copy_from_slice(b"chown");
        let env = FakeEnv {
            process: Some(ProcessContext {
                uid: 1000,
                gid: 100,
                cgroup_id: 99,
                comm,
                ..ProcessContext::default()
            }),
            container_id: Some(b"abcdef"),
            ..FakeEnv::default()
        };
        let mut table = Table::new();
        let mut sink = FakeSink::default();

        run_call(&env, &mut table, &mut sink, path_args(3, 4), 0);

        let event = sink.events[0].1;
        assert_eq!(event.process.comm(), b"chown");
        assert_eq!(event.process.uid, 1000);
        assert_eq!(event.container.id(), b"abcdef");
    }

    #[test]
    fn deny_drops_calls_that_never_resolved_a_file() {
        let env = FakeEnv::default()
            .with_policy(EventType::Chown, Policy::new(PolicyMode::Deny, PolicyFlags::BASENAME));
        let mut table = Table::new();
        let mut sink = FakeSink::default();

        // Path lookup fails before chown_common runs.
        let outcome = run_call(&env, &mut table, &mut sink, path_args(0, 0), -EACCES);

        assert_eq!(outcome, (EntryOutcome::Cached, ExitOutcome::Unapproved));
        assert!(sink.events.is_empty());
        assert!(table.is_empty());
    }

    #[test]
    fn deny_reports_denied_calls_on_approved_files() {
        let env = FakeEnv::default()
            .with_policy(EventType::Chown, Policy::new(PolicyMode::Deny, PolicyFlags::BASENAME));
        let approver = BasenameApprover::new(FakeBasenames::default().with("shadow", EventType::Chown.mask()));
        let mut table = Table::new();
        let mut sink = FakeSink::default();
        let task = env.current_task_id();

        trace_sys_entry::<Chown, _, _>(&env, &mut table, &path_args(0, 0));
        resolve_file::<Chown, _, _>(&mut table, task, 0x1, || file("shadow", 20), &approver);
        let exit = sys_exit::<Chown, _, _, _>(&env, &mut table, &mut sink, -EACCES);

        assert_eq!(exit, ExitOutcome::Sent);
        assert_eq!(sink.events[0].1.syscall.retval, -EACCES);
    }

    #[test]
    fn unresolved_calls_are_reported_without_deny() {
        let env = FakeEnv::default()
            .with_policy(EventType::Chown, Policy::new(PolicyMode::Accept, PolicyFlags::NONE));
        let mut table = Table::new();
        let mut sink = FakeSink::default();

        let outcome = run_call(&env, &mut table, &mut sink, path_args(0, 0), -EACCES);

        assert_eq!(outcome.1, ExitOutcome::Sent);
        assert_eq!(sink.events[0].1.file, FileFields::default());
    }

    #[test]
    fn unreadable_return_consumes_the_record_silently() {
        let env = FakeEnv::default();
        let mut table = Table::new();
        let mut sink = FakeSink::default();

        trace_sys_entry::<Chown, _, _>(&env, &mut table, &path_args(1, 1));
        assert_eq!(
            sys_exit_unreadable::<Chown, _, _>(&env, &mut table),
            ExitOutcome::UnreadableReturn
        );
        assert!(table.is_empty());

        assert_eq!(sys_exit::<Chown, _, _, _>(&env, &mut table, &mut sink, 0), ExitOutcome::NoRecord);
        assert_eq!(sys_exit_unreadable::<Chown, _, _>(&env, &mut table), ExitOutcome::NoRecord);
        assert!(sink.events.is_empty());
    }

    #[test]
    fn compat_programs_cover_the_32bit_id_variants() {
        let compat: Vec<_> = CHOWN_VARIANTS
            .iter()
            .filter_map(|v| v.compat_programs().map(|p| (*v, p)))
            .collect();

        assert_eq!(compat.len(), 4);
        assert!(compat.iter().all(|(v, _)| !v.is_legacy16()));
        let (_, chown) = compat[0];
        assert_eq!(chown.entry, "kprobe_compat_sys_chown");
        assert_eq!(chown.kretprobe, "kretprobe_compat_sys_chown");
        assert_ne!(chown.entry, ChownVariant::Chown.entry_program());
    }

    #[test]
    fn full_transport_drops_without_retry() {
        let env = FakeEnv::default();
        let mut table = Table::new();
        let mut sink = FakeSink {
            full: true,
            ..FakeSink::default()
        };

        let outcome = run_call(&env, &mut table, &mut sink, path_args(1, 1), 0);
        assert_eq!(outcome.1, ExitOutcome::Dropped);
        assert!(table.is_empty());
    }

    #[test]
    fn killed_task_slot_is_reused_without_corruption() {
        let env = FakeEnv::default();
        let mut table = CorrelationTable::<2>::new();
        let mut sink = FakeSink::default();

        // Task 1 enters and is killed before exiting.
        env.on_task(1);
        trace_sys_entry::<Chown, _, _>(&env, &mut table, &path_args(1, 1));
        // Task 2 is mid-call.
        env.on_task(2);
        trace_sys_entry::<Chown, _, _>(&env, &mut table, &path_args(2, 2));
        // A new task takes the stale slot.
        env.on_task(3);
        trace_sys_entry::<Chown, _, _>(&env, &mut table, &path_args(3, 3));
        assert_eq!(sys_exit::<Chown, _, _, _>(&env, &mut table, &mut sink, 0), ExitOutcome::Sent);

        env.on_task(2);
        assert_eq!(sys_exit::<Chown, _, _, _>(&env, &mut table, &mut sink, 0), ExitOutcome::Sent);

        let ids: Vec<_> = sink.events.iter().map(|(_, e)| (e.uid, e.gid)).collect();
        assert_eq!(ids, vec![(3, 3), (2, 2)]);
        assert!(!table.contains(1));
    }

    #[test]
    fn record_of_another_family_is_left_alone() {
        let env = FakeEnv::default();
        let mut table = Table::new();
        let mut sink = FakeSink::default();
        let chmod = SyscallRecord::new(EventType::Chmod, Policy::default(), SyscallPayload::None);
        table.push(env.current_task_id(), chmod);

        let exit = sys_exit::<Chown, _, _, _>(&env, &mut table, &mut sink, 0);
        assert_eq!(exit, ExitOutcome::NoRecord);
        assert_eq!(table.pop(env.current_task_id(), EventType::Chmod), Some(chmod));
    }

    #[test]
    fn malformed_payload_is_not_emitted() {
        let env = FakeEnv::default();
        let mut table = Table::new();
        let mut sink = FakeSink::default();
        table.push(
            env.current_task_id(),
            SyscallRecord::new(EventType::Chown, Policy::default(), SyscallPayload::None),
        );

        let exit = sys_exit::<Chown, _, _, _>(&env, &mut table, &mut sink, 0);
        assert_eq!(exit, ExitOutcome::Malformed);
        assert!(sink.events.is_empty());
    }

    impl FakeEnv {
        fn current_task_id(&self) -> u64 {
            self.task.get()
        }
    }
}
