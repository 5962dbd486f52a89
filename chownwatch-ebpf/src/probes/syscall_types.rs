/// Common tracepoint header for syscall events (sys_enter_*, sys_exit_*)
#[repr(C)]
#[allow(dead_code)]
pub struct SyscallTraceHeader {
    pub common_type: u16,
    pub common_flags: u8,
    pub common_preempt_count: u8,
    pub common_pid: i32,
    pub __syscall_nr: i32,
    pub _pad: i32,
}

// ============================================================
// sys_exit_* (chown, fchown, lchown, fchownat, *16)
// ============================================================

#[repr(C)]
#[allow(dead_code)]
pub struct SysExit {
    pub header: SyscallTraceHeader,
    pub ret: i64,
}

/// Offset of `ret` in every `syscalls:sys_exit_*` record.
pub const SYS_EXIT_RET_OFFSET: usize = core::mem::offset_of!(SysExit, ret);
