//! Raw reads of kernel structures and syscall registers.
//!
//! Struct offsets are kernel version dependent; the values below match
//! x86_64 and aarch64 builds of 5.15 - 6.x.

use aya_ebpf::{
    bindings::pt_regs,
    helpers::{bpf_probe_read_kernel, bpf_probe_read_kernel_str_bytes},
    programs::ProbeContext,
};
use chownwatch_common::{Basename, FileFields, PathKey, BASENAME_LEN};

use crate::env::probe_config;

// struct path { struct vfsmount *mnt; struct dentry *dentry; }
const PATH_MNT_OFFSET: u64 = 0;
const PATH_DENTRY_OFFSET: u64 = 8;

// struct mount embeds struct vfsmount `mnt` after mnt_hash, mnt_parent and
// mnt_mountpoint.
const MOUNT_MNT_OFFSET: u64 = 32;
const MOUNT_MNT_ID_OFFSET: u64 = 284;

const DENTRY_D_NAME_OFFSET: u64 = 32; // struct qstr
const QSTR_NAME_OFFSET: u64 = 8;
const DENTRY_D_INODE_OFFSET: u64 = 48;

const INODE_I_MODE_OFFSET: u64 = 0;
const INODE_I_UID_OFFSET: u64 = 4;
const INODE_I_GID_OFFSET: u64 = 8;
const INODE_I_INO_OFFSET: u64 = 64;
const INODE_I_NLINK_OFFSET: u64 = 72;

#[inline(always)]
fn read<T>(addr: u64) -> Result<T, u32> {
    unsafe { bpf_probe_read_kernel(addr as *const T) }.map_err(|_| 1u32)
}

/// `path->dentry`
#[inline(always)]
pub fn path_dentry(path: u64) -> Result<u64, u32> {
    read(path + PATH_DENTRY_OFFSET)
}

/// Identity of the file behind `path`/`dentry`. Fields that cannot be read
/// stay zero.
#[inline(always)]
pub fn read_file_fields(path: u64, dentry: u64) -> FileFields {
    let mut file = FileFields::default();

    if let Ok(vfsmount) = read::<u64>(path + PATH_MNT_OFFSET) {
        if vfsmount != 0 {
            let mount = vfsmount - MOUNT_MNT_OFFSET;
            file.path_key.mount_id = read::<i32>(mount + MOUNT_MNT_ID_OFFSET).unwrap_or(0) as u32;
        }
    }

    if let Ok(inode) = read::<u64>(dentry + DENTRY_D_INODE_OFFSET) {
        if inode != 0 {
            file.path_key = PathKey {
                ino: read(inode + INODE_I_INO_OFFSET).unwrap_or(0),
                ..file.path_key
            };
            file.mode = read::<u16>(inode + INODE_I_MODE_OFFSET).unwrap_or(0) as u32;
            file.uid = read(inode + INODE_I_UID_OFFSET).unwrap_or(0);
            file.gid = read(inode + INODE_I_GID_OFFSET).unwrap_or(0);
            file.nlink = read(inode + INODE_I_NLINK_OFFSET).unwrap_or(0);
        }
    }

    file.basename = read_basename(dentry);
    file
}

#[inline(always)]
fn read_basename(dentry: u64) -> Basename {
    let mut name = [0u8; BASENAME_LEN];
    if let Ok(name_ptr) = read::<u64>(dentry + DENTRY_D_NAME_OFFSET + QSTR_NAME_OFFSET) {
        if name_ptr != 0 {
            // Keep the last byte as terminator.
            let _ = unsafe {
                bpf_probe_read_kernel_str_bytes(name_ptr as *const u8, &mut name[..BASENAME_LEN - 1])
            };
        }
    }
    Basename(name)
}

/// First five syscall arguments of the probed call.
///
/// With syscall wrappers the probed function receives the user registers
/// as its only argument; `compat` selects the ia32 register convention used
/// by the `__ia32_sys_*` entry points.
#[inline(always)]
pub fn syscall_registers(ctx: &ProbeContext, compat: bool) -> Option<[u64; 5]> {
    if !probe_config().uses_syscall_wrapper() {
        return Some([
            ctx.arg(0)?,
            ctx.arg(1)?,
            ctx.arg(2)?,
            ctx.arg(3).unwrap_or(0),
            ctx.arg(4).unwrap_or(0),
        ]);
    }

    let regs: *const pt_regs = ctx.arg(0)?;
    if regs.is_null() {
        return None;
    }
    Some([
        user_arg(regs, 0, compat)?,
        user_arg(regs, 1, compat)?,
        user_arg(regs, 2, compat)?,
        user_arg(regs, 3, compat).unwrap_or(0),
        user_arg(regs, 4, compat).unwrap_or(0),
    ])
}

#[cfg(bpf_target_arch = "x86_64")]
#[inline(always)]
fn user_arg(regs: *const pt_regs, n: usize, compat: bool) -> Option<u64> {
    let field = unsafe {
        match (compat, n) {
            (false, 0) => core::ptr::addr_of!((*regs).rdi),
            (false, 1) => core::ptr::addr_of!((*regs).rsi),
            (false, 2) => core::ptr::addr_of!((*regs).rdx),
            (false, 3) => core::ptr::addr_of!((*regs).r10),
            (false, 4) => core::ptr::addr_of!((*regs).r8),
            (true, 0) => core::ptr::addr_of!((*regs).rbx),
            (true, 1) => core::ptr::addr_of!((*regs).rcx),
            (true, 2) => core::ptr::addr_of!((*regs).rdx),
            (true, 3) => core::ptr::addr_of!((*regs).rsi),
            (true, 4) => core::ptr::addr_of!((*regs).rdi),
            _ => return None,
        }
    };
    unsafe { bpf_probe_read_kernel(field) }.ok()
}

#[cfg(bpf_target_arch = "aarch64")]
#[inline(always)]
fn user_arg(regs: *const pt_regs, n: usize, _compat: bool) -> Option<u64> {
    if n > 4 {
        return None;
    }
    let field = unsafe { core::ptr::addr_of!((*regs).regs[n]) };
    unsafe { bpf_probe_read_kernel(field) }.ok()
}
