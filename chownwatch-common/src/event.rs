//! Wire types shared between the probes and the userspace consumer.

use crate::{BASENAME_LEN, COMM_LEN, CONTAINER_ID_LEN};

/// Discriminator of a syscall family. Tags in-flight records, policies,
/// discarder masks and approver masks.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Wildcard used by lookups that accept a record of any family.
    Any = 0,
    Open = 1,
    Mkdir = 2,
    Link = 3,
    Rename = 4,
    Unlink = 5,
    Rmdir = 6,
    Chmod = 7,
    Chown = 8,
    Utime = 9,
    SetXattr = 10,
    RemoveXattr = 11,
}

impl EventType {
    pub const MAX: u32 = EventType::RemoveXattr as u32;

    pub fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Self::Any,
            1 => Self::Open,
            2 => Self::Mkdir,
            3 => Self::Link,
            4 => Self::Rename,
            5 => Self::Unlink,
            6 => Self::Rmdir,
            7 => Self::Chmod,
            8 => Self::Chown,
            9 => Self::Utime,
            10 => Self::SetXattr,
            11 => Self::RemoveXattr,
            _ => return None,
        })
    }

    /// Bit of this family inside approver and discarder masks.
    /// `Any` covers every family.
    pub const fn mask(self) -> u64 {
        match self {
            EventType::Any => u64::MAX,
            other => 1u64 << (other as u32 - 1),
        }
    }

    /// Whether a record tagged `self` satisfies a lookup for `wanted`.
    pub const fn matches(self, wanted: EventType) -> bool {
        matches!(wanted, EventType::Any) || self as u32 == wanted as u32
    }

    pub const fn name(self) -> &'static str {
        match self {
            EventType::Any => "any",
            EventType::Open => "open",
            EventType::Mkdir => "mkdir",
            EventType::Link => "link",
            EventType::Rename => "rename",
            EventType::Unlink => "unlink",
            EventType::Rmdir => "rmdir",
            EventType::Chmod => "chmod",
            EventType::Chown => "chown",
            EventType::Utime => "utime",
            EventType::SetXattr => "setxattr",
            EventType::RemoveXattr => "removexattr",
        }
    }
}

/// NUL padded file name, usable as a BPF map key.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Basename(pub [u8; BASENAME_LEN]);

impl Basename {
    pub const fn empty() -> Self {
        Self([0; BASENAME_LEN])
    }

    /// Copies at most `BASENAME_LEN - 1` bytes, stopping at the first NUL.
    pub fn from_bytes(name: &[u8]) -> Self {
        let mut out = [0u8; BASENAME_LEN];
        let mut i = 0;
        while i < BASENAME_LEN - 1 && i < name.len() {
            if name[i] == 0 {
                break;
            }
            out[i] = name[i];
            i += 1;
        }
        Self(out)
    }

    /// Bytes up to the first NUL.
    pub fn as_bytes(&self) -> &[u8] {
        let len = self.0.iter().position(|&b| b == 0).unwrap_or(BASENAME_LEN);
        &self.0[..len]
    }

    pub fn is_empty(&self) -> bool {
        self.0[0] == 0
    }
}

impl Default for Basename {
    fn default() -> Self {
        Self::empty()
    }
}

impl core::fmt::Debug for Basename {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match core::str::from_utf8(self.as_bytes()) {
            Ok(name) => write!(f, "{name:?}"),
            Err(_) => write!(f, "{:?}", self.as_bytes()),
        }
    }
}

/// Stable identity of a file: inode, mount and a path cache generation.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathKey {
    pub ino: u64,
    pub mount_id: u32,
    pub path_id: u32,
}

/// File identity attached to a record by the resolution step.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileFields {
    pub path_key: PathKey,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u32,
    pub basename: Basename,
}

/// Common event header.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KEvent {
    pub event_type: u32,
    pub flags: u32,
    pub timestamp_ns: u64,
}

impl KEvent {
    /// Set when the event was produced outside of the syscall that caused it.
    pub const ASYNC: u32 = 1;

    pub const fn new(event_type: EventType) -> Self {
        Self {
            event_type: event_type as u32,
            flags: 0,
            timestamp_ns: 0,
        }
    }

    pub fn is_async(&self) -> bool {
        self.flags & Self::ASYNC != 0
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessContext {
    pub pid: u32,
    pub tid: u32,
    pub uid: u32,
    pub gid: u32,
    pub cgroup_id: u64,
    pub comm: [u8; COMM_LEN],
}

impl ProcessContext {
    pub fn comm(&self) -> &[u8] {
        let len = self.comm.iter().position(|&b| b == 0).unwrap_or(COMM_LEN);
        &self.comm[..len]
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerContext {
    pub container_id: [u8; CONTAINER_ID_LEN],
}

impl ContainerContext {
    pub const fn empty() -> Self {
        Self {
            container_id: [0; CONTAINER_ID_LEN],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.container_id[0] == 0
    }

    pub fn id(&self) -> &[u8] {
        let len = self
            .container_id
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(CONTAINER_ID_LEN);
        &self.container_id[..len]
    }
}

impl Default for ContainerContext {
    fn default() -> Self {
        Self::empty()
    }
}

/// Distributed tracing identity. All zero when the task carries no span.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpanContext {
    pub span_id: u64,
    pub trace_id: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyscallContext {
    pub retval: i64,
}

/// Ownership change emitted once per completed, tracked chown call.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChownEvent {
    pub event: KEvent,
    pub process: ProcessContext,
    pub span: SpanContext,
    pub container: ContainerContext,
    pub syscall: SyscallContext,
    pub file: FileFields,
    pub uid: u32,
    pub gid: u32,
}

#[cfg(feature = "user")]
mod pod {
    use super::*;

    unsafe impl aya::Pod for Basename {}
    unsafe impl aya::Pod for SpanContext {}
    unsafe impl aya::Pod for ChownEvent {}
}
