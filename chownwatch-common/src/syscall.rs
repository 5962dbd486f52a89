//! In-flight syscall records held between a syscall's entry and its exit.

use crate::event::{EventType, FileFields};
use crate::policy::Policy;

/// Arguments shared by the families that end in `security_inode_setattr`
/// (chown, chmod, utimes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetAttrArgs {
    pub user: u32,
    pub group: u32,
    /// Kernel dentry handle, 0 until the resolution step ran.
    pub dentry: u64,
    pub file: FileFields,
}

impl SetAttrArgs {
    pub fn new(user: u32, group: u32) -> Self {
        Self {
            user,
            group,
            dentry: 0,
            file: FileFields::default(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.dentry != 0
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallPayload {
    None,
    SetAttr(SetAttrArgs),
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyscallRecord {
    pub event_type: EventType,
    pub policy: Policy,
    pub payload: SyscallPayload,
}

impl SyscallRecord {
    pub const fn new(event_type: EventType, policy: Policy, payload: SyscallPayload) -> Self {
        Self {
            event_type,
            policy,
            payload,
        }
    }

    pub fn set_attr(&self) -> Option<&SetAttrArgs> {
        match &self.payload {
            SyscallPayload::SetAttr(args) => Some(args),
            SyscallPayload::None => None,
        }
    }

    pub fn set_attr_mut(&mut self) -> Option<&mut SetAttrArgs> {
        match &mut self.payload {
            SyscallPayload::SetAttr(args) => Some(args),
            SyscallPayload::None => None,
        }
    }

    /// Whether the resolution step attached a file.
    pub fn is_resolved(&self) -> bool {
        self.set_attr().is_some_and(SetAttrArgs::is_resolved)
    }

    /// File identity attached by the resolution step, if the family has one.
    pub fn file(&self) -> Option<&FileFields> {
        self.set_attr().map(|args| &args.file)
    }
}
