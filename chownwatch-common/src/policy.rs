//! Per event type filtering policy and the lookups the entry handlers make
//! against it.

use crate::event::EventType;

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyMode {
    /// Every call is tracked.
    #[default]
    NoFilter = 0,
    /// Tracked unless a discarder matches.
    Accept = 1,
    /// Dropped unless an approver matches.
    Deny = 2,
}

impl PolicyMode {
    /// Unknown raw values fall back to `NoFilter`.
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Accept,
            2 => Self::Deny,
            _ => Self::NoFilter,
        }
    }
}

/// Which approver kinds are configured for an event type.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PolicyFlags(pub u32);

impl PolicyFlags {
    pub const NONE: PolicyFlags = PolicyFlags(0);
    pub const BASENAME: PolicyFlags = PolicyFlags(1);
    pub const FLAGS: PolicyFlags = PolicyFlags(1 << 1);
    pub const MODE: PolicyFlags = PolicyFlags(1 << 2);

    pub const fn contains(self, other: PolicyFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Policy snapshot stored in the `POLICIES` map and copied into every
/// in-flight record. The mode is kept raw so that the map value is plain
/// data on both sides.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Policy {
    pub mode: u32,
    pub flags: PolicyFlags,
}

impl Policy {
    pub const fn new(mode: PolicyMode, flags: PolicyFlags) -> Self {
        Self {
            mode: mode as u32,
            flags,
        }
    }

    pub fn mode(&self) -> PolicyMode {
        PolicyMode::from_raw(self.mode)
    }
}

/// Read-only policy storage. A missing entry means `Policy::default()`.
pub trait PolicyStore {
    fn fetch_policy(&self, event_type: EventType) -> Policy;
}

/// Coarse exclusion of whole processes, independent of call arguments.
pub trait ProcessDiscarders {
    /// Returns true when the current process must not be tracked for
    /// `event_type`. Never true under `PolicyMode::NoFilter`.
    fn is_discarded_by_process(&self, mode: PolicyMode, event_type: EventType) -> bool;
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for Policy {}
