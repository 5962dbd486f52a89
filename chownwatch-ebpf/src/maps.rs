use aya_ebpf::{
    macros::map,
    maps::{Array, HashMap, LruHashMap, RingBuf},
};
use chownwatch_common::{
    Basename, EventType, MAX_APPROVERS, MAX_DISCARDERS, MAX_IN_FLIGHT, Policy, ProbeConfig,
    SpanContext, SyscallRecord,
};

const CHOWN_RINGBUF_SIZE: u32 = 256 * 1024; // 256KB
const MAX_SPANS: u32 = 4096;

#[map]
pub static CHOWN_EVENTS: RingBuf = RingBuf::with_byte_size(CHOWN_RINGBUF_SIZE, 0);

/// In-flight syscalls keyed by pid_tgid. LRU eviction reclaims the slots of
/// tasks that never reached their exit.
#[map]
pub static SYSCALLS: LruHashMap<u64, SyscallRecord> = LruHashMap::with_max_entries(MAX_IN_FLIGHT, 0);

/// Policy per event type, indexed by `EventType as u32`.
#[map]
pub static POLICIES: Array<Policy> = Array::with_max_entries(EventType::MAX + 1, 0);

/// Event mask of discarded event types per tgid.
#[map]
pub static DISCARDED_PIDS: HashMap<u32, u64> = HashMap::with_max_entries(MAX_DISCARDERS, 0);

/// Event mask of approved event types per basename.
#[map]
pub static APPROVER_BASENAMES: HashMap<Basename, u64> = HashMap::with_max_entries(MAX_APPROVERS, 0);

/// Mount id of the internal pipefs mount, 0 while unknown.
#[map]
pub static PIPEFS_MOUNT_ID: Array<u32> = Array::with_max_entries(1, 0);

/// Active span per pid_tgid, written by instrumented tracers.
#[map]
pub static SPAN_CONTEXTS: HashMap<u64, SpanContext> = HashMap::with_max_entries(MAX_SPANS, 0);

#[map]
pub static CONFIG: Array<ProbeConfig> = Array::with_max_entries(1, 0);
