//! In-memory stand-ins for the kernel collaborators.

use std::cell::Cell;

use crate::approver::BasenameLookup;
use crate::engine::{AuditEvent, Delivery, EventSink, ProbeEnv};
use crate::event::{Basename, ContainerContext, EventType, ProcessContext, SpanContext};
use crate::policy::{Policy, PolicyMode, PolicyStore, ProcessDiscarders};
use crate::table::TaskId;

pub struct FakeEnv {
    pub task: Cell<TaskId>,
    pub policies: Vec<(EventType, Policy)>,
    /// Event mask of discarders registered for the current process.
    pub discarded_mask: u64,
    pub pipefs_mount_id: u32,
    /// `None` simulates a process cache miss.
    pub process: Option<ProcessContext>,
    pub container_id: Option<&'static [u8]>,
    pub span: SpanContext,
    pub now: u64,
}

impl Default for FakeEnv {
    fn default() -> Self {
        Self {
            task: Cell::new(1),
            policies: Vec::new(),
            discarded_mask: 0,
            pipefs_mount_id: 0,
            process: None,
            container_id: None,
            span: SpanContext::default(),
            now: 1_000,
        }
    }
}

impl FakeEnv {
    pub fn with_policy(mut self, event_type: EventType, policy: Policy) -> Self {
        self.policies.push((event_type, policy));
        self
    }

    pub fn on_task(&self, task: TaskId) -> &Self {
        self.task.set(task);
        self
    }
}

impl PolicyStore for FakeEnv {
    fn fetch_policy(&self, event_type: EventType) -> Policy {
        self.policies
            .iter()
            .find(|(ty, _)| *ty == event_type)
            .map(|(_, policy)| *policy)
            .unwrap_or_default()
    }
}

impl ProcessDiscarders for FakeEnv {
    fn is_discarded_by_process(&self, mode: PolicyMode, event_type: EventType) -> bool {
        mode != PolicyMode::NoFilter && self.discarded_mask & event_type.mask() != 0
    }
}

impl ProbeEnv for FakeEnv {
    type ProcEntry = u32;

    fn current_task(&self) -> TaskId {
        self.task.get()
    }

    fn now_ns(&self) -> u64 {
        self.now
    }

    fn is_pipefs_mount_id(&self, mount_id: u32) -> bool {
        self.pipefs_mount_id != 0 && mount_id == self.pipefs_mount_id
    }

    fn fill_process_context(&self, out: &mut ProcessContext) -> Option<u32> {
        let task = self.task.get();
        out.pid = (task >> 32) as u32;
        out.tid = task as u32;
        let cached = self.process?;
        out.uid = cached.uid;
        out.gid = cached.gid;
        out.cgroup_id = cached.cgroup_id;
        out.comm = cached.comm;
        Some(out.pid)
    }

    fn fill_container_context(&self, entry: Option<&u32>, out: &mut ContainerContext) {
        if entry.is_none() {
            return;
        }
        if let Some(id) = self.container_id {
            let len = id.len().min(out.container_id.len());
            out.container_id[..len].copy_from_slice(&id[..len]);
        }
    }

    fn fill_span_context(&self, out: &mut SpanContext) {
        *out = self.span;
    }
}

pub struct FakeSink<E> {
    pub events: Vec<(EventType, E)>,
    pub full: bool,
}

impl<E> Default for FakeSink<E> {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            full: false,
        }
    }
}

impl<E: AuditEvent> EventSink<E> for FakeSink<E> {
    fn send_with<F>(&mut self, event_type: EventType, fill: F) -> Delivery
    where
        F: FnOnce(&mut E) -> bool,
    {
        if self.full {
            return Delivery::Dropped;
        }
        // SAFETY: `AuditEvent` types are valid when zeroed.
        let mut event: E = unsafe { core::mem::zeroed() };
        if !fill(&mut event) {
            return Delivery::Aborted;
        }
        self.events.push((event_type, event));
        Delivery::Sent
    }
}

#[derive(Default)]
pub struct FakeBasenames {
    entries: Vec<(Basename, u64)>,
}

impl FakeBasenames {
    pub fn with(mut self, name: &str, mask: u64) -> Self {
        self.entries.push((Basename::from_bytes(name.as_bytes()), mask));
        self
    }
}

impl BasenameLookup for FakeBasenames {
    fn event_mask(&self, basename: &Basename) -> Option<u64> {
        self.entries
            .iter()
            .find(|(name, _)| name == basename)
            .map(|(_, mask)| *mask)
    }
}
