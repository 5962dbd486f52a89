//! Userspace rendering of kernel chown events.

use std::fmt;

use chownwatch_common::{ChownEvent, EventType};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::telemetry::outcome_label;

/// Container runtimes name the leaf cgroup after the 64 hex digit id
/// (`docker-<id>.scope`, `cri-containerd-<id>.scope`, `/docker/<id>`).
static CONTAINER_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([0-9a-f]{64})").expect("container id pattern"));

/// Owner value meaning "leave unchanged".
const UNCHANGED_ID: u32 = u32::MAX;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    pub inode: u64,
    pub mount_id: u32,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u32,
    pub basename: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChownReport {
    /// Family name from the event header, `unknown` for an unexpected tag.
    pub event: &'static str,
    pub observed_at: String,
    pub timestamp_ns: u64,
    pub pid: u32,
    pub tid: u32,
    pub comm: String,
    pub uid: u32,
    pub gid: u32,
    pub cgroup_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<u64>,
    pub retval: i64,
    pub outcome: &'static str,
    /// `None` when the call left the owner unchanged.
    pub new_uid: Option<u32>,
    pub new_gid: Option<u32>,
    /// `None` when the kernel never resolved the target file.
    pub file: Option<FileReport>,
}

impl ChownReport {
    /// Builds the report. `lookup_container` is only consulted when the
    /// kernel did not fill the container id.
    pub fn from_event<F>(event: &ChownEvent, lookup_container: F) -> Self
    where
        F: FnOnce(u32) -> Option<String>,
    {
        let container_id = if event.container.is_empty() {
            lookup_container(event.process.pid)
        } else {
            Some(lossy(event.container.id()))
        };

        let file = (event.file.path_key.ino != 0).then(|| FileReport {
            inode: event.file.path_key.ino,
            mount_id: event.file.path_key.mount_id,
            mode: event.file.mode,
            uid: event.file.uid,
            gid: event.file.gid,
            nlink: event.file.nlink,
            basename: lossy(event.file.basename.as_bytes()),
        });

        Self {
            event: EventType::from_raw(event.event.event_type).map_or("unknown", EventType::name),
            observed_at: chrono::Utc::now().to_rfc3339(),
            timestamp_ns: event.event.timestamp_ns,
            pid: event.process.pid,
            tid: event.process.tid,
            comm: lossy(event.process.comm()),
            uid: event.process.uid,
            gid: event.process.gid,
            cgroup_id: event.process.cgroup_id,
            container_id,
            span_id: (event.span.span_id != 0).then_some(event.span.span_id),
            trace_id: (event.span.trace_id != 0).then_some(event.span.trace_id),
            retval: event.syscall.retval,
            outcome: outcome_label(event.syscall.retval),
            new_uid: (event.uid != UNCHANGED_ID).then_some(event.uid),
            new_gid: (event.gid != UNCHANGED_ID).then_some(event.gid),
            file,
        }
    }
}

impl fmt::Display for ChownReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} pid={} tid={} comm={}",
            self.event.to_ascii_uppercase(),
            self.pid,
            self.tid,
            self.comm
        )?;
        match &self.file {
            Some(file) => write!(
                f,
                " file={} ino={} mnt={} owner={}:{}",
                file.basename, file.inode, file.mount_id, file.uid, file.gid
            )?,
            None => write!(f, " file=<unresolved>")?,
        }
        write!(
            f,
            " new_owner={}:{} ret={} ({})",
            DisplayId(self.new_uid),
            DisplayId(self.new_gid),
            self.retval,
            self.outcome
        )?;
        if let Some(id) = &self.container_id {
            write!(f, " container={}", short_id(id))?;
        }
        write!(f, " cgroup={}", self.cgroup_id)
    }
}

struct DisplayId(Option<u32>);

impl fmt::Display for DisplayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(id) => write!(f, "{}", id),
            None => f.write_str("-"),
        }
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

/// Container id of `pid`, read from `/proc/<pid>/cgroup`.
pub fn container_id_for_pid(pid: u32) -> Option<String> {
    let cgroup = std::fs::read_to_string(format!("/proc/{}/cgroup", pid)).ok()?;
    parse_container_id(&cgroup)
}

/// Scans `hierarchy:controllers:path` lines, innermost match wins.
pub fn parse_container_id(cgroup: &str) -> Option<String> {
    cgroup.lines().rev().find_map(|line| {
        let path = line.rsplit(':').next()?;
        CONTAINER_ID
            .captures_iter(path)
            .last()
            .map(|caps| caps[1].to_string())
    })
}
