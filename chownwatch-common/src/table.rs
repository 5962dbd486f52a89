//! Correlation of syscall entries with their exits.
//!
//! A task owns at most one in-flight record. Entries push it, the resolution
//! step may amend it, exits pop it. Nothing else ever touches another task's
//! slot, which is what keeps the store lock free in the kernel.

use crate::event::EventType;
use crate::syscall::SyscallRecord;

/// Key of a slot: the kernel `pid_tgid` of the calling thread.
pub type TaskId = u64;

/// Keyed store of in-flight records.
///
/// `pop` and `peek_mut` only return a record whose tag matches the wanted
/// type (`EventType::Any` matches everything); a mismatch leaves the record
/// where it is.
pub trait SyscallCache {
    /// Stores `record` for `task`, replacing any record already there.
    fn push(&mut self, task: TaskId, record: SyscallRecord);

    fn pop(&mut self, task: TaskId, event_type: EventType) -> Option<SyscallRecord>;

    fn peek_mut(&mut self, task: TaskId, event_type: EventType) -> Option<&mut SyscallRecord>;
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    task: TaskId,
    stamp: u64,
    record: SyscallRecord,
}

/// Fixed capacity open addressing table with linear probing.
///
/// Removal uses backward shifting so lookups can stop at the first free
/// slot. When all `N` slots are taken, a push for a new task evicts the
/// least recently pushed record.
pub struct CorrelationTable<const N: usize> {
    slots: [Option<Slot>; N],
    len: usize,
    clock: u64,
}

impl<const N: usize> CorrelationTable<N> {
    pub const fn new() -> Self {
        assert!(N > 0, "correlation table needs at least one slot");
        Self {
            slots: [None; N],
            len: 0,
            clock: 0,
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, task: TaskId) -> bool {
        self.find(task).is_some()
    }

    /// Stores `record` for `task` and returns what it displaced: the task's
    /// previous record, or the oldest record of another task when the table
    /// was full.
    pub fn insert(&mut self, task: TaskId, record: SyscallRecord) -> Option<(TaskId, SyscallRecord)> {
        self.clock = self.clock.wrapping_add(1);
        let stamp = self.clock;

        if let Some(idx) = self.find(task) {
            let slot = self.slots[idx].replace(Slot {
                task,
                stamp,
                record,
            });
            return slot.map(|old| (old.task, old.record));
        }

        let evicted = if self.len == N {
            self.oldest().and_then(|idx| self.remove_at(idx))
        } else {
            None
        };

        let home = Self::home(task);
        for i in 0..N {
            let idx = (home + i) % N;
            if self.slots[idx].is_none() {
                self.slots[idx] = Some(Slot {
                    task,
                    stamp,
                    record,
                });
                self.len += 1;
                break;
            }
        }

        evicted.map(|old| (old.task, old.record))
    }

    /// Removes the record of `task` whatever its type.
    pub fn remove(&mut self, task: TaskId) -> Option<SyscallRecord> {
        let idx = self.find(task)?;
        self.remove_at(idx).map(|slot| slot.record)
    }

    fn home(task: TaskId) -> usize {
        // Fibonacci hashing spreads sequential thread ids across the table.
        (task.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 32) as usize % N
    }

    fn distance(from: usize, to: usize) -> usize {
        (to + N - from) % N
    }

    fn find(&self, task: TaskId) -> Option<usize> {
        let home = Self::home(task);
        for i in 0..N {
            let idx = (home + i) % N;
            match &self.slots[idx] {
                None => return None,
                Some(slot) if slot.task == task => return Some(idx),
                Some(_) => {}
            }
        }
        None
    }

    fn oldest(&self) -> Option<usize> {
        let mut oldest: Option<(usize, u64)> = None;
        for (idx, slot) in self.slots.iter().enumerate() {
            if let Some(slot) = slot {
                // Stamps only grow, distance from the clock orders them even
                // across a wrap.
                let age = self.clock.wrapping_sub(slot.stamp);
                if oldest.is_none_or(|(_, best)| age > best) {
                    oldest = Some((idx, age));
                }
            }
        }
        oldest.map(|(idx, _)| idx)
    }

    fn remove_at(&mut self, idx: usize) -> Option<Slot> {
        let removed = self.slots[idx].take()?;
        self.len -= 1;

        let mut hole = idx;
        let mut next = idx;
        for _ in 1..N {
            next = (next + 1) % N;
            let Some(slot) = self.slots[next] else {
                break;
            };
            let home = Self::home(slot.task);
            if Self::distance(home, hole) < Self::distance(home, next) {
                self.slots[hole] = self.slots[next].take();
                hole = next;
            }
        }

        Some(removed)
    }
}

impl<const N: usize> Default for CorrelationTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> SyscallCache for CorrelationTable<N> {
    fn push(&mut self, task: TaskId, record: SyscallRecord) {
        self.insert(task, record);
    }

    fn pop(&mut self, task: TaskId, event_type: EventType) -> Option<SyscallRecord> {
        let idx = self.find(task)?;
        let matches = self.slots[idx]
            .as_ref()
            .is_some_and(|slot| slot.record.event_type.matches(event_type));
        if !matches {
            return None;
        }
        self.remove_at(idx).map(|slot| slot.record)
    }

    fn peek_mut(&mut self, task: TaskId, event_type: EventType) -> Option<&mut SyscallRecord> {
        let idx = self.find(task)?;
        self.slots[idx]
            .as_mut()
            .map(|slot| &mut slot.record)
            .filter(|record| record.event_type.matches(event_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Policy;
    use crate::syscall::{SetAttrArgs, SyscallPayload};

    fn chown_record(user: u32, group: u32) -> SyscallRecord {
        SyscallRecord::new(
            EventType::Chown,
            Policy::default(),
            SyscallPayload::SetAttr(SetAttrArgs::new(user, group)),
        )
    }

    #[test]
    fn push_then_pop_returns_the_same_record() {
        let mut table = CorrelationTable::<8>::new();
        let record = chown_record(1000, 1000);

        table.push(42, record);
        assert_eq!(table.len(), 1);

        assert_eq!(table.pop(42, EventType::Chown), Some(record));
        assert!(table.is_empty());
    }

    #[test]
    fn pop_without_push_is_a_no_op() {
        let mut table = CorrelationTable::<8>::new();
        table.push(1, chown_record(0, 0));

        assert_eq!(table.pop(2, EventType::Chown), None);
        assert_eq!(table.len(), 1);
        assert!(table.contains(1));
    }

    #[test]
    fn second_pop_finds_nothing() {
        let mut table = CorrelationTable::<4>::new();
        table.push(7, chown_record(1, 2));

        assert!(table.pop(7, EventType::Chown).is_some());
        assert_eq!(table.pop(7, EventType::Chown), None);
        assert_eq!(table.pop(7, EventType::Any), None);
    }

    #[test]
    fn type_mismatch_leaves_the_record_in_place() {
        let mut table = CorrelationTable::<4>::new();
        let record = chown_record(5, 6);
        table.push(9, record);

        assert_eq!(table.pop(9, EventType::Chmod), None);
        assert!(table.peek_mut(9, EventType::Chmod).is_none());
        assert_eq!(table.pop(9, EventType::Any), Some(record));
    }

    #[test]
    fn push_on_occupied_slot_overwrites() {
        let mut table = CorrelationTable::<4>::new();
        let first = chown_record(1, 1);
        let second = chown_record(2, 2);

        assert_eq!(table.insert(3, first), None);
        assert_eq!(table.insert(3, second), Some((3, first)));
        assert_eq!(table.len(), 1);
        assert_eq!(table.pop(3, EventType::Chown), Some(second));
    }

    #[test]
    fn distinct_tasks_never_see_each_other() {
        let mut table = CorrelationTable::<16>::new();
        let a = chown_record(1000, 1000);
        let b = chown_record(0, 0);

        // Interleaved lifecycles of two threads.
        table.push(100, a);
        table.push(200, b);
        assert_eq!(table.pop(100, EventType::Chown), Some(a));
        table.push(100, b);
        assert_eq!(table.pop(200, EventType::Chown), Some(b));
        assert_eq!(table.pop(100, EventType::Chown), Some(b));
        assert!(table.is_empty());
    }

    #[test]
    fn full_table_evicts_the_oldest_record() {
        let mut table = CorrelationTable::<3>::new();
        table.push(1, chown_record(1, 1));
        table.push(2, chown_record(2, 2));
        table.push(3, chown_record(3, 3));
        // Refreshing task 1 makes task 2 the oldest.
        table.push(1, chown_record(10, 10));

        let evicted = table.insert(4, chown_record(4, 4));
        assert_eq!(evicted.map(|(task, _)| task), Some(2));
        assert_eq!(table.len(), 3);
        assert!(!table.contains(2));
        assert_eq!(table.pop(1, EventType::Chown), Some(chown_record(10, 10)));
        assert_eq!(table.pop(3, EventType::Chown), Some(chown_record(3, 3)));
        assert_eq!(table.pop(4, EventType::Chown), Some(chown_record(4, 4)));
    }

    #[test]
    fn stale_slot_is_reclaimed_without_touching_live_records() {
        let mut table = CorrelationTable::<2>::new();
        // Task 1 never exits.
        table.push(1, chown_record(1, 1));
        table.push(2, chown_record(2, 2));

        table.push(3, chown_record(3, 3));
        assert!(!table.contains(1));
        assert_eq!(table.pop(2, EventType::Chown), Some(chown_record(2, 2)));
        assert_eq!(table.pop(3, EventType::Chown), Some(chown_record(3, 3)));
    }

    #[test]
    fn removal_keeps_colliding_keys_reachable() {
        let mut table = CorrelationTable::<8>::new();
        for task in 0..8u64 {
            table.push(task * 8, chown_record(task as u32, 0));
        }
        for task in (0..8u64).step_by(2) {
            assert!(table.remove(task * 8).is_some());
        }
        for task in (1..8u64).step_by(2) {
            assert_eq!(
                table.pop(task * 8, EventType::Chown),
                Some(chown_record(task as u32, 0))
            );
        }
        assert!(table.is_empty());
    }

    #[test]
    fn peek_mut_amends_the_in_flight_record() {
        let mut table = CorrelationTable::<4>::new();
        table.push(11, chown_record(1, 1));

        if let Some(args) = table
            .peek_mut(11, EventType::Any)
            .and_then(|record| record.set_attr_mut())
        {
            args.dentry = 0xdead;
        }

        let record = table.pop(11, EventType::Chown).unwrap();
        assert_eq!(record.set_attr().map(|args| args.dentry), Some(0xdead));
    }
}
