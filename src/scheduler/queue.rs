//! The ordering key wrapped around a queued task. A `BinaryHeap` over this
//! type gives priority-then-FIFO ordering without re-sorting a `Vec` on
//! every enqueue — the same shape as the teacher's `ScheduledRequest`.

use chrono::{DateTime, Utc};

use crate::domain::{Priority, Task};

#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub task: Task,
}

impl QueueEntry {
    pub fn new(task: Task) -> Self {
        Self { task }
    }

    fn priority(&self) -> Priority {
        self.task.priority
    }

    fn submitted_at(&self) -> DateTime<Utc> {
        self.task.submitted_at
    }
}

impl Eq for QueueEntry {}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.task.id == other.task.id
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Higher priority first; within a priority class, earlier
        // submission wins, so the comparison on timestamps is reversed
        // (an earlier timestamp must sort as "greater" for the max-heap).
        self.priority().cmp(&other.priority()).then_with(|| other.submitted_at().cmp(&self.submitted_at()))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default, Clone)]
pub struct SchedulerStats {
    pub total_enqueued: u64,
    pub total_dispensed: u64,
    pub peak_queue_depth: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskKind;

    fn task(priority: Priority) -> Task {
        Task::new(TaskKind::ToolCall, priority)
    }

    #[test]
    fn test_higher_priority_sorts_first() {
        let critical = QueueEntry::new(task(Priority::Critical));
        std::thread::sleep(std::time::Duration::from_millis(1));
        let normal = QueueEntry::new(task(Priority::Normal));
        std::thread::sleep(std::time::Duration::from_millis(1));
        let low = QueueEntry::new(task(Priority::Low));

        assert!(critical > normal);
        assert!(normal > low);
    }

    #[test]
    fn test_same_priority_is_fifo() {
        let first = QueueEntry::new(task(Priority::Normal));
        std::thread::sleep(std::time::Duration::from_millis(1));
        let second = QueueEntry::new(task(Priority::Normal));

        assert!(first > second);
    }

    #[test]
    fn test_equality_by_task_id() {
        let t1 = task(Priority::Normal);
        let mut t2 = task(Priority::High);
        t2.id = t1.id.clone();
        assert_eq!(QueueEntry::new(t1), QueueEntry::new(t2));
    }
}
