//! ParallelBatch: a set of tasks submitted together for dependency-aware,
//! concurrent execution.

use super::id::generate_id;
use super::task::Task;

#[derive(Debug)]
pub struct ParallelBatch {
    pub id: String,
    pub tasks: Vec<Task>,
}

impl ParallelBatch {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            id: generate_id("batch", &uuid::Uuid::now_v7().to_string()[..8]),
            tasks,
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{kind::TaskKind, priority::Priority};

    #[test]
    fn test_batch_len() {
        let batch = ParallelBatch::new(vec![
            Task::new(TaskKind::ToolCall, Priority::Normal),
            Task::new(TaskKind::ToolCall, Priority::Normal),
        ]);
        assert_eq!(batch.len(), 2);
        assert!(!batch.is_empty());
    }

    #[test]
    fn test_empty_batch() {
        let batch = ParallelBatch::new(vec![]);
        assert!(batch.is_empty());
    }
}
