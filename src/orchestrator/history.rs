//! In-process task history: every task ever submitted, keyed by id, with
//! submission order preserved for newest-first listing. There is no
//! persistence layer here — history is lost on process restart.

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;

use crate::domain::{Task, TaskStatus};

#[derive(Default)]
pub struct TaskHistory {
    by_id: RwLock<HashMap<String, Task>>,
    order: RwLock<Vec<String>>,
}

impl TaskHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, task: Task) {
        let id = task.id.clone();
        self.by_id.write().await.insert(id.clone(), task);
        self.order.write().await.push(id);
    }

    pub async fn update(&self, task: Task) {
        self.by_id.write().await.insert(task.id.clone(), task);
    }

    pub async fn get(&self, id: &str) -> Option<Task> {
        self.by_id.read().await.get(id).cloned()
    }

    pub async fn failed_ids(&self) -> HashSet<String> {
        self.by_id
            .read()
            .await
            .values()
            .filter(|t| t.status == TaskStatus::Failed || t.status == TaskStatus::Cancelled)
            .map(|t| t.id.clone())
            .collect()
    }

    pub async fn active_count(&self) -> usize {
        self.by_id.read().await.values().filter(|t| !t.status.is_terminal()).count()
    }

    /// Newest-first slice, optionally filtered to one status, bounded to
    /// `limit` entries.
    pub async fn newest_first(&self, limit: usize, status_filter: Option<TaskStatus>) -> Vec<Task> {
        let order = self.order.read().await;
        let by_id = self.by_id.read().await;
        order
            .iter()
            .rev()
            .filter_map(|id| by_id.get(id))
            .filter(|t| status_filter.is_none_or(|s| t.status == s))
            .take(limit)
            .cloned()
            .collect()
    }
}
