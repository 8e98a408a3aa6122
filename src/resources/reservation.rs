//! Coarse resource bookkeeping for container/compute tasks: tracks claimed
//! CPU cores, memory, and GPU slots per task id. Allocation is advisory —
//! the orchestrator does not enforce cgroup limits, it just keeps a ledger
//! so `stats()` can report pressure and the auto-scaler can reason about it.

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct Reservation {
    pub cpu_cores: f64,
    pub memory_mb: u64,
    pub gpu: bool,
}

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct ReservationStats {
    pub active_reservations: usize,
    pub total_cpu_cores: f64,
    pub total_memory_mb: u64,
    pub gpu_claims: usize,
}

#[derive(Default)]
pub struct ReservationTable {
    by_task: Mutex<HashMap<String, Reservation>>,
}

impl ReservationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a claim for `task_id`. Always succeeds: there is no backing
    /// limit to enforce against, only a ledger to keep.
    pub fn allocate(&self, task_id: impl Into<String>, cpu_cores: Option<f64>, memory_mb: Option<u64>, gpu: bool) -> bool {
        let reservation = Reservation { cpu_cores: cpu_cores.unwrap_or(0.0), memory_mb: memory_mb.unwrap_or(0), gpu };
        self.by_task.lock().unwrap().insert(task_id.into(), reservation);
        true
    }

    pub fn release(&self, task_id: &str) {
        self.by_task.lock().unwrap().remove(task_id);
    }

    pub fn stats(&self) -> ReservationStats {
        let by_task = self.by_task.lock().unwrap();
        let mut stats = ReservationStats { active_reservations: by_task.len(), ..Default::default() };
        for reservation in by_task.values() {
            stats.total_cpu_cores += reservation.cpu_cores;
            stats.total_memory_mb += reservation.memory_mb;
            if reservation.gpu {
                stats.gpu_claims += 1;
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_and_release() {
        let table = ReservationTable::new();
        assert!(table.allocate("t1", Some(2.0), Some(512), false));
        let stats = table.stats();
        assert_eq!(stats.active_reservations, 1);
        assert_eq!(stats.total_cpu_cores, 2.0);
        assert_eq!(stats.total_memory_mb, 512);

        table.release("t1");
        assert_eq!(table.stats().active_reservations, 0);
    }

    #[test]
    fn test_gpu_claims_counted() {
        let table = ReservationTable::new();
        table.allocate("t1", None, None, true);
        table.allocate("t2", None, None, false);
        assert_eq!(table.stats().gpu_claims, 1);
    }

    #[test]
    fn test_allocate_always_succeeds_regardless_of_volume() {
        let table = ReservationTable::new();
        for i in 0..500 {
            assert!(table.allocate(format!("t{i}"), Some(64.0), Some(1_000_000), true));
        }
        assert_eq!(table.stats().active_reservations, 500);
    }

    #[test]
    fn test_re_allocate_same_task_replaces() {
        let table = ReservationTable::new();
        table.allocate("t1", Some(1.0), Some(100), false);
        table.allocate("t1", Some(4.0), Some(200), true);
        let stats = table.stats();
        assert_eq!(stats.active_reservations, 1);
        assert_eq!(stats.total_cpu_cores, 4.0);
        assert_eq!(stats.gpu_claims, 1);
    }
}
