//! Resource layer: cloud-LLM API pool with per-worker quotas, plus a coarse
//! reservation ledger for container/compute tasks. This sits beside the
//! `registry` module rather than inside it because quota and reservation
//! accounting applies narrowly to cost-bearing or resource-claiming work,
//! not to every worker kind.

pub mod pool;
pub mod quota;
pub mod reservation;

use serde::Serialize;

pub use pool::{CloudLlmPool, UsageSummary};
pub use quota::{ApiQuota, QuotaTracker};
pub use reservation::{Reservation, ReservationStats, ReservationTable};

#[derive(Debug, Default, Clone, Serialize)]
pub struct ResourceStats {
    pub local_llm_workers: usize,
    pub usage: UsageSummary,
    pub reservations: ReservationStats,
}

/// Ties the cloud-LLM pool and the reservation ledger together behind one
/// handle the orchestrator core can hold and query.
#[derive(Default)]
pub struct ResourceManager {
    pub cloud_llm: CloudLlmPool,
    pub reservations: ReservationTable,
}

impl ResourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// `local_llm_workers` is the count of registered local-LLM workers;
    /// the resource manager has no registry of its own, so the caller
    /// (the orchestrator, which holds the worker registry) supplies it.
    pub async fn stats(&self, local_llm_workers: usize) -> ResourceStats {
        ResourceStats {
            local_llm_workers,
            usage: self.cloud_llm.usage_summary().await,
            reservations: self.reservations.stats(),
        }
    }
}
