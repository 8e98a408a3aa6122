//! Per-worker quota accounting: minute/hour/day request and token limits
//! plus a daily cost budget, with lazy window rollover on read — counters
//! reset on the next access after the window elapses, not on a timer.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiQuota {
    pub requests_per_minute: Option<u32>,
    pub requests_per_hour: Option<u32>,
    pub requests_per_day: Option<u32>,
    pub tokens_per_day: Option<u64>,
    pub daily_cost_budget: Option<f64>,
}

impl Default for ApiQuota {
    fn default() -> Self {
        Self {
            requests_per_minute: None,
            requests_per_hour: None,
            requests_per_day: None,
            tokens_per_day: None,
            daily_cost_budget: None,
        }
    }
}

impl ApiQuota {
    pub fn with_requests_per_minute(mut self, n: u32) -> Self {
        self.requests_per_minute = Some(n);
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ApiUsageCounters {
    requests_this_minute: u32,
    requests_this_hour: u32,
    requests_this_day: u32,
    tokens_today: u64,
    cost_today: f64,
    minute_reset_at: Option<DateTime<Utc>>,
    hour_reset_at: Option<DateTime<Utc>>,
    day_reset_at: Option<DateTime<Utc>>,
}

/// Tracks usage against a quota for a single worker. Guarded by its own
/// mutex so concurrent `check_quota`/`record_usage` calls for *different*
/// workers never contend with each other.
pub struct QuotaTracker {
    pub quota: ApiQuota,
    usage: Mutex<ApiUsageCounters>,
}

impl QuotaTracker {
    pub fn new(quota: ApiQuota) -> Self {
        Self { quota, usage: Mutex::new(ApiUsageCounters::default()) }
    }

    fn roll_over(counters: &mut ApiUsageCounters, now: DateTime<Utc>) {
        match counters.minute_reset_at {
            Some(t) if now - t < chrono::Duration::minutes(1) => {}
            _ => {
                counters.requests_this_minute = 0;
                counters.minute_reset_at = Some(now);
            }
        }
        match counters.hour_reset_at {
            Some(t) if now - t < chrono::Duration::hours(1) => {}
            _ => {
                counters.requests_this_hour = 0;
                counters.hour_reset_at = Some(now);
            }
        }
        match counters.day_reset_at {
            Some(t) if now - t < chrono::Duration::days(1) => {}
            _ => {
                counters.requests_this_day = 0;
                counters.tokens_today = 0;
                counters.cost_today = 0.0;
                counters.day_reset_at = Some(now);
            }
        }
    }

    /// Roll windows over if needed, then check every configured limit.
    /// Returns `Ok(())` if the next call is allowed, `Err(reason)` naming
    /// which window tripped (callers match on substrings like "minute
    /// request limit").
    pub fn check_quota(&self) -> Result<(), String> {
        let now = Utc::now();
        let mut counters = self.usage.lock().unwrap();
        Self::roll_over(&mut counters, now);

        if let Some(limit) = self.quota.requests_per_minute {
            if counters.requests_this_minute >= limit {
                return Err("Minute request limit exceeded".to_string());
            }
        }
        if let Some(limit) = self.quota.requests_per_hour {
            if counters.requests_this_hour >= limit {
                return Err("Hourly request limit exceeded".to_string());
            }
        }
        if let Some(limit) = self.quota.requests_per_day {
            if counters.requests_this_day >= limit {
                return Err("Daily request limit exceeded".to_string());
            }
        }
        if let Some(limit) = self.quota.tokens_per_day {
            if counters.tokens_today >= limit {
                return Err("Daily token limit exceeded".to_string());
            }
        }
        if let Some(budget) = self.quota.daily_cost_budget {
            if counters.cost_today >= budget {
                return Err("Daily cost budget exceeded".to_string());
            }
        }
        Ok(())
    }

    /// Increments all window counters atomically (under the same lock).
    pub fn record_usage(&self, tokens: u64, cost: f64) {
        let now = Utc::now();
        let mut counters = self.usage.lock().unwrap();
        Self::roll_over(&mut counters, now);
        counters.requests_this_minute += 1;
        counters.requests_this_hour += 1;
        counters.requests_this_day += 1;
        counters.tokens_today += tokens;
        counters.cost_today += cost;
    }

    pub fn usage_today(&self) -> (u32, u64, f64) {
        let mut counters = self.usage.lock().unwrap();
        Self::roll_over(&mut counters, Utc::now());
        (counters.requests_this_day, counters.tokens_today, counters.cost_today)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_allows_up_to_limit() {
        let tracker = QuotaTracker::new(ApiQuota::default().with_requests_per_minute(2));
        assert!(tracker.check_quota().is_ok());
        tracker.record_usage(10, 0.01);
        assert!(tracker.check_quota().is_ok());
        tracker.record_usage(10, 0.01);
        let err = tracker.check_quota().unwrap_err();
        assert!(err.to_lowercase().contains("minute request limit"));
    }

    #[test]
    fn test_no_quota_always_ok() {
        let tracker = QuotaTracker::new(ApiQuota::default());
        for _ in 0..1000 {
            tracker.record_usage(1, 0.0);
        }
        assert!(tracker.check_quota().is_ok());
    }

    #[test]
    fn test_usage_today_accumulates() {
        let tracker = QuotaTracker::new(ApiQuota::default());
        tracker.record_usage(100, 0.5);
        tracker.record_usage(50, 0.25);
        let (requests, tokens, cost) = tracker.usage_today();
        assert_eq!(requests, 2);
        assert_eq!(tokens, 150);
        assert!((cost - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_daily_cost_budget() {
        let tracker = QuotaTracker::new(ApiQuota { daily_cost_budget: Some(1.0), ..Default::default() });
        tracker.record_usage(0, 0.9);
        assert!(tracker.check_quota().is_ok());
        tracker.record_usage(0, 0.2);
        assert!(tracker.check_quota().unwrap_err().contains("cost budget"));
    }
}
