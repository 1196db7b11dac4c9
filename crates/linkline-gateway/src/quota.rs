//! Per-group daily bot usage limits.

use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{GatewayError, Result};

pub const EXPLAIN_KEYWORD: &str = "@explain";

/// One group's counters for the UTC day in `date_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub date_key: NaiveDate,
    pub explain_calls: u32,
    pub notes_calls: u32,
}

impl UsageRecord {
    fn fresh(today: NaiveDate) -> Self {
        Self { date_key: today, explain_calls: 0, notes_calls: 0 }
    }

    pub fn total(&self) -> u32 {
        self.explain_calls + self.notes_calls
    }
}

pub struct UsageLimiter {
    daily_limit: u32,
    usage: DashMap<String, UsageRecord>,
}

impl UsageLimiter {
    pub fn new(daily_limit: u32) -> Self {
        Self { daily_limit, usage: DashMap::new() }
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    pub fn check_and_increment(&self, group_id: &str, keyword: &str) -> Result<()> {
        self.check_and_increment_at(group_id, keyword, Utc::now().date_naive())
    }

    /// Count one call against the group's allowance for `today`, or fail once
    /// the allowance is spent. Counters restart whenever the day changes.
    pub fn check_and_increment_at(&self, group_id: &str, keyword: &str, today: NaiveDate) -> Result<()> {
        if group_id.is_empty() {
            return Ok(());
        }

        let mut record = self
            .usage
            .entry(group_id.to_string())
            .or_insert_with(|| UsageRecord::fresh(today));

        if record.date_key != today {
            info!("Resetting daily usage for group {}", group_id);
            *record = UsageRecord::fresh(today);
        }

        if record.total() >= self.daily_limit {
            warn!("Daily AI limit reached for group {}", group_id);
            return Err(GatewayError::QuotaExceeded("Daily AI limit reached".to_string()));
        }

        if keyword == EXPLAIN_KEYWORD {
            record.explain_calls += 1;
        } else {
            record.notes_calls += 1;
        }
        Ok(())
    }

    pub fn usage(&self, group_id: &str) -> Option<UsageRecord> {
        self.usage.get(group_id).map(|r| r.clone())
    }
}
