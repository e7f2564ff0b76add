use chrono::{Local, NaiveDate};
use serde::Serialize;
use tracing::warn;

use crate::usage::{MonthKey, UsageTracker};

/// Usage figures shown on the options page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    pub used: u32,
    pub limit: u32,
    /// Share of the monthly limit, not clamped to 100.
    pub percentage: f64,
    pub reset_label: String,
}

/// "Resets on November 2026 1st" for any day in October 2026.
pub fn reset_label(today: NaiveDate) -> String {
    let next = MonthKey::from_date(today).next();
    let month_name = next
        .first_day()
        .map(|day| day.format("%B %Y").to_string())
        .unwrap_or_else(|| next.to_string());
    format!("Resets on {month_name} 1st")
}

pub fn summarize(used: u32, limit: u32, today: NaiveDate) -> UsageSummary {
    let percentage = if limit == 0 {
        0.0
    } else {
        f64::from(used) / f64::from(limit) * 100.0
    };

    UsageSummary {
        used,
        limit,
        percentage,
        reset_label: reset_label(today),
    }
}

/// Reads the stored count as-is; a stale month is only reset by the next quota check.
pub async fn load_usage_summary(tracker: &UsageTracker) -> Option<UsageSummary> {
    match tracker.usage().await {
        Ok(usage) => Some(summarize(
            usage.used,
            tracker.limit(),
            Local::now().date_naive(),
        )),
        Err(err) => {
            warn!("failed to load usage stats: {err}");
            None
        }
    }
}
