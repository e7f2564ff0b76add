use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{Datelike, Local, NaiveDate};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info};

use crate::storage::{LocalStore, StorageEntries, StorageError};

pub const USAGE_MONTH_KEY: &str = "usageMonthKey";
pub const REWRITES_USED_KEY: &str = "rewritesUsedThisMonth";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid month key `{0}`, expected YYYY-MM")]
pub struct MonthKeyParseError(String);

/// Calendar month a usage count applies to, printed as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn current() -> Self {
        Self::from_date(Local::now().date_naive())
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(self) -> i32 {
        self.year
    }

    pub fn month(self) -> u32 {
        self.month
    }

    pub fn next(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    pub fn first_day(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = MonthKeyParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || MonthKeyParseError(value.to_string());
        let (year, month) = value.split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }

        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        Self::new(year, month).ok_or_else(invalid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub month_key: Option<String>,
    pub used: u32,
}

pub type MonthSource = Arc<dyn Fn() -> MonthKey + Send + Sync>;

/// Monthly rewrite quota persisted in extension storage.
///
/// Each operation is one storage transaction. The window between
/// [`UsageTracker::check_quota`] and [`UsageTracker::consume`] is left open:
/// overlapping flows may both pass the check before either consumes.
pub struct UsageTracker {
    store: Arc<LocalStore>,
    limit: u32,
    month_source: MonthSource,
}

impl UsageTracker {
    pub fn new(store: Arc<LocalStore>, limit: u32) -> Self {
        Self::with_month_source(store, limit, Arc::new(MonthKey::current))
    }

    pub fn with_month_source(store: Arc<LocalStore>, limit: u32, month_source: MonthSource) -> Self {
        Self {
            store,
            limit,
            month_source,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn current_month(&self) -> MonthKey {
        (self.month_source)()
    }

    /// Returns whether another rewrite is allowed this month.
    ///
    /// A stored month that differs from the current one resets the count to zero.
    pub async fn check_quota(&self) -> Result<bool, StorageError> {
        let current_month = self.current_month().to_string();
        let limit = self.limit;

        self.store
            .transaction(|entries| {
                let stored_month = entries.get(USAGE_MONTH_KEY).and_then(Value::as_str);
                if stored_month != Some(current_month.as_str()) {
                    info!(
                        previous = stored_month.unwrap_or("none"),
                        current = %current_month,
                        "usage month rolled over; resetting rewrite count"
                    );
                    entries.insert(USAGE_MONTH_KEY.to_string(), json!(current_month));
                    entries.insert(REWRITES_USED_KEY.to_string(), json!(0));
                    return true;
                }

                read_used(entries) < limit
            })
            .await
    }

    /// Adds one rewrite to this month's count and returns the new total.
    ///
    /// No ceiling is applied here; callers check quota first.
    pub async fn consume(&self) -> Result<u32, StorageError> {
        let used = self
            .store
            .transaction(|entries| {
                let used = read_used(entries).saturating_add(1);
                entries.insert(REWRITES_USED_KEY.to_string(), json!(used));
                used
            })
            .await?;

        debug!(used, limit = self.limit, "recorded rewrite usage");
        Ok(used)
    }

    pub async fn usage(&self) -> Result<UsageRecord, StorageError> {
        let entries = self
            .store
            .get(&[USAGE_MONTH_KEY, REWRITES_USED_KEY])
            .await?;

        Ok(UsageRecord {
            month_key: entries
                .get(USAGE_MONTH_KEY)
                .and_then(Value::as_str)
                .map(str::to_string),
            used: read_used(&entries),
        })
    }
}

fn read_used(entries: &StorageEntries) -> u32 {
    let Some(value) = entries.get(REWRITES_USED_KEY) else {
        return 0;
    };

    value
        .as_u64()
        .or_else(|| {
            value
                .as_f64()
                .filter(|count| count.is_finite() && *count >= 0.0)
                .map(|count| count as u64)
        })
        .map(|count| u32::try_from(count).unwrap_or(u32::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn tracker_at(store: Arc<LocalStore>, month: MonthKey) -> UsageTracker {
        UsageTracker::with_month_source(store, 15, Arc::new(move || month))
    }

    fn october() -> MonthKey {
        MonthKey::new(2026, 10).expect("valid month")
    }

    async fn seed(store: &LocalStore, month: &str, used: u32) {
        let mut items = StorageEntries::new();
        items.insert(USAGE_MONTH_KEY.to_string(), json!(month));
        items.insert(REWRITES_USED_KEY.to_string(), json!(used));
        store.set(items).await.expect("seed");
    }

    #[test]
    fn month_key_formats_and_parses() {
        let key: MonthKey = "2026-03".parse().expect("parse");
        assert_eq!(key, MonthKey::new(2026, 3).expect("valid"));
        assert_eq!(key.to_string(), "2026-03");
        assert!("2026-13".parse::<MonthKey>().is_err());
        assert!("2026-3".parse::<MonthKey>().is_err());
        assert!("march".parse::<MonthKey>().is_err());
    }

    #[test]
    fn month_key_rolls_over_year() {
        let december = MonthKey::new(2026, 12).expect("valid");
        assert_eq!(december.next().to_string(), "2027-01");
        assert_eq!(
            december.next().first_day(),
            NaiveDate::from_ymd_opt(2027, 1, 1)
        );
    }

    #[tokio::test]
    async fn first_check_initializes_month() {
        let store = Arc::new(LocalStore::in_memory());
        let tracker = tracker_at(Arc::clone(&store), october());

        assert!(tracker.check_quota().await.expect("check"));
        let usage = tracker.usage().await.expect("usage");
        assert_eq!(usage.month_key.as_deref(), Some("2026-10"));
        assert_eq!(usage.used, 0);
    }

    #[tokio::test]
    async fn quota_available_below_ceiling_only() {
        for used in 0..15 {
            let store = Arc::new(LocalStore::in_memory());
            seed(&store, "2026-10", used).await;
            let tracker = tracker_at(store, october());
            assert!(tracker.check_quota().await.expect("check"), "used = {used}");
        }

        for used in [15, 16, 40] {
            let store = Arc::new(LocalStore::in_memory());
            seed(&store, "2026-10", used).await;
            let tracker = tracker_at(store, october());
            assert!(!tracker.check_quota().await.expect("check"), "used = {used}");
        }
    }

    #[tokio::test]
    async fn exhausted_quota_resets_in_new_month() {
        let store = Arc::new(LocalStore::in_memory());
        let current = Arc::new(Mutex::new(october()));
        let source = Arc::clone(&current);
        let tracker = UsageTracker::with_month_source(
            Arc::clone(&store),
            15,
            Arc::new(move || *source.lock().expect("month lock")),
        );

        assert!(tracker.check_quota().await.expect("check"));
        for _ in 0..15 {
            tracker.consume().await.expect("consume");
        }
        assert!(!tracker.check_quota().await.expect("check"));

        *current.lock().expect("month lock") = october().next();
        assert!(tracker.check_quota().await.expect("check"));

        let usage = tracker.usage().await.expect("usage");
        assert_eq!(usage.month_key.as_deref(), Some("2026-11"));
        assert_eq!(usage.used, 0);
    }

    #[tokio::test]
    async fn consume_adds_exactly_n_with_interleaved_checks() {
        let store = Arc::new(LocalStore::in_memory());
        seed(&store, "2026-10", 2).await;
        let tracker = tracker_at(store, october());

        for _ in 0..7 {
            tracker.consume().await.expect("consume");
            tracker.check_quota().await.expect("check");
        }

        assert_eq!(tracker.usage().await.expect("usage").used, 9);
    }

    #[tokio::test]
    async fn consume_is_not_clamped_at_ceiling() {
        let store = Arc::new(LocalStore::in_memory());
        seed(&store, "2026-10", 15).await;
        let tracker = tracker_at(store, october());

        assert_eq!(tracker.consume().await.expect("consume"), 16);
    }

    #[tokio::test]
    async fn missing_or_malformed_count_reads_as_zero() {
        let store = Arc::new(LocalStore::in_memory());
        let mut items = StorageEntries::new();
        items.insert(USAGE_MONTH_KEY.to_string(), json!("2026-10"));
        items.insert(REWRITES_USED_KEY.to_string(), json!("many"));
        store.set(items).await.expect("seed");

        let tracker = tracker_at(store, october());
        assert_eq!(tracker.usage().await.expect("usage").used, 0);
        assert!(tracker.check_quota().await.expect("check"));
    }
}
