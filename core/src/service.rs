use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::aggregate;
use crate::db::HistoryStore;
use crate::error::AnalysisError;
use crate::models::{AllTimeStats, DailySummary, NutritionRecord, WeeklyStats};
use crate::vision::FoodImageAnalyzer;

/// Most records returned by a history query.
pub const HISTORY_LIMIT: usize = 20;
pub const DEFAULT_HISTORY_DAYS: i64 = 1;
pub const MAX_HISTORY_DAYS: i64 = 30;

/// A successful analysis. `store_error` is set when the record could not be
/// persisted; the nutrition result is still valid in that case.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisOutcome {
    pub record: NutritionRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_error: Option<String>,
}

impl AnalysisOutcome {
    #[must_use]
    pub fn is_stored(&self) -> bool {
        self.record.id.is_some() && self.store_error.is_none()
    }
}

/// Read-side queries over the history store.
///
/// Store failures are logged and reported as "no data", never propagated.
#[derive(Debug, Clone)]
pub struct Reports {
    store: HistoryStore,
}

impl Reports {
    #[must_use]
    pub fn new(store: HistoryStore) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    /// Newest-first records from the last `days` days (clamped to 1..=30),
    /// at most [`HISTORY_LIMIT`].
    #[must_use]
    pub fn history(&self, user_id: i64, days: i64) -> Vec<NutritionRecord> {
        self.history_at(user_id, days, Utc::now())
    }

    #[must_use]
    pub fn history_at(&self, user_id: i64, days: i64, now: DateTime<Utc>) -> Vec<NutritionRecord> {
        let since = now - Duration::days(clamp_days(days));
        self.store
            .query_recent(user_id, since, HISTORY_LIMIT)
            .unwrap_or_else(|e| {
                error!(user_id, error = %e, "History query failed");
                Vec::new()
            })
    }

    #[must_use]
    pub fn daily_summary(&self, user_id: i64, date: NaiveDate) -> Option<DailySummary> {
        match self.store.query_daily_totals(user_id, date) {
            Ok(totals) => totals.and_then(|t| aggregate::daily_summary(date, &t)),
            Err(e) => {
                error!(user_id, %date, error = %e, "Daily totals query failed");
                None
            }
        }
    }

    /// Stats for the current UTC Monday-based week.
    #[must_use]
    pub fn weekly_stats(&self, user_id: i64) -> Option<WeeklyStats> {
        self.weekly_stats_for(user_id, Utc::now().date_naive())
    }

    /// Stats for the Monday-based week containing `date`.
    #[must_use]
    pub fn weekly_stats_for(&self, user_id: i64, date: NaiveDate) -> Option<WeeklyStats> {
        let start = aggregate::week_start(date);
        match self.store.query_weekly(user_id, start) {
            Ok(rollup) => rollup.and_then(|r| aggregate::weekly_stats(start, r)),
            Err(e) => {
                error!(user_id, week_start = %start, error = %e, "Weekly query failed");
                None
            }
        }
    }

    #[must_use]
    pub fn all_time_stats(&self, user_id: i64) -> Option<AllTimeStats> {
        match self.store.query_all_time(user_id) {
            Ok(rollup) => rollup.and_then(aggregate::all_time_stats),
            Err(e) => {
                error!(user_id, error = %e, "All-time query failed");
                None
            }
        }
    }
}

/// Analyzer plus history store: the entry point for frontends.
#[derive(Clone)]
pub struct NutritionService {
    analyzer: Arc<dyn FoodImageAnalyzer>,
    reports: Reports,
}

impl NutritionService {
    #[must_use]
    pub fn new(analyzer: Arc<dyn FoodImageAnalyzer>, store: HistoryStore) -> Self {
        Self {
            analyzer,
            reports: Reports::new(store),
        }
    }

    #[must_use]
    pub fn reports(&self) -> &Reports {
        &self.reports
    }

    /// Analyze one photo and append the result to the user's history.
    ///
    /// Analyzer failures are returned as-is. The store is only written after
    /// a fully validated result, and a failed write is reported inside the
    /// outcome instead of discarding the analysis.
    pub async fn analyze(
        &self,
        image: &[u8],
        user_id: i64,
        username: Option<&str>,
        source_reference: Option<String>,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let facts = self.analyzer.analyze(image).await?;

        let mut record = NutritionRecord::new(user_id, username, facts, source_reference);
        record.analyzed_at = Some(Utc::now());

        match self.reports.store.append_record(record.clone()) {
            Ok(stored) => {
                info!(
                    user_id,
                    id = stored.id,
                    food = %stored.facts.food_name,
                    "Saved analysis"
                );
                Ok(AnalysisOutcome {
                    record: stored,
                    store_error: None,
                })
            }
            Err(e) => {
                error!(user_id, error = %e, "Failed to save analysis");
                Ok(AnalysisOutcome {
                    record,
                    store_error: Some(e.to_string()),
                })
            }
        }
    }

    #[must_use]
    pub fn history(&self, user_id: i64, days: i64) -> Vec<NutritionRecord> {
        self.reports.history(user_id, days)
    }

    #[must_use]
    pub fn daily_summary(&self, user_id: i64, date: NaiveDate) -> Option<DailySummary> {
        self.reports.daily_summary(user_id, date)
    }

    #[must_use]
    pub fn weekly_stats(&self, user_id: i64) -> Option<WeeklyStats> {
        self.reports.weekly_stats(user_id)
    }

    #[must_use]
    pub fn all_time_stats(&self, user_id: i64) -> Option<AllTimeStats> {
        self.reports.all_time_stats(user_id)
    }
}

#[must_use]
pub fn clamp_days(days: i64) -> i64 {
    if !(1..=MAX_HISTORY_DAYS).contains(&days) {
        warn!(days, "History window out of range, clamping");
    }
    days.clamp(1, MAX_HISTORY_DAYS)
}
