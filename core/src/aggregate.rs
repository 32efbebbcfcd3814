//! Turns history store rollups into display-ready summaries.
//!
//! Everything here is pure; no database or clock access.

use chrono::{Datelike, Duration, NaiveDate};

use crate::models::{
    AllTimeRollup, AllTimeStats, DailySummary, FoodCount, MacroAverages, MacroTotals,
    WeeklyRollup, WeeklyStats,
};

pub const TOP_FOODS_LIMIT: usize = 3;

/// Monday of the week containing `date`.
#[must_use]
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// Order foods by count descending, then by name ascending, keeping `limit`.
#[must_use]
pub fn rank_foods(mut counts: Vec<FoodCount>, limit: usize) -> Vec<FoodCount> {
    counts.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.food_name.cmp(&b.food_name))
    });
    counts.truncate(limit);
    counts
}

/// Sum divided by row count for every macro. `None` for an empty set.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn averages(totals: &MacroTotals) -> Option<MacroAverages> {
    if totals.count <= 0 {
        return None;
    }
    let n = totals.count as f64;
    Some(MacroAverages {
        calories: totals.calories / n,
        protein_g: totals.protein_g / n,
        carbs_g: totals.carbs_g / n,
        fats_g: totals.fats_g / n,
        fiber_g: totals.fiber_g / n,
    })
}

#[must_use]
pub fn daily_summary(date: NaiveDate, totals: &MacroTotals) -> Option<DailySummary> {
    if totals.count <= 0 {
        return None;
    }
    Some(DailySummary {
        date,
        meal_count: totals.count,
        total_calories: totals.calories,
        total_protein_g: totals.protein_g,
        total_carbs_g: totals.carbs_g,
        total_fats_g: totals.fats_g,
        total_fiber_g: totals.fiber_g,
    })
}

#[must_use]
pub fn weekly_stats(week_start: NaiveDate, rollup: WeeklyRollup) -> Option<WeeklyStats> {
    let averages = averages(&rollup.totals)?;
    let most_common_food = rank_foods(rollup.food_counts, 1)
        .into_iter()
        .next()
        .map(|f| f.food_name);
    Some(WeeklyStats {
        week_start,
        start_date: rollup.first_day,
        end_date: rollup.last_day,
        total_analyses: rollup.totals.count,
        averages,
        most_common_food,
    })
}

#[must_use]
pub fn all_time_stats(rollup: AllTimeRollup) -> Option<AllTimeStats> {
    let averages = averages(&rollup.totals)?;
    Some(AllTimeStats {
        total_analyses: rollup.totals.count,
        averages,
        days_tracked: rollup.days_tracked,
        first_analysis: rollup.first_day,
        top_foods: rank_foods(rollup.food_counts, TOP_FOODS_LIMIT),
    })
}
