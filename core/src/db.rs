use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SubsecRound, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::models::{
    AllTimeRollup, Confidence, FoodCount, MacroTotals, NutritionFacts, NutritionRecord,
    WeeklyRollup,
};

// Fixed-width UTC text sorts chronologically, so range scans can use the indexes.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";
const TIMESTAMP_PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const DATE_FORMAT: &str = "%Y-%m-%d";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const RECORD_COLUMNS: &str = "id, user_id, username, food_name, calories, protein_g, carbs_g, \
     fats_g, fiber_g, serving_size, confidence, analyzed_at, source_reference";

const TOTALS_COLUMNS: &str = "COUNT(*), COALESCE(SUM(calories), 0), COALESCE(SUM(protein_g), 0), \
     COALESCE(SUM(carbs_g), 0), COALESCE(SUM(fats_g), 0), COALESCE(SUM(fiber_g), 0)";

impl ToSql for Confidence {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Confidence {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// Append-only nutrition history backed by a single SQLite file.
///
/// Every operation opens its own connection and runs in its own transaction,
/// so clones can be used from any number of threads without extra locking.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let store = Self {
            path: path.to_path_buf(),
        };
        let conn = store.connect()?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        migrate(&conn)?;

        info!(path = %path.display(), journal_mode = %mode, "Opened nutrition history");
        Ok(store)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    // --- Writes ---

    /// Insert a new row and return its id. Identical records produce
    /// separate rows. `analyzed_at` defaults to the current time.
    pub fn append(&self, record: &NutritionRecord) -> Result<i64, StoreError> {
        let analyzed_at = record.analyzed_at.unwrap_or_else(Utc::now);
        self.insert(record, analyzed_at)
    }

    /// Like [`append`](Self::append), returning the record as stored
    /// (id set, timestamp at stored precision).
    pub fn append_record(&self, mut record: NutritionRecord) -> Result<NutritionRecord, StoreError> {
        let analyzed_at = record.analyzed_at.unwrap_or_else(Utc::now).trunc_subsecs(3);
        record.analyzed_at = Some(analyzed_at);
        record.id = Some(self.insert(&record, analyzed_at)?);
        Ok(record)
    }

    fn insert(
        &self,
        record: &NutritionRecord,
        analyzed_at: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let facts = &record.facts;
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO nutrition_history (
                user_id, username, food_name, calories, protein_g, carbs_g, fats_g, fiber_g,
                serving_size, confidence, analyzed_at, source_reference
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                record.user_id,
                record.username,
                facts.food_name,
                facts.calories,
                facts.protein_g,
                facts.carbs_g,
                facts.fats_g,
                facts.fiber_g,
                facts.serving_size,
                facts.confidence,
                format_timestamp(analyzed_at),
                record.source_reference,
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        debug!(
            id,
            user_id = record.user_id,
            food = %facts.food_name,
            "Appended nutrition record"
        );
        Ok(id)
    }

    // --- Raw reads ---

    pub fn get(&self, id: i64) -> Result<Option<NutritionRecord>, StoreError> {
        let conn = self.connect()?;
        let record = conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM nutrition_history WHERE id = ?1"),
                params![id],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Records analyzed at or after `since`, newest first.
    pub fn query_recent(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<NutritionRecord>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM nutrition_history
             WHERE user_id = ?1 AND analyzed_at >= ?2
             ORDER BY analyzed_at DESC, id DESC
             LIMIT ?3"
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let records = stmt
            .query_map(
                params![user_id, format_timestamp(since), limit],
                record_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn count_for_user(&self, user_id: i64) -> Result<i64, StoreError> {
        let conn = self.connect()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM nutrition_history WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // --- Aggregate reads ---

    /// Count and macro sums for one UTC calendar day. `None` when empty.
    pub fn query_daily_totals(
        &self,
        user_id: i64,
        date: NaiveDate,
    ) -> Result<Option<MacroTotals>, StoreError> {
        let conn = self.connect()?;
        let (start, end) = day_bounds(date, 1);
        let totals = range_totals(&conn, user_id, &start, &end)?;
        Ok((totals.count > 0).then_some(totals))
    }

    /// Rollup for the seven days starting at `week_start`.
    pub fn query_weekly(
        &self,
        user_id: i64,
        week_start: NaiveDate,
    ) -> Result<Option<WeeklyRollup>, StoreError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let (start, end) = day_bounds(week_start, 7);

        let totals = range_totals(&tx, user_id, &start, &end)?;
        if totals.count == 0 {
            return Ok(None);
        }

        let (first, last): (String, String) = tx.query_row(
            "SELECT MIN(analyzed_at), MAX(analyzed_at) FROM nutrition_history
             WHERE user_id = ?1 AND analyzed_at >= ?2 AND analyzed_at < ?3",
            params![user_id, start, end],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let mut stmt = tx.prepare(
            "SELECT food_name, COUNT(*) FROM nutrition_history
             WHERE user_id = ?1 AND analyzed_at >= ?2 AND analyzed_at < ?3
             GROUP BY food_name",
        )?;
        let food_counts = stmt
            .query_map(params![user_id, start, end], food_count_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);
        tx.commit()?;

        Ok(Some(WeeklyRollup {
            totals,
            first_day: parse_day(&first)?,
            last_day: parse_day(&last)?,
            food_counts,
        }))
    }

    /// Rollup over every record the user has. `None` when the user has none.
    pub fn query_all_time(&self, user_id: i64) -> Result<Option<AllTimeRollup>, StoreError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        let (totals, first, days_tracked): (MacroTotals, Option<String>, i64) = tx.query_row(
            &format!(
                "SELECT {TOTALS_COLUMNS}, MIN(analyzed_at), COUNT(DISTINCT substr(analyzed_at, 1, 10))
                 FROM nutrition_history WHERE user_id = ?1"
            ),
            params![user_id],
            |row| Ok((totals_from_row(row)?, row.get(6)?, row.get(7)?)),
        )?;
        let Some(first) = first.filter(|_| totals.count > 0) else {
            return Ok(None);
        };

        let mut stmt = tx.prepare(
            "SELECT food_name, COUNT(*) FROM nutrition_history
             WHERE user_id = ?1
             GROUP BY food_name",
        )?;
        let food_counts = stmt
            .query_map(params![user_id], food_count_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);
        tx.commit()?;

        Ok(Some(AllTimeRollup {
            totals,
            first_day: parse_day(&first)?,
            days_tracked,
            food_counts,
        }))
    }
}

fn migrate(conn: &Connection) -> Result<(), StoreError> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if version < 1 {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS nutrition_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                username TEXT NOT NULL DEFAULT 'unknown',
                food_name TEXT NOT NULL,
                calories REAL NOT NULL,
                protein_g REAL NOT NULL,
                carbs_g REAL NOT NULL,
                fats_g REAL NOT NULL,
                fiber_g REAL NOT NULL,
                serving_size TEXT NOT NULL,
                confidence TEXT NOT NULL CHECK (confidence IN ('high', 'medium', 'low')),
                analyzed_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
                source_reference TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_nutrition_user_id ON nutrition_history(user_id);
            CREATE INDEX IF NOT EXISTS idx_nutrition_analyzed_at ON nutrition_history(analyzed_at);
            CREATE INDEX IF NOT EXISTS idx_nutrition_user_date ON nutrition_history(user_id, analyzed_at);

            PRAGMA user_version = 1;",
        )?;
    }

    Ok(())
}

// --- Row mapping helpers ---

fn record_from_row(row: &rusqlite::Row) -> rusqlite::Result<NutritionRecord> {
    let analyzed_at: String = row.get(11)?;
    let analyzed_at = NaiveDateTime::parse_from_str(&analyzed_at, TIMESTAMP_PARSE_FORMAT)
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(11, rusqlite::types::Type::Text, Box::new(e))
        })?
        .and_utc();

    Ok(NutritionRecord {
        id: Some(row.get(0)?),
        user_id: row.get(1)?,
        username: row.get(2)?,
        facts: NutritionFacts {
            food_name: row.get(3)?,
            calories: row.get(4)?,
            protein_g: row.get(5)?,
            carbs_g: row.get(6)?,
            fats_g: row.get(7)?,
            fiber_g: row.get(8)?,
            serving_size: row.get(9)?,
            confidence: row.get(10)?,
        },
        analyzed_at: Some(analyzed_at),
        source_reference: row.get(12)?,
    })
}

// Expects TOTALS_COLUMNS at positions 0..=5.
fn totals_from_row(row: &rusqlite::Row) -> rusqlite::Result<MacroTotals> {
    Ok(MacroTotals {
        count: row.get(0)?,
        calories: row.get(1)?,
        protein_g: row.get(2)?,
        carbs_g: row.get(3)?,
        fats_g: row.get(4)?,
        fiber_g: row.get(5)?,
    })
}

fn food_count_from_row(row: &rusqlite::Row) -> rusqlite::Result<FoodCount> {
    Ok(FoodCount {
        food_name: row.get(0)?,
        count: row.get(1)?,
    })
}

fn range_totals(
    conn: &Connection,
    user_id: i64,
    start: &str,
    end: &str,
) -> Result<MacroTotals, StoreError> {
    let totals = conn.query_row(
        &format!(
            "SELECT {TOTALS_COLUMNS} FROM nutrition_history
             WHERE user_id = ?1 AND analyzed_at >= ?2 AND analyzed_at < ?3"
        ),
        params![user_id, start, end],
        totals_from_row,
    )?;
    Ok(totals)
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Half-open text bounds `[start, start + days)` comparable against `analyzed_at`.
fn day_bounds(start: NaiveDate, days: u64) -> (String, String) {
    let end = start
        .checked_add_days(chrono::Days::new(days))
        .unwrap_or(NaiveDate::MAX);
    (
        start.format(DATE_FORMAT).to_string(),
        end.format(DATE_FORMAT).to_string(),
    )
}

fn parse_day(timestamp: &str) -> Result<NaiveDate, StoreError> {
    let day = timestamp.get(..10).unwrap_or(timestamp);
    NaiveDate::parse_from_str(day, DATE_FORMAT).map_err(|e| {
        StoreError::Database(rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(e),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn create_test_store() -> (HistoryStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::open(&dir.path().join("nutrition.db")).unwrap();
        (store, dir)
    }

    fn facts(name: &str, calories: f64) -> NutritionFacts {
        NutritionFacts {
            food_name: name.to_string(),
            calories,
            protein_g: calories / 20.0,
            carbs_g: calories / 10.0,
            fats_g: calories / 40.0,
            fiber_g: 2.0,
            serving_size: "1 plate".to_string(),
            confidence: Confidence::Medium,
        }
    }

    fn record_at(user_id: i64, name: &str, calories: f64, at: DateTime<Utc>) -> NutritionRecord {
        let mut record = NutritionRecord::new(user_id, Some("alice"), facts(name, calories), None);
        record.analyzed_at = Some(at);
        record
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_open_creates_parent_dir() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("data").join("nutrition.db");
        let store = HistoryStore::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(store.path(), path.as_path());
    }

    #[test]
    fn test_reopen_keeps_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nutrition.db");
        {
            let store = HistoryStore::open(&path).unwrap();
            store
                .append(&record_at(1, "Oatmeal", 300.0, utc(2024, 6, 15, 8, 0)))
                .unwrap();
        }
        let store = HistoryStore::open(&path).unwrap();
        assert_eq!(store.count_for_user(1).unwrap(), 1);
    }

    #[test]
    fn test_append_and_get() {
        let (store, _dir) = create_test_store();
        let mut record = record_at(1, "Pad Thai", 650.0, utc(2024, 6, 15, 12, 30));
        record.source_reference = Some("AgACAgIAAxkBAAI".to_string());

        let id = store.append(&record).unwrap();
        assert!(id > 0);

        let fetched = store.get(id).unwrap().unwrap();
        assert_eq!(fetched.id, Some(id));
        assert_eq!(fetched.user_id, 1);
        assert_eq!(fetched.username, "alice");
        assert_eq!(fetched.facts, record.facts);
        assert_eq!(fetched.analyzed_at, record.analyzed_at);
        assert_eq!(fetched.source_reference.as_deref(), Some("AgACAgIAAxkBAAI"));
    }

    #[test]
    fn test_get_missing() {
        let (store, _dir) = create_test_store();
        assert!(store.get(42).unwrap().is_none());
    }

    #[test]
    fn test_append_assigns_timestamp() {
        let (store, _dir) = create_test_store();
        let before = Utc::now() - chrono::Duration::seconds(1);
        let record = NutritionRecord::new(1, None, facts("Toast", 120.0), None);
        let id = store.append(&record).unwrap();

        let fetched = store.get(id).unwrap().unwrap();
        let at = fetched.analyzed_at.unwrap();
        assert!(at >= before);
        assert!(at <= Utc::now() + chrono::Duration::seconds(1));
        assert_eq!(fetched.username, "unknown");
    }

    #[test]
    fn test_append_record_returns_stored() {
        let (store, _dir) = create_test_store();
        let record = NutritionRecord::new(1, Some("bob"), facts("Soup", 180.0), None);
        let stored = store.append_record(record).unwrap();
        assert!(stored.id.is_some());
        assert!(stored.analyzed_at.is_some());
        let fetched = store.get(stored.id.unwrap()).unwrap().unwrap();
        assert_eq!(fetched, stored);
    }

    #[test]
    fn test_append_is_not_idempotent() {
        let (store, _dir) = create_test_store();
        let record = record_at(1, "Apple", 95.0, utc(2024, 6, 15, 9, 0));
        let id1 = store.append(&record).unwrap();
        let id2 = store.append(&record).unwrap();
        assert_ne!(id1, id2);
        assert_eq!(store.count_for_user(1).unwrap(), 2);
    }

    #[test]
    fn test_query_recent_order_and_limit() {
        let (store, _dir) = create_test_store();
        store.append(&record_at(1, "Breakfast", 300.0, utc(2024, 6, 15, 8, 0))).unwrap();
        store.append(&record_at(1, "Lunch", 600.0, utc(2024, 6, 15, 12, 0))).unwrap();
        store.append(&record_at(1, "Dinner", 700.0, utc(2024, 6, 15, 19, 0))).unwrap();
        store.append(&record_at(2, "Other user", 100.0, utc(2024, 6, 15, 13, 0))).unwrap();

        let recent = store.query_recent(1, utc(2024, 6, 15, 0, 0), 20).unwrap();
        let names: Vec<&str> = recent.iter().map(|r| r.facts.food_name.as_str()).collect();
        assert_eq!(names, vec!["Dinner", "Lunch", "Breakfast"]);

        let limited = store.query_recent(1, utc(2024, 6, 15, 0, 0), 2).unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].facts.food_name, "Dinner");
    }

    #[test]
    fn test_query_recent_respects_since() {
        let (store, _dir) = create_test_store();
        let now = Utc::now();
        store
            .append(&record_at(1, "Old", 100.0, now - chrono::Duration::hours(25)))
            .unwrap();
        store
            .append(&record_at(1, "New", 200.0, now - chrono::Duration::hours(2)))
            .unwrap();

        let recent = store
            .query_recent(1, now - chrono::Duration::days(1), 20)
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].facts.food_name, "New");
    }

    #[test]
    fn test_query_recent_same_timestamp_newest_id_first() {
        let (store, _dir) = create_test_store();
        let at = utc(2024, 6, 15, 8, 0);
        let first = store.append(&record_at(1, "A", 1.0, at)).unwrap();
        let second = store.append(&record_at(1, "B", 1.0, at)).unwrap();
        let recent = store.query_recent(1, at, 10).unwrap();
        assert_eq!(recent[0].id, Some(second));
        assert_eq!(recent[1].id, Some(first));
    }

    #[test]
    fn test_daily_totals_sum() {
        let (store, _dir) = create_test_store();
        store.append(&record_at(1, "Eggs", 200.0, utc(2024, 6, 15, 8, 0))).unwrap();
        store.append(&record_at(1, "Wrap", 300.0, utc(2024, 6, 15, 13, 0))).unwrap();
        store.append(&record_at(1, "Steak", 500.0, utc(2024, 6, 15, 23, 59))).unwrap();
        // Neighbouring days and other users are excluded
        store.append(&record_at(1, "Late", 900.0, utc(2024, 6, 16, 0, 0))).unwrap();
        store.append(&record_at(1, "Early", 900.0, utc(2024, 6, 14, 23, 59))).unwrap();
        store.append(&record_at(2, "Other", 900.0, utc(2024, 6, 15, 12, 0))).unwrap();

        let totals = store.query_daily_totals(1, date(2024, 6, 15)).unwrap().unwrap();
        assert_eq!(totals.count, 3);
        assert!((totals.calories - 1000.0).abs() < 1e-9);
        assert!((totals.protein_g - 50.0).abs() < 1e-9);
        assert!((totals.carbs_g - 100.0).abs() < 1e-9);
        assert!((totals.fats_g - 25.0).abs() < 1e-9);
        assert!((totals.fiber_g - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_daily_totals_empty() {
        let (store, _dir) = create_test_store();
        store.append(&record_at(1, "Eggs", 200.0, utc(2024, 6, 15, 8, 0))).unwrap();
        assert!(store.query_daily_totals(1, date(2024, 6, 16)).unwrap().is_none());
        assert!(store.query_daily_totals(2, date(2024, 6, 15)).unwrap().is_none());
    }

    #[test]
    fn test_query_weekly_rollup() {
        let (store, _dir) = create_test_store();
        // Week of Monday 2024-06-10
        store.append(&record_at(1, "Apple", 100.0, utc(2024, 6, 11, 9, 0))).unwrap();
        store.append(&record_at(1, "Apple", 100.0, utc(2024, 6, 11, 15, 0))).unwrap();
        store.append(&record_at(1, "Banana", 100.0, utc(2024, 6, 13, 9, 0))).unwrap();
        store.append(&record_at(1, "Apple", 500.0, utc(2024, 6, 16, 23, 0))).unwrap();
        // Outside the week
        store.append(&record_at(1, "Cake", 900.0, utc(2024, 6, 9, 23, 0))).unwrap();
        store.append(&record_at(1, "Cake", 900.0, utc(2024, 6, 17, 0, 0))).unwrap();

        let rollup = store.query_weekly(1, date(2024, 6, 10)).unwrap().unwrap();
        assert_eq!(rollup.totals.count, 4);
        assert!((rollup.totals.calories - 800.0).abs() < 1e-9);
        assert_eq!(rollup.first_day, date(2024, 6, 11));
        assert_eq!(rollup.last_day, date(2024, 6, 16));

        let mut counts = rollup.food_counts.clone();
        counts.sort_by(|a, b| a.food_name.cmp(&b.food_name));
        assert_eq!(
            counts,
            vec![
                FoodCount { food_name: "Apple".into(), count: 3 },
                FoodCount { food_name: "Banana".into(), count: 1 },
            ]
        );
    }

    #[test]
    fn test_query_weekly_empty() {
        let (store, _dir) = create_test_store();
        store.append(&record_at(1, "Apple", 100.0, utc(2024, 6, 3, 9, 0))).unwrap();
        assert!(store.query_weekly(1, date(2024, 6, 10)).unwrap().is_none());
    }

    #[test]
    fn test_query_all_time_rollup() {
        let (store, _dir) = create_test_store();
        store.append(&record_at(1, "Rice", 200.0, utc(2024, 1, 2, 12, 0))).unwrap();
        store.append(&record_at(1, "Rice", 200.0, utc(2024, 1, 2, 19, 0))).unwrap();
        store.append(&record_at(1, "Eggs", 150.0, utc(2024, 3, 5, 8, 0))).unwrap();
        store.append(&record_at(1, "Soup", 250.0, utc(2024, 6, 15, 12, 0))).unwrap();
        store.append(&record_at(2, "Other", 999.0, utc(2023, 1, 1, 12, 0))).unwrap();

        let rollup = store.query_all_time(1).unwrap().unwrap();
        assert_eq!(rollup.totals.count, 4);
        assert!((rollup.totals.calories - 800.0).abs() < 1e-9);
        assert_eq!(rollup.first_day, date(2024, 1, 2));
        assert_eq!(rollup.days_tracked, 3);
        assert_eq!(rollup.food_counts.len(), 3);
    }

    #[test]
    fn test_query_all_time_empty() {
        let (store, _dir) = create_test_store();
        assert!(store.query_all_time(1).unwrap().is_none());
    }

    #[test]
    fn test_concurrent_appends_from_threads() {
        let (store, _dir) = create_test_store();
        let handles: Vec<_> = (0..4)
            .map(|user_id| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..10 {
                        let at = utc(2024, 6, 15, 8, i);
                        store.append(&record_at(user_id, "Snack", 50.0, at)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        for user_id in 0..4 {
            assert_eq!(store.count_for_user(user_id).unwrap(), 10);
        }
    }

    #[test]
    fn test_confidence_check_constraint() {
        let (store, _dir) = create_test_store();
        let conn = store.connect().unwrap();
        let result = conn.execute(
            "INSERT INTO nutrition_history (user_id, food_name, calories, protein_g, carbs_g,
                 fats_g, fiber_g, serving_size, confidence)
             VALUES (1, 'x', 1, 1, 1, 1, 1, '1', 'certain')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_default_timestamp_is_readable() {
        let (store, _dir) = create_test_store();
        let conn = store.connect().unwrap();
        conn.execute(
            "INSERT INTO nutrition_history (user_id, food_name, calories, protein_g, carbs_g,
                 fats_g, fiber_g, serving_size, confidence)
             VALUES (1, 'Bagel', 250, 9, 48, 2, 2, '1 bagel', 'low')",
            [],
        )
        .unwrap();
        let id = conn.last_insert_rowid();
        let record = store.get(id).unwrap().unwrap();
        assert!(record.analyzed_at.is_some());
        assert_eq!(record.facts.confidence, Confidence::Low);
    }

    #[test]
    fn test_day_bounds() {
        assert_eq!(
            day_bounds(date(2024, 2, 28), 2),
            ("2024-02-28".to_string(), "2024-03-01".to_string())
        );
        assert_eq!(
            day_bounds(date(2024, 12, 30), 7),
            ("2024-12-30".to_string(), "2025-01-06".to_string())
        );
    }
}
