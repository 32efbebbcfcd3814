use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::AnalysisError;

pub const UNKNOWN_USERNAME: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid confidence level '{0}': expected high, medium or low")]
pub struct ParseConfidenceError(pub String);

impl FromStr for Confidence {
    type Err = ParseConfidenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            _ => Err(ParseConfidenceError(s.to_string())),
        }
    }
}

/// The eight fields the vision model estimates for one photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionFacts {
    pub food_name: String,
    pub calories: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fats_g: f64,
    pub fiber_g: f64,
    pub serving_size: String,
    pub confidence: Confidence,
}

/// One analyzed photo as kept in the history store.
///
/// `id` and `analyzed_at` are `None` until the record has been appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub user_id: i64,
    pub username: String,
    #[serde(flatten)]
    pub facts: NutritionFacts,
    pub analyzed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_reference: Option<String>,
}

impl NutritionRecord {
    /// A blank or missing username is stored as [`UNKNOWN_USERNAME`].
    #[must_use]
    pub fn new(
        user_id: i64,
        username: Option<&str>,
        facts: NutritionFacts,
        source_reference: Option<String>,
    ) -> Self {
        let username = username
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(UNKNOWN_USERNAME)
            .to_string();
        Self {
            id: None,
            user_id,
            username,
            facts,
            analyzed_at: None,
            source_reference,
        }
    }
}

// --- Aggregates ---

/// Row count and per-macro sums over a set of history rows.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MacroTotals {
    pub count: i64,
    pub calories: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fats_g: f64,
    pub fiber_g: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MacroAverages {
    pub calories: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fats_g: f64,
    pub fiber_g: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FoodCount {
    pub food_name: String,
    pub count: i64,
}

/// Raw weekly query result, before ranking and averaging.
#[derive(Debug, Clone, PartialEq)]
pub struct WeeklyRollup {
    pub totals: MacroTotals,
    pub first_day: NaiveDate,
    pub last_day: NaiveDate,
    pub food_counts: Vec<FoodCount>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AllTimeRollup {
    pub totals: MacroTotals,
    pub first_day: NaiveDate,
    pub days_tracked: i64,
    pub food_counts: Vec<FoodCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub meal_count: i64,
    pub total_calories: f64,
    pub total_protein_g: f64,
    pub total_carbs_g: f64,
    pub total_fats_g: f64,
    pub total_fiber_g: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyStats {
    pub week_start: NaiveDate,
    /// First and last dates that actually have records.
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_analyses: i64,
    /// Mean per analysis, not per day.
    pub averages: MacroAverages,
    pub most_common_food: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllTimeStats {
    pub total_analyses: i64,
    pub averages: MacroAverages,
    pub days_tracked: i64,
    pub first_analysis: NaiveDate,
    pub top_foods: Vec<FoodCount>,
}

// --- Validation ---

/// Validate a decoded model response field by field.
///
/// Fields outside the nutrition schema are ignored.
pub fn validate_nutrition(object: &Map<String, Value>) -> Result<NutritionFacts, AnalysisError> {
    let food_name = required_text(object, "food_name")?;
    let calories = required_amount(object, "calories")?;
    let protein_g = required_amount(object, "protein_g")?;
    let carbs_g = required_amount(object, "carbs_g")?;
    let fats_g = required_amount(object, "fats_g")?;
    let fiber_g = required_amount(object, "fiber_g")?;
    let serving_size = required_text(object, "serving_size")?;
    let confidence = required_text(object, "confidence")?
        .parse::<Confidence>()
        .map_err(|e| AnalysisError::SchemaViolation(e.to_string()))?;

    Ok(NutritionFacts {
        food_name,
        calories,
        protein_g,
        carbs_g,
        fats_g,
        fiber_g,
        serving_size,
        confidence,
    })
}

fn required_text(object: &Map<String, Value>, field: &str) -> Result<String, AnalysisError> {
    match object.get(field) {
        None | Some(Value::Null) => Err(AnalysisError::SchemaViolation(format!(
            "missing field '{field}'"
        ))),
        Some(Value::String(s)) if s.trim().is_empty() => Err(AnalysisError::SchemaViolation(
            format!("'{field}' must not be empty"),
        )),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(AnalysisError::SchemaViolation(format!(
            "'{field}' must be a string, got {}",
            json_type_name(other)
        ))),
    }
}

fn required_amount(object: &Map<String, Value>, field: &str) -> Result<f64, AnalysisError> {
    let value = match object.get(field) {
        None | Some(Value::Null) => {
            return Err(AnalysisError::SchemaViolation(format!(
                "missing field '{field}'"
            )));
        }
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| {
            AnalysisError::SchemaViolation(format!("'{field}' is not a representable number"))
        })?,
        Some(other) => {
            return Err(AnalysisError::SchemaViolation(format!(
                "'{field}' must be a number, got {}",
                json_type_name(other)
            )));
        }
    };
    if !value.is_finite() || value < 0.0 {
        return Err(AnalysisError::SchemaViolation(format!(
            "'{field}' must be a non-negative number (got {value})"
        )));
    }
    Ok(value)
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
