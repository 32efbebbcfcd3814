use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use serde::Serialize;

use smartmacro_core::models::NutritionRecord;

/// Dates are UTC calendar days, matching how the history store buckets rows.
pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    let today = Utc::now().date_naive();
    match date_str {
        None => Ok(today),
        Some(s) => match s.as_str() {
            "today" => Ok(today),
            "yesterday" => Ok(today - chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .with_context(|| format!("Invalid date '{s}'. Use YYYY-MM-DD, today or yesterday")),
        },
    }
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

/// Multi-line plain-text rendering of one analysis.
pub(crate) fn format_record(record: &NutritionRecord) -> String {
    let f = &record.facts;
    let mut out = format!(
        "{} ({})\n  Calories: {:.0} kcal\n  Protein:  {:.1} g\n  Carbs:    {:.1} g\n  Fats:     {:.1} g\n  Fiber:    {:.1} g\n  Confidence: {}",
        f.food_name,
        f.serving_size,
        no_neg_zero(f.calories),
        no_neg_zero(f.protein_g),
        no_neg_zero(f.carbs_g),
        no_neg_zero(f.fats_g),
        no_neg_zero(f.fiber_g),
        f.confidence,
    );
    if let Some(id) = record.id {
        out.push_str(&format!("\n  Saved as #{id}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use smartmacro_core::models::{Confidence, NutritionFacts};

    #[test]
    fn test_parse_date_none() {
        assert_eq!(parse_date(None).unwrap(), Utc::now().date_naive());
    }

    #[test]
    fn test_parse_date_keywords() {
        let today = Utc::now().date_naive();
        assert_eq!(parse_date(Some("today".to_string())).unwrap(), today);
        assert_eq!(
            parse_date(Some("yesterday".to_string())).unwrap(),
            today - chrono::Duration::days(1)
        );
    }

    #[test]
    fn test_parse_date_iso() {
        let date = parse_date(Some("2024-01-15".to_string())).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    }

    #[test]
    fn test_parse_date_invalid() {
        assert!(parse_date(Some("nope".to_string())).is_err());
        assert!(parse_date(Some("tomorrow".to_string())).is_err());
    }

    #[test]
    fn test_json_error_escapes() {
        let json = json_error("bad \"input\"");
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["error"], "bad \"input\"");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world this is long", 10), "hello w...");
        assert_eq!(truncate("Crème fraîche", 10), "Crème f...");
    }

    #[test]
    fn test_no_neg_zero() {
        assert_eq!(no_neg_zero(-0.0).to_bits(), 0.0_f64.to_bits());
        assert_eq!(no_neg_zero(5.0), 5.0);
    }

    #[test]
    fn test_format_record() {
        let facts = NutritionFacts {
            food_name: "Pho".to_string(),
            calories: 480.0,
            protein_g: 28.0,
            carbs_g: 60.5,
            fats_g: 9.0,
            fiber_g: 2.0,
            serving_size: "1 large bowl".to_string(),
            confidence: Confidence::High,
        };
        let mut record = NutritionRecord::new(1, None, facts, None);
        let text = format_record(&record);
        assert!(text.starts_with("Pho (1 large bowl)"));
        assert!(text.contains("Calories: 480 kcal"));
        assert!(text.contains("Carbs:    60.5 g"));
        assert!(!text.contains("Saved"));

        record.id = Some(12);
        assert!(format_record(&record).ends_with("Saved as #12"));
    }
}
