use anyhow::Result;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use smartmacro_core::models::{AllTimeStats, DailySummary, NutritionRecord, WeeklyStats};
use smartmacro_core::service::{Reports, clamp_days};

use super::helpers::{json_error, no_neg_zero, parse_date, truncate};

pub(crate) fn cmd_history(reports: &Reports, user_id: i64, days: i64, json: bool) -> Result<()> {
    let days = clamp_days(days);
    let records = reports.history(user_id, days);

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        eprintln!("No meals analyzed in the last {days} day(s)");
        process::exit(2);
    }

    let period = if days == 1 {
        "Last 24 hours".to_string()
    } else {
        format!("Last {days} days")
    };
    println!("=== {period} ===\n");
    println!("{}", history_table(&records));

    Ok(())
}

fn history_table(records: &[NutritionRecord]) -> String {
    #[derive(Tabled)]
    struct HistoryRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "When (UTC)")]
        when: String,
        #[tabled(rename = "Food")]
        food: String,
        #[tabled(rename = "Serving")]
        serving: String,
        #[tabled(rename = "Calories")]
        calories: String,
        #[tabled(rename = "Protein")]
        protein: String,
        #[tabled(rename = "Carbs")]
        carbs: String,
        #[tabled(rename = "Fats")]
        fats: String,
    }

    let rows: Vec<HistoryRow> = records
        .iter()
        .map(|r| {
            let f = &r.facts;
            HistoryRow {
                id: r.id.map_or_else(|| "-".to_string(), |id| id.to_string()),
                when: r
                    .analyzed_at
                    .map_or_else(|| "unknown".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string()),
                food: truncate(&f.food_name, 30),
                serving: truncate(&f.serving_size, 20),
                calories: format!("{:.0}", no_neg_zero(f.calories)),
                protein: format!("{:.1}g", no_neg_zero(f.protein_g)),
                carbs: format!("{:.1}g", no_neg_zero(f.carbs_g)),
                fats: format!("{:.1}g", no_neg_zero(f.fats_g)),
            }
        })
        .collect();

    Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(4..)).with(Alignment::right()))
        .to_string()
}

pub(crate) fn cmd_today(
    reports: &Reports,
    user_id: i64,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;

    let Some(summary) = reports.daily_summary(user_id, date) else {
        if json {
            println!("{}", json_error(&format!("No meals analyzed on {date}")));
        } else {
            eprintln!("No meals analyzed on {date}");
        }
        process::exit(2);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", format_daily(&summary));
    }
    Ok(())
}

fn format_daily(s: &DailySummary) -> String {
    format!(
        "=== {} ===\n\n  Meals:    {}\n  Calories: {:.0} kcal\n  Protein:  {:.1} g\n  Carbs:    {:.1} g\n  Fats:     {:.1} g\n  Fiber:    {:.1} g",
        s.date,
        s.meal_count,
        no_neg_zero(s.total_calories),
        no_neg_zero(s.total_protein_g),
        no_neg_zero(s.total_carbs_g),
        no_neg_zero(s.total_fats_g),
        no_neg_zero(s.total_fiber_g),
    )
}

pub(crate) fn cmd_week(reports: &Reports, user_id: i64, json: bool) -> Result<()> {
    let Some(stats) = reports.weekly_stats(user_id) else {
        if json {
            println!("{}", json_error("No meals analyzed this week"));
        } else {
            eprintln!("No meals analyzed this week");
        }
        process::exit(2);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("{}", format_weekly(&stats));
    }
    Ok(())
}

fn format_weekly(s: &WeeklyStats) -> String {
    let avg = &s.averages;
    let mut out = format!(
        "=== Week of {} ===\n\n  Analyses: {} ({} to {})\n\n  Average per meal:\n    Calories: {:.0} kcal\n    Protein:  {:.1} g\n    Carbs:    {:.1} g\n    Fats:     {:.1} g\n    Fiber:    {:.1} g",
        s.week_start,
        s.total_analyses,
        s.start_date,
        s.end_date,
        no_neg_zero(avg.calories),
        no_neg_zero(avg.protein_g),
        no_neg_zero(avg.carbs_g),
        no_neg_zero(avg.fats_g),
        no_neg_zero(avg.fiber_g),
    );
    if let Some(food) = &s.most_common_food {
        out.push_str("\n\n  Most common: ");
        out.push_str(food);
    }
    out
}

pub(crate) fn cmd_stats(reports: &Reports, user_id: i64, json: bool) -> Result<()> {
    let Some(stats) = reports.all_time_stats(user_id) else {
        if json {
            println!("{}", json_error("No meals analyzed yet"));
        } else {
            eprintln!("No meals analyzed yet");
        }
        process::exit(2);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("{}", format_all_time(&stats));
    }
    Ok(())
}

fn format_all_time(s: &AllTimeStats) -> String {
    let avg = &s.averages;
    let mut out = format!(
        "=== All time ===\n\n  Analyses:     {}\n  Days tracked: {}\n  Since:        {}\n\n  Average per meal:\n    Calories: {:.0} kcal\n    Protein:  {:.1} g\n    Carbs:    {:.1} g\n    Fats:     {:.1} g\n    Fiber:    {:.1} g",
        s.total_analyses,
        s.days_tracked,
        s.first_analysis,
        no_neg_zero(avg.calories),
        no_neg_zero(avg.protein_g),
        no_neg_zero(avg.carbs_g),
        no_neg_zero(avg.fats_g),
        no_neg_zero(avg.fiber_g),
    );
    if !s.top_foods.is_empty() {
        out.push_str("\n\n  Top foods:");
        for (i, food) in s.top_foods.iter().enumerate() {
            out.push_str(&format!("\n    {}. {} ({}x)", i + 1, food.food_name, food.count));
        }
    }
    out
}
