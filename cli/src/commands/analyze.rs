use std::path::Path;
use std::process;

use anyhow::{Context, Result, bail};
use serde::Serialize;

use smartmacro_core::error::{AnalysisError, ErrorKind};
use smartmacro_core::service::NutritionService;

use super::helpers::format_record;

#[derive(Serialize)]
struct AnalysisErrorBody<'a> {
    error: &'a str,
    kind: ErrorKind,
}

pub(crate) async fn cmd_analyze(
    service: &NutritionService,
    image: &Path,
    user_id: i64,
    username: Option<&str>,
    source: Option<String>,
    json: bool,
) -> Result<()> {
    let bytes = std::fs::read(image)
        .with_context(|| format!("Failed to read image: {}", image.display()))?;
    if bytes.is_empty() {
        bail!("Image file is empty: {}", image.display());
    }

    let source = source.or_else(|| Some(image.display().to_string()));

    match service.analyze(&bytes, user_id, username, source).await {
        Ok(outcome) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{}", format_record(&outcome.record));
            }
            if let Some(err) = &outcome.store_error {
                eprintln!("Warning: analysis was not saved to history: {err}");
            }
            Ok(())
        }
        Err(err) => {
            report_analysis_error(&err, json)?;
            // NotFood exits like "no data"
            let code = if err.kind() == ErrorKind::NotFood { 2 } else { 1 };
            process::exit(code);
        }
    }
}

fn report_analysis_error(err: &AnalysisError, json: bool) -> Result<()> {
    if json {
        let body = AnalysisErrorBody {
            error: err.message(),
            kind: err.kind(),
        };
        println!("{}", serde_json::to_string(&body)?);
    } else {
        eprintln!("{err}");
    }
    Ok(())
}
