//! Sub-GHz Analyzer - RAW capture decoding and rolling-code classification
//!
//! Analyzes every capture given on the command line and, for exactly two
//! captures, estimates whether they came from the same transmitter.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use subghz_analyzer::{
    compare, Analysis, Analyzer, BatchRunner, Classifier, ComparisonResult, Config, FileReport,
    OutputFormat,
};

#[derive(Serialize)]
struct FileEntry<'a> {
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    analysis: Option<&'a Analysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct Report<'a> {
    generated_at: String,
    files: Vec<FileEntry<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    comparison: Option<ComparisonResult>,
}

fn comparison(reports: &[FileReport]) -> Option<ComparisonResult> {
    match reports {
        [a, b] => match (&a.outcome, &b.outcome) {
            (Ok(a), Ok(b)) => Some(compare(a, b)),
            _ => None,
        },
        _ => None,
    }
}

fn print_text(reports: &[FileReport], comparison: Option<&ComparisonResult>) {
    for report in reports {
        println!("== {}", report.path.display());
        match &report.outcome {
            Ok(analysis) => println!("{}", analysis),
            Err(e) => println!("error: {}\n", e),
        }
    }
    if let Some(result) = comparison {
        println!("== comparison");
        print!("{}", result);
    }
}

fn print_json(reports: &[FileReport], comparison: Option<ComparisonResult>) -> Result<()> {
    let report = Report {
        generated_at: chrono::Utc::now().to_rfc3339(),
        files: reports
            .iter()
            .map(|r| FileEntry {
                path: r.path.display().to_string(),
                analysis: r.outcome.as_ref().ok(),
                error: r.outcome.as_ref().err().map(|e| e.to_string()),
            })
            .collect(),
        comparison,
    };
    let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
    println!("{}", json);
    Ok(())
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("SUBGHZ_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let paths: Vec<PathBuf> = std::env::args_os().skip(1).map(PathBuf::from).collect();
    if paths.is_empty() {
        bail!("usage: subghz-analyzer FILE...");
    }

    info!("===========================================");
    info!("   Sub-GHz Analyzer");
    info!("   OOK / PWM / Manchester decoder");
    info!("===========================================");

    let config = Config::from_env();

    info!("Configuration:");
    info!("  Workers: {}", config.workers);
    match config.encoding {
        Some(encoding) => info!("  Encoding: {} (forced)", encoding),
        None => info!("  Encoding: auto"),
    }
    info!(
        "  Bit-length bands: fixed below {}, rolling above {}",
        config.fixed_below_bits, config.rolling_above_bits
    );
    info!("  Decision threshold: {}", config.decision_threshold);
    info!("  Output: {:?}", config.output);

    let analyzer = Analyzer::default()
        .with_scheme(config.encoding)
        .with_classifier(Classifier::new(config.classifier_config()));
    let runner = BatchRunner::new(analyzer, config.workers);
    let reports = runner.run_files(&paths);
    let comparison = comparison(&reports);

    match config.output {
        OutputFormat::Text => print_text(&reports, comparison.as_ref()),
        OutputFormat::Json => print_json(&reports, comparison)?,
    }

    let failed = runner.stats().get_failed();
    if failed > 0 {
        error!("{} of {} captures could not be read", failed, reports.len());
        bail!("{} capture(s) failed", failed);
    }
    Ok(())
}
