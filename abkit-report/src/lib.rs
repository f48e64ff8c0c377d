#![warn(missing_docs)]
//! abkit Report - Output Formats
//!
//! Renders an [`AnalysisReport`] as:
//! - JSON (machine-readable)
//! - CSV (one row per comparison)
//! - Human-readable terminal text

mod csv;
mod human;
mod json;
mod report;

pub use csv::generate_csv_report;
pub use human::format_human_output;
pub use json::generate_json_report;
pub use report::{
    AnalysisReport, BayesianEntry, ReportMeta, ReportSummary, SCHEMA_VERSION, VariantSummary,
};

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Pretty JSON
    Json,
    /// CSV for spreadsheets
    Csv,
    /// Human-readable terminal output
    #[default]
    Human,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            "human" | "text" => Ok(OutputFormat::Human),
            other => Err(format!("Unknown output format: {}", other)),
        }
    }
}

/// Render `report` in the requested format
pub fn render(report: &AnalysisReport, format: OutputFormat) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Json => generate_json_report(report),
        OutputFormat::Csv => Ok(generate_csv_report(report)),
        OutputFormat::Human => Ok(format_human_output(report)),
    }
}
