// Report generation from pipeline output

use crate::model::{LinkRecommendation, RunSummary};
use crate::pipeline::PipelineReport;
use chrono::Utc;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

pub const CSV_HEADER: [&str; 6] = [
    "Source",
    "Destination",
    "Anchor Text",
    "Priority Score",
    "Similarity Score",
    "Context",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Csv,
    Json,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "csv" => Some(ReportFormat::Csv),
            "json" => Some(ReportFormat::Json),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    generated_at: String,
    summary: &'a RunSummary,
    recommendations: &'a [LinkRecommendation],
}

pub fn generate_report(report: &PipelineReport, format: ReportFormat) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Text => Ok(generate_text_report(report)),
        ReportFormat::Csv => Ok(generate_csv_report(&report.recommendations)),
        ReportFormat::Json => generate_json_report(report),
    }
}

pub fn generate_text_report(report: &PipelineReport) -> String {
    let summary = &report.summary;
    let mut out = String::new();
    out.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");
    out.push_str("# Summary:\n");
    out.push_str(&format!("  Pages requested: {}\n", summary.pages_requested));
    if summary.pages_skipped > 0 {
        out.push_str(&format!("  Records skipped: {}\n", summary.pages_skipped));
    }
    if summary.pages_excluded > 0 {
        out.push_str(&format!("  Pages excluded: {}\n", summary.pages_excluded));
    }
    out.push_str(&format!("  Pages fetched: {}\n", summary.pages_fetched));
    out.push_str(&format!("  Pages embedded: {}\n", summary.pages_embedded));
    out.push_str(&format!("  Similarity pairs: {}\n", summary.similarity_pairs));
    out.push_str(&format!(
        "  Candidates kept: {} of {}\n",
        summary.candidates_kept, summary.candidates_considered
    ));
    out.push_str(&format!(
        "  Context: {} existing, {} generated, {} template\n",
        summary.contexts_existing, summary.contexts_generated, summary.contexts_template
    ));
    out.push_str("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");

    if report.recommendations.is_empty() {
        out.push_str("No link recommendations passed the thresholds.\n");
        return out;
    }

    out.push_str(&format!(
        "## Top {} Recommendations\n\n",
        report.recommendations.len()
    ));
    for (idx, rec) in report.recommendations.iter().enumerate() {
        let c = &rec.candidate;
        out.push_str(&format!(
            "{:>3}. {} {} {}\n",
            idx + 1,
            c.source.bright_white(),
            "→".blue(),
            c.destination.bright_white()
        ));
        out.push_str(&format!(
            "     anchor: {}  priority: {}  similarity: {}\n",
            c.anchor_text.cyan(),
            format!("{:.2}", c.priority).green(),
            format!("{:.3}", c.similarity).yellow()
        ));
        let label = match rec.context.kind() {
            "existing" => "existing".green(),
            "generated" => "generated".cyan(),
            _ => "template".bright_black(),
        };
        out.push_str(&format!("     [{}] {}\n\n", label, rec.context.text()));
    }

    out
}

pub fn generate_csv_report(recommendations: &[LinkRecommendation]) -> String {
    let mut out = String::new();
    out.push_str(&CSV_HEADER.join(","));
    out.push('\n');

    for rec in recommendations {
        let c = &rec.candidate;
        let row = [
            csv_field(&c.source),
            csv_field(&c.destination),
            csv_field(&c.anchor_text),
            c.priority.to_string(),
            c.similarity.to_string(),
            csv_field(rec.context.text()),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }

    out
}

pub fn generate_json_report(report: &PipelineReport) -> Result<String, serde_json::Error> {
    let json = JsonReport {
        generated_at: Utc::now().to_rfc3339(),
        summary: &report.summary,
        recommendations: &report.recommendations,
    };
    serde_json::to_string_pretty(&json)
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

/// Quote a CSV field when it contains a delimiter, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
