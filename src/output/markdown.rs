//! Markdown summary generation
//!
//! This module generates human-readable markdown summaries of scan results:
//! outcome, severity table, the pages with the most issues and the issue list.

use crate::aggregate::Severity;
use crate::output::traits::{OutputHandler, OutputResult, ScanSummary};
use crate::state::ScanReport;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Issues listed before the summary truncates
const MAX_LISTED_ISSUES: usize = 50;

/// Snippets longer than this are cut in the issue list
const MAX_SNIPPET_CHARS: usize = 120;

/// Writes the markdown summary after each scan
#[derive(Debug, Clone)]
pub struct MarkdownSummaryWriter {
    path: PathBuf,
}

impl MarkdownSummaryWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl OutputHandler for MarkdownSummaryWriter {
    fn name(&self) -> &'static str {
        "markdown summary"
    }

    fn write_report(&self, report: &ScanReport) -> OutputResult<()> {
        generate_markdown_summary(&ScanSummary::from_report(report), &self.path)
    }
}

/// Generates a markdown summary and writes it to `output_path`
///
/// Parent directories are created as needed.
pub fn generate_markdown_summary(summary: &ScanSummary, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_summary(summary);

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a scan summary as markdown
pub fn format_markdown_summary(summary: &ScanSummary) -> String {
    let mut md = String::new();

    md.push_str("# Sumi-Lens Accessibility Scan Summary\n\n");

    // Scan metadata
    md.push_str("## Scan Information\n\n");
    if let Some(id) = summary.scan_id {
        md.push_str(&format!("- **Scan ID**: {}\n", id));
    }
    md.push_str(&format!("- **Target**: {}\n", summary.seed_url));
    md.push_str(&format!("- **Scan Type**: {}\n", summary.scan_type));
    md.push_str(&format!("- **Strategy**: {}\n", summary.strategy));
    md.push_str(&format!("- **Started**: {}\n", summary.started_at));
    if let Some(finished) = &summary.finished_at {
        md.push_str(&format!("- **Finished**: {}\n", finished));
    }
    if let Some(duration) = summary.duration_seconds {
        md.push_str(&format!(
            "- **Duration**: {} seconds ({:.2} minutes)\n",
            duration,
            duration as f64 / 60.0
        ));
    }
    md.push_str(&format!("- **Status**: {}\n", summary.status));
    if let Some(reason) = &summary.abort_reason {
        md.push_str(&format!("- **Aborted**: {}\n", reason));
    }
    md.push('\n');

    // Pages
    md.push_str("## Pages\n\n");
    md.push_str("| Outcome | Count |\n");
    md.push_str("|---------|-------|\n");
    md.push_str(&format!("| Scanned | {} |\n", summary.pages_scanned));
    md.push_str(&format!("| Failed | {} |\n", summary.pages_failed));
    md.push_str(&format!("| Excluded | {} |\n", summary.pages_excluded));
    md.push_str(&format!("| Invalid URLs | {} |\n", summary.urls_invalid));
    md.push_str(&format!("| Duplicate links | {} |\n\n", summary.duplicates));

    // Severity table
    let counts = &summary.counts;
    md.push_str("## Issues by Severity\n\n");
    md.push_str("| Severity | Occurrences |\n");
    md.push_str("|----------|-------------|\n");
    for severity in Severity::ALL {
        md.push_str(&format!(
            "| {} | {} |\n",
            capitalize(severity.as_str()),
            counts.get(severity)
        ));
    }
    md.push_str(&format!("| **mustFix** | {} |\n", counts.must_fix()));
    md.push_str(&format!("| **goodToFix** | {} |\n", counts.good_to_fix()));
    md.push_str(&format!(
        "\n{} unique issues, {} occurrences\n\n",
        summary.issues.len(),
        counts.total()
    ));

    // Top pages
    if !summary.top_pages.is_empty() {
        md.push_str(&format!(
            "## Top {} Pages by Issue Count\n\n",
            summary.top_pages.len()
        ));
        md.push_str("| Page | Issues |\n");
        md.push_str("|------|--------|\n");
        for (url, count) in &summary.top_pages {
            md.push_str(&format!("| {} | {} |\n", url, count));
        }
        md.push('\n');
    }

    // Issue list
    if !summary.issues.is_empty() {
        md.push_str("## Issues\n\n");
        md.push_str("| Severity | Rule | Pages | Element |\n");
        md.push_str("|----------|------|-------|---------|\n");

        for issue in summary.issues.iter().take(MAX_LISTED_ISSUES) {
            let rule = if issue.help_url.is_empty() {
                issue.rule_id.clone()
            } else {
                format!("[{}]({})", issue.rule_id, issue.help_url)
            };
            md.push_str(&format!(
                "| {} | {} | {} | `{}` |\n",
                issue.severity,
                rule,
                issue.occurrence_count(),
                table_cell(&issue.html_snippet)
            ));
        }

        if summary.issues.len() > MAX_LISTED_ISSUES {
            md.push_str(&format!(
                "\n... and {} more\n",
                summary.issues.len() - MAX_LISTED_ISSUES
            ));
        }
        md.push('\n');
    }

    // Failures
    if !summary.failures.is_empty() {
        md.push_str("## Failed Pages\n\n");
        md.push_str("| URL | Reason |\n");
        md.push_str("|-----|--------|\n");
        for failure in summary.failures.iter().take(20) {
            md.push_str(&format!(
                "| {} | {} |\n",
                failure.url,
                table_cell(&failure.reason)
            ));
        }
        md.push('\n');
    }

    md
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Keeps a value on one table row
fn table_cell(value: &str) -> String {
    let flat = value.replace('|', "\\|").replace(['\n', '\r'], " ");
    if flat.chars().count() > MAX_SNIPPET_CHARS {
        let cut: String = flat.chars().take(MAX_SNIPPET_CHARS).collect();
        format!("{}...", cut)
    } else {
        flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{AggregatedIssue, Occurrence, SeverityCounts};
    use crate::state::UrlWithReason;
    use chrono::Utc;

    fn issue(rule: &str, severity: Severity, pages: &[&str]) -> AggregatedIssue {
        AggregatedIssue::restore(
            format!("fp-{}", rule),
            rule.to_string(),
            severity,
            Default::default(),
            format!("https://rules.example/{}", rule),
            "<img src=\"logo.png\">".to_string(),
            None,
            pages
                .iter()
                .enumerate()
                .map(|(i, url)| Occurrence {
                    page_url: url.to_string(),
                    order: i as u64,
                })
                .collect(),
            Utc::now(),
        )
    }

    fn create_test_summary() -> ScanSummary {
        ScanSummary {
            scan_id: Some(1),
            seed_url: "https://example.com/".to_string(),
            scan_type: "intelligent".to_string(),
            strategy: "sitemap-then-domain".to_string(),
            started_at: "2024-01-01T00:00:00Z".to_string(),
            finished_at: Some("2024-01-01T01:00:00Z".to_string()),
            duration_seconds: Some(3600),
            status: "completed".to_string(),
            pages_scanned: 42,
            pages_failed: 3,
            counts: SeverityCounts {
                critical: 7,
                serious: 2,
                moderate: 1,
                minor: 0,
            },
            issues: vec![issue(
                "image-alt",
                Severity::Critical,
                &["https://example.com/", "https://example.com/about"],
            )],
            top_pages: vec![
                ("https://example.com/".to_string(), 4),
                ("https://example.com/about".to_string(), 2),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_format_markdown_summary() {
        let markdown = format_markdown_summary(&create_test_summary());

        assert!(markdown.contains("# Sumi-Lens Accessibility Scan Summary"));
        assert!(markdown.contains("- **Scan ID**: 1"));
        assert!(markdown.contains("- **Strategy**: sitemap-then-domain"));
        assert!(markdown.contains("| Scanned | 42 |"));
    }

    #[test]
    fn test_severity_table() {
        let markdown = format_markdown_summary(&create_test_summary());

        assert!(markdown.contains("| Critical | 7 |"));
        assert!(markdown.contains("| Serious | 2 |"));
        assert!(markdown.contains("| **mustFix** | 9 |"));
        assert!(markdown.contains("| **goodToFix** | 1 |"));
    }

    #[test]
    fn test_top_pages_section() {
        let markdown = format_markdown_summary(&create_test_summary());

        assert!(markdown.contains("## Top 2 Pages by Issue Count"));
        assert!(markdown.contains("| https://example.com/ | 4 |"));
    }

    #[test]
    fn test_issue_list_links_rule_help() {
        let markdown = format_markdown_summary(&create_test_summary());

        assert!(markdown.contains("[image-alt](https://rules.example/image-alt)"));
        assert!(markdown.contains("| critical | [image-alt]"));
    }

    #[test]
    fn test_aborted_summary() {
        let mut summary = create_test_summary();
        summary.status = "aborted".to_string();
        summary.abort_reason = Some("mustFix occurrences found: 9 > 5".to_string());

        let markdown = format_markdown_summary(&summary);
        assert!(markdown.contains("- **Aborted**: mustFix occurrences found: 9 > 5"));
    }

    #[test]
    fn test_failures_section() {
        let mut summary = create_test_summary();
        summary.failures = vec![UrlWithReason {
            url: "https://example.com/broken".to_string(),
            reason: "HTTP 500".to_string(),
        }];

        let markdown = format_markdown_summary(&summary);
        assert!(markdown.contains("## Failed Pages"));
        assert!(markdown.contains("| https://example.com/broken | HTTP 500 |"));
    }

    #[test]
    fn test_empty_scan_has_no_issue_sections() {
        let markdown = format_markdown_summary(&ScanSummary::default());
        assert!(!markdown.contains("## Issues\n"));
        assert!(!markdown.contains("## Top"));
    }

    #[test]
    fn test_table_cell_escapes_and_truncates() {
        assert_eq!(table_cell("a|b\nc"), "a\\|b c");
        let long = "x".repeat(200);
        assert_eq!(table_cell(&long).chars().count(), MAX_SNIPPET_CHARS + 3);
    }

    #[test]
    fn test_generate_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("summary.md");
        generate_markdown_summary(&create_test_summary(), &path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("# Sumi-Lens"));
    }
}
