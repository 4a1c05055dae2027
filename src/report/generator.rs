//! Markdown report generation.
//!
//! This module renders the assembled activity report as Markdown or JSON.

use crate::report::{ActivityReport, ActivitySummary, ReportMetadata};
use anyhow::Result;
use std::io::Write;
use std::path::Path;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &ActivityReport) -> String {
    let mut output = String::new();

    // Title
    output.push_str("# Course Activity Report\n\n");

    // Metadata section
    output.push_str(&generate_metadata_section(&report.metadata));

    // Course table
    output.push_str(&generate_counts_section(report));

    // Summary section
    output.push_str(&generate_summary_section(&report.summary, report));

    // Footer
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Snapshot:** `{}`\n", metadata.snapshot));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    match metadata.category_scope {
        Some(category) => {
            section.push_str(&format!("- **Scope:** category {}\n", category));
        }
        None => {
            section.push_str("- **Scope:** all categories\n");
        }
    }
    section.push_str(&format!("- **Courses:** {}\n", metadata.course_total));
    section.push_str(&format!(
        "- **Page:** {} ({} per page)\n",
        metadata.page, metadata.per_page
    ));
    section.push_str(&format!("- **Sorted by:** {}\n", metadata.sort.label()));
    section.push_str(&format!(
        "- **Duration:** {:.2}s\n",
        metadata.duration_seconds
    ));
    section.push_str("\n");

    section
}

/// Generate the per-course counts table.
fn generate_counts_section(report: &ActivityReport) -> String {
    let mut section = String::new();

    section.push_str("## Activity by Course\n\n");

    if report.courses.is_empty() {
        section.push_str("No courses matched the current scope.\n\n");
        return section;
    }

    section.push_str("| Course |");
    for column in &report.columns {
        section.push_str(&format!(" {} |", column.label()));
    }
    section.push_str("\n|:---|");
    for _ in &report.columns {
        section.push_str(":---:|");
    }
    section.push_str("\n");

    for course in &report.courses {
        section.push_str(&format!("| {} |", course.shortname));
        for column in &report.columns {
            section.push_str(&format!(" {} |", course.count(*column)));
        }
        section.push_str("\n");
    }
    section.push_str("\n");

    section
}

/// Generate the summary section.
fn generate_summary_section(summary: &ActivitySummary, report: &ActivityReport) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");

    // Grand totals per counter
    section.push_str("### Events by Counter\n\n");
    section.push_str("| Counter | Events |\n");
    section.push_str("|:---|:---:|\n");
    for column in &report.columns {
        let events = summary.grand_totals.get(column).copied().unwrap_or(0);
        section.push_str(&format!("| {} | {} |\n", column.label(), events));
    }
    section.push_str("\n");

    // Most active courses
    if !summary.busiest.is_empty() {
        section.push_str("### Most Active Courses\n\n");
        section.push_str("| Course | Total Events |\n");
        section.push_str("|:---|:---:|\n");
        for course in &summary.busiest {
            section.push_str(&format!("| {} | {} |\n", course.shortname, course.total));
        }
        section.push_str("\n");
    }

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(&format!(
        "*Report generated by coursetally v{}*\n",
        env!("CARGO_PKG_VERSION")
    ));

    footer
}

/// Write the Markdown report to a file.
pub fn write_report(report: &ActivityReport, path: &Path) -> Result<()> {
    let content = generate_markdown_report(report);

    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())?;

    Ok(())
}

/// Generate a JSON report.
pub fn generate_json_report(report: &ActivityReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Write a JSON report to a file.
pub fn write_json_report(report: &ActivityReport, path: &Path) -> Result<()> {
    let content = generate_json_report(report)?;

    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::CounterKind;
    use crate::models::CourseRecord;
    use chrono::Utc;

    fn create_test_report() -> ActivityReport {
        let metadata = ReportMetadata {
            snapshot: "fixtures/snapshot.json".to_string(),
            generated_at: Utc::now(),
            category_scope: None,
            course_total: 2,
            page: 0,
            per_page: 25,
            sort: CounterKind::Total,
            duration_seconds: 0.4,
        };

        let columns = vec![CounterKind::Quiz, CounterKind::Forum, CounterKind::Total];
        let courses = vec![
            CourseRecord::new(
                2,
                "BIO-101".to_string(),
                [(CounterKind::Quiz, 4), (CounterKind::Forum, 2)]
                    .into_iter()
                    .collect(),
            ),
            CourseRecord::new(
                3,
                "HIST-200".to_string(),
                [(CounterKind::Quiz, 1), (CounterKind::Forum, 0)]
                    .into_iter()
                    .collect(),
            ),
        ];
        let summary = ActivitySummary::from_records(&courses, &columns, 5);

        ActivityReport {
            metadata,
            columns,
            courses,
            summary,
        }
    }

    #[test]
    fn test_generate_markdown_report() {
        let report = create_test_report();
        let markdown = generate_markdown_report(&report);

        assert!(markdown.contains("# Course Activity Report"));
        assert!(markdown.contains("## Metadata"));
        assert!(markdown.contains("## Activity by Course"));
        assert!(markdown.contains("## Summary"));
        assert!(markdown.contains("| BIO-101 | 4 | 2 | 6 |"));
        assert!(markdown.contains("| Quiz Attempts | 5 |"));
    }

    #[test]
    fn test_generate_metadata_section() {
        let report = create_test_report();
        let section = generate_metadata_section(&report.metadata);

        assert!(section.contains("fixtures/snapshot.json"));
        assert!(section.contains("**Scope:** all categories"));
        assert!(section.contains("**Sorted by:** Total Activity"));

        let mut scoped = report.metadata.clone();
        scoped.category_scope = Some(7);
        assert!(generate_metadata_section(&scoped).contains("**Scope:** category 7"));
    }

    #[test]
    fn test_empty_page_renders_notice_instead_of_table() {
        let mut report = create_test_report();
        report.courses.clear();
        let markdown = generate_markdown_report(&report);

        assert!(markdown.contains("No courses matched the current scope."));
        assert!(!markdown.contains("| Course | Quiz Attempts |"));
    }

    #[test]
    fn test_generate_json_report() {
        let report = create_test_report();
        let json = generate_json_report(&report).unwrap();

        assert!(json.contains("\"snapshot\""));
        assert!(json.contains("\"courses\""));
        assert!(json.contains("\"grand_totals\""));
        assert!(json.contains("\"quiz\""));
    }
}
