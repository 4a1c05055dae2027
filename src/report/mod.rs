//! Report assembly.
//!
//! This module shapes aggregated course records into the final report:
//! sorting by a chosen counter column, slicing out one page, and computing
//! the summary block that heads the rendered output.

pub mod generator;

use crate::counters::CounterKind;
use crate::models::{CategoryId, CourseId, CourseRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata about one report run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Path of the snapshot the report was built from.
    pub snapshot: String,
    /// Date and time the report was generated.
    pub generated_at: DateTime<Utc>,
    /// Category scope of the run, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_scope: Option<CategoryId>,
    /// Courses in scope, before pagination.
    pub course_total: usize,
    /// Zero-based page the report shows.
    pub page: usize,
    /// Page size.
    pub per_page: usize,
    /// Counter column the course table is sorted by.
    pub sort: CounterKind,
    /// Wall-clock duration of the aggregation in seconds.
    pub duration_seconds: f64,
}

/// One entry of the most-active-courses list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusiestCourse {
    /// Course identifier.
    pub id: CourseId,
    /// Short display name of the course.
    pub shortname: String,
    /// Total activity events.
    pub total: u64,
}

/// Aggregate statistics over every course in scope, not just the emitted
/// page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivitySummary {
    /// Events per counter column, summed over all courses in scope.
    pub grand_totals: BTreeMap<CounterKind, u64>,
    /// The most active courses by total, quiet courses omitted.
    pub busiest: Vec<BusiestCourse>,
}

impl ActivitySummary {
    /// Builds the summary from the full record set and the report columns.
    pub fn from_records(records: &[CourseRecord], columns: &[CounterKind], top: usize) -> Self {
        let mut grand_totals = BTreeMap::new();
        for column in columns {
            let sum = records.iter().map(|r| r.count(*column)).sum();
            grand_totals.insert(*column, sum);
        }

        let mut by_total: Vec<&CourseRecord> = records.iter().filter(|r| r.total > 0).collect();
        by_total.sort_by(|a, b| b.total.cmp(&a.total).then(a.id.cmp(&b.id)));
        let busiest = by_total
            .into_iter()
            .take(top)
            .map(|r| BusiestCourse {
                id: r.id,
                shortname: r.shortname.clone(),
                total: r.total,
            })
            .collect();

        Self {
            grand_totals,
            busiest,
        }
    }
}

/// The complete activity report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityReport {
    /// Metadata about the run.
    pub metadata: ReportMetadata,
    /// Counter columns in report order.
    pub columns: Vec<CounterKind>,
    /// The page of course rows the report shows.
    pub courses: Vec<CourseRecord>,
    /// Statistics over every course in scope.
    pub summary: ActivitySummary,
}

/// Sorts course records by one counter column, highest first, with course
/// id as the tie break so equal counts keep a stable order.
pub fn sort_by_counter(records: &mut [CourseRecord], kind: CounterKind) {
    records.sort_by(|a, b| b.count(kind).cmp(&a.count(kind)).then(a.id.cmp(&b.id)));
}

/// Returns one page of records. Pages past the end are empty rather than
/// an error.
pub fn paginate(records: &[CourseRecord], page: usize, per_page: usize) -> &[CourseRecord] {
    let start = page.saturating_mul(per_page).min(records.len());
    let end = start.saturating_add(per_page).min(records.len());
    &records[start..end]
}
