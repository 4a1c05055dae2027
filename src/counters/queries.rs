//! Aggregation query definitions for the built-in counters.
//!
//! Each concrete counter aggregates one base record store, walking a chain
//! of foreign keys up to the table that carries the owning course. The
//! definitions here are declarative; executing them against a concrete
//! data source is the job of an `ActivityStore` implementation.

use crate::counters::CounterKind;
use crate::models::{CountMap, CourseId};
use serde::Serialize;

/// One step up the ownership chain: follow the `fk` column of the current
/// row to the row in `table` whose id it names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JoinHop {
    /// Table the foreign key points into.
    pub table: &'static str,
    /// Column on the current row holding the target row's id.
    pub fk: &'static str,
}

impl JoinHop {
    const fn new(table: &'static str, fk: &'static str) -> Self {
        Self { table, fk }
    }
}

/// How rows that resolved to a course are turned into counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Measure {
    /// One unit per row.
    CountRows,
    /// Group rows by (owning instance, user), take the maximum attempt
    /// number within each group, and sum those maxima per course. Used for
    /// SCORM, where the tracking store holds one row per tracked element
    /// rather than one per attempt.
    SumPerUserMax {
        /// Column holding the user id.
        user_field: &'static str,
        /// Column holding the attempt number.
        attempt_field: &'static str,
    },
}

/// A complete per-course aggregation: which store to read, how to reach
/// the owning course, and how to measure the rows.
///
/// An empty `path` means the base store itself carries the course column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregationQuery {
    /// Base record store to aggregate.
    pub store: &'static str,
    /// Foreign-key chain from the base store to the course-bearing table.
    pub path: Vec<JoinHop>,
    /// Row measure.
    pub measure: Measure,
}

impl AggregationQuery {
    /// The built-in query for a counter. `Total` is derived and has none.
    pub fn for_kind(kind: CounterKind) -> Option<AggregationQuery> {
        let query = match kind {
            CounterKind::Quiz => AggregationQuery {
                store: "quiz_attempts",
                path: vec![JoinHop::new("quiz", "quiz")],
                measure: Measure::CountRows,
            },
            CounterKind::Forum => AggregationQuery {
                store: "forum_posts",
                path: vec![
                    JoinHop::new("forum_discussions", "discussion"),
                    JoinHop::new("forum", "forum"),
                ],
                measure: Measure::CountRows,
            },
            CounterKind::Turnitin => AggregationQuery {
                store: "turnitintool_submissions",
                path: vec![JoinHop::new("turnitintool", "turnitintoolid")],
                measure: Measure::CountRows,
            },
            CounterKind::Assignment => AggregationQuery {
                store: "assign_submission",
                path: vec![JoinHop::new("assign", "assignment")],
                measure: Measure::CountRows,
            },
            CounterKind::Choice => AggregationQuery {
                store: "choice_answers",
                path: vec![JoinHop::new("choice", "choiceid")],
                measure: Measure::CountRows,
            },
            CounterKind::Wiki => AggregationQuery {
                store: "wiki_versions",
                path: vec![
                    JoinHop::new("wiki_pages", "pageid"),
                    JoinHop::new("wiki_subwikis", "subwikiid"),
                    JoinHop::new("wiki", "wikiid"),
                ],
                measure: Measure::CountRows,
            },
            CounterKind::Questionnaire => AggregationQuery {
                store: "questionnaire_response",
                path: vec![JoinHop::new("questionnaire", "questionnaireid")],
                measure: Measure::CountRows,
            },
            CounterKind::Scorm => AggregationQuery {
                store: "scorm_scoes_track",
                path: vec![JoinHop::new("scorm", "scormid")],
                measure: Measure::SumPerUserMax {
                    user_field: "userid",
                    attempt_field: "attempt",
                },
            },
            CounterKind::Total => return None,
        };
        Some(query)
    }
}

/// Folds aggregated `(course, count)` rows into a count map.
///
/// Rows with a non-positive course id are dropped; duplicate course ids
/// are summed.
pub fn fold_counts(rows: Vec<(CourseId, u64)>) -> CountMap {
    let mut counts = CountMap::new();
    for (course, count) in rows {
        if course <= 0 {
            continue;
        }
        *counts.entry(course).or_insert(0) += count;
    }
    counts
}
