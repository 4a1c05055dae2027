//! Data models for the activity report.
//!
//! This module contains the core data structures shared by the counter
//! queries, the cache, and the aggregator: course and category identifiers,
//! per-course count mappings, and the composite course records the report
//! is built from.

use crate::counters::CounterKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifier of a course. Always positive in well-formed data.
pub type CourseId = i64;

/// Identifier of a course category.
pub type CategoryId = i64;

/// Identifier of a user within the host platform.
pub type UserId = i64;

/// The platform's site-level course. It backs the front page rather than
/// real teaching and is excluded from all aggregated output.
pub const SITE_COURSE_ID: CourseId = 1;

/// Per-course tally for a single counter type.
///
/// Courses absent from the mapping implicitly have a count of zero; callers
/// must default rather than treat a missing key as an error.
pub type CountMap = BTreeMap<CourseId, u64>;

/// A course row as selected from the data source, before any counts are
/// attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseSeed {
    /// Course identifier.
    pub id: CourseId,
    /// Short display name of the course.
    pub shortname: String,
    /// Category the course sits in.
    pub category: CategoryId,
}

/// A course category with its hierarchical path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Category identifier.
    pub id: CategoryId,
    /// Display name.
    pub name: String,
    /// Slash-delimited ancestor chain ending at this category, e.g. `/2/7/9`
    /// for category 9 under 7 under 2.
    pub path: String,
}

impl Category {
    /// Whether this category is `scope` itself or one of its descendants.
    pub fn is_under(&self, scope: CategoryId) -> bool {
        path_matches_scope(&self.path, scope)
    }
}

/// The hierarchical scope test used for category filtering.
///
/// A path lies under `scope` when it contains `/{scope}/` as an interior
/// segment or ends with `/{scope}`. Both cases are required: the first
/// matches descendants, the second matches the scoped category itself.
/// Substring checks on anything shorter would let category 7 match
/// category 70.
pub fn path_matches_scope(path: &str, scope: CategoryId) -> bool {
    let interior = format!("/{}/", scope);
    let suffix = format!("/{}", scope);
    path.contains(&interior) || path.ends_with(&suffix)
}

/// A composite per-course record: one count per counter type plus the
/// derived total.
///
/// Records are immutable once built; the total is computed from the counts
/// at construction and never patched afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseRecord {
    /// Course identifier.
    pub id: CourseId,
    /// Short display name of the course.
    pub shortname: String,
    /// Count per concrete counter type. Keys serialize as counter names.
    pub counts: BTreeMap<CounterKind, u64>,
    /// Sum of all counts above.
    pub total: u64,
}

impl CourseRecord {
    /// Builds a record from a course and its per-counter counts, deriving
    /// the total.
    pub fn new(id: CourseId, shortname: String, counts: BTreeMap<CounterKind, u64>) -> Self {
        let total = counts.values().sum();
        Self {
            id,
            shortname,
            counts,
            total,
        }
    }

    /// Returns the count for one counter column, defaulting to zero. The
    /// synthetic `total` column reads the derived total.
    pub fn count(&self, kind: CounterKind) -> u64 {
        if kind.is_total() {
            self.total
        } else {
            self.counts.get(&kind).copied().unwrap_or(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_record(counts: &[(CounterKind, u64)]) -> CourseRecord {
        CourseRecord::new(2, "TEST-101".to_string(), counts.iter().copied().collect())
    }

    #[test]
    fn test_total_is_sum_of_counts() {
        let record = make_record(&[
            (CounterKind::Quiz, 5),
            (CounterKind::Forum, 3),
            (CounterKind::Scorm, 8),
        ]);
        assert_eq!(record.total, 16);
        assert_eq!(record.count(CounterKind::Total), 16);
    }

    #[test]
    fn test_missing_counter_defaults_to_zero() {
        let record = make_record(&[(CounterKind::Quiz, 5)]);
        assert_eq!(record.count(CounterKind::Forum), 0);
    }

    #[test]
    fn test_path_matches_scope_interior_segment() {
        assert!(path_matches_scope("/2/7/9", 7));
    }

    #[test]
    fn test_path_matches_scope_trailing_segment() {
        assert!(path_matches_scope("/2/7", 7));
    }

    #[test]
    fn test_path_matches_scope_rejects_prefix_collisions() {
        assert!(!path_matches_scope("/2/70", 7));
        assert!(!path_matches_scope("/2/71/9", 7));
    }

    #[test]
    fn test_category_is_under() {
        let category = Category {
            id: 9,
            name: "Modern History".to_string(),
            path: "/2/7/9".to_string(),
        };
        assert!(category.is_under(7));
        assert!(category.is_under(9));
        assert!(!category.is_under(3));
    }

    #[test]
    fn test_record_serializes_counter_names_as_keys() {
        let record = make_record(&[(CounterKind::Quiz, 5)]);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"quiz\":5"));
        assert!(json.contains("\"total\":5"));
    }
}
