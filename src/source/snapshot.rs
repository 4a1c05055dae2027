//! Snapshot-backed data source.
//!
//! A snapshot is a single JSON document exported from the host platform:
//! the course list, the category tree, the visible activity modules, and
//! the raw rows of each activity record store. `SnapshotStore` loads one
//! into memory and serves the three source traits from it.
//!
//! Rows hold integer fields only. Joins between tables follow the same
//! rule as the SQL they replace: a row whose foreign key does not resolve
//! is dropped from the aggregation.

use crate::counters::{AggregationQuery, JoinHop, Measure};
use crate::models::{Category, CategoryId, CourseId, CourseSeed, UserId};
use crate::source::{ActivityStore, CategoryDirectory, ModuleDirectory, SourceError};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tracing::debug;

/// Column every course-bearing table ends the join path with.
const COURSE_FIELD: &str = "course";

/// Column the row indexes are keyed on.
const ID_FIELD: &str = "id";

/// One record-store row: integer fields keyed by column name.
type Row = HashMap<String, i64>;

/// On-disk shape of a snapshot document.
#[derive(Debug, Deserialize)]
struct SnapshotDoc {
    #[serde(default)]
    courses: Vec<CourseSeed>,
    #[serde(default)]
    categories: Vec<Category>,
    #[serde(default)]
    visible_modules: Vec<String>,
    #[serde(default)]
    tables: HashMap<String, Vec<Row>>,
}

/// In-memory data source over one snapshot document.
#[derive(Debug)]
pub struct SnapshotStore {
    courses: Vec<CourseSeed>,
    categories: Vec<Category>,
    visible_modules: HashSet<String>,
    tables: HashMap<String, Vec<Row>>,
    /// Per-table index from row id to row position. Rows without an id
    /// column cannot be joined to and are not indexed; a duplicated id
    /// keeps the later row.
    indexes: HashMap<String, HashMap<i64, usize>>,
}

impl SnapshotStore {
    /// Loads a snapshot from a JSON file.
    pub fn load(path: &Path) -> Result<Self, SourceError> {
        let raw = std::fs::read_to_string(path)?;
        let store = Self::from_json(&raw)?;
        debug!(
            "Loaded snapshot from {}: {} courses, {} record stores",
            path.display(),
            store.courses.len(),
            store.tables.len()
        );
        Ok(store)
    }

    /// Parses a snapshot from a JSON string.
    pub fn from_json(raw: &str) -> Result<Self, SourceError> {
        let doc: SnapshotDoc =
            serde_json::from_str(raw).map_err(|e| SourceError::Malformed(e.to_string()))?;
        Ok(Self::from_doc(doc))
    }

    fn from_doc(doc: SnapshotDoc) -> Self {
        let mut indexes: HashMap<String, HashMap<i64, usize>> = HashMap::new();
        for (table, rows) in &doc.tables {
            let mut index = HashMap::with_capacity(rows.len());
            for (position, row) in rows.iter().enumerate() {
                if let Some(&id) = row.get(ID_FIELD) {
                    index.insert(id, position);
                }
            }
            indexes.insert(table.clone(), index);
        }

        let mut courses = doc.courses;
        courses.sort_by_key(|course| course.id);

        Self {
            courses,
            categories: doc.categories,
            visible_modules: doc.visible_modules.into_iter().collect(),
            tables: doc.tables,
            indexes,
        }
    }

    /// Number of courses in the snapshot, site course included.
    pub fn course_count(&self) -> usize {
        self.courses.len()
    }

    /// Number of record stores in the snapshot.
    pub fn store_count(&self) -> usize {
        self.tables.len()
    }

    /// Walks the join path from a base row to the owning course. `None`
    /// when any hop dangles or the final table has no course column.
    fn resolve_course(&self, row: &Row, path: &[JoinHop]) -> Option<CourseId> {
        let mut current = row;
        for hop in path {
            let fk = current.get(hop.fk)?;
            let position = *self.indexes.get(hop.table)?.get(fk)?;
            current = self.tables.get(hop.table)?.get(position)?;
        }
        current.get(COURSE_FIELD).copied()
    }
}

#[async_trait]
impl ActivityStore for SnapshotStore {
    async fn run_aggregation(
        &self,
        query: &AggregationQuery,
    ) -> Result<Vec<(CourseId, u64)>, SourceError> {
        let rows = self
            .tables
            .get(query.store)
            .ok_or_else(|| SourceError::Unavailable {
                store: query.store.to_string(),
            })?;

        let mut totals: BTreeMap<CourseId, u64> = BTreeMap::new();
        match &query.measure {
            Measure::CountRows => {
                for row in rows {
                    if let Some(course) = self.resolve_course(row, &query.path) {
                        *totals.entry(course).or_insert(0) += 1;
                    }
                }
            }
            Measure::SumPerUserMax {
                user_field,
                attempt_field,
            } => {
                // The grouping instance is the base row's first foreign
                // key, i.e. the activity the attempts belong to.
                let instance_fk = query.path.first().map(|hop| hop.fk);
                let mut maxima: HashMap<(i64, UserId), (CourseId, u64)> = HashMap::new();
                for row in rows {
                    let Some(course) = self.resolve_course(row, &query.path) else {
                        continue;
                    };
                    let Some(&user) = row.get(*user_field) else {
                        continue;
                    };
                    let attempt = row.get(*attempt_field).copied().unwrap_or(0).max(0) as u64;
                    let instance = instance_fk
                        .and_then(|fk| row.get(fk).copied())
                        .unwrap_or(0);
                    let entry = maxima.entry((instance, user)).or_insert((course, 0));
                    entry.1 = entry.1.max(attempt);
                }
                for (course, best) in maxima.into_values() {
                    *totals.entry(course).or_insert(0) += best;
                }
            }
        }

        let mut out: Vec<(CourseId, u64)> = totals.into_iter().collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        Ok(out)
    }

    async fn list_courses(&self) -> Result<Vec<CourseSeed>, SourceError> {
        Ok(self.courses.clone())
    }
}

#[async_trait]
impl CategoryDirectory for SnapshotStore {
    async fn list_categories(&self) -> Result<Vec<(CategoryId, String)>, SourceError> {
        let mut categories: Vec<(CategoryId, String)> = self
            .categories
            .iter()
            .map(|c| (c.id, c.name.clone()))
            .collect();
        categories.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));
        Ok(categories)
    }

    async fn category_path(&self, category: CategoryId) -> Result<Option<String>, SourceError> {
        Ok(self
            .categories
            .iter()
            .find(|c| c.id == category)
            .map(|c| c.path.clone()))
    }
}

#[async_trait]
impl ModuleDirectory for SnapshotStore {
    async fn is_module_visible(&self, module: &str) -> Result<bool, SourceError> {
        Ok(self.visible_modules.contains(module))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::CounterKind;

    const SAMPLE: &str = r#"{
        "courses": [
            {"id": 3, "shortname": "HIST-200", "category": 9},
            {"id": 1, "shortname": "SITE", "category": 0},
            {"id": 2, "shortname": "BIO-101", "category": 7}
        ],
        "categories": [
            {"id": 7, "name": "Science", "path": "/7"},
            {"id": 9, "name": "Humanities", "path": "/9"}
        ],
        "visible_modules": ["quiz", "forum", "scorm"],
        "tables": {
            "quiz": [
                {"id": 4, "course": 2},
                {"id": 5, "course": 3}
            ],
            "quiz_attempts": [
                {"id": 1, "quiz": 4, "userid": 3, "attempt": 1},
                {"id": 2, "quiz": 4, "userid": 3, "attempt": 2},
                {"id": 3, "quiz": 5, "userid": 6, "attempt": 1},
                {"id": 9, "quiz": 99, "userid": 6, "attempt": 1}
            ],
            "forum": [
                {"id": 11, "course": 2}
            ],
            "forum_discussions": [
                {"id": 21, "forum": 11}
            ],
            "forum_posts": [
                {"id": 31, "discussion": 21, "userid": 3},
                {"id": 32, "discussion": 21, "userid": 6},
                {"id": 33, "discussion": 99, "userid": 6}
            ],
            "scorm": [
                {"id": 41, "course": 2},
                {"id": 42, "course": 3}
            ],
            "scorm_scoes_track": [
                {"id": 51, "scormid": 41, "userid": 3, "attempt": 1},
                {"id": 52, "scormid": 41, "userid": 3, "attempt": 3},
                {"id": 53, "scormid": 41, "userid": 5, "attempt": 5},
                {"id": 54, "scormid": 41, "userid": 5, "attempt": 2},
                {"id": 55, "scormid": 42, "userid": 5, "attempt": 2}
            ]
        }
    }"#;

    fn make_store() -> SnapshotStore {
        SnapshotStore::from_json(SAMPLE).unwrap()
    }

    fn query_for(kind: CounterKind) -> AggregationQuery {
        AggregationQuery::for_kind(kind).unwrap()
    }

    #[tokio::test]
    async fn test_missing_store_is_unavailable() {
        let store = make_store();
        let err = store
            .run_aggregation(&query_for(CounterKind::Wiki))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SourceError::Unavailable { store } if store == "wiki_versions"
        ));
    }

    #[tokio::test]
    async fn test_count_rows_follows_single_hop() {
        let store = make_store();
        let rows = store
            .run_aggregation(&query_for(CounterKind::Quiz))
            .await
            .unwrap();
        // Course 2 has two attempts, course 3 one. The attempt on the
        // dangling quiz 99 is dropped.
        assert_eq!(rows, vec![(2, 2), (3, 1)]);
    }

    #[tokio::test]
    async fn test_count_rows_follows_two_hops() {
        let store = make_store();
        let rows = store
            .run_aggregation(&query_for(CounterKind::Forum))
            .await
            .unwrap();
        assert_eq!(rows, vec![(2, 2)]);
    }

    #[tokio::test]
    async fn test_scorm_sums_per_user_maxima() {
        let store = make_store();
        let rows = store
            .run_aggregation(&query_for(CounterKind::Scorm))
            .await
            .unwrap();
        // Course 2: user 3 peaks at attempt 3, user 5 at attempt 5.
        // Course 3: user 5 peaks at attempt 2 on a different package.
        assert_eq!(rows, vec![(2, 8), (3, 2)]);
    }

    #[tokio::test]
    async fn test_counts_sum_across_instances_in_one_course() {
        let store = SnapshotStore::from_json(
            r#"{
                "tables": {
                    "quiz": [
                        {"id": 1, "course": 2},
                        {"id": 2, "course": 2}
                    ],
                    "quiz_attempts": [
                        {"id": 1, "quiz": 1},
                        {"id": 2, "quiz": 1},
                        {"id": 3, "quiz": 1},
                        {"id": 4, "quiz": 2},
                        {"id": 5, "quiz": 2}
                    ]
                }
            }"#,
        )
        .unwrap();
        let rows = store
            .run_aggregation(&query_for(CounterKind::Quiz))
            .await
            .unwrap();
        assert_eq!(rows, vec![(2, 5)]);
    }

    #[tokio::test]
    async fn test_rows_ordered_by_count_desc_then_id() {
        let store = SnapshotStore::from_json(
            r#"{
                "tables": {
                    "quiz": [
                        {"id": 1, "course": 5},
                        {"id": 2, "course": 4},
                        {"id": 3, "course": 9}
                    ],
                    "quiz_attempts": [
                        {"id": 1, "quiz": 1},
                        {"id": 2, "quiz": 2},
                        {"id": 3, "quiz": 3},
                        {"id": 4, "quiz": 3}
                    ]
                }
            }"#,
        )
        .unwrap();
        let rows = store
            .run_aggregation(&query_for(CounterKind::Quiz))
            .await
            .unwrap();
        assert_eq!(rows, vec![(9, 2), (4, 1), (5, 1)]);
    }

    #[tokio::test]
    async fn test_list_courses_sorted_by_id() {
        let store = make_store();
        let courses = store.list_courses().await.unwrap();
        let ids: Vec<CourseId> = courses.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(courses[1].shortname, "BIO-101");
    }

    #[tokio::test]
    async fn test_list_categories_sorted_by_name() {
        let store = make_store();
        let categories = store.list_categories().await.unwrap();
        assert_eq!(
            categories,
            vec![(9, "Humanities".to_string()), (7, "Science".to_string())]
        );
    }

    #[tokio::test]
    async fn test_category_path_lookup() {
        let store = make_store();
        assert_eq!(store.category_path(7).await.unwrap(), Some("/7".to_string()));
        assert_eq!(store.category_path(42).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_module_visibility() {
        let store = make_store();
        assert!(store.is_module_visible("quiz").await.unwrap());
        assert!(!store.is_module_visible("wiki").await.unwrap());
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        let err = SnapshotStore::from_json("{not json").unwrap_err();
        assert!(matches!(err, SourceError::Malformed(_)));
    }

    #[test]
    fn test_empty_document_is_valid() {
        let store = SnapshotStore::from_json("{}").unwrap();
        assert_eq!(store.course_count(), 0);
        assert_eq!(store.store_count(), 0);
    }

    #[tokio::test]
    async fn test_bundled_fixture_aggregates() {
        let store =
            SnapshotStore::from_json(include_str!("../../fixtures/snapshot.json")).unwrap();
        assert_eq!(store.course_count(), 5);

        let quiz = store
            .run_aggregation(&query_for(CounterKind::Quiz))
            .await
            .unwrap();
        assert_eq!(quiz, vec![(2, 3), (1, 1), (4, 1)]);

        let wiki = store
            .run_aggregation(&query_for(CounterKind::Wiki))
            .await
            .unwrap();
        assert_eq!(wiki, vec![(4, 3)]);

        let scorm = store
            .run_aggregation(&query_for(CounterKind::Scorm))
            .await
            .unwrap();
        assert_eq!(scorm, vec![(2, 4), (3, 2)]);
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, SAMPLE).unwrap();

        let store = SnapshotStore::load(&path).unwrap();
        assert_eq!(store.course_count(), 3);

        let missing = SnapshotStore::load(&dir.path().join("absent.json"));
        assert!(matches!(missing, Err(SourceError::Io(_))));
    }
}
