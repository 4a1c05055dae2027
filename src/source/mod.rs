//! Data-source abstractions.
//!
//! The aggregator never reads activity records directly. It goes through
//! three narrow traits: `ActivityStore` for the record stores themselves,
//! `CategoryDirectory` for the category hierarchy, and `ModuleDirectory`
//! for module visibility. The bundled `SnapshotStore` implements all three
//! over a JSON export; a deployment sitting on a live database would
//! implement them over SQL instead.

pub mod snapshot;

pub use snapshot::SnapshotStore;

use crate::counters::AggregationQuery;
use crate::models::{CategoryId, CourseId, CourseSeed};
use async_trait::async_trait;
use thiserror::Error;

/// Errors produced by a data source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The named record store does not exist in the data source. This is
    /// the expected state for an uninstalled module and is recoverable;
    /// the other variants are not.
    #[error("record store `{store}` is not present in the data source")]
    Unavailable {
        /// Name of the missing store.
        store: String,
    },

    /// The store exists but the aggregation over it failed.
    #[error("aggregation over `{store}` failed: {message}")]
    Query {
        /// Name of the store being aggregated.
        store: String,
        /// Backend failure description.
        message: String,
    },

    /// The data source could not be read at all.
    #[error("failed to read the data source")]
    Io(#[from] std::io::Error),

    /// The data source was read but does not parse.
    #[error("malformed data source: {0}")]
    Malformed(String),
}

/// Read access to the activity record stores.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// Runs one counter's aggregation and returns `(course, count)` rows,
    /// ordered by count descending with course id ascending as the tie
    /// break. Courses with no matching records are simply absent.
    async fn run_aggregation(
        &self,
        query: &AggregationQuery,
    ) -> Result<Vec<(CourseId, u64)>, SourceError>;

    /// Lists every course in the source, site course included, ordered by
    /// id ascending.
    async fn list_courses(&self) -> Result<Vec<CourseSeed>, SourceError>;
}

/// Read access to the course category hierarchy.
#[async_trait]
pub trait CategoryDirectory: Send + Sync {
    /// Lists categories as `(id, name)` pairs ordered by name.
    async fn list_categories(&self) -> Result<Vec<(CategoryId, String)>, SourceError>;

    /// Returns the hierarchical path of a category, or `None` for an
    /// unknown id.
    async fn category_path(&self, category: CategoryId) -> Result<Option<String>, SourceError>;
}

/// Read access to the installed-module table.
#[async_trait]
pub trait ModuleDirectory: Send + Sync {
    /// Whether the named activity module is installed and visible.
    async fn is_module_visible(&self, module: &str) -> Result<bool, SourceError>;
}
