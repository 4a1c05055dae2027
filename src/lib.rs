//! Batch reporting engine for per-course student activity counts.
//!
//! CourseTally aggregates activity events (quiz attempts, forum posts,
//! submissions, wiki edits, SCORM attempts, ...) per course from a
//! platform snapshot. The engine is split along three seams: the
//! [`source`] traits abstract where activity records live, the [`cache`]
//! trait stores intermediate aggregation results, and the [`aggregator`]
//! walks the registered counters to assemble one record per course. The
//! [`report`] module shapes those records into Markdown or JSON output,
//! and the binary wires everything to the command line.

pub mod aggregator;
pub mod cache;
pub mod cli;
pub mod config;
pub mod counters;
pub mod models;
pub mod report;
pub mod source;

pub use aggregator::{AggregationError, CourseAggregator};
pub use cache::{AggregationCache, CacheKey, CacheValue, MemoryCache, NoopCache};
pub use counters::{AggregationQuery, CounterKind, CounterRegistry};
pub use models::{CountMap, CourseRecord, SITE_COURSE_ID};
pub use source::{ActivityStore, CategoryDirectory, ModuleDirectory, SnapshotStore, SourceError};
