//! Course aggregation.
//!
//! This module assembles the report's course records: it selects courses,
//! applies the optional category scope, fans out to every enabled counter,
//! and attaches the per-course counts plus the derived total. All counter
//! maps and the assembled records flow through the aggregation cache, so
//! repeated reads within one cache lifetime hit the source only once.

use crate::cache::{AggregationCache, CacheKey, CacheValue};
use crate::counters::queries::fold_counts;
use crate::counters::{CounterKind, CounterRegistry};
use crate::models::{
    path_matches_scope, CategoryId, CountMap, CourseId, CourseRecord, CourseSeed, SITE_COURSE_ID,
};
use crate::source::{ActivityStore, CategoryDirectory, SourceError};
use futures::future;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors surfaced by the aggregation engine.
#[derive(Debug, Error)]
pub enum AggregationError {
    /// A counter name outside the registry's declared set.
    #[error("unknown counter type `{0}`")]
    UnknownCounterType(String),

    /// The data source failed in a way the report cannot recover from.
    /// A store that is merely absent for an unavailable module is not an
    /// error; that case is counted as zero upstream.
    #[error("data access failed for {context}")]
    DataAccess {
        /// What the engine was doing when the source failed.
        context: String,
        #[source]
        source: SourceError,
    },
}

/// Aggregates per-course activity counts into course records.
///
/// The aggregator holds its dependencies behind trait objects so tests and
/// alternative deployments can swap the data source and the cache without
/// touching the engine.
pub struct CourseAggregator {
    store: Arc<dyn ActivityStore>,
    categories: Arc<dyn CategoryDirectory>,
    registry: Arc<CounterRegistry>,
    cache: Arc<dyn AggregationCache>,
    scope: Option<CategoryId>,
}

impl CourseAggregator {
    /// Creates an aggregator with no category scope.
    pub fn new(
        store: Arc<dyn ActivityStore>,
        categories: Arc<dyn CategoryDirectory>,
        registry: Arc<CounterRegistry>,
        cache: Arc<dyn AggregationCache>,
    ) -> Self {
        Self {
            store,
            categories,
            registry,
            cache,
            scope: None,
        }
    }

    /// Restricts or widens the report to one category and its descendants.
    /// `None` reports on every course. Scoped and unscoped runs cache
    /// under distinct keys, so switching scope never mixes results.
    pub fn set_category_scope(&mut self, scope: Option<CategoryId>) {
        self.scope = scope;
    }

    /// The current category scope.
    pub fn category_scope(&self) -> Option<CategoryId> {
        self.scope
    }

    /// The registry this aggregator reports over.
    pub fn registry(&self) -> &CounterRegistry {
        &self.registry
    }

    /// Lists the categories available for scoping, ordered by name.
    pub async fn categories(&self) -> Result<Vec<(CategoryId, String)>, AggregationError> {
        self.categories
            .list_categories()
            .await
            .map_err(|source| AggregationError::DataAccess {
                context: "category listing".to_string(),
                source,
            })
    }

    /// Returns the course records for the current scope, one per course,
    /// ordered by course id.
    ///
    /// On a cache hit the stored records are returned as-is. Otherwise the
    /// courses are selected, every enabled counter's map is computed
    /// concurrently, the records are assembled with absent counts
    /// defaulting to zero, and the result is stored before returning.
    pub async fn get_courses(&self) -> Result<Vec<CourseRecord>, AggregationError> {
        let key = CacheKey::Courses(self.scope);
        if let Some(CacheValue::Courses(records)) = self.cache.get(&key).await {
            return Ok(records);
        }

        let seeds = self.select_courses().await?;
        let kinds = self.enabled_concrete().await?;
        let maps =
            future::try_join_all(kinds.iter().map(|kind| self.concrete_counts(*kind))).await?;

        let mut records = Vec::with_capacity(seeds.len());
        for seed in seeds {
            let mut counts = BTreeMap::new();
            for (kind, map) in kinds.iter().zip(&maps) {
                counts.insert(*kind, map.get(&seed.id).copied().unwrap_or(0));
            }
            records.push(CourseRecord::new(seed.id, seed.shortname, counts));
        }
        debug!("Assembled {} course records", records.len());

        self.cache.set(&key, CacheValue::Courses(records.clone())).await;
        Ok(records)
    }

    /// Returns one counter's per-course map.
    ///
    /// The `total` counter is derived by summing the maps of every enabled
    /// concrete counter and is never cached under its own key; concrete
    /// counters are cached individually.
    pub async fn counter_counts(&self, kind: CounterKind) -> Result<CountMap, AggregationError> {
        if kind.is_total() {
            let kinds = self.enabled_concrete().await?;
            let maps =
                future::try_join_all(kinds.iter().map(|kind| self.concrete_counts(*kind))).await?;
            let mut total = CountMap::new();
            for map in maps {
                for (course, count) in map {
                    *total.entry(course).or_insert(0) += count;
                }
            }
            return Ok(total);
        }
        self.concrete_counts(kind).await
    }

    /// Returns one course's count for a counter named by the caller,
    /// defaulting to zero for courses without activity.
    pub async fn count(&self, counter: &str, course: CourseId) -> Result<u64, AggregationError> {
        let kind = self.registry.lookup(counter)?;
        let map = self.counter_counts(kind).await?;
        Ok(map.get(&course).copied().unwrap_or(0))
    }

    /// Computes a concrete counter's map, going through the cache.
    ///
    /// An absent record store is fatal only when the counter's module
    /// claims to be available; for an unavailable module it means the
    /// module was never installed, and the counter reads zero everywhere.
    async fn concrete_counts(&self, kind: CounterKind) -> Result<CountMap, AggregationError> {
        let key = CacheKey::Counts(kind);
        if let Some(CacheValue::Counts(map)) = self.cache.get(&key).await {
            return Ok(map);
        }

        let query = self
            .registry
            .query_for(kind)
            .ok_or_else(|| AggregationError::UnknownCounterType(kind.name().to_string()))?;

        let map = match self.store.run_aggregation(query).await {
            Ok(rows) => fold_counts(rows),
            Err(SourceError::Unavailable { store }) => {
                if self.registry.is_available(kind).await? {
                    return Err(AggregationError::DataAccess {
                        context: format!("counter `{}`", kind),
                        source: SourceError::Unavailable { store },
                    });
                }
                debug!("Counter {} has no store and no module, counting zero", kind);
                CountMap::new()
            }
            Err(source) => {
                return Err(AggregationError::DataAccess {
                    context: format!("counter `{}`", kind),
                    source,
                });
            }
        };

        self.cache.set(&key, CacheValue::Counts(map.clone())).await;
        Ok(map)
    }

    /// The enabled counters minus the synthetic total, in column order.
    async fn enabled_concrete(&self) -> Result<Vec<CounterKind>, AggregationError> {
        Ok(self
            .registry
            .enabled_kinds()
            .await?
            .into_iter()
            .filter(|kind| !kind.is_total())
            .collect())
    }

    /// Selects the courses in scope: every course except the site course,
    /// then filtered to the scoped category subtree when a scope is set.
    /// A scope that matches nothing, including an unknown category id,
    /// selects no courses.
    async fn select_courses(&self) -> Result<Vec<CourseSeed>, AggregationError> {
        let seeds = self
            .store
            .list_courses()
            .await
            .map_err(|source| AggregationError::DataAccess {
                context: "course selection".to_string(),
                source,
            })?;
        let mut seeds: Vec<CourseSeed> = seeds
            .into_iter()
            .filter(|seed| seed.id != SITE_COURSE_ID)
            .collect();

        if let Some(scope) = self.scope {
            let mut in_scope: HashMap<CategoryId, bool> = HashMap::new();
            let mut kept = Vec::with_capacity(seeds.len());
            for seed in seeds {
                let keep = if let Some(&cached) = in_scope.get(&seed.category) {
                    cached
                } else {
                    let path = self
                        .categories
                        .category_path(seed.category)
                        .await
                        .map_err(|source| AggregationError::DataAccess {
                            context: format!("category {} lookup", seed.category),
                            source,
                        })?;
                    let keep = path
                        .map(|path| path_matches_scope(&path, scope))
                        .unwrap_or(false);
                    in_scope.insert(seed.category, keep);
                    keep
                };
                if keep {
                    kept.push(seed);
                }
            }
            seeds = kept;
            debug!("Category scope {} keeps {} courses", scope, seeds.len());
        }

        Ok(seeds)
    }
}
