//! Counter types and the counter registry.
//!
//! A counter is one column of the activity report: a named aggregation over
//! one activity record store (quiz attempts, forum posts, and so on) plus
//! the synthetic `total` column. The registry declares the full ordered set
//! of counters, resolves names to counters, and answers which counters are
//! currently backed by a visible activity module.

pub mod queries;

pub use queries::{AggregationQuery, JoinHop, Measure};

use crate::aggregator::AggregationError;
use crate::source::ModuleDirectory;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

/// One counter column of the report.
///
/// The variant order is the report's column order; `Total` is always last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterKind {
    /// Quiz attempts per course.
    Quiz,
    /// Forum posts per course.
    Forum,
    /// Turnitin submissions per course.
    Turnitin,
    /// Assignment submissions per course.
    Assignment,
    /// Choice responses per course.
    Choice,
    /// Wiki page edits per course.
    Wiki,
    /// Questionnaire responses per course.
    Questionnaire,
    /// SCORM attempts per course, counted as each user's highest attempt
    /// number per package.
    Scorm,
    /// Derived sum of every other column. Never aggregated or cached on
    /// its own.
    Total,
}

impl CounterKind {
    /// All counters in report column order.
    pub const ALL: [CounterKind; 9] = [
        CounterKind::Quiz,
        CounterKind::Forum,
        CounterKind::Turnitin,
        CounterKind::Assignment,
        CounterKind::Choice,
        CounterKind::Wiki,
        CounterKind::Questionnaire,
        CounterKind::Scorm,
        CounterKind::Total,
    ];

    /// The stable machine name, used in cache keys and CLI arguments.
    pub fn name(&self) -> &'static str {
        match self {
            CounterKind::Quiz => "quiz",
            CounterKind::Forum => "forum",
            CounterKind::Turnitin => "turnitin",
            CounterKind::Assignment => "assignment",
            CounterKind::Choice => "choice",
            CounterKind::Wiki => "wiki",
            CounterKind::Questionnaire => "questionnaire",
            CounterKind::Scorm => "scorm",
            CounterKind::Total => "total",
        }
    }

    /// The human-readable column heading.
    pub fn label(&self) -> &'static str {
        match self {
            CounterKind::Quiz => "Quiz Attempts",
            CounterKind::Forum => "Forum Posts",
            CounterKind::Turnitin => "Turnitin Submissions",
            CounterKind::Assignment => "Assignment Submissions",
            CounterKind::Choice => "Choice Responses",
            CounterKind::Wiki => "Wiki Edits",
            CounterKind::Questionnaire => "Questionnaire Responses",
            CounterKind::Scorm => "SCORM Attempts",
            CounterKind::Total => "Total Activity",
        }
    }

    /// The activity module that backs this counter, if any. `Total` has
    /// none.
    pub fn module(&self) -> Option<&'static str> {
        match self {
            CounterKind::Quiz => Some("quiz"),
            CounterKind::Forum => Some("forum"),
            CounterKind::Turnitin => Some("turnitintool"),
            CounterKind::Assignment => Some("assign"),
            CounterKind::Choice => Some("choice"),
            CounterKind::Wiki => Some("wiki"),
            CounterKind::Questionnaire => Some("questionnaire"),
            CounterKind::Scorm => Some("scorm"),
            CounterKind::Total => None,
        }
    }

    /// Resolves a machine name back to a counter.
    pub fn from_name(name: &str) -> Option<CounterKind> {
        CounterKind::ALL.into_iter().find(|k| k.name() == name)
    }

    /// Whether this is the synthetic total column.
    pub fn is_total(&self) -> bool {
        matches!(self, CounterKind::Total)
    }
}

impl fmt::Display for CounterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A counter together with its aggregation query. The total column carries
/// no query.
#[derive(Debug, Clone)]
pub struct CounterDef {
    /// Which counter this entry declares.
    pub kind: CounterKind,
    /// How to aggregate it from the record stores. `None` for `Total`.
    pub query: Option<AggregationQuery>,
}

/// The ordered set of counters the report knows about.
///
/// The set itself is fixed at construction; what varies per run is
/// availability, which is probed through the module directory the first
/// time it is needed and then held for the lifetime of the registry.
pub struct CounterRegistry {
    defs: Vec<CounterDef>,
    modules: Arc<dyn ModuleDirectory>,
    availability: OnceCell<BTreeMap<CounterKind, bool>>,
}

impl CounterRegistry {
    /// Creates the registry with the built-in counter set, probing module
    /// visibility through `modules`.
    pub fn new(modules: Arc<dyn ModuleDirectory>) -> Self {
        let defs = CounterKind::ALL
            .into_iter()
            .map(|kind| CounterDef {
                kind,
                query: AggregationQuery::for_kind(kind),
            })
            .collect();
        Self {
            defs,
            modules,
            availability: OnceCell::new(),
        }
    }

    /// All counter definitions in column order.
    pub fn defs(&self) -> &[CounterDef] {
        &self.defs
    }

    /// All counter kinds in column order.
    pub fn kinds(&self) -> Vec<CounterKind> {
        self.defs.iter().map(|d| d.kind).collect()
    }

    /// Resolves a counter name, rejecting names outside the declared set.
    pub fn lookup(&self, name: &str) -> Result<CounterKind, AggregationError> {
        CounterKind::from_name(name)
            .ok_or_else(|| AggregationError::UnknownCounterType(name.to_string()))
    }

    /// The aggregation query for a counter, if it has one.
    pub fn query_for(&self, kind: CounterKind) -> Option<&AggregationQuery> {
        self.defs
            .iter()
            .find(|d| d.kind == kind)
            .and_then(|d| d.query.as_ref())
    }

    /// Whether a counter's backing module is visible. `Total` is always
    /// available.
    pub async fn is_available(&self, kind: CounterKind) -> Result<bool, AggregationError> {
        if kind.is_total() {
            return Ok(true);
        }
        let availability = self.availability().await?;
        Ok(availability.get(&kind).copied().unwrap_or(false))
    }

    /// The counters whose backing module is visible, plus `Total`, in
    /// column order.
    pub async fn enabled_kinds(&self) -> Result<Vec<CounterKind>, AggregationError> {
        let availability = self.availability().await?;
        Ok(self
            .defs
            .iter()
            .map(|d| d.kind)
            .filter(|kind| kind.is_total() || availability.get(kind).copied().unwrap_or(false))
            .collect())
    }

    /// Probes module visibility once per registry and returns the held
    /// result on every later call, even if the directory would now answer
    /// differently.
    async fn availability(&self) -> Result<&BTreeMap<CounterKind, bool>, AggregationError> {
        self.availability
            .get_or_try_init(|| async {
                let mut map = BTreeMap::new();
                for def in &self.defs {
                    let Some(module) = def.kind.module() else {
                        continue;
                    };
                    let visible = self.modules.is_module_visible(module).await.map_err(
                        |source| AggregationError::DataAccess {
                            context: format!("availability probe for counter `{}`", def.kind),
                            source,
                        },
                    )?;
                    debug!("Module {} visible: {}", module, visible);
                    map.insert(def.kind, visible);
                }
                Ok(map)
            })
            .await
    }
}
