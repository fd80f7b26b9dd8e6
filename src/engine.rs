//! The seam to the external full-text/geospatial index engine.
//!
//! [`EngineQuery`] is what the constraint builder produces and
//! [`EngineResult`] is what the normalizer consumes. Neither mentions a
//! particular engine; [`crate::solr`] translates them for Apache Solr.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::gap::Gap;
use crate::geo::{Point, Rectangle};
use crate::heatmap::GridResolution;
use crate::model::{CountsGrid, Timing};
use crate::time_range::TimeRange;

/// A document as the engine returns it: a flat field to value mapping.
pub type Document = Map<String, Value>;

/// Which endpoint a query serves; engines may route the two differently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueryPurpose {
    #[default]
    Search,
    /// Bulk retrieval; the engine must also report its configured field list.
    Export,
}

/// What a filter matches.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Exact value match.
    Term(String),
    TimeRange(TimeRange),
    GeoBox(Rectangle),
}

/// A filter on one field, optionally tagged so a facet can exclude it.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub tag: Option<String>,
    pub predicate: Predicate,
}

impl Filter {
    /// A filter tagged with its own field name.
    pub fn tagged(field: &str, predicate: Predicate) -> Self {
        Self {
            field: field.to_string(),
            tag: Some(field.to_string()),
            predicate,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SortSpec {
    /// Relevance, best first.
    Score,
    /// Field value, largest first.
    FieldDesc(String),
    /// Distance of `field` from `origin`, nearest first.
    Distance { field: String, origin: Point },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeFacetRequest {
    pub field: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub gap: Gap,
    pub exclude_tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapRequest {
    pub field: String,
    pub region: Rectangle,
    pub resolution: GridResolution,
    pub exclude_tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldFacetRequest {
    pub field: String,
    pub limit: u32,
    pub exclude_tag: Option<String>,
}

/// One request to the index engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineQuery {
    pub purpose: QueryPurpose,
    /// Relevance query; `None` matches everything.
    pub text: Option<String>,
    pub filters: Vec<Filter>,
    pub rows: u32,
    /// Omitted entirely when no rows are requested.
    pub sort: Option<SortSpec>,
    pub time_facet: Option<TimeFacetRequest>,
    pub heatmap: Option<HeatmapRequest>,
    pub field_facets: Vec<FieldFacetRequest>,
}

/// Raw time range facet counts.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTimeFacet {
    pub start: String,
    pub end: String,
    /// Engine-native gap, e.g. `+1DAYS`.
    pub gap: String,
    pub counts: Vec<(String, u64)>,
}

/// Raw heatmap grid.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHeatmap {
    pub grid_level: u32,
    pub rows: u32,
    pub columns: u32,
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    pub counts: Option<CountsGrid>,
}

/// Raw top-values counts for one field, highest count first.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFieldFacet {
    pub field: String,
    pub values: Vec<(String, u64)>,
}

/// Everything the engine returned for one [`EngineQuery`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineResult {
    pub match_count: u64,
    pub docs: Vec<Document>,
    pub time_facet: Option<RawTimeFacet>,
    pub heatmap: Option<RawHeatmap>,
    pub field_facets: Vec<RawFieldFacet>,
    /// The engine's own breakdown of where query time went.
    pub timing: Option<Timing>,
    /// Query time the engine reports for itself.
    pub engine_millis: Option<u64>,
    /// Wall-clock time of the call, measured by the client.
    pub elapsed_millis: u64,
    /// The engine's configured returned-field list; present for exports.
    pub field_list: Option<Vec<String>>,
}

/// An index engine able to execute [`EngineQuery`]s.
///
/// Implementations own their connection handling; this crate never retries.
#[async_trait]
pub trait IndexEngine: Send + Sync {
    async fn query(&self, query: &EngineQuery) -> Result<EngineResult>;

    /// Cheap liveness check.
    async fn ping(&self) -> Result<()>;
}
