//! Data models for the search service.
//!
//! Request parameter structs deserialize straight from the query string, so
//! their serde names are the public parameter names (`q.text`, `a.hm.limit`,
//! ...). Response structs serialize to the public JSON contract, where an
//! absent key means "not requested".

use serde::{Deserialize, Serialize};

/// Field names in the index schema.
pub mod fields {
    /// Document identifier, stored as a sortable signed 64-bit value.
    pub const ID: &str = "id";
    pub const TIME_FILTER: &str = "created_at";
    /// The identifier is time based, so sorting by it is sorting by time.
    pub const TIME_SORT: &str = "id";
    pub const GEO_FILTER: &str = "coord_rpt";
    /// Heatmap field; its units are degrees.
    pub const GEO_HEATMAP: &str = "coord_rpt";
    /// Point field used for distance sorting.
    pub const GEO_SORT: &str = "coord";
    pub const TEXT: &str = "text";
    pub const USER: &str = "user_name";
}

/// Bounds on request parameters.
pub mod limits {
    pub const SEARCH_DOCS: u32 = 100;
    pub const EXPORT_DOCS: u32 = 100;
    pub const TIME_FACET: u32 = 1000;
    pub const HEATMAP_CELLS: u32 = 10_000;
    pub const GRID_LEVEL: u32 = 100;
    pub const FIELD_FACET: u32 = 1000;
}

/// How documents are ordered before the top N are returned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocSort {
    /// Keyword relevancy. Needs `q.text`; falls back to `Time` without it.
    #[default]
    Score,
    /// Time descending.
    Time,
    /// Distance from the centre of `q.geo`, nearest first.
    Distance,
}

/// The `q.*` constraint parameters shared by every endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstraintParams {
    pub text: Option<String>,
    pub user: Option<String>,
    pub time: Option<String>,
    pub geo: Option<String>,
}

/// Query parameters for GET /search.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    /// Keyword search query.
    #[serde(rename = "q.text")]
    pub q_text: Option<String>,

    /// Exact user match.
    #[serde(rename = "q.user")]
    pub q_user: Option<String>,

    /// `[A TO B]`; each side `*`, `2013-03-01`, or `2013-03-01T00:00:00`.
    #[serde(rename = "q.time")]
    pub q_time: Option<String>,

    /// `[lat,lon TO lat,lon]`, lower-left to upper-right.
    #[serde(rename = "q.geo")]
    pub q_geo: Option<String>,

    /// How many documents to return (default: 0).
    #[serde(rename = "d.docs.limit", default)]
    pub docs_limit: u32,

    #[serde(rename = "d.docs.sort", default)]
    pub docs_sort: DocSort,

    /// Non-zero triggers time range faceting; a soft maximum on bucket count.
    #[serde(rename = "a.time.limit", default)]
    pub time_limit: u32,

    /// Explicit bucket width, e.g. `P1D`. Overrides `a.time.limit`.
    #[serde(rename = "a.time.gap")]
    pub time_gap: Option<String>,

    /// Range to bucket. Defaults to `q.time`, else the last 90 days.
    #[serde(rename = "a.time.filter")]
    pub time_filter: Option<String>,

    /// Non-zero triggers heatmap faceting; a soft maximum on cell count.
    #[serde(rename = "a.hm.limit", default)]
    pub heatmap_limit: u32,

    /// Explicit grid level. Overrides `a.hm.limit`.
    #[serde(rename = "a.hm.gridLevel")]
    pub heatmap_grid_level: Option<u32>,

    /// Region to plot. Defaults to `q.geo`, else the world.
    #[serde(rename = "a.hm.filter")]
    pub heatmap_filter: Option<String>,

    /// Most frequent words.
    #[serde(rename = "a.text.limit", default)]
    pub text_limit: u32,

    /// Most frequent users.
    #[serde(rename = "a.user.limit", default)]
    pub user_limit: u32,
}

impl SearchParams {
    pub fn constraints(&self) -> ConstraintParams {
        ConstraintParams {
            text: self.q_text.clone(),
            user: self.q_user.clone(),
            time: self.q_time.clone(),
            geo: self.q_geo.clone(),
        }
    }
}

/// Query parameters for GET /export.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportParams {
    #[serde(rename = "q.text")]
    pub q_text: Option<String>,

    #[serde(rename = "q.user")]
    pub q_user: Option<String>,

    #[serde(rename = "q.time")]
    pub q_time: Option<String>,

    #[serde(rename = "q.geo")]
    pub q_geo: Option<String>,

    /// Required; 1 to 100.
    #[serde(rename = "d.docs.limit")]
    pub docs_limit: Option<u32>,
}

impl ExportParams {
    pub fn constraints(&self) -> ConstraintParams {
        ConstraintParams {
            text: self.q_text.clone(),
            user: self.q_user.clone(),
            time: self.q_time.clone(),
            geo: self.q_geo.clone(),
        }
    }
}

/// A time range facet request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeFacetSpec {
    pub limit: u32,
    pub explicit_gap: Option<String>,
    /// Raw `[A TO B]`; `None` falls back to `q.time`.
    pub filter_range: Option<String>,
}

/// A heatmap facet request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeatmapSpec {
    pub limit: u32,
    pub explicit_grid_level: Option<u32>,
    /// Raw `[lat,lon TO lat,lon]`; `None` falls back to `q.geo`.
    pub filter_rect: Option<String>,
}

/// A top-values facet on one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFacetSpec {
    pub field: String,
    pub limit: u32,
    /// Count as if this field's own filter were absent (multi-select faceting).
    pub exclude_self_filter: bool,
}

/// A value and how many matching documents carry it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetValue {
    pub value: String,
    pub count: u64,
}

/// Rows of heatmap counts. A `None` row or cell means no data, which is not the same as 0.
pub type CountsGrid = Vec<Option<Vec<Option<u64>>>>;

/// Response block for `a.time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeFacet {
    pub start: String,
    pub end: String,
    /// ISO-8601, e.g. `P1D`.
    pub gap: String,
    pub counts: Vec<FacetValue>,
}

/// Response block for `a.hm`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapFacet {
    #[serde(rename = "gridLevel")]
    pub grid_level: u32,
    pub rows: u32,
    pub columns: u32,
    #[serde(rename = "minX")]
    pub min_x: f64,
    #[serde(rename = "maxX")]
    pub max_x: f64,
    #[serde(rename = "minY")]
    pub min_y: f64,
    #[serde(rename = "maxY")]
    pub max_y: f64,
    /// Top row first. `null` when every count would be 0.
    #[serde(rename = "counts_ints2D")]
    pub counts_ints_2d: Option<CountsGrid>,
    pub projection: String,
}

/// A node of the timing tree returned with each search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timing {
    pub label: String,
    pub millis: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subs: Vec<Timing>,
}

/// Response for GET /search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResponse {
    #[serde(rename = "a.matchDocs")]
    pub match_docs: u64,

    /// `None` when no documents were requested; `Some(vec![])` when requested but none matched.
    #[serde(rename = "d.docs", skip_serializing_if = "Option::is_none")]
    pub docs: Option<Vec<serde_json::Map<String, serde_json::Value>>>,

    #[serde(rename = "a.time", skip_serializing_if = "Option::is_none")]
    pub time: Option<TimeFacet>,

    #[serde(rename = "a.hm", skip_serializing_if = "Option::is_none")]
    pub heatmap: Option<HeatmapFacet>,

    #[serde(rename = "a.user", skip_serializing_if = "Option::is_none")]
    pub user: Option<Vec<FacetValue>>,

    #[serde(rename = "a.text", skip_serializing_if = "Option::is_none")]
    pub text: Option<Vec<FacetValue>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing: Option<Timing>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_sort_default_is_score() {
        assert_eq!(DocSort::default(), DocSort::Score);
        let sort: DocSort = serde_json::from_str("\"distance\"").unwrap();
        assert_eq!(sort, DocSort::Distance);
    }

    #[test]
    fn test_absent_keys_mean_not_requested() {
        let response = SearchResponse {
            match_docs: 3,
            docs: None,
            time: None,
            heatmap: None,
            user: None,
            text: None,
            timing: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json, serde_json::json!({ "a.matchDocs": 3 }));

        let requested = SearchResponse {
            docs: Some(vec![]),
            ..response
        };
        let json = serde_json::to_value(&requested).unwrap();
        assert_eq!(json["d.docs"], serde_json::json!([]));
    }

    #[test]
    fn test_heatmap_nulls_survive_serialization() {
        let heatmap = HeatmapFacet {
            grid_level: 5,
            rows: 2,
            columns: 2,
            min_x: -80.0,
            max_x: -60.0,
            min_y: 30.0,
            max_y: 50.0,
            counts_ints_2d: Some(vec![None, Some(vec![Some(0), None])]),
            projection: "EPSG:4326".to_string(),
        };
        let json = serde_json::to_value(&heatmap).unwrap();
        assert_eq!(json["counts_ints2D"], serde_json::json!([null, [0, null]]));
        assert_eq!(json["gridLevel"], 5);

        let empty = HeatmapFacet {
            counts_ints_2d: None,
            ..heatmap
        };
        let json = serde_json::to_value(&empty).unwrap();
        assert!(json.as_object().unwrap().contains_key("counts_ints2D"));
        assert!(json["counts_ints2D"].is_null());
    }

    #[test]
    fn test_timing_omits_empty_subs() {
        let timing = Timing {
            label: "QTime".to_string(),
            millis: 4,
            subs: vec![],
        };
        assert_eq!(
            serde_json::to_value(&timing).unwrap(),
            serde_json::json!({ "label": "QTime", "millis": 4 })
        );
    }
}
