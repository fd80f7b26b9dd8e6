//! Apache Solr client.
//!
//! Translates an [`EngineQuery`] into Solr request parameters (local-params
//! tags for filters, `{!ex=..}` for facet exclusion) and parses Solr's JSON
//! response back into an [`EngineResult`]. The translation and parsing are
//! pure functions so they can be checked without a running Solr.
//!
//! # API Reference
//!
//! See: <https://solr.apache.org/guide/solr/latest/query-guide/faceting.html>

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::config::SolrConfig;
use crate::engine::{
    Document, EngineQuery, EngineResult, Filter, IndexEngine, Predicate, QueryPurpose,
    RawFieldFacet, RawHeatmap, RawTimeFacet, SortSpec,
};
use crate::error::{QueryError, Result};
use crate::heatmap::GridResolution;
use crate::model::{CountsGrid, Timing};
use crate::time_range::format_instant;

/// Label of the engine's own timing tree.
pub const QTIME_LABEL: &str = "QTime";

/// Client for one Solr collection.
#[derive(Clone)]
pub struct SolrEngine {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    search_handler: String,
    export_handler: String,
    extra_params: Vec<(String, String)>,
}

impl SolrEngine {
    pub fn new(config: &SolrConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            search_handler: config.search_handler.clone(),
            export_handler: config.export_handler.clone(),
            extra_params: config.extra_params.clone(),
        })
    }

    /// Create a client against a given base URL with default handlers (for testing).
    pub fn with_base_url(base_url: &str, collection: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
            search_handler: "/select".to_string(),
            export_handler: "/select".to_string(),
            extra_params: Vec::new(),
        }
    }

    fn handler_url(&self, purpose: QueryPurpose) -> String {
        let handler = match purpose {
            QueryPurpose::Search => &self.search_handler,
            QueryPurpose::Export => &self.export_handler,
        };
        format!("{}/{}{}", self.base_url, self.collection, handler)
    }
}

#[async_trait]
impl IndexEngine for SolrEngine {
    #[instrument(skip(self, query), fields(purpose = ?query.purpose, rows = query.rows))]
    async fn query(&self, query: &EngineQuery) -> Result<EngineResult> {
        let mut params = params(query);
        params.extend(self.extra_params.iter().cloned());
        let url = self.handler_url(query.purpose);
        debug!(%url, ?params, "Sending Solr request");

        let started = Instant::now();
        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| QueryError::engine(None, format!("Solr request failed: {e}")))?;
        let status = response.status();
        let body = response.json::<Value>().await;
        let elapsed_millis = started.elapsed().as_millis() as u64;

        let body = match body {
            Ok(body) => body,
            Err(e) if status.is_success() => {
                return Err(QueryError::engine(None, format!("Unreadable Solr response: {e}")));
            }
            Err(_) => {
                return Err(QueryError::engine(
                    Some(status.as_u16()),
                    format!("Solr returned {status}"),
                ));
            }
        };

        if !status.is_success() {
            return Err(error_from_body(status.as_u16(), &body));
        }
        parse_response(&body, query, elapsed_millis)
    }

    async fn ping(&self) -> Result<()> {
        let url = format!("{}/{}/admin/ping", self.base_url, self.collection);
        let response = self
            .client
            .get(&url)
            .query(&[("wt", "json")])
            .send()
            .await
            .map_err(|e| QueryError::engine(None, format!("Solr ping failed: {e}")))?;
        let status = response.status();
        let body = response
            .json::<Value>()
            .await
            .map_err(|e| QueryError::engine(Some(status.as_u16()), format!("Unreadable ping: {e}")))?;

        match body.get("status").and_then(Value::as_str) {
            Some("OK") => Ok(()),
            other => {
                warn!(http_status = %status, solr_status = ?other, "Solr ping unhealthy");
                Err(QueryError::engine(
                    Some(status.as_u16()),
                    format!("Solr ping status {other:?}"),
                ))
            }
        }
    }
}

/// Solr request parameters for `query`, in a stable order.
pub fn params(query: &EngineQuery) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = Vec::new();
    let mut push = |key: &str, value: String| params.push((key.to_string(), value));

    push("wt", "json".to_string());
    push("debug", "timing".to_string());
    push("q", query.text.clone().unwrap_or_else(|| "*:*".to_string()));
    for filter in &query.filters {
        push("fq", filter_query(filter));
    }

    push("rows", query.rows.to_string());
    match &query.sort {
        Some(SortSpec::Score) => push("sort", "score desc".to_string()),
        Some(SortSpec::FieldDesc(field)) => push("sort", format!("{field} desc")),
        Some(SortSpec::Distance { field, origin }) => {
            push("sort", "geodist() asc".to_string());
            push("sfield", field.clone());
            push("pt", origin.to_lat_lon());
        }
        None => {}
    }

    let faceting = query.time_facet.is_some()
        || query.heatmap.is_some()
        || !query.field_facets.is_empty();
    if faceting {
        push("facet", "true".to_string());
    }

    if let Some(facet) = &query.time_facet {
        let field = &facet.field;
        push("facet.range", with_exclusion(&facet.exclude_tag, field));
        push(
            &format!("f.{field}.facet.range.start"),
            format_instant(facet.start),
        );
        push(&format!("f.{field}.facet.range.end"), format_instant(facet.end));
        push(
            &format!("f.{field}.facet.range.gap"),
            facet.gap.to_engine_native(),
        );
        push(&format!("f.{field}.facet.mincount"), "1".to_string());
    }

    if let Some(heatmap) = &query.heatmap {
        push(
            "facet.heatmap",
            with_exclusion(&heatmap.exclude_tag, &heatmap.field),
        );
        push("facet.heatmap.geom", heatmap.region.to_string());
        match heatmap.resolution {
            GridResolution::Level(level) => push("facet.heatmap.gridLevel", level.to_string()),
            GridResolution::MaxCellError(err) => {
                push("facet.heatmap.distErr", (err as f32).to_string())
            }
        }
    }

    for facet in &query.field_facets {
        let field = &facet.field;
        push("facet.field", with_exclusion(&facet.exclude_tag, field));
        push(&format!("f.{field}.facet.limit"), facet.limit.to_string());
        push(&format!("f.{field}.facet.mincount"), "1".to_string());
    }

    if query.purpose == QueryPurpose::Export {
        push("echoParams", "all".to_string());
    }
    params
}

fn filter_query(filter: &Filter) -> String {
    let tag = filter
        .tag
        .as_ref()
        .map(|tag| format!(" tag={tag}"))
        .unwrap_or_default();
    match &filter.predicate {
        Predicate::Term(value) => format!("{{!field f={}{tag}}}{value}", filter.field),
        Predicate::TimeRange(range) => format!("{{!field{tag} f={}}}{range}", filter.field),
        Predicate::GeoBox(rect) => format!("{{!lucene{tag} df={}}}{rect}", filter.field),
    }
}

fn with_exclusion(tag: &Option<String>, field: &str) -> String {
    match tag {
        Some(tag) => format!("{{!ex={tag}}}{field}"),
        None => field.to_string(),
    }
}

/// Turn a non-2xx Solr body into an error, preferring Solr's own code and message.
pub fn error_from_body(http_status: u16, body: &Value) -> QueryError {
    let error = body.get("error");
    let code = error
        .and_then(|e| e.get("code"))
        .and_then(Value::as_u64)
        .and_then(|c| u16::try_from(c).ok())
        .unwrap_or(http_status);
    let message = error
        .and_then(|e| e.get("msg"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Solr returned HTTP {http_status}"));
    QueryError::engine(Some(code), message)
}

/// Parse a successful Solr response to `query`.
pub fn parse_response(body: &Value, query: &EngineQuery, elapsed_millis: u64) -> Result<EngineResult> {
    let response = body
        .get("response")
        .ok_or_else(|| malformed_response("missing response"))?;
    let match_count = response
        .get("numFound")
        .and_then(Value::as_u64)
        .ok_or_else(|| malformed_response("missing numFound"))?;
    let docs = match response.get("docs") {
        Some(Value::Array(docs)) => docs
            .iter()
            .map(|doc| match doc {
                Value::Object(map) => Ok(map.clone()),
                _ => Err(malformed_response("document is not an object")),
            })
            .collect::<Result<Vec<Document>>>()?,
        _ => Vec::new(),
    };

    let header = body.get("responseHeader");
    let engine_millis = header.and_then(|h| h.get("QTime")).and_then(Value::as_u64);
    let timing = body
        .pointer("/debug/timing")
        .map(|tree| timing_node(QTIME_LABEL, tree));

    let facets = body.get("facet_counts");
    let facet_section = |name: &str, field: &str| {
        facets
            .and_then(|f| f.get(name))
            .and_then(|section| section.get(field))
            .ok_or_else(|| malformed_response(&format!("missing {name}.{field}")))
    };

    let time_facet = match &query.time_facet {
        Some(request) => Some(parse_range_facet(facet_section(
            "facet_ranges",
            &request.field,
        )?)?),
        None => None,
    };

    let heatmap = match &query.heatmap {
        Some(request) => Some(parse_heatmap(facet_section(
            "facet_heatmaps",
            &request.field,
        )?)?),
        None => None,
    };

    let field_facets = query
        .field_facets
        .iter()
        .map(|request| {
            let values = facet_section("facet_fields", &request.field)?;
            Ok(RawFieldFacet {
                field: request.field.clone(),
                values: counts(values)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let field_list = header
        .and_then(|h| h.pointer("/params/fl"))
        .and_then(parse_field_list);

    Ok(EngineResult {
        match_count,
        docs,
        time_facet,
        heatmap,
        field_facets,
        timing,
        engine_millis,
        elapsed_millis,
        field_list,
    })
}

fn malformed_response(what: &str) -> QueryError {
    QueryError::engine(None, format!("Malformed Solr response: {what}"))
}

/// Entries of a Solr named list, in either the flat `[k, v, k, v]` or the map form.
fn named_list(value: &Value) -> Result<Vec<(&str, &Value)>> {
    match value {
        Value::Object(map) => Ok(map.iter().map(|(k, v)| (k.as_str(), v)).collect()),
        Value::Array(items) => {
            if items.len() % 2 != 0 {
                return Err(malformed_response("odd-length named list"));
            }
            items
                .chunks(2)
                .map(|pair| match pair[0].as_str() {
                    Some(key) => Ok((key, &pair[1])),
                    None => Err(malformed_response("named list key is not a string")),
                })
                .collect()
        }
        _ => Err(malformed_response("expected a named list")),
    }
}

fn counts(value: &Value) -> Result<Vec<(String, u64)>> {
    named_list(value)?
        .into_iter()
        .map(|(key, count)| match count.as_u64() {
            Some(count) => Ok((key.to_string(), count)),
            None => Err(malformed_response("facet count is not a number")),
        })
        .collect()
}

fn parse_range_facet(value: &Value) -> Result<RawTimeFacet> {
    let text = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| malformed_response(&format!("range facet missing {key}")))
    };
    Ok(RawTimeFacet {
        start: text("start")?,
        end: text("end")?,
        gap: text("gap")?,
        counts: counts(
            value
                .get("counts")
                .ok_or_else(|| malformed_response("range facet missing counts"))?,
        )?,
    })
}

fn parse_heatmap(value: &Value) -> Result<RawHeatmap> {
    let entries = named_list(value)?;
    let get = |key: &str| {
        entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| *v)
            .ok_or_else(|| malformed_response(&format!("heatmap missing {key}")))
    };
    let int = |key: &str| -> Result<u32> {
        get(key)?
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| malformed_response(&format!("heatmap {key} is not an integer")))
    };
    let float = |key: &str| -> Result<f64> {
        get(key)?
            .as_f64()
            .ok_or_else(|| malformed_response(&format!("heatmap {key} is not a number")))
    };

    Ok(RawHeatmap {
        grid_level: int("gridLevel")?,
        rows: int("rows")?,
        columns: int("columns")?,
        min_x: float("minX")?,
        max_x: float("maxX")?,
        min_y: float("minY")?,
        max_y: float("maxY")?,
        counts: match get("counts_ints2D") {
            Ok(grid) => parse_grid(grid)?,
            Err(_) => None,
        },
    })
}

fn parse_grid(value: &Value) -> Result<Option<CountsGrid>> {
    let cell = |value: &Value| match value {
        Value::Null => Ok(None),
        other => other
            .as_u64()
            .map(Some)
            .ok_or_else(|| malformed_response("heatmap cell is not a count")),
    };
    let row = |value: &Value| match value {
        Value::Null => Ok(None),
        Value::Array(cells) => cells.iter().map(cell).collect::<Result<Vec<_>>>().map(Some),
        _ => Err(malformed_response("heatmap row is not an array")),
    };
    match value {
        Value::Null => Ok(None),
        Value::Array(rows) => rows.iter().map(row).collect::<Result<Vec<_>>>().map(Some),
        _ => Err(malformed_response("heatmap counts are not an array")),
    }
}

/// Solr reports `{"time": 3.0, "prepare": {"time": 0.0, ...}, ...}`; every non-`time` key is a child.
fn timing_node(label: &str, value: &Value) -> Timing {
    let millis = value
        .get("time")
        .and_then(Value::as_f64)
        .map(|t| t.max(0.0).trunc() as u64)
        .unwrap_or(0);
    let subs = match value {
        Value::Object(map) => map
            .iter()
            .filter(|(key, child)| key.as_str() != "time" && child.is_object())
            .map(|(key, child)| timing_node(key, child))
            .collect(),
        _ => Vec::new(),
    };
    Timing {
        label: label.to_string(),
        millis,
        subs,
    }
}

fn parse_field_list(value: &Value) -> Option<Vec<String>> {
    let joined = match value {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(","),
        _ => return None,
    };
    let fields: Vec<String> = joined
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect();
    (!fields.is_empty()).then_some(fields)
}
