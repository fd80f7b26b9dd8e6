//! Reshaping of the engine's native result into the public response.

use chrono::DateTime;
use serde_json::Value;
use tracing::warn;

use crate::doc_id;
use crate::engine::{Document, EngineResult, RawHeatmap, RawTimeFacet};
use crate::error::{QueryError, Result};
use crate::gap::Gap;
use crate::model::{FacetValue, HeatmapFacet, SearchResponse, TimeFacet, Timing, fields};
use crate::time_range::format_instant;

/// Heatmap coordinates are plain WGS84 degrees.
pub const PROJECTION: &str = "EPSG:4326";

/// Label of the root timing node, which covers the whole engine call.
pub const ROOT_TIMING_LABEL: &str = "callEngine.elapsed";

/// Largest tolerated disagreement between the engine's query time and its timing tree.
const TIMING_DRIFT_MILLIS: u64 = 5;

/// Build the /search response. `docs_requested` decides between `d.docs` absent and empty.
pub fn normalize_search(result: EngineResult, docs_requested: bool) -> Result<SearchResponse> {
    let docs = if docs_requested {
        Some(
            result
                .docs
                .into_iter()
                .map(normalize_document)
                .collect::<Result<Vec<_>>>()?,
        )
    } else {
        None
    };

    let mut user = None;
    let mut text = None;
    for facet in result.field_facets {
        let values = facet
            .values
            .into_iter()
            .map(|(value, count)| FacetValue { value, count })
            .collect();
        match facet.field.as_str() {
            fields::USER => user = Some(values),
            fields::TEXT => text = Some(values),
            other => warn!(field = other, "Ignoring facet on unexpected field"),
        }
    }

    Ok(SearchResponse {
        match_docs: result.match_count,
        docs,
        time: result.time_facet.map(normalize_time_facet).transpose()?,
        heatmap: result.heatmap.map(normalize_heatmap),
        user,
        text,
        timing: Some(normalize_timing(
            result.elapsed_millis,
            result.engine_millis,
            result.timing,
        )),
    })
}

/// Decode the identifier and check every other field is a string or a number.
///
/// Engine-internal fields (leading underscore) are dropped.
pub fn normalize_document(doc: Document) -> Result<Document> {
    let mut normalized = Document::new();
    for (name, value) in doc {
        if name.starts_with('_') {
            continue;
        }

        let value = if name == fields::ID {
            match value.as_i64() {
                Some(stored) => Value::String(doc_id::decode_to_string(stored)),
                None => {
                    return Err(QueryError::UnexpectedFieldType {
                        field: name,
                        kind: value_kind(&value),
                    });
                }
            }
        } else {
            match value {
                Value::String(_) | Value::Number(_) => value,
                other => {
                    return Err(QueryError::UnexpectedFieldType {
                        field: name,
                        kind: value_kind(&other),
                    });
                }
            }
        };
        normalized.insert(name, value);
    }
    Ok(normalized)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Convert the gap back to ISO-8601 and the bounds to canonical UTC instants.
pub fn normalize_time_facet(raw: RawTimeFacet) -> Result<TimeFacet> {
    let gap = Gap::parse_engine_native(&raw.gap)
        .map_err(|err| QueryError::engine(None, format!("engine returned gap {}: {err}", raw.gap)))?;

    Ok(TimeFacet {
        start: normalize_instant(&raw.start)?,
        end: normalize_instant(&raw.end)?,
        gap: gap.to_iso8601(),
        counts: raw
            .counts
            .into_iter()
            .map(|(value, count)| FacetValue { value, count })
            .collect(),
    })
}

fn normalize_instant(value: &str) -> Result<String> {
    DateTime::parse_from_rfc3339(value)
        .map(|instant| format_instant(instant.to_utc()))
        .map_err(|err| QueryError::engine(None, format!("engine returned instant {value}: {err}")))
}

/// Null rows and cells are kept as they are; they are not zeros.
pub fn normalize_heatmap(raw: RawHeatmap) -> HeatmapFacet {
    HeatmapFacet {
        grid_level: raw.grid_level,
        rows: raw.rows,
        columns: raw.columns,
        min_x: raw.min_x,
        max_x: raw.max_x,
        min_y: raw.min_y,
        max_y: raw.max_y,
        counts_ints_2d: raw.counts,
        projection: PROJECTION.to_string(),
    }
}

/// Wrap the engine's timing tree under a root node for the whole call.
pub fn normalize_timing(
    elapsed_millis: u64,
    engine_millis: Option<u64>,
    tree: Option<Timing>,
) -> Timing {
    if let (Some(reported), Some(tree)) = (engine_millis, tree.as_ref()) {
        if reported.abs_diff(tree.millis) > TIMING_DRIFT_MILLIS {
            warn!(
                reported,
                tree = tree.millis,
                "Engine query time disagrees with its timing tree"
            );
        }
    }

    Timing {
        label: ROOT_TIMING_LABEL.to_string(),
        millis: elapsed_millis,
        subs: tree.and_then(prune_timing).into_iter().collect(),
    }
}

/// Zero-millisecond nodes are the norm and only add noise.
fn prune_timing(node: Timing) -> Option<Timing> {
    if node.millis == 0 {
        return None;
    }
    Some(Timing {
        label: node.label,
        millis: node.millis,
        subs: node.subs.into_iter().filter_map(prune_timing).collect(),
    })
}
