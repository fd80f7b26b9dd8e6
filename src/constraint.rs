//! Translation of request parameters into an [`EngineQuery`].
//!
//! All parsing and validation happens here, before the engine is called.
//! Every filter is tagged with its field name so that a facet on the same
//! field can exclude it (multi-select faceting): the time facet ignores
//! `q.time`, the heatmap ignores `q.geo`, and the user facet ignores `q.user`.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::engine::{
    EngineQuery, FieldFacetRequest, Filter, HeatmapRequest, Predicate, QueryPurpose, SortSpec,
    TimeFacetRequest,
};
use crate::error::{QueryError, Result};
use crate::gap::Gap;
use crate::geo::{Rectangle, WORLD, parse_geo_box};
use crate::heatmap::GridResolution;
use crate::model::{
    ConstraintParams, DocSort, ExportParams, FieldFacetSpec, HeatmapSpec, SearchParams,
    TimeFacetSpec, fields, limits,
};
use crate::time_range::{TimeRange, parse_time_range};

/// How far back a time facet reaches when its range has no start.
const DEFAULT_TIME_FACET_DAYS: i64 = 90;

/// Parsed and validated `q.*` constraints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Constraints {
    pub text: Option<String>,
    pub user: Option<String>,
    pub time: Option<TimeRange>,
    pub geo: Option<Rectangle>,
}

impl Constraints {
    /// Parse every constraint eagerly so later stages only see typed values.
    pub fn parse(params: &ConstraintParams) -> Result<Self> {
        Ok(Self {
            text: non_empty("q.text", params.text.as_deref())?,
            user: non_empty("q.user", params.user.as_deref())?,
            time: params.time.as_deref().map(parse_time_range).transpose()?,
            geo: params.geo.as_deref().map(parse_geo_box).transpose()?,
        })
    }

    /// Add the relevance query and the tagged filters to `query`.
    pub fn apply(&self, query: &mut EngineQuery) {
        if let Some(text) = &self.text {
            query.text = Some(text.clone());
        }

        if let Some(user) = &self.user {
            query
                .filters
                .push(Filter::tagged(fields::USER, Predicate::Term(user.clone())));
        }

        if let Some(time) = self.time {
            query
                .filters
                .push(Filter::tagged(fields::TIME_FILTER, Predicate::TimeRange(time)));
        }

        if let Some(geo) = self.geo {
            query
                .filters
                .push(Filter::tagged(fields::GEO_FILTER, Predicate::GeoBox(geo)));
        }
    }
}

fn non_empty(name: &str, value: Option<&str>) -> Result<Option<String>> {
    match value {
        Some("") => Err(QueryError::malformed(format!("{name} must not be empty"))),
        other => Ok(other.map(str::to_string)),
    }
}

fn check_max(name: &str, value: u32, max: u32) -> Result<()> {
    if value > max {
        return Err(QueryError::malformed(format!(
            "{name} must be at most {max} but got {value}"
        )));
    }
    Ok(())
}

/// The sort actually applied: score without a text query falls back to time.
pub fn effective_sort(requested: DocSort, has_text: bool) -> DocSort {
    match requested {
        DocSort::Score if !has_text => DocSort::Time,
        other => other,
    }
}

/// Set the row count and, when rows are requested, the sort.
pub fn request_docs(
    limit: u32,
    sort: DocSort,
    constraints: &Constraints,
    query: &mut EngineQuery,
) -> Result<()> {
    query.rows = limit;
    if limit == 0 {
        return Ok(());
    }

    query.sort = Some(match effective_sort(sort, constraints.text.is_some()) {
        DocSort::Score => SortSpec::Score,
        DocSort::Time => SortSpec::FieldDesc(fields::TIME_SORT.to_string()),
        DocSort::Distance => {
            let geo = constraints.geo.ok_or_else(|| {
                QueryError::MissingDependency("can't sort by distance without q.geo".to_string())
            })?;
            SortSpec::Distance {
                field: fields::GEO_SORT.to_string(),
                origin: geo.center(),
            }
        }
    });
    Ok(())
}

/// Request time range faceting over `spec.filter_range`, or `q.time`, or the last 90 days.
pub fn request_time_facet(
    spec: &TimeFacetSpec,
    constraints: &Constraints,
    now: DateTime<Utc>,
    query: &mut EngineQuery,
) -> Result<()> {
    let range = match spec.filter_range.as_deref() {
        Some(filter) => parse_time_range(filter)?,
        None => constraints.time.unwrap_or(TimeRange::open()),
    };
    let start = range
        .start
        .unwrap_or(now - Duration::days(DEFAULT_TIME_FACET_DAYS));
    let end = range.end.unwrap_or(now);
    let filled = TimeRange {
        start: Some(start),
        end: Some(end),
    };

    let range_duration = end - start;
    if range_duration < Duration::zero() {
        return Err(QueryError::InvalidRange(format!(
            "date ordering problem: {filled}"
        )));
    }

    let gap = match spec.explicit_gap.as_deref() {
        Some(gap) => Gap::parse_iso8601(gap)?,
        None => Gap::compute_auto(range_duration, spec.limit),
    };
    gap.ensure_bucket_cap(range_duration, &filled.to_string())?;

    query.time_facet = Some(TimeFacetRequest {
        field: fields::TIME_FILTER.to_string(),
        start,
        end,
        gap,
        exclude_tag: Some(fields::TIME_FILTER.to_string()),
    });
    Ok(())
}

/// Request a heatmap over `spec.filter_rect`, or `q.geo`, or the whole world.
pub fn request_heatmap_facet(
    spec: &HeatmapSpec,
    constraints: &Constraints,
    query: &mut EngineQuery,
) -> Result<()> {
    let region = match spec.filter_rect.as_deref() {
        Some(filter) => parse_geo_box(filter)?,
        None => constraints.geo.unwrap_or(WORLD),
    };

    query.heatmap = Some(HeatmapRequest {
        field: fields::GEO_HEATMAP.to_string(),
        region,
        resolution: GridResolution::choose(spec.limit, &region, spec.explicit_grid_level),
        exclude_tag: Some(fields::GEO_FILTER.to_string()),
    });
    Ok(())
}

/// Request the top `spec.limit` values of `spec.field`.
pub fn request_field_facet(spec: &FieldFacetSpec, query: &mut EngineQuery) {
    query.field_facets.push(FieldFacetRequest {
        field: spec.field.clone(),
        limit: spec.limit,
        exclude_tag: spec.exclude_self_filter.then(|| spec.field.clone()),
    });
}

/// Build the engine query for GET /search.
pub fn build_search_query(params: &SearchParams, now: DateTime<Utc>) -> Result<EngineQuery> {
    check_max("d.docs.limit", params.docs_limit, limits::SEARCH_DOCS)?;
    check_max("a.time.limit", params.time_limit, limits::TIME_FACET)?;
    check_max("a.hm.limit", params.heatmap_limit, limits::HEATMAP_CELLS)?;
    check_max("a.text.limit", params.text_limit, limits::FIELD_FACET)?;
    check_max("a.user.limit", params.user_limit, limits::FIELD_FACET)?;
    if let Some(level) = params.heatmap_grid_level {
        if level == 0 {
            return Err(QueryError::malformed("a.hm.gridLevel must be at least 1"));
        }
        check_max("a.hm.gridLevel", level, limits::GRID_LEVEL)?;
    }

    let constraints = Constraints::parse(&params.constraints())?;
    let mut query = EngineQuery {
        purpose: QueryPurpose::Search,
        ..EngineQuery::default()
    };
    constraints.apply(&mut query);

    request_docs(params.docs_limit, params.docs_sort, &constraints, &mut query)?;

    if params.time_limit > 0 {
        let spec = TimeFacetSpec {
            limit: params.time_limit,
            explicit_gap: params.time_gap.clone(),
            filter_range: params.time_filter.clone(),
        };
        request_time_facet(&spec, &constraints, now, &mut query)?;
    }

    if params.heatmap_limit > 0 {
        let spec = HeatmapSpec {
            limit: params.heatmap_limit,
            explicit_grid_level: params.heatmap_grid_level,
            filter_rect: params.heatmap_filter.clone(),
        };
        request_heatmap_facet(&spec, &constraints, &mut query)?;
    }

    if params.text_limit > 0 {
        // Words have no filter of their own to exclude.
        let spec = FieldFacetSpec {
            field: fields::TEXT.to_string(),
            limit: params.text_limit,
            exclude_self_filter: false,
        };
        request_field_facet(&spec, &mut query);
    }

    if params.user_limit > 0 {
        let spec = FieldFacetSpec {
            field: fields::USER.to_string(),
            limit: params.user_limit,
            exclude_self_filter: true,
        };
        request_field_facet(&spec, &mut query);
    }

    debug!(
        rows = query.rows,
        filters = query.filters.len(),
        time_facet = query.time_facet.is_some(),
        heatmap = query.heatmap.is_some(),
        field_facets = query.field_facets.len(),
        "Built search query"
    );
    Ok(query)
}

/// Build the engine query for GET /export. Documents always come back newest first.
pub fn build_export_query(params: &ExportParams) -> Result<EngineQuery> {
    let limit = params
        .docs_limit
        .ok_or_else(|| QueryError::malformed("d.docs.limit is required"))?;
    if limit == 0 {
        return Err(QueryError::malformed("d.docs.limit must be at least 1"));
    }
    check_max("d.docs.limit", limit, limits::EXPORT_DOCS)?;

    let constraints = Constraints::parse(&params.constraints())?;
    let mut query = EngineQuery {
        purpose: QueryPurpose::Export,
        ..EngineQuery::default()
    };
    constraints.apply(&mut query);
    request_docs(limit, DocSort::Time, &constraints, &mut query)?;
    Ok(query)
}
