//! HTTP API handlers.
//!
//! - **GET /search**: documents, facets and timing as JSON.
//! - **GET /export**: matching documents as a streamed CSV download.
//! - **GET /health**: engine liveness.
//!
//! Every failure is a [`QueryError`], rendered as `{"code", "message"}` with
//! the matching HTTP status.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{Query, State, rejection::QueryRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

use crate::constraint::{build_export_query, build_search_query};
use crate::engine::IndexEngine;
use crate::error::QueryError;
use crate::export::{CONTENT_DISPOSITION, CONTENT_TYPE, CsvExporter};
use crate::model::{ExportParams, SearchParams, SearchResponse};
use crate::normalize::normalize_search;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<dyn IndexEngine>,
}

impl AppState {
    pub fn new(engine: impl IndexEngine + 'static) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
}

/// Routes for `/search`, `/export` and `/health`, traced per request.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/search", get(search))
        .route("/export", get(export))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

fn bad_query_string(rejection: QueryRejection) -> QueryError {
    QueryError::malformed(rejection.body_text())
}

/// GET /search - Search documents and compute facets.
///
/// # Query Parameters
///
/// Constraints `q.text`, `q.user`, `q.time`, `q.geo`; documents `d.docs.limit`,
/// `d.docs.sort`; facets `a.time.*`, `a.hm.*`, `a.text.limit`, `a.user.limit`.
///
/// # Response
///
/// ```json
/// {
///     "a.matchDocs": 3,
///     "a.time": { "start": "2015-04-01T00:00:00Z", "end": "...", "gap": "P1D", "counts": [...] },
///     "timing": { "label": "callEngine.elapsed", "millis": 12, "subs": [...] }
/// }
/// ```
///
/// Keys for anything not requested are absent.
#[instrument(skip(state))]
pub async fn search(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<SearchResponse>, QueryError> {
    let Query(params) = params.map_err(bad_query_string)?;
    let query = build_search_query(&params, Utc::now())?;
    let result = state.engine.query(&query).await?;

    let response = normalize_search(result, query.rows > 0)?;
    info!(
        matched = response.match_docs,
        docs = response.docs.as_ref().map_or(0, Vec::len),
        time = response.time.is_some(),
        heatmap = response.heatmap.is_some(),
        user = response.user.is_some(),
        text = response.text.is_some(),
        millis = response.timing.as_ref().map_or(0, |t| t.millis),
        "Search served"
    );
    Ok(Json(response))
}

/// GET /export - Download matching documents as CSV, newest first.
///
/// `d.docs.limit` is required. Columns follow the engine's configured field
/// list; rows are written as they are produced.
#[instrument(skip(state))]
pub async fn export(
    State(state): State<AppState>,
    params: Result<Query<ExportParams>, QueryRejection>,
) -> Result<Response, QueryError> {
    let Query(params) = params.map_err(bad_query_string)?;
    let query = build_export_query(&params)?;
    let result = state.engine.query(&query).await?;

    let fields = result
        .field_list
        .ok_or_else(|| QueryError::engine(None, "engine did not report its field list"))?;
    info!(
        columns = fields.len(),
        rows = result.docs.len(),
        "Export started"
    );

    let lines = CsvExporter::new(fields).lines(result.docs).inspect(|line| {
        if let Err(e) = line {
            error!(error = %e, "Export aborted mid-stream");
        }
    });
    let body = Body::from_stream(futures::stream::iter(lines));

    Ok((
        [
            (header::CONTENT_TYPE, CONTENT_TYPE),
            (header::CONTENT_DISPOSITION, CONTENT_DISPOSITION),
        ],
        body,
    )
        .into_response())
}

/// GET /health - Healthy when the engine answers its ping.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.engine.ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            warn!(error = %e, "Engine ping failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
