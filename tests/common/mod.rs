//! An in-memory index engine for exercising the HTTP API without Solr.
//!
//! It honours the parts of [`EngineQuery`] the API produces: whitespace
//! keyword matching (terms are ANDed unless joined with `OR`), tagged filters
//! with facet exclusion, time range buckets, a quad-tree heatmap with square
//! cells of `360 / 2^level` degrees, and top-value field facets.

use std::collections::HashMap;

use async_trait::async_trait;
use axum_test::TestServer;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value, json};

use geosearch::api::{AppState, router};
use geosearch::doc_id;
use geosearch::engine::{
    Document, EngineQuery, EngineResult, Filter, IndexEngine, Predicate, QueryPurpose,
    RawFieldFacet, RawHeatmap, RawTimeFacet, SortSpec,
};
use geosearch::error::{QueryError, Result};
use geosearch::geo::Point;
use geosearch::heatmap::GridResolution;
use geosearch::model::{CountsGrid, Timing, fields};
use geosearch::time_range::format_instant;

/// Columns the engine reports for exports.
pub const FIELD_LIST: [&str; 5] = ["id", "created_at", "coord", "user_name", "text"];

#[derive(Debug, Clone)]
pub struct Tweet {
    pub created_at: DateTime<Utc>,
    pub coord: Point,
    pub user: String,
    pub text: String,
}

impl Tweet {
    pub fn new(created_at: DateTime<Utc>, lat: f64, lon: f64, user: &str, text: &str) -> Self {
        Self {
            created_at,
            coord: Point { lat, lon },
            user: user.to_string(),
            text: text.to_string(),
        }
    }

    /// Identifiers are the creation time in epoch millis.
    pub fn id(&self) -> u64 {
        self.created_at.timestamp_millis() as u64
    }

    fn terms(&self) -> Vec<String> {
        tokenize(&self.text)
    }

    fn to_document(&self) -> Document {
        let mut doc = Map::new();
        doc.insert(fields::ID.to_string(), json!(doc_id::encode(self.id())));
        doc.insert(
            fields::TIME_FILTER.to_string(),
            json!(format_instant(self.created_at)),
        );
        doc.insert(fields::GEO_SORT.to_string(), json!(self.coord.to_lat_lon()));
        doc.insert(fields::USER.to_string(), json!(self.user));
        doc.insert(fields::TEXT.to_string(), json!(self.text));
        doc.insert("_version_".to_string(), json!(1_510_000_000_000_000_000u64));
        doc
    }
}

/// Apple, Orange and Lemon, one a day from 2015-04-01 at noon, stacked along longitude -70.
pub fn fruit_tweets() -> Vec<Tweet> {
    let noon = |day| Utc.with_ymd_and_hms(2015, 4, day, 12, 0, 0).unwrap();
    vec![
        Tweet::new(noon(1), 41.5, -70.0, "Alex", "Apple fruit"),
        Tweet::new(noon(2), 42.5, -70.0, "Otto", "Orange fruit fruit fruit"),
        Tweet::new(noon(3), 43.5, -70.0, "Luke", "Lemon fruit"),
    ]
}

#[derive(Debug, Clone, Default)]
pub struct MemoryEngine {
    tweets: Vec<Tweet>,
    /// Added to every returned document.
    extra_field: Option<(String, Value)>,
    /// Every query fails with this engine status and message.
    failure: Option<(Option<u16>, String)>,
    down: bool,
}

impl MemoryEngine {
    pub fn new(tweets: Vec<Tweet>) -> Self {
        Self {
            tweets,
            ..Self::default()
        }
    }

    pub fn with_extra_field(mut self, name: &str, value: Value) -> Self {
        self.extra_field = Some((name.to_string(), value));
        self
    }

    pub fn failing(mut self, status: Option<u16>, message: &str) -> Self {
        self.failure = Some((status, message.to_string()));
        self
    }

    pub fn down(mut self) -> Self {
        self.down = true;
        self
    }

    fn matching<'a>(&'a self, query: &EngineQuery, excluded_tag: Option<&str>) -> Vec<&'a Tweet> {
        self.tweets
            .iter()
            .filter(|tweet| query.text.as_deref().is_none_or(|text| text_matches(text, tweet)))
            .filter(|tweet| {
                query
                    .filters
                    .iter()
                    .filter(|filter| excluded_tag.is_none() || filter.tag.as_deref() != excluded_tag)
                    .all(|filter| filter_matches(filter, tweet))
            })
            .collect()
    }

    fn docs(&self, query: &EngineQuery, matched: &[&Tweet]) -> Vec<Document> {
        let mut sorted = matched.to_vec();
        match &query.sort {
            Some(SortSpec::Score) => {
                let text = query.text.as_deref().unwrap_or_default();
                sorted.sort_by(|a, b| {
                    score(text, b)
                        .cmp(&score(text, a))
                        .then(b.id().cmp(&a.id()))
                });
            }
            Some(SortSpec::FieldDesc(_)) | None => sorted.sort_by_key(|t| std::cmp::Reverse(t.id())),
            Some(SortSpec::Distance { origin, .. }) => sorted.sort_by(|a, b| {
                distance(origin, &a.coord).total_cmp(&distance(origin, &b.coord))
            }),
        }

        sorted
            .into_iter()
            .take(query.rows as usize)
            .map(|tweet| {
                let mut doc = tweet.to_document();
                if let Some((name, value)) = &self.extra_field {
                    doc.insert(name.clone(), value.clone());
                }
                doc
            })
            .collect()
    }
}

#[async_trait]
impl IndexEngine for MemoryEngine {
    async fn query(&self, query: &EngineQuery) -> Result<EngineResult> {
        if let Some((status, message)) = &self.failure {
            return Err(QueryError::engine(*status, message.clone()));
        }

        let matched = self.matching(query, None);

        let time_facet = query.time_facet.as_ref().map(|request| {
            let pool = self.matching(query, request.exclude_tag.as_deref());
            let step = request.gap.to_duration();
            let mut counts = Vec::new();
            let mut bucket = request.start;
            while bucket < request.end {
                let next = bucket + step;
                let count = pool
                    .iter()
                    .filter(|t| t.created_at >= bucket && t.created_at < next)
                    .count() as u64;
                if count > 0 {
                    counts.push((format_instant(bucket), count));
                }
                bucket = next;
            }
            RawTimeFacet {
                start: format_instant(request.start),
                end: format_instant(request.end),
                gap: request.gap.to_engine_native(),
                counts,
            }
        });

        let heatmap = query.heatmap.as_ref().map(|request| {
            let pool = self.matching(query, request.exclude_tag.as_deref());
            let level = match request.resolution {
                GridResolution::Level(level) => level,
                GridResolution::MaxCellError(err) => {
                    (1..=26).find(|l| cell_side(*l) <= err).unwrap_or(26)
                }
            };
            heatmap(level, request.region, &pool)
        });

        let field_facets = query
            .field_facets
            .iter()
            .map(|request| {
                let pool = self.matching(query, request.exclude_tag.as_deref());
                let mut counts: HashMap<String, u64> = HashMap::new();
                for tweet in pool {
                    let values = if request.field == fields::USER {
                        vec![tweet.user.clone()]
                    } else {
                        let mut terms = tweet.terms();
                        terms.sort();
                        terms.dedup();
                        terms
                    };
                    for value in values {
                        *counts.entry(value).or_default() += 1;
                    }
                }
                let mut values: Vec<_> = counts.into_iter().collect();
                values.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
                values.truncate(request.limit as usize);
                RawFieldFacet {
                    field: request.field.clone(),
                    values,
                }
            })
            .collect();

        Ok(EngineResult {
            match_count: matched.len() as u64,
            docs: self.docs(query, &matched),
            time_facet,
            heatmap,
            field_facets,
            timing: Some(Timing {
                label: "QTime".to_string(),
                millis: 2,
                subs: vec![
                    Timing {
                        label: "prepare".to_string(),
                        millis: 0,
                        subs: vec![],
                    },
                    Timing {
                        label: "process".to_string(),
                        millis: 2,
                        subs: vec![],
                    },
                ],
            }),
            engine_millis: Some(2),
            elapsed_millis: 3,
            field_list: (query.purpose == QueryPurpose::Export)
                .then(|| FIELD_LIST.iter().map(|f| f.to_string()).collect()),
        })
    }

    async fn ping(&self) -> Result<()> {
        if self.down {
            return Err(QueryError::engine(Some(503), "engine is down"));
        }
        Ok(())
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|word| !word.is_empty())
        .collect()
}

fn text_matches(query: &str, tweet: &Tweet) -> bool {
    let words: Vec<&str> = query.split_whitespace().collect();
    let terms = tweet.terms();
    let has = |word: &&str| terms.contains(&word.to_lowercase());
    if words.contains(&"OR") {
        words.iter().filter(|w| **w != "OR").any(|w| has(w))
    } else {
        words.iter().all(|w| has(w))
    }
}

fn score(query: &str, tweet: &Tweet) -> usize {
    let words: Vec<String> = tokenize(query).into_iter().filter(|w| w != "or").collect();
    tweet.terms().iter().filter(|t| words.contains(t)).count()
}

fn filter_matches(filter: &Filter, tweet: &Tweet) -> bool {
    match &filter.predicate {
        Predicate::Term(value) => tweet.user == *value,
        Predicate::TimeRange(range) => {
            range.start.is_none_or(|start| tweet.created_at >= start)
                && range.end.is_none_or(|end| tweet.created_at <= end)
        }
        Predicate::GeoBox(rect) => rect.contains(tweet.coord),
    }
}

fn distance(a: &Point, b: &Point) -> f64 {
    let dlat = a.lat - b.lat;
    let dlon = (a.lon - b.lon) * a.lat.to_radians().cos();
    dlat.hypot(dlon)
}

fn cell_side(level: u32) -> f64 {
    360.0 / f64::from(1u32 << level.min(30))
}

fn heatmap(level: u32, region: geosearch::geo::Rectangle, tweets: &[&Tweet]) -> RawHeatmap {
    let side = cell_side(level);
    let first_col = ((region.min_x() + 180.0) / side).floor() as i64;
    let last_col = (((region.max_x() + 180.0) / side).ceil() as i64).max(first_col + 1);
    let first_row = ((region.min_y() + 90.0) / side).floor() as i64;
    let last_row = (((region.max_y() + 90.0) / side).ceil() as i64).max(first_row + 1);
    let columns = (last_col - first_col) as usize;
    let rows = (last_row - first_row) as usize;

    let mut grid = vec![vec![0u64; columns]; rows];
    for tweet in tweets {
        let col = ((tweet.coord.lon + 180.0) / side).floor() as i64 - first_col;
        let row = ((tweet.coord.lat + 90.0) / side).floor() as i64 - first_row;
        if (0..columns as i64).contains(&col) && (0..rows as i64).contains(&row) {
            // top row first
            grid[rows - 1 - row as usize][col as usize] += 1;
        }
    }

    let counts: CountsGrid = grid
        .into_iter()
        .map(|row| {
            row.iter()
                .any(|c| *c > 0)
                .then(|| row.into_iter().map(Some).collect())
        })
        .collect();

    RawHeatmap {
        grid_level: level,
        rows: rows as u32,
        columns: columns as u32,
        min_x: -180.0 + first_col as f64 * side,
        max_x: -180.0 + last_col as f64 * side,
        min_y: -90.0 + first_row as f64 * side,
        max_y: -90.0 + last_row as f64 * side,
        counts: counts.iter().any(Option::is_some).then_some(counts),
    }
}

/// A test server with the same routes as the binary.
pub fn create_test_server(engine: MemoryEngine) -> TestServer {
    TestServer::new(router(AppState::new(engine))).unwrap()
}

/// A test server over [`fruit_tweets`].
pub fn fruit_server() -> TestServer {
    create_test_server(MemoryEngine::new(fruit_tweets()))
}
