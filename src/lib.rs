//! Geosearch - read-path query engine for geotagged, timestamped short texts.
//!
//! # Overview
//!
//! A request's constraints (keywords, user, time range, bounding box) become
//! tagged filters on one [`engine::EngineQuery`]. Each facet excludes its own
//! dimension's filter, so a client can show "what else is there" next to the
//! current selection. The engine's answer is reshaped into a stable JSON
//! contract, or into CSV for bulk export.
//!
//! # Modules
//!
//! - [`geo`], [`time_range`], [`gap`]: parameter grammars
//! - [`heatmap`]: heatmap grid sizing
//! - [`doc_id`]: identifier codec between the source and the index
//! - [`constraint`]: request parameters to [`engine::EngineQuery`]
//! - [`engine`]: the index engine seam; [`solr`] implements it
//! - [`normalize`], [`export`]: engine results to JSON and CSV
//! - [`api`]: HTTP API handlers
//! - [`config`]: environment configuration

pub mod api;
pub mod config;
pub mod constraint;
pub mod doc_id;
pub mod engine;
pub mod error;
pub mod export;
pub mod gap;
pub mod geo;
pub mod grammar;
pub mod heatmap;
pub mod model;
pub mod normalize;
pub mod solr;
pub mod time_range;
