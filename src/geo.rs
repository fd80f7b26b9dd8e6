//! Geographic rectangles given as `[lat,lon TO lat,lon]`, lower-left to upper-right.
//!
//! The external format is lat,lon. The engine's own geometry is x/y, i.e.
//! lon/lat, which is what [`Rectangle::min_x`] and friends expose.
//!
//! Boxes that cross the antimeridian are rejected here rather than wrapped;
//! a client wanting one must split it into two requests.

use std::fmt;

use crate::error::{QueryError, Result};
use crate::grammar::parse_range_pair;

/// The whole world, used when a heatmap is requested without any region.
pub const WORLD: Rectangle = Rectangle {
    min_lat: -90.0,
    min_lon: -180.0,
    max_lat: 90.0,
    max_lon: 180.0,
};

/// A point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
}

impl Point {
    /// `lat,lon`, the form the engine expects for a distance origin.
    pub fn to_lat_lon(&self) -> String {
        format!("{},{}", self.lat, self.lon)
    }
}

/// An axis-aligned rectangle in decimal degrees.
///
/// Always satisfies `min_lat <= max_lat` and `min_lon <= max_lon`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rectangle {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl Rectangle {
    pub fn min_x(&self) -> f64 {
        self.min_lon
    }

    pub fn max_x(&self) -> f64 {
        self.max_lon
    }

    pub fn min_y(&self) -> f64 {
        self.min_lat
    }

    pub fn max_y(&self) -> f64 {
        self.max_lat
    }

    /// Angular width in degrees.
    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    /// Angular height in degrees.
    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn center(&self) -> Point {
        Point {
            lat: (self.min_lat + self.max_lat) / 2.0,
            lon: (self.min_lon + self.max_lon) / 2.0,
        }
    }

    pub fn contains(&self, point: Point) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.lat)
            && (self.min_lon..=self.max_lon).contains(&point.lon)
    }
}

impl fmt::Display for Rectangle {
    /// Renders back into the `[lat,lon TO lat,lon]` form; values round-trip exactly.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{},{} TO {},{}]",
            self.min_lat, self.min_lon, self.max_lat, self.max_lon
        )
    }
}

/// Parse `[lat,lon TO lat,lon]` into a [`Rectangle`].
pub fn parse_geo_box(input: &str) -> Result<Rectangle> {
    let (lower_left, upper_right) = parse_range_pair(input)?;
    let from = parse_lat_lon(lower_left)?;
    let to = parse_lat_lon(upper_right)?;

    if from.lat > to.lat {
        return Err(QueryError::InvalidRange(format!(
            "lower-left latitude is above upper-right latitude: {input}"
        )));
    }
    if from.lon > to.lon {
        return Err(QueryError::InvalidRange(format!(
            "boxes crossing the antimeridian are not supported: {input}"
        )));
    }

    Ok(Rectangle {
        min_lat: from.lat,
        min_lon: from.lon,
        max_lat: to.lat,
        max_lon: to.lon,
    })
}

/// Parse `lat,lon` in decimal degrees.
pub fn parse_lat_lon(input: &str) -> Result<Point> {
    let (lat, lon) = input
        .split_once(',')
        .ok_or_else(|| QueryError::malformed(format!("expected lat,lon but got {input}")))?;
    let lat = parse_degrees(lat, input)?;
    let lon = parse_degrees(lon, input)?;

    if !(-90.0..=90.0).contains(&lat) {
        return Err(QueryError::malformed(format!(
            "latitude {lat} is out of range [-90,90] in {input}"
        )));
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(QueryError::malformed(format!(
            "longitude {lon} is out of range [-180,180] in {input}"
        )));
    }
    Ok(Point { lat, lon })
}

fn parse_degrees(value: &str, context: &str) -> Result<f64> {
    let degrees: f64 = value
        .parse()
        .map_err(|_| QueryError::malformed(format!("{value} is not a number in {context}")))?;
    if !degrees.is_finite() {
        return Err(QueryError::malformed(format!(
            "{value} is not a finite number in {context}"
        )));
    }
    Ok(degrees)
}
