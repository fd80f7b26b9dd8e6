//! Time range constraints: `[A TO B]` where each side is `*`, a date, or a
//! date-time. UTC is implied; explicit zone offsets are rejected.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;

use crate::error::{QueryError, Result};
use crate::grammar::{compiled, parse_range_pair};

/// Accepted shapes for one side of a time range.
const DATE_TIME_PATTERN: &str = r"^\d{4}-\d{2}-\d{2}(T\d{2}:\d{2}:\d{2}(\.\d{1,9})?)?$";

/// A possibly open-ended span of time. `None` on either side means `*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// The unbounded range `[* TO *]`.
    pub const fn open() -> Self {
        Self {
            start: None,
            end: None,
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = |inst: Option<DateTime<Utc>>| inst.map_or_else(|| "*".to_string(), format_instant);
        write!(f, "[{} TO {}]", side(self.start), side(self.end))
    }
}

/// Parse `[A TO B]` into a [`TimeRange`], rejecting `start > end`.
pub fn parse_time_range(input: &str) -> Result<TimeRange> {
    let (left, right) = parse_range_pair(input)?;
    let range = TimeRange {
        start: parse_date_time(left)?,
        end: parse_date_time(right)?,
    };

    if let (Some(start), Some(end)) = (range.start, range.end) {
        if start > end {
            return Err(QueryError::InvalidRange(format!(
                "start must come before end: {input}"
            )));
        }
    }
    Ok(range)
}

/// Parse one side of a range: `*`, `2016-05-15` or `2016-05-15T00:00:00`.
pub fn parse_date_time(input: &str) -> Result<Option<DateTime<Utc>>> {
    if input == "*" {
        return Ok(None);
    }

    static DATE_TIME: OnceCell<std::result::Result<Regex, String>> = OnceCell::new();
    if !compiled(&DATE_TIME, DATE_TIME_PATTERN)?.is_match(input) {
        return Err(QueryError::malformed(format!(
            "expected * or YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS (UTC implied) but got {input}"
        )));
    }

    let naive = if input.contains('T') {
        NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.f")
    } else {
        NaiveDate::parse_from_str(input, "%Y-%m-%d")
            .map(|date| date.and_time(chrono::NaiveTime::MIN))
    }
    .map_err(|err| QueryError::malformed(format!("bad date {input}: {err}")))?;

    Ok(Some(naive.and_utc()))
}

/// Canonical instant rendering used on the wire, e.g. `2015-04-01T00:00:00Z`.
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
