//! Bucket widths for time range faceting.
//!
//! A [`Gap`] is one quantity of one unit, always kept in its coarsest
//! equivalent form: 7 days is 1 week, 24 hours is 1 day. It has two textual
//! forms: the ISO-8601 subset accepted from clients (`P1D`, `PT6H`) and the
//! engine's native date-math form (`+1DAYS`).

use std::fmt;

use chrono::Duration;
use once_cell::sync::OnceCell;
use regex::Regex;

use crate::error::{QueryError, Result};
use crate::grammar::compiled;

/// Hard cap on the number of buckets a single time facet may produce.
pub const MAX_BUCKETS: i64 = 1000;

/// Units a gap can be expressed in, finest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
    Years,
}

impl TimeUnit {
    /// Nominal length in milliseconds. Months and years use the mean
    /// Gregorian length (365.2425 days per year).
    pub const fn millis(self) -> i64 {
        match self {
            TimeUnit::Seconds => 1_000,
            TimeUnit::Minutes => 60_000,
            TimeUnit::Hours => 3_600_000,
            TimeUnit::Days => 86_400_000,
            TimeUnit::Weeks => 604_800_000,
            TimeUnit::Months => 2_629_746_000,
            TimeUnit::Years => 31_556_952_000,
        }
    }

    /// The next coarser unit, if any.
    pub const fn next(self) -> Option<TimeUnit> {
        match self {
            TimeUnit::Seconds => Some(TimeUnit::Minutes),
            TimeUnit::Minutes => Some(TimeUnit::Hours),
            TimeUnit::Hours => Some(TimeUnit::Days),
            TimeUnit::Days => Some(TimeUnit::Weeks),
            TimeUnit::Weeks => Some(TimeUnit::Months),
            TimeUnit::Months => Some(TimeUnit::Years),
            TimeUnit::Years => None,
        }
    }

    /// Upper-case plural name, as used by the engine's date math.
    pub const fn name(self) -> &'static str {
        match self {
            TimeUnit::Seconds => "SECONDS",
            TimeUnit::Minutes => "MINUTES",
            TimeUnit::Hours => "HOURS",
            TimeUnit::Days => "DAYS",
            TimeUnit::Weeks => "WEEKS",
            TimeUnit::Months => "MONTHS",
            TimeUnit::Years => "YEARS",
        }
    }

    fn from_name(name: &str) -> Option<TimeUnit> {
        let upper = name.to_ascii_uppercase();
        let singular = upper.strip_suffix('S').unwrap_or(&upper);
        match singular {
            "SECOND" => Some(TimeUnit::Seconds),
            "MINUTE" => Some(TimeUnit::Minutes),
            "HOUR" => Some(TimeUnit::Hours),
            "DAY" => Some(TimeUnit::Days),
            "WEEK" => Some(TimeUnit::Weeks),
            "MONTH" => Some(TimeUnit::Months),
            "YEAR" => Some(TimeUnit::Years),
            _ => None,
        }
    }
}

/// A normalized bucket width. Construct with [`Gap::of`] or one of the parsers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Gap {
    quantity: i64,
    unit: TimeUnit,
}

impl Gap {
    /// Build a gap, renormalizing to the coarsest equivalent unit.
    pub fn of(quantity: i64, unit: TimeUnit) -> Result<Gap> {
        if quantity < 1 {
            return Err(QueryError::malformed(format!(
                "gap quantity must be at least 1 but got {quantity}"
            )));
        }
        Ok(Gap::normalized(quantity, unit))
    }

    fn normalized(mut quantity: i64, mut unit: TimeUnit) -> Gap {
        while quantity > 1 {
            let Some(next) = unit.next() else { break };
            let Some(millis) = unit.millis().checked_mul(quantity) else {
                break;
            };
            if millis % next.millis() != 0 {
                break;
            }
            quantity = millis / next.millis();
            unit = next;
        }
        Gap { quantity, unit }
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    /// Parse the client-facing ISO-8601 subset: `P<n>[YMWD]` or `PT<n>[HMS]`.
    pub fn parse_iso8601(input: &str) -> Result<Gap> {
        static DATE_PART: OnceCell<std::result::Result<Regex, String>> = OnceCell::new();
        static TIME_PART: OnceCell<std::result::Result<Regex, String>> = OnceCell::new();

        let (regex, units): (_, &[(&str, TimeUnit)]) = if input.contains('T') {
            (
                compiled(&TIME_PART, r"^PT(\d+)([HMS])$")?,
                &[
                    ("H", TimeUnit::Hours),
                    ("M", TimeUnit::Minutes),
                    ("S", TimeUnit::Seconds),
                ],
            )
        } else {
            (
                compiled(&DATE_PART, r"^P(\d+)([YMWD])$")?,
                &[
                    ("Y", TimeUnit::Years),
                    ("M", TimeUnit::Months),
                    ("W", TimeUnit::Weeks),
                    ("D", TimeUnit::Days),
                ],
            )
        };

        let bad = || QueryError::malformed(format!("gap {input} must look like P1D or PT1H"));
        let captures = regex.captures(input).ok_or_else(bad)?;
        let quantity = captures
            .get(1)
            .and_then(|m| m.as_str().parse::<i64>().ok())
            .ok_or_else(bad)?;
        let letter = captures.get(2).map(|m| m.as_str()).ok_or_else(bad)?;
        let unit = units
            .iter()
            .find(|(l, _)| *l == letter)
            .map(|(_, unit)| *unit)
            .ok_or_else(bad)?;
        Gap::of(quantity, unit)
    }

    /// Parse the engine's native gap form, e.g. `+1DAYS` or `+6HOURS`.
    pub fn parse_engine_native(input: &str) -> Result<Gap> {
        static NATIVE: OnceCell<std::result::Result<Regex, String>> = OnceCell::new();

        let bad = || QueryError::malformed(format!("unrecognized engine gap {input}"));
        let captures = compiled(&NATIVE, r"^\+(\d+)(\w+)$")?
            .captures(input)
            .ok_or_else(bad)?;
        let quantity = captures
            .get(1)
            .and_then(|m| m.as_str().parse::<i64>().ok())
            .ok_or_else(bad)?;
        let unit = captures
            .get(2)
            .and_then(|m| TimeUnit::from_name(m.as_str()))
            .ok_or_else(bad)?;
        Gap::of(quantity, unit)
    }

    /// Engine date math. The engine has no week unit, so weeks go out as days.
    pub fn to_engine_native(&self) -> String {
        match self.unit {
            TimeUnit::Weeks => format!("+{}DAYS", self.quantity.saturating_mul(7)),
            unit => format!("+{}{}", self.quantity, unit.name()),
        }
    }

    pub fn to_iso8601(&self) -> String {
        let prefix = if self.unit < TimeUnit::Days { "PT" } else { "P" };
        let letter = &self.unit.name()[..1];
        format!("{prefix}{}{letter}", self.quantity)
    }

    pub fn to_millis(&self) -> i64 {
        self.unit.millis().saturating_mul(self.quantity)
    }

    pub fn to_duration(&self) -> Duration {
        Duration::milliseconds(self.to_millis())
    }

    /// How many whole gaps fit in `range`.
    pub fn buckets_in(&self, range: Duration) -> i64 {
        range.num_milliseconds() / self.to_millis()
    }

    /// Reject a gap that would split `range` into more than [`MAX_BUCKETS`] buckets.
    pub fn ensure_bucket_cap(&self, range: Duration, range_label: &str) -> Result<()> {
        let buckets = self.buckets_in(range);
        if buckets > MAX_BUCKETS {
            return Err(QueryError::GapTooSmall {
                gap: self.to_iso8601(),
                range: range_label.to_string(),
                buckets,
                max: MAX_BUCKETS,
            });
        }
        Ok(())
    }

    /// Pick a human-legible gap for `range` that yields at most about `limit` buckets.
    ///
    /// Hours for up to 4 days, days for up to 4 weeks, weeks for up to 100
    /// weeks, and otherwise a multiple of days no shorter than a week.
    pub fn compute_auto(range: Duration, limit: u32) -> Gap {
        let limit = i64::from(limit.max(1));
        let hours = range.num_hours();
        let days = range.num_days();

        if hours < limit.min(24 * 4) {
            Gap::normalized(1, TimeUnit::Hours)
        } else if days < limit.min(7 * 4) {
            Gap::normalized(1, TimeUnit::Days)
        } else if days / 7 < limit.min(100) {
            Gap::normalized(1, TimeUnit::Weeks)
        } else {
            let per_bucket = (days + limit - 1) / limit;
            Gap::normalized(per_bucket.max(7), TimeUnit::Days)
        }
    }
}

impl fmt::Display for Gap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}
