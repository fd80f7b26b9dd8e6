//! Shared pieces of the request parameter grammars.

use once_cell::sync::OnceCell;
use regex::Regex;

use crate::error::{QueryError, Result};

/// `[<left> TO <right>]`, the range syntax shared by `q.time` and `q.geo`.
const RANGE_PATTERN: &str = r"^\[(\S+) TO (\S+)\]$";

/// Compile `pattern` once and cache it in `cell`.
pub(crate) fn compiled(
    cell: &'static OnceCell<std::result::Result<Regex, String>>,
    pattern: &str,
) -> Result<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).map_err(|err| err.to_string()))
        .as_ref()
        .map_err(|err| QueryError::Internal(format!("pattern {pattern} failed to compile: {err}")))
}

/// Split `[A TO B]` into its two sides.
pub fn parse_range_pair(input: &str) -> Result<(&str, &str)> {
    static RANGE: OnceCell<std::result::Result<Regex, String>> = OnceCell::new();
    let captures = compiled(&RANGE, RANGE_PATTERN)?
        .captures(input)
        .ok_or_else(|| {
            QueryError::malformed(format!("expected [<start> TO <end>] but got {input}"))
        })?;

    match (captures.get(1), captures.get(2)) {
        (Some(left), Some(right)) => Ok((left.as_str(), right.as_str())),
        _ => Err(QueryError::malformed(format!(
            "expected [<start> TO <end>] but got {input}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range_pair() {
        assert_eq!(
            parse_range_pair("[2015-04-01 TO *]").unwrap(),
            ("2015-04-01", "*")
        );
        assert_eq!(
            parse_range_pair("[-90,-180 TO 90,180]").unwrap(),
            ("-90,-180", "90,180")
        );
    }

    #[test]
    fn test_broken_pattern_is_internal() {
        static BROKEN: OnceCell<std::result::Result<Regex, String>> = OnceCell::new();
        let err = compiled(&BROKEN, "(").unwrap_err();
        assert!(matches!(err, QueryError::Internal(_)));
        assert_eq!(
            err.status_code(),
            axum::http::StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_parse_range_pair_rejects_other_shapes() {
        for input in [
            "",
            "2015-04-01 TO *",
            "[2015-04-01 TO *",
            "[2015-04-01 to *]",
            "[2015-04-01  TO *]",
            "[a b TO c]",
            "x[a TO b]",
        ] {
            assert!(
                matches!(parse_range_pair(input), Err(QueryError::MalformedInput(_))),
                "{input:?} should be rejected"
            );
        }
    }
}
