//! Query-string extraction.
//!
//! Pairs are found by scanning the whole raw URL for `[?&]key=value`, not by
//! splitting at the first `?`. Both halves are percent-decoded. An encoded
//! `&` inside a value survives decoding, while a bare key without `=` is glued
//! onto the key of the following pair. This is not RFC 3986 parsing; existing
//! clients depend on it.

use conduit_core::{ConduitError, ConduitResult, ParamMap};
use regex::Regex;
use std::sync::OnceLock;

fn pair_regex() -> &'static Regex {
    static PAIR: OnceLock<Regex> = OnceLock::new();
    PAIR.get_or_init(|| match Regex::new(r"[?&]([^=]+)=([^&]+)") {
        Ok(regex) => regex,
        Err(err) => unreachable!("query pair expression is valid: {err}"),
    })
}

/// Extracts query parameters from a raw request target.
///
/// Later duplicates overwrite earlier ones but keep the first position.
///
/// ```
/// use conduit_server::parse_query;
///
/// let query = parse_query("/search?q=rust%20lang&page=2").unwrap();
/// assert_eq!(query["q"].as_deref(), Some("rust lang"));
/// assert_eq!(query["page"].as_deref(), Some("2"));
/// ```
///
/// # Errors
///
/// Returns [`ConduitError::QueryDecode`] when a key or value does not decode
/// to valid UTF-8.
pub fn parse_query(raw_url: &str) -> ConduitResult<ParamMap> {
    let mut query = ParamMap::new();
    for captures in pair_regex().captures_iter(raw_url) {
        let key = decode(&captures[1])?;
        let value = decode(&captures[2])?;
        query.insert(key, Some(value));
    }
    Ok(query)
}

fn decode(component: &str) -> ConduitResult<String> {
    urlencoding::decode(component)
        .map(std::borrow::Cow::into_owned)
        .map_err(|e| ConduitError::QueryDecode(format!("{component}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_query() {
        assert!(parse_query("/users").unwrap().is_empty());
        assert!(parse_query("/users?").unwrap().is_empty());
    }

    #[test]
    fn test_pairs_in_order() {
        let query = parse_query("/user/42?x=1&y=two").unwrap();
        let keys: Vec<_> = query.keys().map(String::as_str).collect();
        assert_eq!(keys, ["x", "y"]);
        assert_eq!(query["y"].as_deref(), Some("two"));
    }

    #[test]
    fn test_decodes_key_and_value() {
        let query = parse_query("/s?na%20me=a%26b").unwrap();
        assert_eq!(query["na me"].as_deref(), Some("a&b"));
    }

    #[test]
    fn test_bare_flag_joins_next_key() {
        let query = parse_query("/s?flag&x=1&empty=").unwrap();
        assert_eq!(query.len(), 1);
        assert_eq!(query["flag&x"].as_deref(), Some("1"));
    }

    #[test]
    fn test_scan_is_not_rfc_strict() {
        // Only `&` ends a value.
        let query = parse_query("/s?a=1?b=2").unwrap();
        assert_eq!(query["a"].as_deref(), Some("1?b=2"));
    }

    #[test]
    fn test_invalid_utf8_is_an_error() {
        let err = parse_query("/s?x=%FF").unwrap_err();
        assert!(matches!(err, ConduitError::QueryDecode(_)));
        assert_eq!(err.status_code(), http::StatusCode::INTERNAL_SERVER_ERROR);
    }
}
