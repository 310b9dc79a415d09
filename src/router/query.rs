use std::borrow::Cow;
use std::sync::Arc;

use crate::server::ParamVec;

/// Parse a query string (without the leading `?`) into ordered pairs.
///
/// Uses `application/x-www-form-urlencoded` decoding, so `+` becomes a
/// space and percent escapes are decoded. Keys without `=` get an empty
/// value. Values are never coerced; callers convert as needed.
#[must_use]
pub fn parse_query(query: &str) -> ParamVec {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (Arc::from(k.as_ref()), v.into_owned()))
        .collect()
}

/// Percent-decode a single path segment; invalid encodings are kept as-is.
#[must_use]
pub fn decode_segment(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(q: &ParamVec) -> Vec<(&str, &str)> {
        q.iter().map(|(k, v)| (k.as_ref(), v.as_str())).collect()
    }

    #[test]
    fn test_parse_query_params() {
        let q = parse_query("category=delivery&page=2");
        assert_eq!(pairs(&q), vec![("category", "delivery"), ("page", "2")]);
    }

    #[test]
    fn test_parse_query_decodes() {
        let q = parse_query("name=Tibs%20%26%20Injera&q=shiro+wat&flag");
        assert_eq!(
            pairs(&q),
            vec![("name", "Tibs & Injera"), ("q", "shiro wat"), ("flag", "")]
        );
    }

    #[test]
    fn test_empty_query() {
        assert!(parse_query("").is_empty());
    }

    #[test]
    fn test_decode_segment() {
        assert_eq!(decode_segment("caf%C3%A9"), "café");
        assert_eq!(decode_segment("%FF"), "%FF");
    }
}
