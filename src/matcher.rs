//! Request matching logic.
//!
//! Evaluates a compiled expectation against the `(method, path, body)` triple
//! derived from an incoming request. Matching is pure and short-circuits in
//! order: method, path, then body.
//!
//! Body policy: for `GET` the body is the URL query string and is compared as
//! an unordered set of parameters. Every other method, `DELETE` included,
//! compares the raw body by exact equality and then by the request pattern.

use crate::expectation::{CompiledExpectation, Criterion};
use regex::Regex;
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Parsed query string: key to values in order of appearance.
pub type QueryParams = BTreeMap<String, Vec<String>>;

/// Check whether a request matches a compiled expectation.
pub fn matches(rule: &CompiledExpectation, method: &str, path: &str, body: &str) -> bool {
    let expectation = rule.expectation();

    match_method(&expectation.method, method)
        && match_path(&expectation.path, rule.path_regex(), path)
        && match_request(&expectation.request, rule.request_regex(), method, body)
}

fn match_method(expected: &Criterion, method: &str) -> bool {
    match expected.value() {
        None => true,
        Some(value) => value.eq_ignore_ascii_case(method),
    }
}

fn match_path(expected: &Criterion, pattern: Option<&Regex>, path: &str) -> bool {
    let Some(value) = expected.value() else {
        return true;
    };

    if path.is_empty() {
        return false;
    }

    value == path || pattern.is_some_and(|regex| regex.is_match(path))
}

fn match_request(expected: &Criterion, pattern: Option<&Regex>, method: &str, body: &str) -> bool {
    let Some(value) = expected.value() else {
        return true;
    };

    if method.eq_ignore_ascii_case("GET") {
        return match_query(value, body);
    }

    if body.is_empty() {
        return false;
    }

    value == body || pattern.is_some_and(|regex| regex.is_match(body))
}

/// Compare two query strings ignoring parameter order.
fn match_query(expected: &str, actual: &str) -> bool {
    match (parse_query_string(expected), parse_query_string(actual)) {
        (Some(expected), Some(actual)) => compare_queries(&expected, &actual),
        _ => false,
    }
}

fn compare_queries(left: &QueryParams, right: &QueryParams) -> bool {
    if left.len() != right.len() {
        return false;
    }

    left.iter().all(|(key, values)| {
        right.get(key).is_some_and(|other| {
            values.len() == other.len() && values.concat() == other.concat()
        })
    })
}

/// Parse a query string into multi-valued parameters.
///
/// Returns `None` for strings that are not valid queries (a `;` separator or
/// an escape that does not decode to UTF-8).
pub fn parse_query_string(query: &str) -> Option<QueryParams> {
    let mut params = QueryParams::new();

    for part in query.split('&') {
        if part.is_empty() {
            continue;
        }
        if part.contains(';') {
            return None;
        }

        let (key, value) = part.split_once('=').unwrap_or((part, ""));
        params
            .entry(decode_component(key)?)
            .or_default()
            .push(decode_component(value)?);
    }

    Some(params)
}

fn decode_component(s: &str) -> Option<String> {
    let s: Cow<'_, str> = if s.contains('+') {
        Cow::Owned(s.replace('+', " "))
    } else {
        Cow::Borrowed(s)
    };

    urlencoding::decode(&s).ok().map(Cow::into_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expectation::Expectation;

    fn compile(method: &str, path: &str, request: Option<&str>) -> CompiledExpectation {
        Expectation {
            method: method.into(),
            path: path.into(),
            request: request.map(Criterion::new).unwrap_or_default(),
            ..Default::default()
        }
        .compile()
        .unwrap()
    }

    #[test]
    fn test_method_matching() {
        let cases = [
            ("exact", "POST", "POST", true),
            ("case insensitive", "post", "POST", true),
            ("empty is wildcard", "", "DELETE", true),
            ("star is wildcard", "*", "PATCH", true),
            ("mismatch", "POST", "GET", false),
        ];

        for (name, expected, method, want) in cases {
            let rule = compile(expected, "/test", None);
            assert_eq!(rule.matches(method, "/test", ""), want, "{name}");
        }
    }

    #[test]
    fn test_wildcard_method_accepts_every_method() {
        for expected in ["", "*"] {
            let rule = compile(expected, "/test", None);
            for method in ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"] {
                assert!(rule.matches(method, "/test", ""), "{expected:?} vs {method}");
            }
        }

        let rule = Expectation::default().compile().unwrap();
        assert!(rule.matches("TRACE", "/anything", "body"));
    }

    #[test]
    fn test_path_matching() {
        let cases = [
            ("exact", "/users", "/users", true),
            ("wildcard", "*", "/any/path", true),
            ("regex", r"^/users/\d+$", "/users/123", true),
            ("regex mismatch", r"^/users/\d+$", "/users/abc", false),
            ("mismatch", "/users", "/admin", false),
            ("empty incoming path", "/users", "", false),
        ];

        for (name, expected, path, want) in cases {
            let rule = compile("GET", expected, None);
            assert_eq!(rule.matches("GET", path, ""), want, "{name}");
        }
    }

    #[test]
    fn test_empty_path_never_matches_a_pattern() {
        let rule = compile("GET", ".*", None);
        assert!(rule.matches("GET", "/x", ""));
        assert!(!rule.matches("GET", "", ""));
    }

    #[test]
    fn test_wildcard_path_accepts_any_path() {
        let rule = compile("GET", "*", None);
        for path in ["/", "/a", "/a/b/c", "/with%20space"] {
            assert!(rule.matches("GET", path, ""));
        }
    }

    #[test]
    fn test_body_matching() {
        let cases = [
            ("exact body", "POST", Some(r#"{"foo":"bar"}"#), r#"{"foo":"bar"}"#, true),
            ("wildcard body", "POST", Some(""), r#"{"random":"json"}"#, true),
            ("unset body", "POST", None, r#"{"random":"json"}"#, true),
            ("regex body", "POST", Some(r#""id":\d+"#), r#"{"id":123}"#, true),
            ("body mismatch", "POST", Some(r#"{"foo":"bar"}"#), r#"{"foo":"baz"}"#, false),
            ("empty body, empty expectation", "POST", Some(""), "", true),
            ("empty body, constrained", "POST", Some("something"), "", false),
            ("DELETE compares body", "DELETE", Some("some body"), "any body", false),
            ("DELETE exact body", "DELETE", Some("some body"), "some body", true),
            ("PUT matches body", "PUT", Some(r#"{"updated":true}"#), r#"{"updated":true}"#, true),
            ("PUT mismatch", "PUT", Some(r#"{"updated":true}"#), r#"{"updated":false}"#, false),
            ("PATCH matches body", "PATCH", Some(r#"{"patch":true}"#), r#"{"patch":true}"#, true),
            ("PATCH mismatch", "PATCH", Some(r#"{"patch":true}"#), r#"{"patch":false}"#, false),
        ];

        for (name, method, request, body, want) in cases {
            let rule = compile(method, "/data", request);
            assert_eq!(rule.matches(method, "/data", body), want, "{name}");
        }
    }

    #[test]
    fn test_get_query_matching() {
        let rule = compile("GET", "/data", Some("foo=bar&baz=qux"));

        assert!(rule.matches("GET", "/data", "foo=bar&baz=qux"));
        assert!(rule.matches("GET", "/data", "baz=qux&foo=bar"));
        assert!(rule.matches("get", "/data", "baz=qux&foo=bar"));
        assert!(!rule.matches("GET", "/data", "foo=baz"));
        assert!(!rule.matches("GET", "/data", "foo=bar"));
        assert!(!rule.matches("GET", "/data", ""));
    }

    #[test]
    fn test_get_ignores_body_without_request() {
        let rule = compile("GET", "/data", Some("*"));
        assert!(rule.matches("GET", "/data", "anything=1"));
        assert!(rule.matches("GET", "/data", ""));
    }

    #[test]
    fn test_get_query_repeated_keys() {
        let rule = compile("GET", "/data", Some("tag=a&tag=b&x=1"));
        assert!(rule.matches("GET", "/data", "x=1&tag=a&tag=b"));
        assert!(!rule.matches("GET", "/data", "x=1&tag=b&tag=a"));
        assert!(!rule.matches("GET", "/data", "x=1&tag=ab"));
    }

    #[test]
    fn test_get_query_decoding() {
        let rule = compile("GET", "/search", Some("q=hello world"));
        assert!(rule.matches("GET", "/search", "q=hello+world"));
        assert!(rule.matches("GET", "/search", "q=hello%20world"));
    }

    #[test]
    fn test_invalid_query_never_matches() {
        let rule = compile("GET", "/data", Some("a=1"));
        assert!(!rule.matches("GET", "/data", "a=1;b=2"));
    }

    #[test]
    fn test_parse_query_string() {
        let params = parse_query_string("foo=bar&baz=qux&foo=again").unwrap();
        assert_eq!(params["foo"], vec!["bar", "again"]);
        assert_eq!(params["baz"], vec!["qux"]);

        let params = parse_query_string("name=John%20Doe&flag").unwrap();
        assert_eq!(params["name"], vec!["John Doe"]);
        assert_eq!(params["flag"], vec![""]);

        assert!(parse_query_string("").unwrap().is_empty());
        assert!(parse_query_string("a=1;b=2").is_none());
    }
}
