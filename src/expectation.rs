//! Expectation data model and compilation.
//!
//! An [`Expectation`] is the plain, serializable rule an operator registers.
//! Before it can be matched it is turned into a [`CompiledExpectation`]: path
//! and request patterns are compiled once and a `@file` mock response is read
//! from disk. Only compiled expectations are ever stored.

use crate::error::ExpectationError;
use crate::matcher;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Prefix marking a mock response that must be loaded from a file.
pub const MOCK_FILE_PREFIX: &str = "@";

/// Value of a single matching criterion.
///
/// `Unset`, `Empty` and `Wildcard` all accept any value. They are kept apart
/// so that a listed expectation serializes back to what was configured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum Criterion {
    /// Field absent (or `null`)
    #[default]
    Unset,
    /// Field present as `""`
    Empty,
    /// Field present as `"*"`
    Wildcard,
    /// Concrete value to compare against
    Value(String),
}

impl Criterion {
    /// Build a criterion from a configured string.
    pub fn new(value: impl Into<String>) -> Self {
        Some(value.into()).into()
    }

    /// Whether this criterion accepts anything.
    pub fn is_wildcard(&self) -> bool {
        !matches!(self, Criterion::Value(_))
    }

    /// Whether the field was absent from the configuration.
    pub fn is_unset(&self) -> bool {
        matches!(self, Criterion::Unset)
    }

    /// The concrete value, if any.
    pub fn value(&self) -> Option<&str> {
        match self {
            Criterion::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl From<Option<String>> for Criterion {
    fn from(value: Option<String>) -> Self {
        match value {
            None => Criterion::Unset,
            Some(v) if v.is_empty() => Criterion::Empty,
            Some(v) if v == "*" => Criterion::Wildcard,
            Some(v) => Criterion::Value(v),
        }
    }
}

impl From<Criterion> for Option<String> {
    fn from(value: Criterion) -> Self {
        match value {
            Criterion::Unset => None,
            Criterion::Empty => Some(String::new()),
            Criterion::Wildcard => Some("*".to_string()),
            Criterion::Value(v) => Some(v),
        }
    }
}

impl From<&str> for Criterion {
    fn from(value: &str) -> Self {
        Criterion::new(value)
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Criterion::Unset | Criterion::Wildcard => f.write_str("*"),
            Criterion::Empty => Ok(()),
            Criterion::Value(v) => f.write_str(v),
        }
    }
}

/// A mock rule: how to recognize a request and how to answer it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Expectation {
    /// HTTP method, compared case-insensitively
    #[serde(default, skip_serializing_if = "Criterion::is_unset")]
    pub method: Criterion,

    /// Request path, exact or regular expression
    #[serde(default, skip_serializing_if = "Criterion::is_unset")]
    pub path: Criterion,

    /// Request body (or query string for GET), exact or regular expression
    #[serde(default, skip_serializing_if = "Criterion::is_unset")]
    pub request: Criterion,

    /// Response status code (0 = 200)
    #[serde(default)]
    pub status: u16,

    /// Response headers
    #[serde(default, deserialize_with = "null_as_default")]
    pub headers: HashMap<String, String>,

    /// Response body, or `@<file>` to serve a file's contents
    #[serde(default, deserialize_with = "null_as_default")]
    pub mock: String,
}

/// Treat an explicit `null` like an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl Expectation {
    /// Compile patterns and resolve the mock response.
    ///
    /// This is the full registration step; a failure at either stage
    /// rejects the expectation.
    pub fn compile(self) -> Result<CompiledExpectation, ExpectationError> {
        let mut compiled = CompiledExpectation::compile(self)?;
        compiled.resolve_mock_response()?;
        Ok(compiled)
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Expectation(Method={}, Path={}, Request={}, StatusCode={})",
            self.method, self.path, self.request, self.status
        )
    }
}

/// A registered expectation as reported by listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectationRecord {
    pub id: Uuid,
    pub matched_count: u64,
    #[serde(flatten)]
    pub expectation: Expectation,
}

/// Response data of the expectation that matched a request.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedExpectation {
    pub id: Uuid,
    pub status: u16,
    pub headers: HashMap<String, String>,
    /// Resolved body content (file contents for `@file` mocks)
    pub body: String,
}

/// An expectation with its patterns compiled and mock response resolved.
#[derive(Debug, Clone)]
pub struct CompiledExpectation {
    expectation: Expectation,
    path_regex: Option<Regex>,
    request_regex: Option<Regex>,
    mock_body: String,
    file_source: Option<String>,
}

impl CompiledExpectation {
    /// Compile the `path` and `request` patterns.
    ///
    /// Wildcard criteria produce no pattern.
    pub fn compile(expectation: Expectation) -> Result<Self, ExpectationError> {
        let path_regex = expectation
            .path
            .value()
            .map(compile_pattern)
            .transpose()
            .map_err(ExpectationError::InvalidPathPattern)?;

        let request_regex = expectation
            .request
            .value()
            .map(compile_pattern)
            .transpose()
            .map_err(ExpectationError::InvalidRequestPattern)?;

        let mock_body = expectation.mock.clone();

        Ok(Self {
            expectation,
            path_regex,
            request_regex,
            mock_body,
            file_source: None,
        })
    }

    /// Load the mock body from disk if it references a file.
    ///
    /// Calling this again after a successful resolution does nothing.
    pub fn resolve_mock_response(&mut self) -> Result<(), ExpectationError> {
        if self.file_source.is_some() {
            return Ok(());
        }

        let Some(path) = self.expectation.mock.strip_prefix(MOCK_FILE_PREFIX) else {
            return Ok(());
        };

        let data = std::fs::read(path).map_err(|source| ExpectationError::FileRead {
            path: path.to_string(),
            source,
        })?;

        self.mock_body = String::from_utf8_lossy(&data).into_owned();
        self.file_source = Some(self.expectation.mock.clone());
        Ok(())
    }

    /// Check whether a request matches this expectation.
    pub fn matches(&self, method: &str, path: &str, body: &str) -> bool {
        matcher::matches(self, method, path, body)
    }

    /// The expectation as configured (mock still holds any `@file` reference).
    pub fn expectation(&self) -> &Expectation {
        &self.expectation
    }

    pub fn path_regex(&self) -> Option<&Regex> {
        self.path_regex.as_ref()
    }

    pub fn request_regex(&self) -> Option<&Regex> {
        self.request_regex.as_ref()
    }

    /// Body to serve when this expectation matches.
    pub fn mock_body(&self) -> &str {
        &self.mock_body
    }

    /// Configured `@file` reference, when the body came from a file.
    pub fn file_source(&self) -> Option<&str> {
        self.file_source.as_deref()
    }

    /// Response status, defaulting to 200.
    pub fn status(&self) -> u16 {
        match self.expectation.status {
            0 => 200,
            status => status,
        }
    }
}

/// Compile a path or request pattern.
///
/// Braces that do not form a counted repetition are taken literally, so
/// JSON bodies such as `{"id":\d+}` are usable as patterns.
fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    match Regex::new(pattern) {
        Ok(re) => Ok(re),
        Err(err) => {
            let relaxed = escape_literal_braces(pattern);
            if relaxed == pattern {
                return Err(err);
            }
            Regex::new(&relaxed).map_err(|_| err)
        }
    }
}

fn escape_literal_braces(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '\\' => {
                let len = escape_len(&chars[i..]);
                out.extend(&chars[i..i + len]);
                i += len;
            }
            '{' => match repetition_len(&chars[i..]) {
                Some(len) if i > 0 && !matches!(chars[i - 1], '(' | '|') => {
                    out.extend(&chars[i..i + len]);
                    i += len;
                }
                _ => {
                    out.push_str("\\{");
                    i += 1;
                }
            },
            '}' => {
                out.push_str("\\}");
                i += 1;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

/// Length of an escape sequence starting at a backslash.
///
/// Bracketed escapes such as `\p{L}` or `\x{1F600}` are kept whole.
fn escape_len(chars: &[char]) -> usize {
    match chars.get(1) {
        None => 1,
        Some('p' | 'P' | 'x' | 'u' | 'U') if chars.get(2) == Some(&'{') => chars[3..]
            .iter()
            .position(|&c| c == '}')
            .map_or(2, |end| end + 4),
        Some(_) => 2,
    }
}

/// Length of a `{n}`, `{n,}` or `{n,m}` quantifier at the start of `chars`.
fn repetition_len(chars: &[char]) -> Option<usize> {
    let mut i = 1;
    let digits = |i: &mut usize| {
        let start = *i;
        while chars.get(*i).is_some_and(char::is_ascii_digit) {
            *i += 1;
        }
        *i - start
    };

    if digits(&mut i) == 0 {
        return None;
    }
    if chars.get(i) == Some(&',') {
        i += 1;
        digits(&mut i);
    }
    (chars.get(i) == Some(&'}')).then_some(i + 1)
}
