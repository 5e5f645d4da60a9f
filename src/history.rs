//! Request history records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One processed request and its match outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub date: DateTime<Utc>,
    pub method: String,
    pub url: String,
    /// Request as it appeared on the wire (request line, headers, body)
    pub dump: String,
    /// Raw request body
    pub body: String,
    /// Whether an expectation matched
    pub matched: bool,
    /// Body served from the matched expectation (empty when unmatched)
    pub mock_body: String,
    /// Reproducible curl command line
    pub curl_command: String,
}

impl HistoryItem {
    /// Build an unmatched history item from request parts.
    ///
    /// `headers` are emitted in the order given; callers pass them sorted.
    pub fn from_request(
        method: &str,
        url: &str,
        headers: &[(String, String)],
        body: &str,
    ) -> Self {
        Self {
            date: Utc::now(),
            method: method.to_string(),
            url: url.to_string(),
            dump: dump_request(method, url, headers, body),
            body: body.to_string(),
            matched: false,
            mock_body: String::new(),
            curl_command: curl_command(method, url, headers, body),
        }
    }

    /// Mark this item as served by an expectation.
    pub fn with_match(mut self, mock_body: impl Into<String>) -> Self {
        self.matched = true;
        self.mock_body = mock_body.into();
        self
    }

    /// Short text shown as the served response in the history page.
    pub fn response_summary(&self) -> &str {
        if !self.mock_body.is_empty() {
            &self.mock_body
        } else if !self.matched {
            "request wasn't matched"
        } else {
            "request was matched but mock response is empty"
        }
    }
}

impl fmt::Display for HistoryItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HistoryItem(Date={}, MockMatched={}, CurlCommand={})",
            self.date.to_rfc3339(),
            self.matched,
            self.curl_command
        )
    }
}

/// Render a request in HTTP/1.1 wire form.
fn dump_request(method: &str, url: &str, headers: &[(String, String)], body: &str) -> String {
    let (host, target) = split_url(url);

    let mut dump = format!("{method} {target} HTTP/1.1\r\n");
    if !host.is_empty() {
        dump.push_str(&format!("Host: {host}\r\n"));
    }
    for (name, value) in headers {
        if name.eq_ignore_ascii_case("host") {
            continue;
        }
        dump.push_str(&format!("{name}: {value}\r\n"));
    }
    dump.push_str("\r\n");
    dump.push_str(body);
    dump
}

/// Build a curl invocation reproducing a request.
fn curl_command(method: &str, url: &str, headers: &[(String, String)], body: &str) -> String {
    let mut parts = vec![
        "curl".to_string(),
        "-X".to_string(),
        shell_quote(method),
    ];

    if !body.is_empty() {
        parts.push("-d".to_string());
        parts.push(shell_quote(body));
    }

    for (name, value) in headers {
        parts.push("-H".to_string());
        parts.push(shell_quote(&format!("{name}: {value}")));
    }

    parts.push(shell_quote(url));
    parts.join(" ")
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Split an absolute URL into host and request target.
fn split_url(url: &str) -> (&str, &str) {
    let Some((_, rest)) = url.split_once("://") else {
        return ("", url);
    };

    match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, "/"),
    }
}
