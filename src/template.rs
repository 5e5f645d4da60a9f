//! Template engine for the history page.
//!
//! Uses Handlebars to render registered expectations and the most recent
//! requests as a single HTML page.

use crate::expectation::ExpectationRecord;
use crate::history::HistoryItem;
use handlebars::Handlebars;
use serde::Serialize;
use std::collections::BTreeMap;

const INDEX_TEMPLATE: &str = include_str!("../templates/index.hbs");
const INDEX_NAME: &str = "index";

/// Template engine for rendering the browsing UI.
pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
}

/// Context for the index page.
#[derive(Debug, Serialize)]
pub struct IndexContext {
    pub expectations: Vec<ExpectationView>,
    pub history: Vec<HistoryView>,
}

/// An expectation as shown on the page.
#[derive(Debug, Serialize)]
pub struct ExpectationView {
    pub id: String,
    pub matched_count: u64,
    pub method: String,
    pub path: String,
    pub request: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub mock: String,
}

/// A history item as shown on the page.
#[derive(Debug, Serialize)]
pub struct HistoryView {
    pub date: String,
    pub method: String,
    pub url: String,
    pub dump: String,
    pub curl_command: String,
    pub matched: bool,
    pub response: String,
}

impl From<&ExpectationRecord> for ExpectationView {
    fn from(record: &ExpectationRecord) -> Self {
        let e = &record.expectation;
        Self {
            id: record.id.to_string(),
            matched_count: record.matched_count,
            method: e.method.to_string(),
            path: e.path.to_string(),
            request: e.request.to_string(),
            status: e.status,
            headers: e.headers.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            mock: e.mock.clone(),
        }
    }
}

impl From<&HistoryItem> for HistoryView {
    fn from(item: &HistoryItem) -> Self {
        Self {
            date: item.date.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
            method: item.method.clone(),
            url: item.url.clone(),
            dump: item.dump.clone(),
            curl_command: item.curl_command.clone(),
            matched: item.matched,
            response: item.response_summary().to_string(),
        }
    }
}

impl TemplateEngine {
    /// Create a new template engine with the index page registered.
    pub fn new() -> Result<Self, handlebars::TemplateError> {
        let mut handlebars = Handlebars::new();

        handlebars.register_helper("json", Box::new(json_helper));
        handlebars.register_helper("upper", Box::new(upper_helper));
        handlebars.register_template_string(INDEX_NAME, INDEX_TEMPLATE)?;

        Ok(Self { handlebars })
    }

    /// Render the index page from store snapshots.
    ///
    /// `history` is rendered in the order given (newest first in practice).
    pub fn render_index(
        &self,
        expectations: &[ExpectationRecord],
        history: &[HistoryItem],
    ) -> Result<String, handlebars::RenderError> {
        let ctx = IndexContext {
            expectations: expectations.iter().map(ExpectationView::from).collect(),
            history: history.iter().map(HistoryView::from).collect(),
        };

        self.handlebars.render(INDEX_NAME, &ctx)
    }
}

// Custom Handlebars helpers

fn json_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let param = h.param(0).and_then(|v| v.value().as_str()).unwrap_or("");
    // Pretty print JSON
    let text = match serde_json::from_str::<serde_json::Value>(param) {
        Ok(json) => serde_json::to_string_pretty(&json).unwrap_or_else(|_| param.to_string()),
        Err(_) => param.to_string(),
    };
    out.write(&handlebars::html_escape(&text))?;
    Ok(())
}

fn upper_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let value = h.param(0).and_then(|v| v.value().as_str()).unwrap_or("");
    out.write(&handlebars::html_escape(&value.to_uppercase()))?;
    Ok(())
}
