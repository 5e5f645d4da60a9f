//! Request handlers: expectation CRUD, history, index page and mock serving.

use crate::error::ApiError;
use crate::expectation::Expectation;
use crate::history::HistoryItem;
use crate::server::{build_response, build_response_with_headers, collect_body, json_response, AppState};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Body;
use hyper::header::{ACCEPT, CONTENT_TYPE, HOST};
use hyper::http::request::Parts;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Response body for create and update.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExpectationId {
    pub id: Uuid,
}

/// Response body for an expectation match check.
#[derive(Debug, Serialize, Deserialize)]
pub struct MatchStatus {
    pub matched: bool,
    pub matched_count: u64,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

/// Convert an API error into a JSON error response.
pub fn error_response(err: &ApiError) -> Response<Full<Bytes>> {
    json_response(
        err.status(),
        &ErrorBody {
            error: err.kind(),
            message: err.to_string(),
        },
    )
}

pub fn method_not_allowed() -> Response<Full<Bytes>> {
    error_response(&ApiError::MethodNotAllowed)
}

fn respond(result: Result<Response<Full<Bytes>>, ApiError>) -> Response<Full<Bytes>> {
    result.unwrap_or_else(|err| {
        warn!(error = %err, "API request rejected");
        error_response(&err)
    })
}

/// GET / - history page
pub fn handle_index(state: &AppState) -> Response<Full<Bytes>> {
    let expectations = state.store.dump_available_expectations();
    let history = state.store.get_history(true);

    match state.templates.render_index(&expectations, &history) {
        Ok(html) => build_response_with_headers(
            StatusCode::OK,
            [("Content-Type", "text/html; charset=utf-8")],
            html,
        ),
        Err(e) => build_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// POST /api/expectation - register an expectation
pub async fn handle_create<B>(req: Request<B>, state: &AppState) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    respond(create_expectation(req, state).await)
}

async fn create_expectation<B>(
    req: Request<B>,
    state: &AppState,
) -> Result<Response<Full<Bytes>>, ApiError>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let expectation = decode_expectation(req.into_body()).await?;
    let id = state.store.add_expectation(expectation)?;
    Ok(json_response(StatusCode::CREATED, &ExpectationId { id }))
}

/// GET /api/expectations - list all expectations
pub fn handle_list(state: &AppState) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &state.store.dump_available_expectations())
}

/// GET /api/history - request history, `?reverse=true` for newest first
pub fn handle_history(query: Option<&str>, state: &AppState) -> Response<Full<Bytes>> {
    let reverse = query
        .map(|q| q.split('&').any(|pair| pair == "reverse=true"))
        .unwrap_or(false);
    json_response(StatusCode::OK, &state.store.get_history(reverse))
}

/// GET/PUT/DELETE /api/expectation/{id}
pub async fn handle_expectation<B>(
    method: &Method,
    id: &str,
    req: Request<B>,
    state: &AppState,
) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    respond(expectation_by_id(method, id, req, state).await)
}

async fn expectation_by_id<B>(
    method: &Method,
    id: &str,
    req: Request<B>,
    state: &AppState,
) -> Result<Response<Full<Bytes>>, ApiError>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    if id.is_empty() {
        return Err(ApiError::MissingId);
    }
    if !matches!(*method, Method::GET | Method::PUT | Method::DELETE) {
        return Err(ApiError::MethodNotAllowed);
    }

    let id = Uuid::parse_str(id).map_err(|_| ApiError::UnknownId(id.to_string()))?;

    match *method {
        Method::GET => {
            let record = state.store.get_expectation(id)?;
            Ok(json_response(
                StatusCode::OK,
                &MatchStatus {
                    matched: record.matched_count > 0,
                    matched_count: record.matched_count,
                },
            ))
        }
        Method::PUT => {
            let expectation = decode_expectation(req.into_body()).await?;
            state.store.update_expectation(id, expectation)?;
            Ok(json_response(StatusCode::OK, &ExpectationId { id }))
        }
        _ => {
            state.store.remove_expectation(id)?;
            Ok(build_response(StatusCode::NO_CONTENT, Bytes::new()))
        }
    }
}

async fn decode_expectation<B>(body: B) -> Result<Expectation, ApiError>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let body = collect_body(body).await.map_err(ApiError::MalformedPayload)?;
    serde_json::from_slice(&body).map_err(|e| ApiError::MalformedPayload(e.to_string()))
}

/// Serve a request from the expectation store.
///
/// Every request is recorded in the history, matched or not.
pub async fn handle_mock<B>(req: Request<B>, state: &AppState) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let (parts, body) = req.into_parts();
    let body = match collect_body(body).await {
        Ok(b) => String::from_utf8_lossy(&b).into_owned(),
        Err(e) => return build_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    };

    let method = parts.method.as_str();
    let path = parts.uri.path();
    let match_body = if parts.method == Method::GET {
        parts.uri.query().unwrap_or("")
    } else {
        body.as_str()
    };

    let matched = state.store.find_match(method, path, match_body);

    let mut item = HistoryItem::from_request(method, &request_url(&parts), &sorted_headers(&parts), &body);

    match &matched {
        Some(m) => {
            match state.store.record_match(m.id) {
                Ok(count) if state.settings.log_matches => {
                    info!(id = %m.id, count, method, path, "Request matched expectation");
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "Matched expectation removed before it was counted"),
            }
            item = item.with_match(m.body.clone());
        }
        None => {
            if state.settings.log_unmatched {
                warn!(method, path, "No matching expectation found");
            }
        }
    }

    state.store.add_history(item);

    let Some(matched) = matched else {
        return build_response(StatusCode::NOT_FOUND, Bytes::new());
    };

    let status = StatusCode::from_u16(matched.status).unwrap_or_else(|_| {
        warn!(id = %matched.id, status = matched.status, "Invalid status code in expectation");
        StatusCode::INTERNAL_SERVER_ERROR
    });

    let mut headers: Vec<(String, String)> = matched.headers.into_iter().collect();
    if headers.is_empty() {
        if let Some(accept) = parts.headers.get(ACCEPT).and_then(|v| v.to_str().ok()) {
            headers.push((CONTENT_TYPE.to_string(), accept.to_string()));
        }
    }

    build_response_with_headers(status, headers, matched.body)
}

/// Absolute URL of a request, as used in history and curl commands.
fn request_url(parts: &Parts) -> String {
    let host = parts
        .headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| parts.uri.authority().map(|a| a.as_str()))
        .unwrap_or("localhost");

    let target = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    format!("http://{host}{target}")
}

/// Request headers sorted by name, multi-valued headers joined with `, `.
fn sorted_headers(parts: &Parts) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = parts
        .headers
        .keys()
        .map(|name| {
            let value = parts
                .headers
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                .collect::<Vec<_>>()
                .join(", ");
            (name.to_string(), value)
        })
        .collect();
    headers.sort();
    headers
}
