//! HTTP server.
//!
//! One tokio task per connection, HTTP/1.1 via hyper. Requests under `/api/`
//! manage expectations, a bare `GET /` renders the history page, and everything else
//! is served from the expectation store.

use crate::config::ServerSettings;
use crate::handlers;
use crate::store::Store;
use crate::template::TemplateEngine;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info};

/// State shared by all connections.
pub struct AppState {
    pub store: Arc<Store>,
    pub templates: TemplateEngine,
    pub settings: ServerSettings,
}

impl AppState {
    pub fn new(
        store: Arc<Store>,
        settings: ServerSettings,
    ) -> Result<Self, handlebars::TemplateError> {
        Ok(Self {
            store,
            templates: TemplateEngine::new()?,
            settings,
        })
    }
}

/// Mock HTTP server bound to a listening socket.
pub struct MockServer {
    listener: TcpListener,
    state: Arc<AppState>,
}

impl MockServer {
    /// Bind the listening socket.
    pub async fn bind(addr: SocketAddr, state: AppState) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            state: Arc::new(state),
        })
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until `shutdown` resolves.
    ///
    /// Connections already accepted keep running to completion.
    pub async fn serve_with_shutdown(
        self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), anyhow::Error> {
        info!(
            address = %self.local_addr()?,
            expectations = self.state.store.len(),
            "Mock server listening"
        );
        for expectation in self.state.store.dump_available_expectations() {
            info!(id = %expectation.id, "{}", expectation.expectation);
        }

        tokio::pin!(shutdown);

        loop {
            let (stream, peer) = tokio::select! {
                _ = &mut shutdown => {
                    info!("Mock server shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => accepted?,
            };

            let io = TokioIo::new(stream);
            let state = Arc::clone(&self.state);

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let state = Arc::clone(&state);
                    async move { route_request(req, state).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!(%peer, "Connection error: {}", e);
                }
            });
        }
    }
}

/// Main request router.
pub async fn route_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!(%method, %path, "Request received");

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/") if req.uri().query().is_none() => handlers::handle_index(&state),
        (_, "/api/expectation") => match method {
            Method::POST => handlers::handle_create(req, &state).await,
            _ => handlers::method_not_allowed(),
        },
        (_, "/api/expectations") => match method {
            Method::GET => handlers::handle_list(&state),
            _ => handlers::method_not_allowed(),
        },
        (_, "/api/history") => match method {
            Method::GET => handlers::handle_history(req.uri().query(), &state),
            _ => handlers::method_not_allowed(),
        },
        (_, p) if p.starts_with("/api/expectation/") => {
            let id = p.trim_start_matches("/api/expectation/").to_string();
            handlers::handle_expectation(&method, &id, req, &state).await
        }
        _ => handlers::handle_mock(req, &state).await,
    };

    Ok(response)
}

/// Create a JSON response.
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string_pretty(body).unwrap_or_else(|_| "{}".to_string());
    build_response_with_headers(status, [("Content-Type", "application/json")], json)
}

/// Build an HTTP response with the given status and body.
pub fn build_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(body.into()))
        .unwrap_or_else(|_| internal_error())
}

/// Build an HTTP response with headers.
///
/// Invalid header names or values yield a plain 500 response.
pub fn build_response_with_headers(
    status: StatusCode,
    headers: impl IntoIterator<Item = (impl AsRef<str>, impl AsRef<str>)>,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(status);
    for (key, value) in headers {
        builder = builder.header(key.as_ref(), value.as_ref());
    }
    builder
        .body(Full::new(body.into()))
        .unwrap_or_else(|_| internal_error())
}

fn internal_error() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from("Internal Server Error")));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

/// Collect a request body into bytes.
pub async fn collect_body<B>(body: B) -> Result<Bytes, String>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    body.collect()
        .await
        .map(|c| c.to_bytes())
        .map_err(|e| format!("Failed to read request body: {e}"))
}
