//! Expectation Mock Server
//!
//! An HTTP mock server for integration tests. Expectations (method, path,
//! request body or query, and the response to serve) are registered at
//! startup or through a JSON API, and every incoming request is answered by
//! the first expectation that matches it.
//!
//! # Features
//!
//! - **Request Matching**: method, path regex, request body regex or
//!   unordered query parameters
//! - **File Responses**: `@path` mock bodies are read from disk
//! - **Match Counting**: check whether an expectation was hit, and how often
//! - **Request History**: every request recorded with a wire dump and curl command
//! - **History Page**: `GET /` renders expectations and recent requests
//!
//! # Example Configuration
//!
//! ```yaml
//! expectations:
//!   - method: GET
//!     path: /ping
//!     mock: pong
//!   - method: POST
//!     path: ^/users/\d+$
//!     request: '"name":'
//!     status: 201
//!     headers:
//!       Content-Type: application/json
//!     mock: '{"created": true}'
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod expectation;
pub mod handlers;
pub mod history;
pub mod matcher;
pub mod server;
pub mod store;
pub mod template;

pub use client::{ClientError, MockServerClient};
pub use config::{MockServerConfig, ServerSettings};
pub use error::{ApiError, ExpectationError, StoreError};
pub use expectation::{Criterion, Expectation, ExpectationRecord};
pub use handlers::{ExpectationId, MatchStatus};
pub use history::HistoryItem;
pub use server::{AppState, MockServer};
pub use store::Store;
