//! HTTP client for the expectation API.
//!
//! Lets tests register expectations on a running mock server and later check
//! whether they were hit.

use crate::expectation::{Expectation, ExpectationRecord};
use crate::handlers::{ExpectationId, MatchStatus};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Errors returned by [`MockServerClient`].
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("mock server returned {status}: {message}")]
    Server { status: u16, message: String },
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

/// Client for a running mock server.
#[derive(Debug, Clone)]
pub struct MockServerClient {
    client: Client,
    base_url: String,
}

impl MockServerClient {
    /// Create a client for the server at `base_url` (e.g. `http://127.0.0.1:8081`).
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Register an expectation and return its id.
    pub async fn create_expectation(&self, expectation: &Expectation) -> Result<Uuid, ClientError> {
        let url = format!("{}/api/expectation", self.base_url);
        let resp = self.client.post(&url).json(expectation).send().await?;
        let created: ExpectationId = Self::parse(resp).await?;
        Ok(created.id)
    }

    /// Replace the expectation with the given id.
    pub async fn update_expectation(
        &self,
        id: Uuid,
        expectation: &Expectation,
    ) -> Result<(), ClientError> {
        let resp = self
            .client
            .put(self.expectation_url(id))
            .json(expectation)
            .send()
            .await?;
        Self::parse::<ExpectationId>(resp).await?;
        Ok(())
    }

    /// Report whether the expectation has matched and how many times.
    pub async fn check_expectation(&self, id: Uuid) -> Result<MatchStatus, ClientError> {
        let resp = self.client.get(self.expectation_url(id)).send().await?;
        Self::parse(resp).await
    }

    /// Remove the expectation with the given id.
    pub async fn remove_expectation(&self, id: Uuid) -> Result<(), ClientError> {
        let resp = self.client.delete(self.expectation_url(id)).send().await?;
        if !resp.status().is_success() {
            return Err(Self::server_error(resp).await);
        }
        Ok(())
    }

    /// List all registered expectations in match order.
    pub async fn get_expectations(&self) -> Result<Vec<ExpectationRecord>, ClientError> {
        let url = format!("{}/api/expectations", self.base_url);
        let resp = self.client.get(&url).send().await?;
        Self::parse(resp).await
    }

    fn expectation_url(&self, id: Uuid) -> String {
        format!("{}/api/expectation/{}", self.base_url, id)
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<T, ClientError> {
        if !resp.status().is_success() {
            return Err(Self::server_error(resp).await);
        }
        Ok(resp.json().await?)
    }

    async fn server_error(resp: reqwest::Response) -> ClientError {
        let status = resp.status();
        let message = match resp.json::<ErrorResponse>().await {
            Ok(body) => body.message,
            Err(_) => format!("request failed with status {status}"),
        };
        ClientError::Server {
            status: status.as_u16(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trimmed() {
        let client = MockServerClient::new("http://127.0.0.1:8081/").unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:8081");
        assert_eq!(
            client.expectation_url(Uuid::nil()),
            "http://127.0.0.1:8081/api/expectation/00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_server_error_display() {
        let err = ClientError::Server {
            status: 404,
            message: "expectation not found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "mock server returned 404: expectation not found"
        );
    }
}
