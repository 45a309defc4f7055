//! Câmara open data API client.
//!
//! This module provides a trait-based HTTP client for the three endpoints the
//! pipeline reads, plus a `follow` call for pagination links. The trait
//! abstraction enables:
//!
//! - Scripted responses in unit tests ([`mock::MockCamaraClient`])
//! - HTTP-level testing with `wiremock` in integration tests
//!
//! Responses are returned as raw JSON; envelope and link handling live in
//! [`crate::pagination`] and [`crate::flatten`].
//!
//! # Example
//!
//! ```ignore
//! use camara_etl::camara::{CamaraApiClient, HttpCamaraClient};
//!
//! let client = HttpCamaraClient::new("https://dadosabertos.camara.leg.br/api/v2", timeout)?;
//! let page = client.list_legislators(56).await?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur when calling the API.
///
/// Every variant is a failure of one request; callers decide whether it is
/// fatal for their phase.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport failure (connect, timeout, reset)
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// API answered with a non-success status
    #[error("API returned {status} for {url}")]
    Status { status: u16, url: String },

    /// Body was not valid JSON
    #[error("invalid JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Query for one legislator's reimbursement documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpenseQuery {
    pub year: i32,
    pub legislature: u32,
}

impl ExpenseQuery {
    fn params(self) -> [(&'static str, String); 4] {
        [
            ("ano", self.year.to_string()),
            ("ordem", "ASC".to_string()),
            ("ordenarPor", "ano".to_string()),
            ("idLegislatura", self.legislature.to_string()),
        ]
    }
}

/// Trait for API operations.
///
/// Use `HttpCamaraClient` for real HTTP calls, or `MockCamaraClient` for
/// testing.
#[async_trait]
pub trait CamaraApiClient: Send + Sync {
    /// First page of the roster for a legislature.
    async fn list_legislators(&self, legislature: u32) -> Result<Value, ApiError>;

    /// Detail payload of one legislator.
    async fn get_legislator(&self, id: i64) -> Result<Value, ApiError>;

    /// First page of one legislator's expenses.
    async fn list_expenses(&self, id: i64, query: ExpenseQuery) -> Result<Value, ApiError>;

    /// Fetch an absolute URL taken from a pagination link.
    async fn follow(&self, url: &str) -> Result<Value, ApiError>;
}

/// HTTP-based implementation of `CamaraApiClient`.
pub struct HttpCamaraClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCamaraClient {
    /// Create a client whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying TLS backend cannot be initialised.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("camara-etl/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Create a client with a custom `reqwest::Client`.
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_json(&self, request: reqwest::RequestBuilder) -> Result<Value, ApiError> {
        let response = request
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let url = response.url().to_string();
        let status = response.status();
        debug!(%url, status = status.as_u16(), "API response");

        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|source| ApiError::Decode { url, source })
    }
}

#[async_trait]
impl CamaraApiClient for HttpCamaraClient {
    async fn list_legislators(&self, legislature: u32) -> Result<Value, ApiError> {
        let url = format!("{}/deputados", self.base_url);
        self.get_json(
            self.client
                .get(&url)
                .query(&[("idLegislatura", legislature.to_string())]),
        )
        .await
    }

    async fn get_legislator(&self, id: i64) -> Result<Value, ApiError> {
        let url = format!("{}/deputados/{id}", self.base_url);
        self.get_json(self.client.get(&url)).await
    }

    async fn list_expenses(&self, id: i64, query: ExpenseQuery) -> Result<Value, ApiError> {
        let url = format!("{}/deputados/{id}/despesas", self.base_url);
        self.get_json(self.client.get(&url).query(&query.params()))
            .await
    }

    async fn follow(&self, url: &str) -> Result<Value, ApiError> {
        self.get_json(self.client.get(url)).await
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    clippy::missing_const_for_fn,
    clippy::must_use_candidate
)]
pub mod mock {
    //! Mock implementation for unit testing.

    use super::{ApiError, CamaraApiClient, ExpenseQuery};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// Scripted `CamaraApiClient`.
    ///
    /// Queue responses with the `on_*` methods; each call pops the next queued
    /// response for its request. Unscripted requests answer with a 404
    /// `ApiError::Status`. `calls()` lists every request in order.
    #[derive(Default)]
    pub struct MockCamaraClient {
        responses: Mutex<HashMap<String, VecDeque<Result<Value, ApiError>>>>,
        calls: Mutex<Vec<String>>,
    }

    impl MockCamaraClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn on_list_legislators(&self, legislature: u32, result: Result<Value, ApiError>) {
            self.push(format!("roster:{legislature}"), result);
        }

        pub fn on_get_legislator(&self, id: i64, result: Result<Value, ApiError>) {
            self.push(format!("detail:{id}"), result);
        }

        pub fn on_list_expenses(&self, id: i64, result: Result<Value, ApiError>) {
            self.push(format!("expenses:{id}"), result);
        }

        pub fn on_follow(&self, url: &str, result: Result<Value, ApiError>) {
            self.push(format!("follow:{url}"), result);
        }

        /// Every request made so far, e.g. `detail:101`.
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn push(&self, key: String, result: Result<Value, ApiError>) {
            self.responses
                .lock()
                .unwrap()
                .entry(key)
                .or_default()
                .push_back(result);
        }

        fn answer(&self, key: String) -> Result<Value, ApiError> {
            self.calls.lock().unwrap().push(key.clone());
            self.responses
                .lock()
                .unwrap()
                .get_mut(&key)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| {
                    Err(ApiError::Status {
                        status: 404,
                        url: key,
                    })
                })
        }
    }

    #[async_trait]
    impl CamaraApiClient for MockCamaraClient {
        async fn list_legislators(&self, legislature: u32) -> Result<Value, ApiError> {
            self.answer(format!("roster:{legislature}"))
        }

        async fn get_legislator(&self, id: i64) -> Result<Value, ApiError> {
            self.answer(format!("detail:{id}"))
        }

        async fn list_expenses(&self, id: i64, _query: ExpenseQuery) -> Result<Value, ApiError> {
            self.answer(format!("expenses:{id}"))
        }

        async fn follow(&self, url: &str) -> Result<Value, ApiError> {
            self.answer(format!("follow:{url}"))
        }
    }
}
