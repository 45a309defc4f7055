//! HTTP mock server helpers for testing outbound HTTP calls.
//!
//! A thin wrapper around `wiremock` for declarative stubbing of the open
//! data API.
//!
//! # Quick Start
//!
//! ```ignore
//! use crate::common::http_mock::MockHttpServer;
//!
//! #[tokio::test]
//! async fn test_external_api_call() {
//!     let server = MockHttpServer::start().await;
//!
//!     server
//!         .expect_get("/deputados")
//!         .with_query("idLegislatura", "56")
//!         .respond_with_json(json!({"dados": [], "links": []}))
//!         .mount()
//!         .await;
//!
//!     // Point the client at server.url()
//! }
//! ```

use serde_json::Value;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockBuilder, MockServer, ResponseTemplate};

pub struct MockHttpServer {
    inner: MockServer,
}

impl MockHttpServer {
    pub async fn start() -> Self {
        Self {
            inner: MockServer::start().await,
        }
    }

    /// Base URL of the server, without trailing slash.
    pub fn url(&self) -> String {
        self.inner.uri()
    }

    /// Drop every mounted stub.
    pub async fn reset(&self) {
        self.inner.reset().await;
    }

    pub fn expect_get(&self, route: &str) -> StubBuilder<'_> {
        StubBuilder {
            server: &self.inner,
            mock: Mock::given(method("GET")).and(path(route)),
            response: ResponseTemplate::new(200),
            times: None,
        }
    }
}

pub struct StubBuilder<'a> {
    server: &'a MockServer,
    mock: MockBuilder,
    response: ResponseTemplate,
    times: Option<u64>,
}

impl StubBuilder<'_> {
    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.mock = self.mock.and(query_param(key, value));
        self
    }

    pub fn respond_with_json(mut self, body: Value) -> Self {
        self.response = ResponseTemplate::new(200).set_body_json(body);
        self
    }

    pub fn respond_with_body(mut self, body: &str) -> Self {
        self.response = ResponseTemplate::new(200).set_body_string(body);
        self
    }

    pub fn respond_with_status(mut self, status: u16) -> Self {
        self.response = ResponseTemplate::new(status);
        self
    }

    pub fn expect_times(mut self, times: u64) -> Self {
        self.times = Some(times);
        self
    }

    pub async fn mount(self) {
        let mock = self.mock.respond_with(self.response);
        let mock = match self.times {
            Some(times) => mock.expect(times),
            None => mock,
        };
        mock.mount(self.server).await;
    }
}
