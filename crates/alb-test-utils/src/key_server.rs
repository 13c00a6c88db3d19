//! Mock public key endpoint
//!
//! Serves PEM keys at `/<kid>` the way the load balancer's key endpoint
//! does, and records every request for call-count assertions.

use crate::crypto_fixtures::TestSigningKey;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A `wiremock` server standing in for the public key endpoint.
pub struct MockKeyServer {
    server: MockServer,
}

impl MockKeyServer {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL to configure as the public key endpoint.
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Serve `key`'s public PEM at `/<kid>`.
    pub async fn serve_key(&self, key: &TestSigningKey) {
        self.serve_body(key.kid(), &key.public_key_pem()).await;
    }

    /// Serve an arbitrary body with 200 at `/<kid>`.
    pub async fn serve_body(&self, kid: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/{kid}")))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&self.server)
            .await;
    }

    /// Serve `key` after `delay`.
    pub async fn serve_key_delayed(&self, key: &TestSigningKey, delay: Duration) {
        Mock::given(method("GET"))
            .and(path(format!("/{}", key.kid())))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(key.public_key_pem())
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    /// Answer `/<kid>` with `status` and an empty body.
    pub async fn serve_status(&self, kid: &str, status: u16) {
        Mock::given(method("GET"))
            .and(path(format!("/{kid}")))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Answer the next `times` requests for `/<kid>` with `status`, taking
    /// precedence over other mounted responses.
    pub async fn fail_next(&self, kid: &str, status: u16, times: u64) {
        Mock::given(method("GET"))
            .and(path(format!("/{kid}")))
            .respond_with(ResponseTemplate::new(status))
            .up_to_n_times(times)
            .with_priority(1)
            .mount(&self.server)
            .await;
    }

    /// Total requests received.
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map_or(0, |requests| requests.len())
    }

    /// Paths of all requests received, in order.
    pub async fn requested_paths(&self) -> Vec<String> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .map(|request| request.url.path().to_string())
            .collect()
    }

    /// Requests received for `/<kid>`.
    pub async fn requests_for(&self, kid: &str) -> usize {
        let expected = format!("/{kid}");
        self.requested_paths()
            .await
            .iter()
            .filter(|p| **p == expected)
            .count()
    }
}
