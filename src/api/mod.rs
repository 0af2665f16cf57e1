pub mod jikan;
pub mod mangadex;
pub mod paste;
pub mod tcb;

use crate::config::Config;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::time::Duration;
use tracing::warn;

const RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned status {status}")]
    Status {
        service: &'static str,
        status: StatusCode,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("could not parse {service} response: {reason}")]
    Parse {
        service: &'static str,
        reason: String,
    },
}

/// A chapter as reported by any chapter source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub number: String,
    pub title: Option<String>,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
}

pub fn build_http_client(config: &Config) -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(config.http_timeout())
        .user_agent(concat!("cogbot/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Sends the request built by `build`, retrying rate limits, server errors
/// and transport failures a fixed number of times with a fixed delay.
pub(crate) async fn send_with_retry<F>(
    service: &'static str,
    attempts: u32,
    build: F,
) -> Result<reqwest::Response, ApiError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let attempts = attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match build().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }
                if status == StatusCode::NOT_FOUND {
                    return Err(ApiError::NotFound(service.to_string()));
                }
                if status != StatusCode::TOO_MANY_REQUESTS && !status.is_server_error() {
                    return Err(ApiError::Status { service, status });
                }
                warn!(
                    "{} returned {} (attempt {}/{})",
                    service, status, attempt, attempts
                );
                last_error = Some(ApiError::Status { service, status });
            }
            Err(e) => {
                warn!(
                    "{} request failed (attempt {}/{}): {}",
                    service, attempt, attempts, e
                );
                last_error = Some(ApiError::Http(e));
            }
        }

        if attempt < attempts {
            tokio::time::sleep(RETRY_DELAY).await;
        }
    }

    Err(last_error.unwrap_or(ApiError::Status {
        service,
        status: StatusCode::SERVICE_UNAVAILABLE,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[tokio::test]
    async fn test_server_error_is_retried_until_success() {
        let mut server = Server::new_async().await;
        let failing = server
            .mock("GET", "/ping")
            .with_status(503)
            .expect(1)
            .create_async()
            .await;
        let ok = server
            .mock("GET", "/ping")
            .with_status(200)
            .with_body("pong")
            .expect(1)
            .create_async()
            .await;

        let http = reqwest::Client::new();
        let url = format!("{}/ping", server.url());
        let response = send_with_retry("test", 3, || http.get(&url)).await.unwrap();
        assert_eq!(response.text().await.unwrap(), "pong");
        failing.assert_async().await;
        ok.assert_async().await;
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let mut server = Server::new_async().await;
        let bad = server
            .mock("GET", "/ping")
            .with_status(400)
            .expect(1)
            .create_async()
            .await;

        let http = reqwest::Client::new();
        let url = format!("{}/ping", server.url());
        let err = send_with_retry("test", 3, || http.get(&url)).await.unwrap_err();
        assert!(matches!(
            err,
            ApiError::Status { status: StatusCode::BAD_REQUEST, .. }
        ));
        bad.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_resource_maps_to_not_found() {
        let mut server = Server::new_async().await;
        let missing = server
            .mock("GET", "/ping")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let http = reqwest::Client::new();
        let url = format!("{}/ping", server.url());
        let err = send_with_retry("test", 3, || http.get(&url)).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        missing.assert_async().await;
    }
}
