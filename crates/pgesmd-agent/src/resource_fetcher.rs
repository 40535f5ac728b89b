// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::access_token::AccessTokenFactory;
use crate::config::Config;
use crate::errors::FetchError;
use crate::http_utils::build_client;

const BULK_RESOURCE_PATH: &str = "GreenButtonConnect/espi/1_1/resource/Batch/Bulk";
const PUBLISHED_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Retrieves usage documents from the utility.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// Returns the raw document behind a resource URI. An empty document is an error.
    async fn fetch(&self, uri: &str) -> Result<Bytes, FetchError>;

    /// Asks the utility to publish the last `days` days of data. The documents arrive later
    /// through regular notifications. Returns whether the utility accepted the request.
    async fn request_historical_data(&self, days: u32) -> Result<bool, FetchError>;
}

/// `published-min` and `published-max` of a backfill covering the `days` days before `now`.
pub fn historical_data_window(days: u32, now: DateTime<Utc>) -> (String, String) {
    let min = now - chrono::Duration::days(i64::from(days));
    (
        min.format(PUBLISHED_FORMAT).to_string(),
        now.format(PUBLISHED_FORMAT).to_string(),
    )
}

/// Fetches documents over HTTPS, presenting the service certificate as client identity.
pub struct HttpResourceFetcher {
    client: reqwest::Client,
    utility_uri: String,
    bulk_id: Option<String>,
    access_token: AccessTokenFactory,
    timeout: Duration,
}

impl HttpResourceFetcher {
    pub fn new(config: &Config, access_token: AccessTokenFactory) -> Result<Self, FetchError> {
        let client = build_client(
            config.proxy_url.as_deref(),
            Some((&config.cert_path, &config.key_path)),
            config.fetch_timeout(),
        )
        .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(HttpResourceFetcher::with_client(
            client,
            &config.utility_uri,
            config.bulk_id.clone(),
            access_token,
            config.fetch_timeout(),
        ))
    }

    pub fn with_client(
        client: reqwest::Client,
        utility_uri: &str,
        bulk_id: Option<String>,
        access_token: AccessTokenFactory,
        timeout: Duration,
    ) -> Self {
        HttpResourceFetcher {
            client,
            utility_uri: utility_uri.trim_end_matches('/').to_string(),
            bulk_id,
            access_token,
            timeout,
        }
    }

    async fn get(&self, uri: &str, query: &[(&str, String)]) -> Result<reqwest::Response, FetchError> {
        let mut request = self.client.get(uri).query(query);
        if let Some(token) = self.access_token.get_access_token() {
            request = request.bearer_auth(token);
        }
        request.send().await.map_err(|err| self.request_error(uri, err))
    }

    fn request_error(&self, uri: &str, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(uri.to_string(), self.timeout)
        } else {
            FetchError::Request {
                uri: uri.to_string(),
                message: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl ResourceFetcher for HttpResourceFetcher {
    async fn fetch(&self, uri: &str) -> Result<Bytes, FetchError> {
        let time = std::time::Instant::now();
        let response = self.get(uri, &[]).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                uri: uri.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response
            .bytes()
            .await
            .map_err(|err| self.request_error(uri, err))?;
        if body.is_empty() {
            return Err(FetchError::Empty(uri.to_string()));
        }
        debug!(
            "Fetched {} bytes from {uri} in {} ms",
            body.len(),
            time.elapsed().as_millis()
        );
        Ok(body)
    }

    async fn request_historical_data(&self, days: u32) -> Result<bool, FetchError> {
        let bulk_id = self.bulk_id.as_deref().ok_or(FetchError::MissingBulkId)?;
        let uri = format!("{}/{BULK_RESOURCE_PATH}/{bulk_id}", self.utility_uri);
        let (published_min, published_max) = historical_data_window(days, Utc::now());

        let response = self
            .get(
                &uri,
                &[
                    ("published-min", published_min),
                    ("published-max", published_max),
                ],
            )
            .await?;
        let status = response.status();
        if status.is_success() {
            info!("Historical data for the last {days} days requested");
            Ok(true)
        } else {
            let body = response.text().await.unwrap_or_default();
            error!("Historical data request failed with status {status}: {body}");
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mockito::{Matcher, Server};

    fn fetcher(server: &Server, bulk_id: Option<&str>, token: Option<&str>) -> HttpResourceFetcher {
        HttpResourceFetcher::with_client(
            reqwest::Client::new(),
            &format!("{}/", server.url()),
            bulk_id.map(str::to_string),
            AccessTokenFactory::from(token.map(str::to_string)),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_fetch_sends_bearer_token() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/resource/Batch/Subscription/1")
            .match_header("Authorization", "Bearer mock-token")
            .with_status(200)
            .with_body("<feed/>")
            .create_async()
            .await;

        let fetcher = fetcher(&server, None, Some("mock-token"));
        let body = fetcher
            .fetch(&format!("{}/resource/Batch/Subscription/1", server.url()))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(body, Bytes::from_static(b"<feed/>"));
    }

    #[tokio::test]
    async fn test_fetch_error_status() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/resource/1")
            .with_status(403)
            .create_async()
            .await;

        let uri = format!("{}/resource/1", server.url());
        let err = fetcher(&server, None, None).fetch(&uri).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_fetch_empty_document() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/resource/1")
            .with_status(200)
            .create_async()
            .await;

        let uri = format!("{}/resource/1", server.url());
        let err = fetcher(&server, None, None).fetch(&uri).await.unwrap_err();
        assert!(matches!(err, FetchError::Empty(u) if u == uri));
    }

    #[tokio::test]
    async fn test_fetch_unreachable() {
        let fetcher = HttpResourceFetcher::with_client(
            reqwest::Client::new(),
            "http://127.0.0.1:1",
            None,
            AccessTokenFactory::None,
            Duration::from_secs(1),
        );
        let err = fetcher.fetch("http://127.0.0.1:1/resource").await.unwrap_err();
        assert!(matches!(err, FetchError::Request { .. }));
    }

    #[tokio::test]
    async fn test_request_historical_data() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock(
                "GET",
                "/GreenButtonConnect/espi/1_1/resource/Batch/Bulk/50098",
            )
            .match_query(Matcher::AllOf(vec![
                Matcher::Regex("published-min=".to_string()),
                Matcher::Regex("published-max=".to_string()),
            ]))
            .with_status(202)
            .create_async()
            .await;

        let accepted = fetcher(&server, Some("50098"), None)
            .request_historical_data(30)
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(accepted);
    }

    #[tokio::test]
    async fn test_request_historical_data_rejected() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock(
                "GET",
                "/GreenButtonConnect/espi/1_1/resource/Batch/Bulk/50098",
            )
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("try later")
            .create_async()
            .await;

        let accepted = fetcher(&server, Some("50098"), None)
            .request_historical_data(30)
            .await
            .unwrap();
        assert!(!accepted);
    }

    #[tokio::test]
    async fn test_request_historical_data_without_bulk_id() {
        let server = Server::new_async().await;
        let err = fetcher(&server, None, None)
            .request_historical_data(30)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::MissingBulkId));
    }

    #[test]
    fn test_historical_data_window() {
        let now = Utc.with_ymd_and_hms(2021, 3, 31, 12, 30, 0).unwrap();
        let (min, max) = historical_data_window(120, now);
        assert_eq!(min, "2020-12-01T12:30:00Z");
        assert_eq!(max, "2021-03-31T12:30:00Z");
    }
}
