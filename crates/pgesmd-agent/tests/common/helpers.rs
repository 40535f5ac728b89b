// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use pgesmd_agent::{
    config::Config, document_store::DocumentStore, resource_fetcher::ResourceFetcher,
    state::ServiceState, time_series_sink::TimeSeriesSink, webhook_service::WebhookService,
};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

pub const UTILITY_URI: &str = "https://api.utility.example/GreenButtonConnect/espi/1_1/resource/";

pub fn tls_fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../testdata/tls")
        .join(name)
}

pub fn usage_document() -> &'static str {
    include_str!("../fixtures/usage_document.xml")
}

pub fn create_test_config(save_dir: &Path) -> Config {
    Config {
        utility_uri: UTILITY_URI.to_string(),
        port: 0,
        cert_path: tls_fixture("server.pem"),
        key_path: tls_fixture("server.key"),
        access_token: None,
        bulk_id: None,
        to_db: true,
        save_to_file: false,
        save_dir: save_dir.to_path_buf(),
        max_request_content_length: 1024 * 1024,
        fetch_timeout_secs: 5,
        sink_timeout_secs: 5,
        proxy_url: None,
        influxdb: None,
    }
}

/// Starts the webhook service on an ephemeral port and returns its address.
pub async fn start_webhook_service(
    config: Config,
    fetcher: Arc<dyn ResourceFetcher + Send + Sync>,
    sink: Option<Arc<dyn TimeSeriesSink + Send + Sync>>,
) -> SocketAddr {
    let acceptor = pgesmd_tls::build_tls_acceptor(&config.cert_path, &config.key_path)
        .expect("failed to build TLS acceptor");
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("unable to bind listener");
    let addr = listener.local_addr().expect("no local address");

    let service = WebhookService {
        document_store: Arc::new(DocumentStore::new(config.save_dir.clone())),
        state: Arc::new(ServiceState::new(config.save_to_file)),
        config: Arc::new(config),
        fetcher,
        sink,
    };
    tokio::spawn(async move {
        let _ = service.serve(listener, acceptor).await;
    });
    addr
}

/// HTTPS client trusting the test CA, with `localhost` pinned to the service address.
pub fn create_test_client(addr: SocketAddr) -> reqwest::Client {
    let ca = std::fs::read(tls_fixture("ca.pem")).expect("missing test CA");
    reqwest::Client::builder()
        .use_rustls_tls()
        .add_root_certificate(reqwest::Certificate::from_pem(&ca).expect("invalid test CA"))
        .resolve("localhost", addr)
        .timeout(Duration::from_secs(5))
        .build()
        .expect("failed to build client")
}

pub fn url(addr: SocketAddr, path: &str) -> String {
    format!("https://localhost:{}{path}", addr.port())
}

/// Polls `condition` until it holds, failing the test after a few seconds.
pub async fn wait_for(condition: impl Fn() -> bool) {
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for condition");
}
