// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::sync::Arc;
use tracing::{debug, error, info};

use pgesmd_agent::{
    config, document_store::DocumentStore, state::ServiceState, webhook_service::WebhookService,
};
use pgesmd_server::{build_fetcher, build_sink, init_tracing};

#[tokio::main]
pub async fn main() {
    init_tracing();
    debug!("Starting Share My Data webhook service");

    let config = match config::Config::new() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!("Error creating config on webhook service startup: {e}");
            std::process::exit(1);
        }
    };

    let fetcher = match build_fetcher(&config) {
        Ok(fetcher) => fetcher,
        Err(e) => {
            error!("Unable to create resource fetcher: {e}");
            std::process::exit(1);
        }
    };

    let sink = match build_sink(&config) {
        Ok(sink) => sink,
        Err(e) => {
            error!("Unable to create InfluxDB sink: {e}");
            std::process::exit(1);
        }
    };
    if sink.is_none() {
        info!("Database: disabled, readings will not be written");
    }

    let webhook_service = WebhookService {
        config: Arc::clone(&config),
        fetcher,
        sink,
        document_store: Arc::new(DocumentStore::new(config.save_dir.clone())),
        state: Arc::new(ServiceState::new(config.save_to_file)),
    };

    if let Err(e) = webhook_service.start_webhook_service().await {
        error!("Error when running webhook service: {e}");
        std::process::exit(1);
    }
}
