// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! Wiring shared by the binaries: logging setup and construction of the fetcher and sink from
//! configuration.

use std::{env, sync::Arc};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use pgesmd_agent::{
    access_token::AccessTokenFactory,
    config::Config,
    errors::{FetchError, SinkError},
    resource_fetcher::{HttpResourceFetcher, ResourceFetcher},
    time_series_sink::{InfluxDbSink, TimeSeriesSink},
};

/// Log filter applied on top of `PGESMD_LOG_LEVEL`; the HTTP and TLS stacks are silenced.
pub fn log_filter(log_level: &str) -> String {
    format!("h2=off,hyper=off,rustls=off,{log_level}")
}

pub fn init_tracing() {
    let log_level = env::var("PGESMD_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(log_filter(&log_level))
                .expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");
}

pub fn build_fetcher(config: &Config) -> Result<Arc<dyn ResourceFetcher + Send + Sync>, FetchError> {
    let access_token = AccessTokenFactory::from(config.access_token.clone());
    let fetcher = HttpResourceFetcher::new(config, access_token)?;
    Ok(Arc::new(fetcher))
}

/// Returns `None` when readings are not forwarded to a database.
pub fn build_sink(
    config: &Config,
) -> Result<Option<Arc<dyn TimeSeriesSink + Send + Sync>>, SinkError> {
    let Some(influxdb) = config.influxdb.as_ref().filter(|_| config.to_db) else {
        return Ok(None);
    };
    let sink = InfluxDbSink::new(influxdb, config.proxy_url.as_deref(), config.sink_timeout())?;
    Ok(Some(Arc::new(sink)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgesmd_agent::config::InfluxDbConfig;
    use std::path::PathBuf;

    fn create_test_config(to_db: bool) -> Config {
        Config {
            utility_uri: "https://api.utility.example/".to_string(),
            port: 7999,
            cert_path: PathBuf::from("cert.pem"),
            key_path: PathBuf::from("key.pem"),
            access_token: None,
            bulk_id: None,
            to_db,
            save_to_file: false,
            save_dir: PathBuf::from("./data"),
            max_request_content_length: 1024,
            fetch_timeout_secs: 30,
            sink_timeout_secs: 10,
            proxy_url: None,
            influxdb: Some(InfluxDbConfig {
                url: "http://localhost:8086".to_string(),
                org: "home".to_string(),
                bucket: "energy".to_string(),
                token: None,
                measurement: "pgesdm".to_string(),
                batch_size: 1,
            }),
        }
    }

    #[test]
    fn test_log_filter() {
        assert_eq!(log_filter("debug"), "h2=off,hyper=off,rustls=off,debug");
        assert!(EnvFilter::try_new(log_filter("info")).is_ok());
    }

    #[test]
    fn test_build_sink() {
        assert!(build_sink(&create_test_config(true)).unwrap().is_some());
        assert!(build_sink(&create_test_config(false)).unwrap().is_none());
    }

    #[test]
    fn test_build_fetcher_requires_client_identity() {
        // the certificate files do not exist
        assert!(matches!(
            build_fetcher(&create_test_config(false)),
            Err(FetchError::Client(_))
        ));
    }
}
