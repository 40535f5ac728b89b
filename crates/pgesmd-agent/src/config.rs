// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_PORT: u16 = 7999;
const DEFAULT_SAVE_DIR: &str = "./data";
const DEFAULT_MEASUREMENT: &str = "pgesdm";

/// Where and how readings are written to InfluxDB.
#[derive(Debug, Clone)]
pub struct InfluxDbConfig {
    pub url: String,
    pub org: String,
    pub bucket: String,
    pub token: Option<String>,
    pub measurement: String,
    /// readings buffered before a write request is sent
    pub batch_size: usize,
}

impl InfluxDbConfig {
    /// Reads the `INFLUXDB_V2_*` variables used by the InfluxDB client libraries.
    pub fn from_env() -> Result<InfluxDbConfig, Box<dyn std::error::Error>> {
        let url = required_var("INFLUXDB_V2_URL")?;
        let org = required_var("INFLUXDB_V2_ORG")?;
        let bucket = required_var("INFLUXDB_V2_BUCKET")?;
        let batch_size: usize = parse_var("INFLUXDB_V2_BATCH_SIZE")?.unwrap_or(1);
        if batch_size == 0 {
            return Err(anyhow::anyhow!("INFLUXDB_V2_BATCH_SIZE must be at least 1").into());
        }

        Ok(InfluxDbConfig {
            url: url.trim_end_matches('/').to_string(),
            org,
            bucket,
            token: env::var("INFLUXDB_V2_TOKEN").ok(),
            measurement: env::var("INFLUXDB_V2_MEASUREMENT")
                .unwrap_or_else(|_| DEFAULT_MEASUREMENT.to_string()),
            batch_size,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// every resource URI in a notification must start with this
    pub utility_uri: String,
    pub port: u16,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub access_token: Option<String>,
    pub bulk_id: Option<String>,
    pub to_db: bool,
    /// initial state of the save-to-file toggle
    pub save_to_file: bool,
    pub save_dir: PathBuf,
    pub max_request_content_length: usize,
    /// bound on each document fetch, in seconds
    pub fetch_timeout_secs: u64,
    /// bound on each sink write, in seconds
    pub sink_timeout_secs: u64,
    pub proxy_url: Option<String>,
    pub influxdb: Option<InfluxDbConfig>,
}

impl Config {
    pub fn new() -> Result<Config, Box<dyn std::error::Error>> {
        let utility_uri = required_var("PGESMD_UTILITY_URI")?;
        let cert_path = PathBuf::from(required_var("PGESMD_CERT_PATH")?);
        let key_path = PathBuf::from(required_var("PGESMD_KEY_PATH")?);

        let to_db = parse_bool_var("PGESMD_TO_DB")?.unwrap_or(true);
        let influxdb = if to_db {
            Some(InfluxDbConfig::from_env().map_err(|err| {
                anyhow::anyhow!("PGESMD_TO_DB is enabled but InfluxDB is not configured: {err}")
            })?)
        } else {
            None
        };

        Ok(Config {
            utility_uri,
            port: parse_var("PGESMD_PORT")?.unwrap_or(DEFAULT_PORT),
            cert_path,
            key_path,
            access_token: env::var("PGESMD_ACCESS_TOKEN").ok(),
            bulk_id: env::var("PGESMD_BULK_ID").ok(),
            to_db,
            save_to_file: parse_bool_var("PGESMD_SAVE_TO_FILE")?.unwrap_or(false),
            save_dir: env::var("PGESMD_SAVE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_SAVE_DIR)),
            max_request_content_length: parse_var("PGESMD_MAX_REQUEST_CONTENT_LENGTH")?
                .unwrap_or(1024 * 1024), // 1MB in Bytes
            fetch_timeout_secs: parse_var("PGESMD_FETCH_TIMEOUT_SECS")?.unwrap_or(30),
            sink_timeout_secs: parse_var("PGESMD_SINK_TIMEOUT_SECS")?.unwrap_or(10),
            proxy_url: env::var("PGESMD_PROXY_HTTPS")
                .or_else(|_| env::var("HTTPS_PROXY"))
                .ok(),
            influxdb,
        })
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn sink_timeout(&self) -> Duration {
        Duration::from_secs(self.sink_timeout_secs)
    }
}

fn required_var(name: &str) -> Result<String, anyhow::Error> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(anyhow::anyhow!("{name} environment variable is not set")),
    }
}

fn parse_var<T: FromStr>(name: &str) -> Result<Option<T>, anyhow::Error> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{name} has an invalid value: {value:?}")),
        Err(_) => Ok(None),
    }
}

fn parse_bool_var(name: &str) -> Result<Option<bool>, anyhow::Error> {
    match env::var(name) {
        Ok(value) => match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(anyhow::anyhow!("{name} has an invalid value: {value:?}")),
        },
        Err(_) => Ok(None),
    }
}
