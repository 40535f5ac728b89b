// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::InfluxDbConfig;
use crate::errors::SinkError;
use crate::http_utils::build_client;
use crate::interval_decoder::IntervalReading;

/// Storage backend for decoded readings.
#[async_trait]
pub trait TimeSeriesSink: Send + Sync {
    /// Stores one reading, or buffers it for a later batch.
    async fn write(&self, reading: &IntervalReading) -> Result<(), SinkError>;

    /// Sends whatever is still buffered. Called once per resource.
    async fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

fn escape_measurement(measurement: &str) -> String {
    measurement.replace(',', "\\,").replace(' ', "\\ ")
}

/// Renders a reading as one line of InfluxDB line protocol with second precision.
pub fn to_line_protocol(measurement: &str, reading: &IntervalReading) -> String {
    format!(
        "{},commodity={},flowDirection={} tou={}i,duration={}i,wattHour={} {}",
        escape_measurement(measurement),
        reading.commodity,
        reading.flow_direction,
        reading.time_of_use,
        reading.duration_seconds,
        reading.watt_hours,
        reading.start_epoch_seconds
    )
}

/// Writes readings through the InfluxDB v2 write API.
pub struct InfluxDbSink {
    client: reqwest::Client,
    write_url: String,
    org: String,
    bucket: String,
    token: Option<String>,
    measurement: String,
    batch_size: usize,
    timeout: Duration,
    buffer: Mutex<Vec<String>>,
}

impl InfluxDbSink {
    pub fn new(
        config: &InfluxDbConfig,
        proxy_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, SinkError> {
        let client = build_client(proxy_url, None, timeout)
            .map_err(|e| SinkError::Request(e.to_string()))?;
        Ok(InfluxDbSink::with_client(client, config, timeout))
    }

    pub fn with_client(client: reqwest::Client, config: &InfluxDbConfig, timeout: Duration) -> Self {
        InfluxDbSink {
            client,
            write_url: format!("{}/api/v2/write", config.url.trim_end_matches('/')),
            org: config.org.clone(),
            bucket: config.bucket.clone(),
            token: config.token.clone(),
            measurement: config.measurement.clone(),
            batch_size: config.batch_size.max(1),
            timeout,
            buffer: Mutex::new(Vec::new()),
        }
    }

    async fn send(&self, lines: Vec<String>) -> Result<(), SinkError> {
        let mut request = self
            .client
            .post(&self.write_url)
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "s"),
            ])
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(lines.join("\n"));
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Token {token}"));
        }

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                SinkError::Timeout(self.timeout)
            } else {
                SinkError::Request(err.to_string())
            }
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Status {
                status: status.as_u16(),
                body,
            });
        }
        debug!("InfluxDB | wrote {} points", lines.len());
        Ok(())
    }
}

#[async_trait]
impl TimeSeriesSink for InfluxDbSink {
    async fn write(&self, reading: &IntervalReading) -> Result<(), SinkError> {
        let batch = {
            let mut buffer = self.buffer.lock().await;
            buffer.push(to_line_protocol(&self.measurement, reading));
            if buffer.len() < self.batch_size {
                return Ok(());
            }
            std::mem::take(&mut *buffer)
        };
        self.send(batch).await
    }

    async fn flush(&self) -> Result<(), SinkError> {
        let batch = std::mem::take(&mut *self.buffer.lock().await);
        if batch.is_empty() {
            return Ok(());
        }
        self.send(batch).await
    }
}
