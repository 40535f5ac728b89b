// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use chrono::Local;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::document_store::{document_name, DocumentStore};
use crate::errors::{DecodeError, FetchError, ResourceError, SinkError};
use crate::interval_decoder::{IntervalDecoder, IntervalReading};
use crate::notification::Notification;
use crate::resource_fetcher::ResourceFetcher;
use crate::state::ServiceState;
use crate::time_series_sink::TimeSeriesSink;

/// Cadence of the cumulative progress log while writing readings.
pub const LOG_EVERY_N_READINGS: usize = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub written: usize,
    pub failed: usize,
}

impl WriteSummary {
    pub fn processed(&self) -> usize {
        self.written + self.failed
    }
}

/// Outcome of one resource URI that was fetched successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSummary {
    pub uri: String,
    pub document_len: usize,
    pub saved_to: Option<PathBuf>,
    /// `None` when readings are not forwarded to a sink
    pub readings: Option<WriteSummary>,
}

/// Runs fetch, save, decode and sink for each resource URI of a notification.
pub struct IngestWorker {
    pub config: Arc<Config>,
    pub fetcher: Arc<dyn ResourceFetcher + Send + Sync>,
    pub sink: Option<Arc<dyn TimeSeriesSink + Send + Sync>>,
    pub document_store: Arc<DocumentStore>,
    pub state: Arc<ServiceState>,
}

impl IngestWorker {
    /// Processes notifications one after the other until every sender is dropped.
    pub async fn start_ingest_worker(&self, mut notification_rx: Receiver<Notification>) {
        while let Some(notification) = notification_rx.recv().await {
            self.process_notification(&notification).await;
        }
        debug!("Ingest worker stopped, notification channel closed");
    }

    /// Handles the resource URIs strictly in order. A failing resource never stops the ones
    /// after it.
    pub async fn process_notification(
        &self,
        notification: &Notification,
    ) -> Vec<Result<ResourceSummary, ResourceError>> {
        let mut results = Vec::with_capacity(notification.len());
        for uri in &notification.resource_uris {
            debug!("resource_uri: {uri}");
            let result = self.process_resource(uri).await;
            match &result {
                Ok(summary) => debug!("Finished resource {}: {summary:?}", summary.uri),
                Err(ResourceError::Fetch(err @ FetchError::Empty(_))) => {
                    info!("No data for resource {uri}: {err}")
                }
                Err(err) => error!("Skipping resource {uri}: {err}"),
            }
            results.push(result);
        }
        results
    }

    pub async fn process_resource(&self, uri: &str) -> Result<ResourceSummary, ResourceError> {
        if !uri.starts_with(&self.config.utility_uri) {
            return Err(ResourceError::PrefixMismatch {
                uri: uri.to_string(),
                expected: self.config.utility_uri.clone(),
            });
        }

        let fetch_timeout = self.config.fetch_timeout();
        let document = match tokio::time::timeout(fetch_timeout, self.fetcher.fetch(uri)).await {
            Ok(result) => result?,
            Err(_) => return Err(FetchError::Timeout(uri.to_string(), fetch_timeout).into()),
        };

        let mut summary = ResourceSummary {
            uri: uri.to_string(),
            document_len: document.len(),
            saved_to: None,
            readings: None,
        };

        if self.state.save_to_file() {
            let name = document_name(uri, Local::now());
            match self.document_store.save(&name, &document).await {
                Ok(path) => {
                    info!("XML saved at {}", path.display());
                    summary.saved_to = Some(path);
                }
                Err(err) => error!("File not saved: {err}"),
            }
        }

        if let Some(sink) = &self.sink {
            info!("Database: writing readings from {uri}");
            let readings = IntervalDecoder::from_bytes(&document);
            summary.readings = Some(
                write_readings(sink.as_ref(), readings, self.config.sink_timeout(), uri).await?,
            );
        }

        Ok(summary)
    }
}

/// Feeds every decoded reading to the sink.
///
/// Failed writes are logged and counted, never fatal. A decode error stops the document: the
/// readings before it stay written and the error is returned.
pub async fn write_readings<I>(
    sink: &(dyn TimeSeriesSink + Send + Sync),
    readings: I,
    timeout: Duration,
    resource: &str,
) -> Result<WriteSummary, DecodeError>
where
    I: Iterator<Item = Result<IntervalReading, DecodeError>> + Send,
{
    let mut summary = WriteSummary::default();
    let mut decode_error = None;

    for reading in readings {
        let reading = match reading {
            Ok(reading) => reading,
            Err(err) => {
                decode_error = Some(err);
                break;
            }
        };

        let result = match tokio::time::timeout(timeout, sink.write(&reading)).await {
            Ok(result) => result,
            Err(_) => Err(SinkError::Timeout(timeout)),
        };
        match result {
            Ok(()) => summary.written += 1,
            Err(err) => {
                summary.failed += 1;
                error!(
                    "Database: failed to write reading starting at {}: {err}",
                    reading.start_epoch_seconds
                );
            }
        }

        if summary.processed() % LOG_EVERY_N_READINGS == 0 {
            info!(
                "Database: {} readings written so far ({} failed)",
                summary.written, summary.failed
            );
        }
    }

    let flushed = match tokio::time::timeout(timeout, sink.flush()).await {
        Ok(result) => result,
        Err(_) => Err(SinkError::Timeout(timeout)),
    };
    if let Err(err) = flushed {
        error!("Database: failed to flush readings from {resource}: {err}");
    }

    info!(
        "Database: wrote {} readings from {resource} ({} failed)",
        summary.written, summary.failed
    );
    match decode_error {
        Some(err) => Err(err),
        None => Ok(summary),
    }
}
