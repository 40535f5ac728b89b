// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock implementations of the pipeline collaborators for testing

use bytes::Bytes;
use pgesmd_agent::{
    errors::{FetchError, SinkError},
    interval_decoder::IntervalReading,
    resource_fetcher::ResourceFetcher,
    time_series_sink::TimeSeriesSink,
};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::Notify;

/// Serves fixed documents and records every URI it was asked for.
///
/// When gated, each fetch waits until [`MockFetcher::open_gate`] is called.
pub struct MockFetcher {
    documents: HashMap<String, Bytes>,
    fetched: Mutex<Vec<String>>,
    gate: Option<Notify>,
}

#[allow(dead_code)]
impl MockFetcher {
    pub fn new(documents: Vec<(&str, &'static str)>) -> Self {
        MockFetcher {
            documents: documents
                .into_iter()
                .map(|(uri, document)| (uri.to_string(), Bytes::from_static(document.as_bytes())))
                .collect(),
            fetched: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    pub fn gated(documents: Vec<(&str, &'static str)>) -> Self {
        MockFetcher {
            gate: Some(Notify::new()),
            ..MockFetcher::new(documents)
        }
    }

    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ResourceFetcher for MockFetcher {
    async fn fetch(&self, uri: &str) -> Result<Bytes, FetchError> {
        self.fetched.lock().unwrap().push(uri.to_string());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.documents
            .get(uri)
            .cloned()
            .ok_or_else(|| FetchError::Empty(uri.to_string()))
    }

    async fn request_historical_data(&self, _days: u32) -> Result<bool, FetchError> {
        Ok(true)
    }
}

/// Keeps every reading it is given.
#[derive(Default)]
pub struct MockSink {
    readings: Mutex<Vec<IntervalReading>>,
}

#[allow(dead_code)]
impl MockSink {
    pub fn readings(&self) -> Vec<IntervalReading> {
        self.readings.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl TimeSeriesSink for MockSink {
    async fn write(&self, reading: &IntervalReading) -> Result<(), SinkError> {
        self.readings.lock().unwrap().push(*reading);
        Ok(())
    }
}
