// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy of the ingestion pipeline.
//!
//! Everything below [`ResourceError`] is per-resource or per-reading: the ingest worker logs it
//! and moves on to the next resource URI or reading.

use std::time::Duration;

/// A notification body or usage document could not be turned into values.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("XML is not well-formed: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("document has no root element")]
    EmptyDocument,

    #[error("document has more than one root element")]
    MultipleRoots,

    #[error("unexpected text outside the root element")]
    TextOutsideRoot,

    #[error("document ended inside an unclosed element")]
    UnexpectedEof,

    #[error("interval reading is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid number in `{field}`: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("interval block appears before powerOfTenMultiplier, commodity and flowDirection are known")]
    MissingReadingType,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {uri} failed: {message}")]
    Request { uri: String, message: String },

    #[error("{uri} responded with status {status}")]
    Status { uri: String, status: u16 },

    #[error("{0} returned an empty document")]
    Empty(String),

    #[error("request to {0} timed out after {1:?}")]
    Timeout(String, Duration),

    #[error("no bulk id configured, set PGESMD_BULK_ID")]
    MissingBulkId,

    #[error("unable to build HTTP client: {0}")]
    Client(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("write request failed: {0}")]
    Request(String),

    #[error("backend responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("write timed out after {0:?}")]
    Timeout(Duration),
}

/// Why a single resource URI of a notification produced no (or partial) data.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("resource URI {uri:?} does not start with {expected}")]
    PrefixMismatch { uri: String, expected: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("unable to decode usage document: {0}")]
    Decode(#[from] DecodeError),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid document name {0:?}")]
    InvalidName(String),

    #[error("document {0:?} not found")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
