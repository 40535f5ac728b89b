// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod access_token;
pub mod config;
pub mod document_store;
pub mod errors;
pub mod http_utils;
pub mod ingest_worker;
pub mod interval_decoder;
pub mod notification;
pub mod resource_fetcher;
pub mod state;
pub mod time_series_sink;
pub mod webhook_service;
