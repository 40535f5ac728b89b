// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Asks the utility to publish historical usage data. The documents arrive later as regular
//! notifications to the webhook service.
//!
//! Usage: `pgesmd-request-historical-data [DAYS]` (defaults to 120 days)

use std::env;
use tracing::{error, info};

use pgesmd_agent::config;
use pgesmd_server::{build_fetcher, init_tracing};

const DEFAULT_DAYS: u32 = 120;

#[tokio::main]
pub async fn main() {
    init_tracing();

    let days = match env::args().nth(1) {
        Some(arg) => match arg.parse::<u32>() {
            Ok(days) => days,
            Err(_) => {
                error!("Invalid number of days: {arg:?}");
                std::process::exit(2);
            }
        },
        None => DEFAULT_DAYS,
    };

    let config = match config::Config::new() {
        Ok(c) => c,
        Err(e) => {
            error!("Error creating config: {e}");
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

    match fetcher.request_historical_data(days).await {
        Ok(true) => info!("request_historical_data({days}) accepted"),
        Ok(false) => {
            error!("request_historical_data({days}) was not accepted");
            std::process::exit(1);
        }
        Err(e) => {
            error!("request_historical_data({days}) failed: {e}");
            std::process::exit(1);
        }
    }
}
