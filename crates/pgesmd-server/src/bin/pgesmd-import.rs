// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Writes the readings of previously saved usage documents to InfluxDB.
//!
//! Usage: `pgesmd-import FILE...`

use std::env;
use tracing::{error, info};

use pgesmd_agent::{config, ingest_worker::write_readings, interval_decoder::IntervalDecoder};
use pgesmd_server::{build_sink, init_tracing};

#[tokio::main]
pub async fn main() {
    init_tracing();

    let paths: Vec<String> = env::args().skip(1).collect();
    if paths.is_empty() {
        error!("Usage: pgesmd-import FILE...");
        std::process::exit(2);
    }

    let config = match config::Config::new() {
        Ok(c) => c,
        Err(e) => {
            error!("Error creating config: {e}");
            std::process::exit(1);
        }
    };

    let sink = match build_sink(&config) {
        Ok(Some(sink)) => sink,
        Ok(None) => {
            error!("PGESMD_TO_DB is disabled, nothing to import into");
            std::process::exit(1);
        }
        Err(e) => {
            error!("Unable to create InfluxDB sink: {e}");
            std::process::exit(1);
        }
    };

    let mut failed_files = 0;
    for path in &paths {
        let decoder = match IntervalDecoder::from_path(path) {
            Ok(decoder) => decoder,
            Err(e) => {
                error!("Input xml file {path} could not be opened: {e}");
                failed_files += 1;
                continue;
            }
        };
        info!("Parsing the xml {path}");
        if let Err(e) = write_readings(sink.as_ref(), decoder, config.sink_timeout(), path).await {
            error!("Unable to decode {path}: {e}");
            failed_files += 1;
        }
    }

    if failed_files > 0 {
        std::process::exit(1);
    }
}
