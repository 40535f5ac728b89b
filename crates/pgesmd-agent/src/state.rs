// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicBool, Ordering};

/// Runtime switches shared between the request handlers and the ingest worker.
#[derive(Debug, Default)]
pub struct ServiceState {
    save_to_file: AtomicBool,
}

impl ServiceState {
    pub fn new(save_to_file: bool) -> ServiceState {
        ServiceState {
            save_to_file: AtomicBool::new(save_to_file),
        }
    }

    pub fn save_to_file(&self) -> bool {
        self.save_to_file.load(Ordering::SeqCst)
    }

    /// Flips the save-to-file switch and returns the new value.
    pub fn toggle_save_to_file(&self) -> bool {
        !self.save_to_file.fetch_xor(true, Ordering::SeqCst)
    }
}
