// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::{ClientBuilder, Identity};
use std::error::Error;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Creates a reqwest client builder using reqwest's rustls TLS implementation.
pub fn create_reqwest_client_builder() -> Result<ClientBuilder, Box<dyn Error>> {
    Ok(reqwest::Client::builder().use_rustls_tls())
}

/// Creates a reqwest client builder that presents the given certificate chain and private key
/// as its client identity. The utility API authenticates callers with the same certificate the
/// webhook listener serves, so both files are PEM encoded.
pub fn create_reqwest_client_builder_with_identity(
    cert_path: &Path,
    key_path: &Path,
) -> Result<ClientBuilder, Box<dyn Error>> {
    let mut pem = fs::read(cert_path)
        .map_err(|e| format!("unable to read certificate {}: {e}", cert_path.display()))?;
    if !pem.ends_with(b"\n") {
        pem.push(b'\n');
    }
    let key = fs::read(key_path)
        .map_err(|e| format!("unable to read private key {}: {e}", key_path.display()))?;
    pem.extend_from_slice(&key);

    let identity = Identity::from_pem(&pem)?;
    debug!(
        "Client builder is configured with identity from {}",
        cert_path.display()
    );
    Ok(create_reqwest_client_builder()?.identity(identity))
}
