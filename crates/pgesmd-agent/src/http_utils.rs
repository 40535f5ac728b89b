// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use core::time::Duration;
use http_body_util::Full;
use hyper::{
    header,
    http::{self, HeaderMap},
    Response, StatusCode,
};
use pgesmd_tls::reqwest_adapter::{
    create_reqwest_client_builder, create_reqwest_client_builder_with_identity,
};
use serde_json::json;
use std::error::Error;
use std::path::Path;
use tracing::{debug, error};

pub type HttpResponse = Response<Full<Bytes>>;

/// Does two things:
/// 1. Logs the given message. A success status code (within 200-299) will cause a debug log to be
///    written, otherwise error will be written.
/// 2. Returns the given message in the body of JSON response with the given status code.
///
/// Response body format:
/// {
///     "message": message
/// }
pub fn log_and_create_http_response(
    message: &str,
    status: StatusCode,
) -> http::Result<HttpResponse> {
    if status.is_success() {
        debug!("{message}");
    } else {
        error!("{message}");
    }
    let body = json!({ "message": message }).to_string();
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
}

/// Returns the given value serialized as a JSON response body with a 200 status.
pub fn create_json_http_response(value: &serde_json::Value) -> http::Result<HttpResponse> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(value.to_string())))
}

/// Returns an empty-bodied response with the given status.
pub fn create_empty_http_response(status: StatusCode) -> http::Result<HttpResponse> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::new()))
}

/// Takes a request's header map, and verifies that the "content-length" header is present,
/// valid, and less than the given max_content_length. Notifications are always sent with a
/// declared length, so chunked bodies are rejected too.
///
/// Will return None if no issues are found. Otherwise logs an error (with the given prefix) and
/// returns an HTTP Response with the appropriate error status code.
pub fn verify_request_content_length(
    header_map: &HeaderMap,
    max_content_length: usize,
    error_message_prefix: &str,
) -> Option<http::Result<HttpResponse>> {
    let content_length_header = match header_map.get(header::CONTENT_LENGTH) {
        Some(res) => res,
        None => {
            return Some(log_and_create_http_response(
                &format!("{error_message_prefix}: Missing Content-Length header"),
                StatusCode::LENGTH_REQUIRED,
            ));
        }
    };
    let content_length = match content_length_header
        .to_str()
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
    {
        Some(res) => res,
        None => {
            return Some(log_and_create_http_response(
                &format!("{error_message_prefix}: Invalid Content-Length header"),
                StatusCode::BAD_REQUEST,
            ));
        }
    };
    if content_length > max_content_length {
        return Some(log_and_create_http_response(
            &format!("{error_message_prefix}: Payload too large"),
            StatusCode::PAYLOAD_TOO_LARGE,
        ));
    }
    None
}

/// Builds a reqwest client with optional proxy configuration, client identity and timeout.
pub fn build_client(
    proxy_url: Option<&str>,
    identity: Option<(&Path, &Path)>,
    timeout: Duration,
) -> Result<reqwest::Client, Box<dyn Error>> {
    let builder = match identity {
        Some((cert_path, key_path)) => {
            create_reqwest_client_builder_with_identity(cert_path, key_path)?
        }
        None => create_reqwest_client_builder()?,
    };
    let mut builder = builder.timeout(timeout);
    if let Some(proxy) = proxy_url {
        builder = builder.proxy(reqwest::Proxy::https(proxy)?);
    }
    Ok(builder.build()?)
}
