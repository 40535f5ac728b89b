// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::service::service_fn;
use hyper::{header, http, Method, Request, Response, StatusCode};
use pgesmd_tls::{build_tls_acceptor, TlsAcceptor};
use serde_json::json;
use std::fmt::Display;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::document_store::DocumentStore;
use crate::errors::StoreError;
use crate::http_utils::{
    create_empty_http_response, create_json_http_response, log_and_create_http_response,
    verify_request_content_length, HttpResponse,
};
use crate::ingest_worker::IngestWorker;
use crate::notification::{decode_notification, Notification};
use crate::resource_fetcher::ResourceFetcher;
use crate::state::ServiceState;
use crate::time_series_sink::TimeSeriesSink;

const NOTIFICATION_ENDPOINT_PATH: &str = "/pgesmd";
const TEST_ENDPOINT_PATH: &str = "/test";
const STATUS_ENDPOINT_PATH: &str = "/pgesmd/status";
const SAVE_TO_FILE_ENDPOINT_PATH: &str = "/pgesmd/save_to_file";
const REQUEST_HISTORICAL_DATA_ENDPOINT_PATH: &str = "/pgesmd/request_historical_data";
const READ_XML_FILE_ENDPOINT_PATH: &str = "/pgesmd/read_xml_file";
const NOTIFICATION_CHANNEL_BUFFER_SIZE: usize = 10;
/// Days covered by a backfill triggered through the control endpoint.
pub const HISTORICAL_DATA_DAYS: u32 = 30;

/// HTTPS endpoint the utility posts notifications to.
pub struct WebhookService {
    pub config: Arc<Config>,
    pub fetcher: Arc<dyn ResourceFetcher + Send + Sync>,
    pub sink: Option<Arc<dyn TimeSeriesSink + Send + Sync>>,
    pub document_store: Arc<DocumentStore>,
    pub state: Arc<ServiceState>,
}

/// What every request handler needs, built once per service.
struct EndpointContext {
    config: Arc<Config>,
    fetcher: Arc<dyn ResourceFetcher + Send + Sync>,
    document_store: Arc<DocumentStore>,
    state: Arc<ServiceState>,
    notification_tx: Sender<Notification>,
}

impl WebhookService {
    pub async fn start_webhook_service(&self) -> Result<(), Box<dyn std::error::Error>> {
        let now = Instant::now();

        // refuse to start without TLS material
        let acceptor = build_tls_acceptor(&self.config.cert_path, &self.config.key_path)?;

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let listener = TcpListener::bind(&addr).await?;

        info!("Webhook service listening on port {}", self.config.port);
        debug!(
            "Time taken to start the webhook service: {} ms",
            now.elapsed().as_millis()
        );

        self.serve(listener, acceptor).await
    }

    /// Serves HTTPS on an already bound listener until the ingest worker stops or accepting fails.
    pub async fn serve(
        &self,
        listener: TcpListener,
        acceptor: TlsAcceptor,
    ) -> Result<(), Box<dyn std::error::Error>> {
        // notifications are acknowledged by the handlers and processed in arrival order by a
        // single worker, so the resources of one notification are never interleaved with another's
        let (notification_tx, notification_rx): (Sender<Notification>, Receiver<Notification>) =
            mpsc::channel(NOTIFICATION_CHANNEL_BUFFER_SIZE);

        let ingest_worker = IngestWorker {
            config: self.config.clone(),
            fetcher: self.fetcher.clone(),
            sink: self.sink.clone(),
            document_store: self.document_store.clone(),
            state: self.state.clone(),
        };
        let ingest_worker_handle = tokio::spawn(async move {
            ingest_worker.start_ingest_worker(notification_rx).await;
        });

        let context = Arc::new(EndpointContext {
            config: self.config.clone(),
            fetcher: self.fetcher.clone(),
            document_store: self.document_store.clone(),
            state: self.state.clone(),
            notification_tx,
        });

        let service = service_fn(move |req: Request<hyper::body::Incoming>| {
            // called for each http request
            let context = context.clone();
            async move { context.endpoint_handler(req).await }
        });

        Self::serve_tls(listener, acceptor, service, ingest_worker_handle).await
    }

    async fn serve_tls<S>(
        listener: TcpListener,
        acceptor: TlsAcceptor,
        service: S,
        mut ingest_worker_handle: tokio::task::JoinHandle<()>,
    ) -> Result<(), Box<dyn std::error::Error>>
    where
        S: hyper::service::Service<Request<hyper::body::Incoming>, Response = HttpResponse>
            + Clone
            + Send
            + 'static,
        S::Future: Send,
        S::Error: std::error::Error + Send + Sync + 'static,
    {
        let server = hyper::server::conn::http1::Builder::new();
        let mut joinset = tokio::task::JoinSet::new();

        loop {
            let (conn, peer) = tokio::select! {
                con_res = listener.accept() => match con_res {
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        error!("Server error: {e}");
                        return Err(e.into());
                    }
                    Ok(accepted) => accepted,
                },
                finished = async {
                    match joinset.join_next().await {
                        Some(finished) => finished,
                        None => std::future::pending().await,
                    }
                } => match finished {
                    Err(e) if e.is_panic() => {
                        error!("Connection handler panicked: {:?}", e);
                        continue;
                    },
                    Ok(()) | Err(_) => continue,
                },
                result = &mut ingest_worker_handle => {
                    error!("Ingest worker task died: {:?}", result);
                    return Err("Ingest worker task terminated unexpectedly".into());
                },
            };

            let acceptor = acceptor.clone();
            let server = server.clone();
            let service = service.clone();
            joinset.spawn(async move {
                let stream = match acceptor.accept(conn).await {
                    Ok(stream) => stream,
                    Err(e) => {
                        debug!("TLS handshake with {peer} failed: {e}");
                        return;
                    }
                };
                debug!("Accepted connection from {peer}");
                let conn = hyper_util::rt::TokioIo::new(stream);
                if let Err(e) = server.serve_connection(conn, service).await {
                    error!("Connection error: {e}");
                }
            });
        }
    }
}

impl EndpointContext {
    async fn endpoint_handler<B>(&self, req: Request<B>) -> http::Result<HttpResponse>
    where
        B: Body,
        B::Error: Display,
    {
        match (req.method(), req.uri().path()) {
            (&Method::POST, NOTIFICATION_ENDPOINT_PATH) => self.notification_handler(req).await,
            (&Method::POST, TEST_ENDPOINT_PATH) => create_empty_http_response(StatusCode::OK),
            (&Method::GET, STATUS_ENDPOINT_PATH) => self.status_handler(),
            (&Method::GET, SAVE_TO_FILE_ENDPOINT_PATH) => self.save_to_file_handler(),
            (&Method::GET, REQUEST_HISTORICAL_DATA_ENDPOINT_PATH) => {
                self.request_historical_data_handler().await
            }
            (&Method::GET, READ_XML_FILE_ENDPOINT_PATH) => {
                self.read_xml_file_handler(req.uri().query()).await
            }
            _ => create_empty_http_response(StatusCode::NOT_FOUND),
        }
    }

    /// Acknowledges a notification as soon as it is decoded. Fetching and writing happen after
    /// the response, on the ingest worker. When the worker is `NOTIFICATION_CHANNEL_BUFFER_SIZE`
    /// notifications behind, the caller gets a 503 and may retry.
    async fn notification_handler<B>(&self, req: Request<B>) -> http::Result<HttpResponse>
    where
        B: Body,
        B::Error: Display,
    {
        let (parts, body) = req.into_parts();
        if let Some(response) = verify_request_content_length(
            &parts.headers,
            self.config.max_request_content_length,
            "Error processing notification",
        ) {
            return response;
        }

        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                return log_and_create_http_response(
                    &format!("Error reading notification body: {e}"),
                    StatusCode::BAD_REQUEST,
                );
            }
        };
        debug!("Notification body: {}", String::from_utf8_lossy(&body));

        let notification = match decode_notification(&body) {
            Ok(notification) => notification,
            Err(e) => {
                return log_and_create_http_response(
                    &format!("Malformed notification: {e}"),
                    StatusCode::BAD_REQUEST,
                );
            }
        };
        info!(
            "Received notification with {} resource URIs",
            notification.len()
        );

        // never wait on the worker here, a full queue is reported to the caller instead
        match self.notification_tx.try_send(notification) {
            Ok(()) => create_empty_http_response(StatusCode::OK),
            Err(TrySendError::Full(notification)) => log_and_create_http_response(
                &format!(
                    "Ingest queue is full, dropping notification with {} resource URIs",
                    notification.len()
                ),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            Err(TrySendError::Closed(_)) => log_and_create_http_response(
                "Error sending notification to the ingest worker: channel closed",
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        }
    }

    fn status_handler(&self) -> http::Result<HttpResponse> {
        create_json_http_response(&json!({
            "save_to_file": self.state.save_to_file(),
            "to_db": self.config.to_db,
            "request_historical_data": HISTORICAL_DATA_DAYS,
            "read_xml_file": "?file=filename",
        }))
    }

    fn save_to_file_handler(&self) -> http::Result<HttpResponse> {
        let save_to_file = self.state.toggle_save_to_file();
        info!("Saving fetched documents to file: {save_to_file}");
        create_json_http_response(&json!({
            "save_to_file": save_to_file,
            "to_db": self.config.to_db,
        }))
    }

    async fn request_historical_data_handler(&self) -> http::Result<HttpResponse> {
        match self
            .fetcher
            .request_historical_data(HISTORICAL_DATA_DAYS)
            .await
        {
            Ok(accepted) => create_json_http_response(&json!({
                "request_historical_data": HISTORICAL_DATA_DAYS,
                "accepted": accepted,
            })),
            Err(e) => log_and_create_http_response(
                &format!("Error requesting historical data: {e}"),
                StatusCode::BAD_GATEWAY,
            ),
        }
    }

    async fn read_xml_file_handler(&self, query: Option<&str>) -> http::Result<HttpResponse> {
        let file = query.and_then(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .find(|(key, _)| key == "file")
                .map(|(_, value)| value.into_owned())
        });
        let Some(file) = file else {
            return log_and_create_http_response(
                "Missing file query parameter",
                StatusCode::BAD_REQUEST,
            );
        };
        debug!("Reading saved document {file}");

        match self.document_store.read(&file).await {
            Ok(document) => Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/xml")
                .body(Full::new(Bytes::from(document))),
            Err(e @ StoreError::InvalidName(_)) => {
                log_and_create_http_response(&e.to_string(), StatusCode::BAD_REQUEST)
            }
            Err(e @ StoreError::NotFound(_)) => {
                log_and_create_http_response(&e.to_string(), StatusCode::NOT_FOUND)
            }
            Err(e) => log_and_create_http_response(
                &format!("Error reading saved document: {e}"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        }
    }
}
