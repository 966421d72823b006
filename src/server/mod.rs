//! HTTP server module
//!
//! Accepts producer connections and routes them:
//!
//! | Route | Handler |
//! |-------|---------|
//! | `GET /health` | liveness probe, `ok` |
//! | `POST`/`PUT` on the ingest path | one streaming upload session |
//! | anything else | 404 |
//!
//! # Example
//!
//! ```no_run
//! use stream_uploadr::{config::Config, server::Server};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("config.yaml")?;
//! let server = Server::from_config(config).await?;
//! println!("Listening on {}", server.local_addr());
//! server.run_until(tokio::signal::ctrl_c()).await?;
//! # Ok(())
//! # }
//! ```

pub mod ingest;
pub mod registry;

pub use registry::{SessionGuard, SessionRegistry};

use crate::config::Config;
use crate::s3::{S3Client, S3ClientConfig};
use crate::upload::{ObjectStore, S3ObjectStore};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(String),

    #[error("Object store setup failed: {0}")]
    StoreError(String),

    #[error("Server error: {0}")]
    RuntimeError(String),
}

/// State shared by every connection
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn ObjectStore>,
    pub registry: Arc<SessionRegistry>,
}

/// Ingest server
pub struct Server {
    state: Arc<AppState>,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Bind the configured address with an explicit object store
    ///
    /// Port 0 lets the OS pick; see [`local_addr`](Self::local_addr).
    pub async fn new(config: Config, store: Arc<dyn ObjectStore>) -> Result<Self, ServerError> {
        let addr: SocketAddr = config
            .server
            .address
            .parse()
            .map_err(|e| ServerError::BindError(format!("Invalid address: {}", e)))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(format!("Failed to bind to {}: {}", addr, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(format!("Failed to get local address: {}", e)))?;

        info!("Server bound to {}", local_addr);

        Ok(Self {
            state: Arc::new(AppState {
                config,
                store,
                registry: Arc::new(SessionRegistry::new()),
            }),
            listener,
            local_addr,
        })
    }

    /// Bind with an S3 store built from `config.s3`
    pub async fn from_config(config: Config) -> Result<Self, ServerError> {
        let client_config = S3ClientConfig::from_config(&config.s3)
            .map_err(|e| ServerError::StoreError(e.to_string()))?;
        let client =
            S3Client::new(client_config).map_err(|e| ServerError::StoreError(e.to_string()))?;
        info!(
            s3.bucket = client.bucket(),
            s3.endpoint = %client.endpoint(),
            "Object store configured"
        );

        let store = S3ObjectStore::new(client).with_content_type(content_type_for(
            &config.upload.key_suffix,
        ));
        Self::new(config, Arc::new(store)).await
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.state.registry)
    }

    /// Accept connections forever
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Accept connections until `shutdown` resolves
    ///
    /// Sessions already in flight keep running to completion on their tasks.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future,
    {
        info!(
            ingest_path = %self.state.config.server.ingest_path,
            "Accepting producers on {}", self.local_addr
        );
        let mut shutdown = std::pin::pin!(shutdown);

        loop {
            let (stream, peer_addr) = tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down server");
                    return Ok(());
                }
                result = self.listener.accept() => match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                },
            };

            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    let state = Arc::clone(&state);
                    async move { handle_request(req, state).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("Connection from {} closed with error: {}", peer_addr, e);
                }
            });
        }
    }
}

async fn handle_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<String>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    debug!("Handling {} {}", method, path);

    if path == "/health" && method == Method::GET {
        return Ok(text_response(StatusCode::OK, "ok"));
    }

    if path == state.config.server.ingest_path && (method == Method::POST || method == Method::PUT)
    {
        let report = ingest::ingest(req.into_body(), &state).await;
        return Ok(ingest::report_response(&report));
    }

    Ok(text_response(StatusCode::NOT_FOUND, "Not Found"))
}

fn text_response(status: StatusCode, body: &str) -> Response<String> {
    let mut response = Response::new(body.to_string());
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("text/plain"),
    );
    response
}

/// Content type for whole-object writes, from the key suffix
fn content_type_for(suffix: &str) -> &'static str {
    match suffix.rsplit('.').next().unwrap_or_default() {
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        "webm" => "audio/webm",
        _ => "application/octet-stream",
    }
}
