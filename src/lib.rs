//! Stream Uploadr Library
//!
//! Streams live byte feeds (e.g. audio from a microphone) into S3 objects
//! without buffering whole objects in memory.
//!
//! # Features
//!
//! - **Streaming multipart**: bytes are cut into fixed-size parts and uploaded
//!   while the producer is still sending
//! - **Small-object fallback**: streams too short for multipart end up as a
//!   single whole-object write
//! - **Clean failure**: every failed upload aborts its multipart upload
//! - **S3 compatible**: path-style SigV4 requests work against AWS and MinIO
//!
//! # Example
//!
//! ```no_run
//! use stream_uploadr::{config::Config, server::Server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let server = Server::from_config(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod logging;
pub mod metrics;
pub mod s3;
pub mod server;
pub mod upload;

// Re-export commonly used types
pub use config::Config;
pub use server::Server;
pub use upload::{SessionReport, SessionState, UploadSession};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
