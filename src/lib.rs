//! rtmp-netstream: RTMP client protocol engine
//!
//! This library provides the client side of RTMP:
//! - Handshake, chunk stream framing and AMF0 commands
//! - NetConnection / NetStream state machines for play and publish
//! - Timestamped muxing of encoded audio and video
//! - Automatic reconnect with exponential backoff
//!
//! # Example: Publish
//!
//! ```no_run
//! use rtmp_netstream::{ClientConfig, ClientEvent, HowToPublish, NoopPipeline, RtmpClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new("rtmp://localhost/live");
//!     let (client, mut events) = RtmpClient::connect(config)?;
//!
//!     let stream = client.create_stream(NoopPipeline).await?;
//!     stream.publish(Some("camera"), HowToPublish::Live).await?;
//!
//!     while let Some(event) = events.recv().await {
//!         if let ClientEvent::Status { status, .. } = event {
//!             println!("{}", status.code);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod amf;
pub mod client;
pub mod error;
pub mod media;
pub mod protocol;
pub mod session;
pub mod stats;

// Re-export main types for convenience
pub use client::config::ClientConfig;
pub use client::connection::{NetConnection, StreamKey};
pub use client::handle::{RtmpClient, StreamHandle};
pub use client::worker::ClientEvent;
pub use error::{Error, Result};
pub use media::pipeline::{MediaPipeline, NoopPipeline};
pub use protocol::status::{Status, StatusCode};
pub use session::state::{HowToPublish, ReadyState};
pub use session::stream::{NetStream, PlayOptions};
pub use stats::StreamStats;
