//! RTMP client implementation
//!
//! Provides client-side RTMP for:
//! - Publishing encoded audio/video to a remote server
//! - Playing remote streams
//! - Reconnecting with exponential backoff when the connection drops
//!
//! [`NetConnection`] is the sans-io protocol core. [`RtmpClient`] runs it on
//! a Tokio task and hands out [`StreamHandle`]s.

pub mod config;
pub mod connection;
pub mod handle;
pub mod reconnect;
pub mod worker;

pub use config::{ClientConfig, ParsedUrl};
pub use connection::{ConnectionEvent, NetConnection, StreamKey};
pub use handle::{RtmpClient, StreamHandle};
pub use reconnect::{ReconnectDecision, ReconnectPolicy};
pub use worker::ClientEvent;
