//! Client stream sessions
//!
//! This module holds the per-stream state machine:
//! - Ready states and publish types
//! - The [`NetStream`] itself, driven through a [`StreamTransport`]
//! - Callbacks for status events and inbound media

pub mod delegate;
pub mod state;
pub mod stream;

pub use delegate::{NoopDelegate, StreamDelegate};
pub use state::{HowToPublish, ReadyState};
pub use stream::{NetStream, PlayOptions, StreamTransport};
