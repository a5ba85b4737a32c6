//! Media handling for the client
//!
//! This module provides:
//! - The [`MediaPipeline`] trait for external capture, encode, decode and recording
//! - The muxer that turns encoded samples into timestamped RTMP messages
//! - Stream metadata built from the active encoder settings

pub mod muxer;
pub mod pipeline;

pub use muxer::{metadata, Muxer, TimestampAccumulator};
pub use pipeline::{
    AudioCapabilities, MediaCapabilities, MediaPipeline, NoopPipeline, VideoCapabilities,
};
