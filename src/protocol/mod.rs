//! RTMP wire protocol implementation
//!
//! This module handles the low-level protocol details:
//! - Client handshake (C0C1/S0S1S2/C2 exchange)
//! - Chunk stream multiplexing and demultiplexing
//! - Message framing and parsing
//! - Typed NetConnection / NetStream status events

pub mod chunk;
pub mod constants;
pub mod handshake;
pub mod message;
pub mod status;

pub use chunk::{ChunkDecoder, ChunkEncoder, ChunkFormat, RtmpChunk};
pub use handshake::Handshake;
pub use message::{Command, DataMessage, MediaMessage, RtmpMessage, UserControlEvent};
pub use status::{Status, StatusCode, StatusLevel};
