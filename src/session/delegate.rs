//! Stream event callbacks

use crate::protocol::message::{DataMessage, MediaMessage};
use crate::protocol::status::Status;
use crate::session::state::ReadyState;

/// Receives what a [`NetStream`](super::NetStream) observes
///
/// All methods default to no-ops.
pub trait StreamDelegate: Send + 'static {
    /// Status event addressed to this stream (or connection-wide)
    fn on_status(&mut self, _stream_id: u32, _status: &Status) {}

    fn on_ready_state(&mut self, _state: ReadyState) {}

    /// Stream re-entered Open; counters were cleared
    fn on_clear(&mut self) {}

    fn on_audio(&mut self, _message: &MediaMessage) {}

    fn on_video(&mut self, _message: &MediaMessage) {}

    /// Inbound data message such as `onMetaData`
    fn on_data(&mut self, _data: &DataMessage) {}
}

/// Delegate that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDelegate;

impl StreamDelegate for NoopDelegate {}
