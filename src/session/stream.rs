//! NetStream: one play or publish session on a connection
//!
//! The stream is sans-IO. Every operation that may put bytes on the wire
//! takes a [`StreamTransport`]; the connection implements it on top of its
//! chunk encoder and the tests implement it with a recorder.
//!
//! State changes go through [`NetStream::transition`], which suppresses
//! no-op changes and runs the exit actions of the old state before the entry
//! actions of the new one.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;

use crate::amf::AmfValue;
use crate::error::Result;
use crate::media::muxer::{metadata, Muxer};
use crate::media::pipeline::{recording_file_name, MediaPipeline};
use crate::protocol::chunk::ChunkFormat;
use crate::protocol::constants::*;
use crate::protocol::message::{Command, DataMessage, MediaMessage, RtmpMessage};
use crate::protocol::status::{Status, StatusCode};
use crate::session::delegate::StreamDelegate;
use crate::session::state::{HowToPublish, ReadyState};
use crate::stats::StreamInfo;

/// Outbound side of the connection as seen by a stream
pub trait StreamTransport {
    /// Chunk and queue a message, returning the bytes it takes on the wire
    fn send(&mut self, message: RtmpMessage, format: ChunkFormat) -> Result<usize>;

    /// Send audio or video; `clock` is the track's absolute time in ms
    ///
    /// Chunk streams are shared by every stream on the connection, so a
    /// compressed header may not be possible. The transport then falls back
    /// to a full header carrying `clock`.
    fn send_media(&mut self, message: RtmpMessage, format: ChunkFormat, clock: u32) -> Result<usize> {
        let _ = clock;
        self.send(message, format)
    }

    /// Next command transaction id on this connection
    fn next_transaction_id(&mut self) -> u32;

    /// Flash version announced in `connect`
    fn flash_ver(&self) -> &str;
}

/// Optional `play` arguments after the stream name
///
/// Omitted values are filled with the server defaults only when a later
/// argument is present (start -2, duration -1).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlayOptions {
    /// Seconds; -2 live then recorded, -1 live only
    pub start: Option<f64>,
    pub duration: Option<f64>,
    /// Flush any previous playlist
    pub reset: Option<bool>,
}

impl PlayOptions {
    fn arguments(&self, name: &str) -> Vec<AmfValue> {
        let mut args = vec![AmfValue::from(name)];
        if self.start.is_some() || self.duration.is_some() || self.reset.is_some() {
            args.push(AmfValue::Number(self.start.unwrap_or(-2.0)));
        }
        if self.duration.is_some() || self.reset.is_some() {
            args.push(AmfValue::Number(self.duration.unwrap_or(-1.0)));
        }
        if let Some(reset) = self.reset {
            args.push(AmfValue::Boolean(reset));
        }
        args
    }
}

/// Stream state machine
pub struct NetStream {
    id: u32,
    ready_state: ReadyState,
    resource_name: Option<String>,
    how_to_publish: HowToPublish,
    /// play/publish issued before the server assigned an id
    pending: VecDeque<Command>,
    /// Last play/publish request, replayed after a reconnect
    last_request: Option<Command>,
    muxer: Muxer,
    frame_count: u16,
    paused: bool,
    receive_audio: bool,
    receive_video: bool,
    info: Arc<StreamInfo>,
    pipeline: Box<dyn MediaPipeline>,
    delegate: Box<dyn StreamDelegate>,
}

impl NetStream {
    pub fn new(pipeline: Box<dyn MediaPipeline>, delegate: Box<dyn StreamDelegate>) -> Self {
        Self {
            id: 0,
            ready_state: ReadyState::Initialized,
            resource_name: None,
            how_to_publish: HowToPublish::Live,
            pending: VecDeque::new(),
            last_request: None,
            muxer: Muxer::new(),
            frame_count: 0,
            paused: false,
            receive_audio: true,
            receive_video: true,
            info: Arc::new(StreamInfo::new()),
            pipeline,
            delegate,
        }
    }

    /// Server-assigned message stream id, 0 until created
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn ready_state(&self) -> ReadyState {
        self.ready_state
    }

    pub fn resource_name(&self) -> Option<&str> {
        self.resource_name.as_deref()
    }

    pub fn how_to_publish(&self) -> HowToPublish {
        self.how_to_publish
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn receive_audio(&self) -> bool {
        self.receive_audio
    }

    pub fn receive_video(&self) -> bool {
        self.receive_video
    }

    /// Number of commands waiting for a stream id
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Shared counters for this stream
    pub fn info(&self) -> Arc<StreamInfo> {
        Arc::clone(&self.info)
    }

    /// Start playing `name`, or stop playing when `name` is `None`
    pub fn play(
        &mut self,
        t: &mut dyn StreamTransport,
        name: Option<&str>,
        options: PlayOptions,
    ) -> Result<()> {
        let Some(name) = name else {
            if self.ready_state.is_playing_family() {
                self.resource_name = None;
                self.close(t)?;
            }
            return Ok(());
        };

        self.resource_name = Some(name.to_string());
        let command = Command::new(self.id, 0, CMD_PLAY).with_args(options.arguments(name));
        self.last_request = Some(command.clone());

        if self.ready_state == ReadyState::Initialized {
            tracing::debug!(name, "Queueing play until the stream is created");
            self.pending.push_back(command);
            return Ok(());
        }

        self.transition(t, ReadyState::Play)?;
        self.send_command(t, command)
    }

    /// Publish under `name`, or stop publishing when `name` is `None`
    pub fn publish(
        &mut self,
        t: &mut dyn StreamTransport,
        name: Option<&str>,
        how: HowToPublish,
    ) -> Result<()> {
        let Some(name) = name else {
            if self.ready_state.is_publishing_family() {
                self.close(t)?;
            }
            return Ok(());
        };

        if self.ready_state == ReadyState::Publishing && self.resource_name.as_deref() == Some(name) {
            // Same stream: only local recording changes
            if how == HowToPublish::LocalRecord {
                let file_name = recording_file_name(self.resource_name.as_deref());
                self.pipeline.start_recording(&file_name);
            } else {
                self.pipeline.stop_recording();
            }
            self.how_to_publish = how;
            return Ok(());
        }

        self.resource_name = Some(name.to_string());
        self.how_to_publish = how;
        let command = Command::new(self.id, 0, CMD_PUBLISH)
            .with_args(vec![AmfValue::from(name), AmfValue::from(how.as_str())]);
        self.last_request = Some(command.clone());

        if self.ready_state == ReadyState::Initialized {
            tracing::debug!(name, "Queueing publish until the stream is created");
            self.pending.push_back(command);
            return Ok(());
        }

        self.transition(t, ReadyState::Publish)?;
        self.send_command(t, command)
    }

    /// Stop playing or publishing and go back to Open
    ///
    /// Does nothing unless the stream is playing or publishing.
    pub fn close(&mut self, t: &mut dyn StreamTransport) -> Result<()> {
        if self.ready_state <= ReadyState::Open {
            return Ok(());
        }
        self.last_request = None;
        self.transition(t, ReadyState::Open)?;

        let command =
            Command::new(0, 0, CMD_CLOSE_STREAM).with_args(vec![AmfValue::from(self.id)]);
        t.send(RtmpMessage::Command(command), ChunkFormat::Full)?;
        Ok(())
    }

    /// Mute encoders while publishing, or ask the server to pause playback
    pub fn pause(&mut self, t: &mut dyn StreamTransport, paused: bool) -> Result<()> {
        self.paused = paused;
        match self.ready_state {
            ReadyState::Publish | ReadyState::Publishing => {
                self.pipeline.set_muted(paused);
                Ok(())
            }
            ReadyState::Playing => {
                let command = Command::new(self.id, 0, CMD_PAUSE)
                    .with_args(vec![AmfValue::Boolean(paused), AmfValue::Number(0.0)]);
                self.send_command(t, command)
            }
            _ => Ok(()),
        }
    }

    /// Seek to `offset` seconds; only while Playing
    pub fn seek(&mut self, t: &mut dyn StreamTransport, offset: f64) -> Result<()> {
        if self.ready_state != ReadyState::Playing {
            return Ok(());
        }
        let command = Command::new(self.id, 0, CMD_SEEK).with_args(vec![AmfValue::Number(offset)]);
        self.send_command(t, command)
    }

    pub fn set_receive_audio(&mut self, t: &mut dyn StreamTransport, enabled: bool) -> Result<()> {
        self.receive_audio = enabled;
        self.send_receive(t, CMD_RECEIVE_AUDIO, enabled)
    }

    pub fn set_receive_video(&mut self, t: &mut dyn StreamTransport, enabled: bool) -> Result<()> {
        self.receive_video = enabled;
        self.send_receive(t, CMD_RECEIVE_VIDEO, enabled)
    }

    fn send_receive(&mut self, t: &mut dyn StreamTransport, name: &str, enabled: bool) -> Result<()> {
        if self.ready_state != ReadyState::Playing {
            return Ok(());
        }
        let command = Command::new(self.id, 0, name).with_args(vec![AmfValue::Boolean(enabled)]);
        self.send_command(t, command)
    }

    /// Send a data message to subscribers; only while Publishing
    pub fn send(
        &mut self,
        t: &mut dyn StreamTransport,
        handler_name: &str,
        arguments: Vec<AmfValue>,
    ) -> Result<()> {
        if self.ready_state != ReadyState::Publishing {
            return Ok(());
        }
        let data = DataMessage {
            stream_id: self.id,
            handler_name: handler_name.to_string(),
            arguments,
        };
        let written = t.send(RtmpMessage::Data(data), ChunkFormat::Full)?;
        self.info.add_bytes(written);
        Ok(())
    }

    /// Send an encoded audio sample taken at `time` seconds
    ///
    /// Samples are dropped unless the stream is Publishing.
    pub fn append_audio(&mut self, t: &mut dyn StreamTransport, payload: Bytes, time: f64) -> Result<()> {
        if self.ready_state != ReadyState::Publishing {
            return Ok(());
        }
        let (message, format) = self.muxer.mux_audio(self.id, payload, time);
        let written = t.send_media(message, format, self.muxer.audio_clock())?;
        self.info.add_bytes(written);
        Ok(())
    }

    /// Send an encoded video sample taken at `time` seconds
    pub fn append_video(&mut self, t: &mut dyn StreamTransport, payload: Bytes, time: f64) -> Result<()> {
        if self.ready_state != ReadyState::Publishing {
            return Ok(());
        }
        let (message, format) = self.muxer.mux_video(self.id, payload, time);
        let written = t.send_media(message, format, self.muxer.video_clock())?;
        self.info.add_bytes(written);
        self.frame_count = self.frame_count.wrapping_add(1);
        Ok(())
    }

    /// Once-a-second bookkeeping
    pub fn on_tick(&mut self) {
        self.info.set_current_fps(self.frame_count);
        self.frame_count = 0;
    }

    /// The connection (re)connected: start over from Initialized
    ///
    /// A play or publish that was active is queued again so it resumes once
    /// the new stream id arrives.
    pub fn on_connect_success(&mut self, t: &mut dyn StreamTransport) -> Result<()> {
        if self.ready_state > ReadyState::Open && self.pending.is_empty() {
            if let Some(request) = self.last_request.clone() {
                tracing::debug!(command = %request.command_name, "Resuming after reconnect");
                self.pending.push_back(request);
            }
        }
        self.transition(t, ReadyState::Initialized)
    }

    /// `createStream` answered with our id
    pub fn on_created(&mut self, t: &mut dyn StreamTransport, id: u32) -> Result<()> {
        self.id = id;
        self.transition(t, ReadyState::Open)
    }

    /// Status event for this stream or the connection
    pub fn on_status(&mut self, t: &mut dyn StreamTransport, status: &Status) -> Result<()> {
        match status.code {
            StatusCode::PlayReset => self.transition(t, ReadyState::Play)?,
            StatusCode::PlayStart => self.transition(t, ReadyState::Playing)?,
            StatusCode::PublishStart => self.transition(t, ReadyState::Publishing)?,
            _ => {}
        }
        self.delegate.on_status(self.id, status);
        Ok(())
    }

    pub fn on_audio(&mut self, message: &MediaMessage) {
        self.delegate.on_audio(message);
    }

    pub fn on_video(&mut self, message: &MediaMessage) {
        self.frame_count = self.frame_count.wrapping_add(1);
        self.delegate.on_video(message);
    }

    pub fn on_data(&mut self, data: &DataMessage) {
        self.delegate.on_data(data);
    }

    /// Move to `state`, running exit and entry actions
    pub fn transition(&mut self, t: &mut dyn StreamTransport, state: ReadyState) -> Result<()> {
        let old = self.ready_state;
        if old == state {
            return Ok(());
        }
        tracing::debug!(stream_id = self.id, from = ?old, to = ?state, "Stream state change");

        self.ready_state = state;
        self.info.set_ready_state(state);
        self.delegate.on_ready_state(state);

        self.exit(t, old)?;
        self.enter(t, state)
    }

    fn exit(&mut self, t: &mut dyn StreamTransport, state: ReadyState) -> Result<()> {
        match state {
            ReadyState::Playing => self.pipeline.stop_decoding(),
            ReadyState::Publishing => {
                self.fc_call(t, CMD_FC_UNPUBLISH)?;
                self.pipeline.stop_encoding();
                self.pipeline.stop_recording();
            }
            _ => {}
        }
        Ok(())
    }

    fn enter(&mut self, t: &mut dyn StreamTransport, state: ReadyState) -> Result<()> {
        match state {
            ReadyState::Open => {
                self.frame_count = 0;
                self.info.clear();
                self.delegate.on_clear();
                self.flush_pending(t)?;
            }
            ReadyState::Playing => self.pipeline.start_decoding(),
            ReadyState::Publish => {
                self.muxer.reset();
                self.pipeline.start_capture();
                self.fc_call(t, CMD_FC_PUBLISH)?;
            }
            ReadyState::Publishing => {
                let meta = metadata(&self.pipeline.capabilities());
                self.send(
                    t,
                    CMD_SET_DATA_FRAME,
                    vec![AmfValue::from(CMD_ON_METADATA), AmfValue::EcmaArray(meta)],
                )?;
                self.pipeline.start_encoding();
                if self.how_to_publish == HowToPublish::LocalRecord {
                    let file_name = recording_file_name(self.resource_name.as_deref());
                    self.pipeline.start_recording(&file_name);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn flush_pending(&mut self, t: &mut dyn StreamTransport) -> Result<()> {
        let pending = std::mem::take(&mut self.pending);
        for mut command in pending {
            command.transaction_id = t.next_transaction_id();
            command.stream_id = self.id;
            match command.command_name.as_str() {
                CMD_PLAY => self.transition(t, ReadyState::Play)?,
                CMD_PUBLISH => self.transition(t, ReadyState::Publish)?,
                _ => {}
            }
            self.send_command(t, command)?;
        }
        Ok(())
    }

    /// FCPublish / FCUnpublish, only understood by FMLE-style servers
    fn fc_call(&mut self, t: &mut dyn StreamTransport, name: &str) -> Result<()> {
        let Some(resource) = self.resource_name.as_deref() else {
            return Ok(());
        };
        if !t.flash_ver().contains(FMLE_FLASH_VER_PREFIX) {
            return Ok(());
        }
        let transaction_id = t.next_transaction_id();
        let command = Command::new(0, transaction_id, name).with_args(vec![AmfValue::from(resource)]);
        t.send(RtmpMessage::Command(command), ChunkFormat::Full)?;
        Ok(())
    }

    fn send_command(&mut self, t: &mut dyn StreamTransport, command: Command) -> Result<()> {
        tracing::trace!(
            stream_id = command.stream_id,
            transaction_id = command.transaction_id,
            command = %command.command_name,
            "Sending stream command"
        );
        t.send(RtmpMessage::Command(command), ChunkFormat::Full)?;
        Ok(())
    }
}

impl std::fmt::Debug for NetStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetStream")
            .field("id", &self.id)
            .field("ready_state", &self.ready_state)
            .field("resource_name", &self.resource_name)
            .field("how_to_publish", &self.how_to_publish)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}
