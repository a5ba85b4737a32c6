//! NetConnection: protocol state for one client connection
//!
//! Sans-IO. The worker feeds received bytes to [`NetConnection::handle_input`],
//! writes whatever [`NetConnection::take_output`] returns and reacts to the
//! [`ConnectionEvent`]s it queues. Streams live here and are addressed by a
//! local key, since the server-side id is only known after `createStream`.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::amf::{AmfObject, AmfValue};
use crate::client::config::{ClientConfig, ParsedUrl};
use crate::error::{Error, ProtocolError, Result};
use crate::protocol::chunk::{ChunkDecoder, ChunkEncoder, ChunkFormat};
use crate::protocol::constants::*;
use crate::protocol::message::{Command, RtmpMessage, UserControlEvent};
use crate::protocol::status::{Status, StatusCode, StatusLevel};
use crate::session::stream::{NetStream, StreamTransport};
use crate::stats::StreamInfo;

/// Local stream handle key
pub type StreamKey = u32;

/// Something the worker has to act on
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// `connect` succeeded
    Connected(Status),
    /// Connection-level failure (connect rejected or failed, server closed)
    Failed(Status),
    /// Server assigned a message stream id
    StreamCreated { key: StreamKey, stream_id: u32 },
    /// Connection-level status that needs no action
    Status(Status),
}

/// Encoder side, lent to streams as their transport
struct Outbound {
    encoder: ChunkEncoder,
    buf: BytesMut,
    transaction_id: u32,
    flash_ver: String,
}

impl Outbound {
    fn new(flash_ver: &str) -> Self {
        Self {
            encoder: ChunkEncoder::new(),
            buf: BytesMut::with_capacity(64 * 1024),
            transaction_id: 0,
            flash_ver: flash_ver.to_string(),
        }
    }
}

impl StreamTransport for Outbound {
    fn send(&mut self, message: RtmpMessage, format: ChunkFormat) -> Result<usize> {
        self.encoder.encode(&message.to_chunk(), format, &mut self.buf)
    }

    fn send_media(&mut self, mut message: RtmpMessage, format: ChunkFormat, clock: u32) -> Result<usize> {
        match self.encoder.encode(&message.to_chunk(), format, &mut self.buf) {
            Err(Error::Protocol(
                ProtocolError::MissingFullHeader { csid } | ProtocolError::HeaderMismatch { csid },
            )) if format != ChunkFormat::Full => {
                // A full header carries absolute time, not the delta
                tracing::debug!(csid, clock, "Header cannot be compressed, sending full header");
                if let RtmpMessage::Audio(media) | RtmpMessage::Video(media) = &mut message {
                    media.timestamp = clock;
                }
                self.encoder.encode(&message.to_chunk(), ChunkFormat::Full, &mut self.buf)
            }
            result => result,
        }
    }

    fn next_transaction_id(&mut self) -> u32 {
        self.transaction_id += 1;
        self.transaction_id
    }

    fn flash_ver(&self) -> &str {
        &self.flash_ver
    }
}

/// Client connection state machine
pub struct NetConnection {
    config: ClientConfig,
    url: ParsedUrl,
    connected: bool,
    out: Outbound,
    decoder: ChunkDecoder,
    streams: BTreeMap<StreamKey, NetStream>,
    next_key: StreamKey,
    /// createStream transaction id -> stream
    pending_creates: HashMap<u32, StreamKey>,
    connect_transaction: Option<u32>,
    window_ack_size: u32,
    bytes_received: u64,
    last_ack: u64,
    events: VecDeque<ConnectionEvent>,
}

impl NetConnection {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let url = config.validate()?;
        Ok(Self {
            out: Outbound::new(&config.flash_ver),
            config,
            url,
            connected: false,
            decoder: ChunkDecoder::new(),
            streams: BTreeMap::new(),
            next_key: 1,
            pending_creates: HashMap::new(),
            connect_transaction: None,
            window_ack_size: 0,
            bytes_received: 0,
            last_ack: 0,
            events: VecDeque::new(),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn url(&self) -> &ParsedUrl {
        &self.url
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Last transaction id handed out on this connection
    pub fn transaction_id(&self) -> u32 {
        self.out.transaction_id
    }

    /// Fresh protocol state for a new socket; streams are kept
    pub fn reset(&mut self) {
        self.connected = false;
        self.out = Outbound::new(&self.config.flash_ver);
        self.decoder = ChunkDecoder::new();
        self.pending_creates.clear();
        self.connect_transaction = None;
        self.window_ack_size = 0;
        self.bytes_received = 0;
        self.last_ack = 0;
        self.events.clear();
    }

    /// Send `connect`; call once the handshake is done
    pub fn connect(&mut self) -> Result<()> {
        let transaction_id = self.out.next_transaction_id();
        self.connect_transaction = Some(transaction_id);

        let mut object = AmfObject::new()
            .with("app", self.url.app.as_str())
            .with("type", "nonprivate")
            .with("flashVer", self.config.flash_ver.as_str());
        if let Some(swf_url) = &self.config.swf_url {
            object.insert("swfUrl", swf_url.as_str());
        }
        object.insert("tcUrl", self.url.tc_url.as_str());
        object.insert("fpad", false);
        object.insert("capabilities", CONNECT_CAPABILITIES);
        object.insert("audioCodecs", CONNECT_AUDIO_CODECS);
        object.insert("videoCodecs", CONNECT_VIDEO_CODECS);
        object.insert("videoFunction", CONNECT_VIDEO_FUNCTION);
        if let Some(page_url) = &self.config.page_url {
            object.insert("pageUrl", page_url.as_str());
        }
        object.insert("objectEncoding", 0.0);

        tracing::debug!(app = %self.url.app, tc_url = %self.url.tc_url, "Sending connect");
        let command = Command::new(0, transaction_id, CMD_CONNECT).with_object(object);
        self.out.send(RtmpMessage::Command(command), ChunkFormat::Full)?;
        Ok(())
    }

    /// Register a stream; `createStream` goes out now if connected
    pub fn add_stream(&mut self, stream: NetStream) -> Result<StreamKey> {
        self.add_stream_with(|_| stream)
    }

    /// Like [`add_stream`](Self::add_stream) for streams that need their key
    pub fn add_stream_with(&mut self, make: impl FnOnce(StreamKey) -> NetStream) -> Result<StreamKey> {
        let key = self.next_key;
        self.next_key += 1;
        self.streams.insert(key, make(key));
        if self.connected {
            self.create_stream(key)?;
        }
        Ok(key)
    }

    fn create_stream(&mut self, key: StreamKey) -> Result<()> {
        let transaction_id = self.out.next_transaction_id();
        self.pending_creates.insert(transaction_id, key);
        let command = Command::new(0, transaction_id, CMD_CREATE_STREAM);
        self.out.send(RtmpMessage::Command(command), ChunkFormat::Full)?;
        Ok(())
    }

    /// Run an operation against a stream with this connection as transport
    pub fn with_stream<R>(
        &mut self,
        key: StreamKey,
        op: impl FnOnce(&mut NetStream, &mut dyn StreamTransport) -> Result<R>,
    ) -> Result<R> {
        let stream = self
            .streams
            .get_mut(&key)
            .ok_or(ProtocolError::StreamNotFound(key))?;
        op(stream, &mut self.out)
    }

    pub fn stream(&self, key: StreamKey) -> Option<&NetStream> {
        self.streams.get(&key)
    }

    pub fn stream_info(&self, key: StreamKey) -> Option<Arc<StreamInfo>> {
        self.streams.get(&key).map(|s| s.info())
    }

    /// Announce the playback buffer ahead of `play`
    pub fn set_buffer_length(&mut self, key: StreamKey) -> Result<()> {
        let Some(stream) = self.streams.get(&key) else {
            return Err(ProtocolError::StreamNotFound(key).into());
        };
        if stream.id() == 0 {
            return Ok(());
        }
        let event = UserControlEvent::SetBufferLength {
            stream_id: stream.id(),
            buffer_ms: self.config.buffer_length,
        };
        self.out.send(RtmpMessage::UserControl(event), ChunkFormat::Full)?;
        Ok(())
    }

    /// Close the stream, delete it on the server and forget it
    pub fn dispose(&mut self, key: StreamKey) -> Result<()> {
        let Some(mut stream) = self.streams.remove(&key) else {
            return Ok(());
        };
        self.pending_creates.retain(|_, k| *k != key);
        if !self.connected {
            return Ok(());
        }
        stream.close(&mut self.out)?;
        if stream.id() != 0 {
            let command =
                Command::new(0, 0, CMD_DELETE_STREAM).with_args(vec![AmfValue::from(stream.id())]);
            self.out.send(RtmpMessage::Command(command), ChunkFormat::Full)?;
        }
        tracing::debug!(key, stream_id = stream.id(), "Stream disposed");
        Ok(())
    }

    /// Dispose every stream
    pub fn close(&mut self) -> Result<()> {
        let keys: Vec<StreamKey> = self.streams.keys().copied().collect();
        for key in keys {
            self.dispose(key)?;
        }
        self.connected = false;
        Ok(())
    }

    /// Once-a-second bookkeeping
    pub fn tick(&mut self) {
        for stream in self.streams.values_mut() {
            stream.on_tick();
        }
    }

    /// Bytes waiting to be written to the socket
    pub fn take_output(&mut self) -> Option<Bytes> {
        if self.out.buf.is_empty() {
            None
        } else {
            Some(self.out.buf.split().freeze())
        }
    }

    pub fn poll_event(&mut self) -> Option<ConnectionEvent> {
        self.events.pop_front()
    }

    /// Decode and handle every complete message in `buf`
    ///
    /// Framing errors are returned and end the connection. A message that
    /// fails to parse is logged and dropped.
    pub fn handle_input(&mut self, buf: &mut BytesMut) -> Result<()> {
        let before = buf.len();
        let result = self.decode_all(buf);
        self.bytes_received += (before - buf.len()) as u64;
        self.maybe_acknowledge()?;
        result
    }

    fn decode_all(&mut self, buf: &mut BytesMut) -> Result<()> {
        while let Some(chunk) = self.decoder.decode(buf)? {
            match RtmpMessage::from_chunk(&chunk) {
                Ok(message) => self.handle_message(message)?,
                Err(e) => {
                    tracing::warn!(
                        csid = chunk.csid,
                        message_type = chunk.message_type,
                        error = %e,
                        "Dropping malformed message"
                    );
                }
            }
        }
        Ok(())
    }

    fn maybe_acknowledge(&mut self) -> Result<()> {
        if self.window_ack_size == 0 {
            return Ok(());
        }
        if self.bytes_received - self.last_ack >= self.window_ack_size as u64 {
            self.last_ack = self.bytes_received;
            let sequence = self.bytes_received as u32;
            tracing::trace!(sequence, "Sending acknowledgement");
            self.out
                .send(RtmpMessage::Acknowledgement { sequence }, ChunkFormat::Full)?;
        }
        Ok(())
    }

    fn handle_message(&mut self, message: RtmpMessage) -> Result<()> {
        match message {
            RtmpMessage::SetChunkSize(size) => {
                tracing::debug!(size, "Peer chunk size");
                self.decoder.set_chunk_size(size);
            }
            RtmpMessage::Abort { csid } => {
                tracing::debug!(csid, "Peer aborted message");
                self.decoder.abort(csid);
            }
            RtmpMessage::Acknowledgement { sequence } => {
                tracing::trace!(sequence, "Peer acknowledgement");
            }
            RtmpMessage::WindowAckSize(size) => {
                tracing::debug!(size, "Window acknowledgement size");
                self.window_ack_size = size;
            }
            RtmpMessage::SetPeerBandwidth { size, limit_type } => {
                tracing::debug!(size, limit_type, "Peer bandwidth");
            }
            RtmpMessage::UserControl(event) => self.handle_user_control(event)?,
            RtmpMessage::Command(command) => self.handle_command(command)?,
            RtmpMessage::Data(data) => {
                if let Some(stream) = self.stream_by_id(data.stream_id) {
                    stream.on_data(&data);
                }
            }
            RtmpMessage::Audio(media) => {
                if let Some(stream) = self.stream_by_id(media.stream_id) {
                    stream.on_audio(&media);
                }
            }
            RtmpMessage::Video(media) => {
                if let Some(stream) = self.stream_by_id(media.stream_id) {
                    stream.on_video(&media);
                }
            }
            RtmpMessage::Unknown { type_id, .. } => {
                tracing::trace!(type_id, "Ignoring message");
            }
        }
        Ok(())
    }

    fn handle_user_control(&mut self, event: UserControlEvent) -> Result<()> {
        match event {
            UserControlEvent::PingRequest(timestamp) => {
                tracing::trace!(timestamp, "Ping");
                self.out.send(
                    RtmpMessage::UserControl(UserControlEvent::PingResponse(timestamp)),
                    ChunkFormat::Full,
                )?;
            }
            other => tracing::debug!(event = ?other, "User control event"),
        }
        Ok(())
    }

    fn handle_command(&mut self, command: Command) -> Result<()> {
        match command.command_name.as_str() {
            CMD_RESULT | CMD_ERROR => self.handle_response(command),
            CMD_ON_STATUS => self.handle_on_status(command),
            name => {
                tracing::trace!(command = name, "Ignoring server command");
                Ok(())
            }
        }
    }

    fn handle_response(&mut self, command: Command) -> Result<()> {
        let success = command.command_name == CMD_RESULT;
        let transaction_id = command.transaction_id;

        if self.connect_transaction == Some(transaction_id) {
            self.connect_transaction = None;
            let fallback = if success {
                StatusCode::ConnectSuccess
            } else {
                StatusCode::ConnectFailed
            };
            let status = command
                .first_argument()
                .and_then(|info| Status::from_amf(info).ok())
                .unwrap_or_else(|| Status::new(fallback, ""));
            return self.on_connection_status(status);
        }

        if let Some(key) = self.pending_creates.remove(&transaction_id) {
            if !success {
                tracing::warn!(key, "createStream rejected");
                let status = command
                    .first_argument()
                    .and_then(|info| Status::from_amf(info).ok())
                    .unwrap_or_else(|| Status::new(StatusCode::CallFailed, "createStream failed"));
                self.events.push_back(ConnectionEvent::Status(status));
                return Ok(());
            }
            let Some(stream_id) = command.first_argument().and_then(AmfValue::as_number) else {
                tracing::warn!(key, "createStream result without a stream id");
                return Ok(());
            };
            let stream_id = stream_id as u32;
            tracing::debug!(key, stream_id, "Stream created");

            let buffer_ms = self.config.buffer_length;
            self.out.send(
                RtmpMessage::UserControl(UserControlEvent::SetBufferLength { stream_id, buffer_ms }),
                ChunkFormat::Full,
            )?;
            if let Some(stream) = self.streams.get_mut(&key) {
                stream.on_created(&mut self.out, stream_id)?;
                self.events
                    .push_back(ConnectionEvent::StreamCreated { key, stream_id });
            }
            return Ok(());
        }

        tracing::trace!(transaction_id, success, "Unmatched response");
        Ok(())
    }

    fn handle_on_status(&mut self, command: Command) -> Result<()> {
        let Some(info) = command.first_argument() else {
            tracing::warn!("onStatus without an info object");
            return Ok(());
        };
        let status = match Status::from_amf(info) {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping onStatus");
                return Ok(());
            }
        };

        if status.code.is_connection() {
            return self.on_connection_status(status);
        }

        let stream_id = command.stream_id;
        match self.streams.values_mut().find(|s| s.id() == stream_id && stream_id != 0) {
            Some(stream) => {
                tracing::debug!(stream_id, code = %status.code, "Stream status");
                stream.on_status(&mut self.out, &status)?;
            }
            None => {
                tracing::debug!(stream_id, code = %status.code, "Status for unknown stream");
                self.events.push_back(ConnectionEvent::Status(status));
            }
        }
        Ok(())
    }

    fn on_connection_status(&mut self, status: Status) -> Result<()> {
        match status.code {
            StatusCode::ConnectSuccess => {
                tracing::info!(app = %self.url.app, "Connected");
                self.connected = true;

                let chunk_size = self.config.chunk_size;
                self.out
                    .send(RtmpMessage::SetChunkSize(chunk_size), ChunkFormat::Full)?;
                self.out.encoder.set_chunk_size(chunk_size);

                let keys: Vec<StreamKey> = self.streams.keys().copied().collect();
                for key in keys {
                    if let Some(stream) = self.streams.get_mut(&key) {
                        stream.on_connect_success(&mut self.out)?;
                    }
                    self.create_stream(key)?;
                }
                self.events.push_back(ConnectionEvent::Connected(status));
            }
            StatusCode::ConnectClosed
            | StatusCode::ConnectFailed
            | StatusCode::ConnectRejected
            | StatusCode::ConnectInvalidApp
            | StatusCode::ConnectAppShutdown => {
                tracing::warn!(code = %status.code, description = %status.description, "Connection failed");
                self.connected = false;
                self.events.push_back(ConnectionEvent::Failed(status));
            }
            _ if status.level == StatusLevel::Error && !self.connected => {
                self.events.push_back(ConnectionEvent::Failed(status));
            }
            _ => self.events.push_back(ConnectionEvent::Status(status)),
        }
        Ok(())
    }

    fn stream_by_id(&mut self, stream_id: u32) -> Option<&mut NetStream> {
        if stream_id == 0 {
            return None;
        }
        self.streams.values_mut().find(|s| s.id() == stream_id)
    }
}
