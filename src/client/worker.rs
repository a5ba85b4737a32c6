//! Connection worker task
//!
//! One task per client owns the socket, the [`NetConnection`] and every
//! stream. Socket reads, handle requests and the one-second tick are
//! multiplexed with `tokio::select!`. Requests are only taken off the channel
//! while the connection is up, so anything sent during a reconnect waits.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval, timeout, MissedTickBehavior};

use crate::amf::AmfValue;
use crate::client::connection::{ConnectionEvent, NetConnection, StreamKey};
use crate::client::reconnect::{ReconnectDecision, ReconnectPolicy};
use crate::error::{Error, Result};
use crate::media::pipeline::MediaPipeline;
use crate::protocol::handshake::Handshake;
use crate::protocol::message::{DataMessage, MediaMessage};
use crate::protocol::status::{Status, StatusCode};
use crate::session::delegate::StreamDelegate;
use crate::session::state::{HowToPublish, ReadyState};
use crate::session::stream::{NetStream, PlayOptions};
use crate::stats::StreamInfo;

/// Events from the client
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// `connect` succeeded (also after every reconnect)
    Connected,

    /// Server assigned a stream id
    StreamCreated { key: StreamKey, stream_id: u32 },

    /// Status event; `key` is `None` for connection-level codes
    Status { key: Option<StreamKey>, status: Status },

    /// Stream changed state
    ReadyState { key: StreamKey, state: ReadyState },

    /// Stream re-entered Open and its counters were cleared
    Cleared { key: StreamKey },

    /// Inbound audio
    Audio { key: StreamKey, message: MediaMessage },

    /// Inbound video
    Video { key: StreamKey, message: MediaMessage },

    /// Inbound data message such as `onMetaData`
    Data { key: StreamKey, data: DataMessage },

    /// Lost the connection, trying again after `delay`
    Reconnecting { attempt: u32, delay: Duration },

    /// Socket closed; `error` is set unless it was a clean shutdown
    Disconnected { error: Option<String> },

    /// Out of retries, the worker has stopped
    Fatal(String),
}

/// Handle-to-worker requests
pub(crate) enum Request {
    CreateStream {
        pipeline: Box<dyn MediaPipeline>,
        reply: oneshot::Sender<Result<(StreamKey, Arc<StreamInfo>)>>,
    },
    Play {
        key: StreamKey,
        name: Option<String>,
        options: PlayOptions,
    },
    Publish {
        key: StreamKey,
        name: Option<String>,
        how: HowToPublish,
    },
    Pause {
        key: StreamKey,
        paused: bool,
    },
    Seek {
        key: StreamKey,
        offset: f64,
    },
    Close {
        key: StreamKey,
    },
    Send {
        key: StreamKey,
        handler_name: String,
        arguments: Vec<AmfValue>,
    },
    ReceiveAudio {
        key: StreamKey,
        enabled: bool,
    },
    ReceiveVideo {
        key: StreamKey,
        enabled: bool,
    },
    AppendAudio {
        key: StreamKey,
        payload: Bytes,
        time: f64,
    },
    AppendVideo {
        key: StreamKey,
        payload: Bytes,
        time: f64,
    },
    Dispose {
        key: StreamKey,
    },
}

/// Forwards stream callbacks to the event channel
struct ChannelDelegate {
    key: StreamKey,
    events: mpsc::Sender<ClientEvent>,
}

impl ChannelDelegate {
    fn emit(&self, event: ClientEvent) {
        if let Err(mpsc::error::TrySendError::Full(event)) = self.events.try_send(event) {
            tracing::warn!(key = self.key, ?event, "Event channel full, dropping event");
        }
    }
}

impl StreamDelegate for ChannelDelegate {
    fn on_status(&mut self, _stream_id: u32, status: &Status) {
        self.emit(ClientEvent::Status {
            key: Some(self.key),
            status: status.clone(),
        });
    }

    fn on_ready_state(&mut self, state: ReadyState) {
        self.emit(ClientEvent::ReadyState { key: self.key, state });
    }

    fn on_clear(&mut self) {
        self.emit(ClientEvent::Cleared { key: self.key });
    }

    fn on_audio(&mut self, message: &MediaMessage) {
        self.emit(ClientEvent::Audio {
            key: self.key,
            message: message.clone(),
        });
    }

    fn on_video(&mut self, message: &MediaMessage) {
        self.emit(ClientEvent::Video {
            key: self.key,
            message: message.clone(),
        });
    }

    fn on_data(&mut self, data: &DataMessage) {
        self.emit(ClientEvent::Data {
            key: self.key,
            data: data.clone(),
        });
    }
}

/// Why a session ended
enum SessionEnd {
    Shutdown,
    /// Connection-level failure, goes through the reconnect policy
    Failed(Status),
    /// Transport error after connecting, reconnect at once
    Transport(Error),
}

type Reader = BufReader<ReadHalf<TcpStream>>;
type Writer = BufWriter<WriteHalf<TcpStream>>;

pub(crate) struct Worker {
    conn: NetConnection,
    requests: mpsc::Receiver<Request>,
    events: mpsc::Sender<ClientEvent>,
    shutdown: watch::Receiver<bool>,
    policy: ReconnectPolicy,
}

impl Worker {
    pub(crate) fn new(
        conn: NetConnection,
        requests: mpsc::Receiver<Request>,
        events: mpsc::Sender<ClientEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let policy = ReconnectPolicy::from_config(conn.config());
        Self {
            conn,
            requests,
            events,
            shutdown,
            policy,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            if *self.shutdown.borrow() {
                break;
            }
            self.conn.reset();

            match self.session().await {
                SessionEnd::Shutdown => {
                    self.emit(ClientEvent::Disconnected { error: None }).await;
                    break;
                }
                SessionEnd::Transport(e) => {
                    tracing::warn!(error = %e, "Connection lost, reconnecting");
                    self.emit(ClientEvent::Disconnected {
                        error: Some(e.to_string()),
                    })
                    .await;
                }
                SessionEnd::Failed(status) => {
                    self.emit(ClientEvent::Status {
                        key: None,
                        status: status.clone(),
                    })
                    .await;

                    match self.policy.on_failure() {
                        ReconnectDecision::Retry { delay } => {
                            let attempt = self.policy.retry_count();
                            tracing::warn!(
                                code = %status.code,
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                "Reconnecting"
                            );
                            self.emit(ClientEvent::Reconnecting { attempt, delay }).await;
                            if !self.sleep(delay).await {
                                self.emit(ClientEvent::Disconnected { error: None }).await;
                                break;
                            }
                        }
                        ReconnectDecision::GiveUp { attempts } => {
                            let error = Error::RetriesExhausted { attempts };
                            tracing::error!(error = %error, "Giving up");
                            self.emit(ClientEvent::Fatal(error.to_string())).await;
                            break;
                        }
                    }
                }
            }
        }
        tracing::debug!("Worker stopped");
    }

    /// Sleep unless shut down first; returns false on shutdown
    async fn sleep(&mut self, delay: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = self.shutdown.changed() => false,
        }
    }

    async fn emit(&mut self, event: ClientEvent) {
        // Receiver gone means nobody is listening; keep running
        let _ = self.events.send(event).await;
    }

    async fn session(&mut self) -> SessionEnd {
        let (mut reader, mut writer, mut read_buf) = match self.open().await {
            Ok(parts) => parts,
            Err(e) => {
                tracing::warn!(error = %e, "Connect failed");
                return SessionEnd::Failed(Status::new(StatusCode::ConnectFailed, e.to_string()));
            }
        };

        match self.drive(&mut reader, &mut writer, &mut read_buf).await {
            Ok(end) => end,
            Err(Error::ConnectionClosed) => {
                SessionEnd::Failed(Status::new(StatusCode::ConnectClosed, "Server closed the connection"))
            }
            Err(e) if self.conn.is_connected() => {
                if !e.is_transport() {
                    // Chunk framing is unrecoverable once out of sync
                    tracing::warn!(error = %e, "Protocol error, dropping connection");
                }
                SessionEnd::Transport(e)
            }
            Err(e) => SessionEnd::Failed(Status::new(StatusCode::ConnectFailed, e.to_string())),
        }
    }

    /// TCP connect, handshake and `connect` command
    async fn open(&mut self) -> Result<(Reader, Writer, BytesMut)> {
        let config = self.conn.config().clone();
        let addr = self.conn.url().addr();
        tracing::info!(addr = %addr, app = %self.conn.url().app, "Connecting");

        let socket = timeout(config.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(Error::Io)?;

        if config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }

        let (read_half, write_half) = tokio::io::split(socket);
        let mut reader = BufReader::with_capacity(64 * 1024, read_half);
        let mut writer = BufWriter::with_capacity(64 * 1024, write_half);
        let mut read_buf = BytesMut::with_capacity(64 * 1024);

        timeout(
            config.connect_timeout,
            handshake(&mut reader, &mut writer, &mut read_buf),
        )
        .await
        .map_err(|_| Error::Timeout)??;

        self.conn.connect()?;
        flush(&mut self.conn, &mut writer).await?;
        Ok((reader, writer, read_buf))
    }

    async fn drive(
        &mut self,
        reader: &mut Reader,
        writer: &mut Writer,
        read_buf: &mut BytesMut,
    ) -> Result<SessionEnd> {
        let mut ticker = interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // The server may have sent chunks right behind S2
        self.conn.handle_input(read_buf)?;

        loop {
            flush(&mut self.conn, writer).await?;
            if let Some(end) = self.drain_events().await {
                return Ok(end);
            }

            let connected = self.conn.is_connected();
            tokio::select! {
                _ = self.shutdown.changed() => {
                    self.close(writer).await;
                    return Ok(SessionEnd::Shutdown);
                }
                read = reader.read_buf(&mut *read_buf) => {
                    if read? == 0 {
                        return Err(Error::ConnectionClosed);
                    }
                    self.conn.handle_input(read_buf)?;
                }
                request = self.requests.recv(), if connected => {
                    match request {
                        Some(request) => self.apply(request),
                        None => {
                            tracing::debug!("All handles dropped");
                            self.close(writer).await;
                            return Ok(SessionEnd::Shutdown);
                        }
                    }
                }
                _ = ticker.tick() => self.conn.tick(),
            }
        }
    }

    async fn drain_events(&mut self) -> Option<SessionEnd> {
        while let Some(event) = self.conn.poll_event() {
            match event {
                ConnectionEvent::Connected(status) => {
                    self.policy.on_connect_success();
                    self.emit(ClientEvent::Connected).await;
                    self.emit(ClientEvent::Status { key: None, status }).await;
                }
                ConnectionEvent::StreamCreated { key, stream_id } => {
                    self.emit(ClientEvent::StreamCreated { key, stream_id }).await;
                }
                ConnectionEvent::Status(status) => {
                    self.emit(ClientEvent::Status { key: None, status }).await;
                }
                ConnectionEvent::Failed(status) => return Some(SessionEnd::Failed(status)),
            }
        }
        None
    }

    /// Best-effort goodbye: dispose streams and flush
    async fn close(&mut self, writer: &mut Writer) {
        if let Err(e) = self.conn.close() {
            tracing::debug!(error = %e, "Error while closing streams");
        }
        if let Err(e) = flush(&mut self.conn, writer).await {
            tracing::debug!(error = %e, "Error while flushing on close");
        }
        let _ = writer.shutdown().await;
    }

    fn apply(&mut self, request: Request) {
        let result = match request {
            Request::CreateStream { pipeline, reply } => {
                let events = self.events.clone();
                let created = self
                    .conn
                    .add_stream_with(|key| {
                        NetStream::new(pipeline, Box::new(ChannelDelegate { key, events }))
                    })
                    .map(|key| {
                        let info = self.conn.stream_info(key).unwrap_or_default();
                        (key, info)
                    });
                if let Err(e) = &created {
                    tracing::warn!(error = %e, "Stream registration failed");
                }
                let _ = reply.send(created);
                Ok(())
            }
            Request::Play { key, name, options } => {
                if name.is_some() {
                    if let Err(e) = self.conn.set_buffer_length(key) {
                        tracing::debug!(key, error = %e, "No buffer length for play");
                    }
                }
                self.conn
                    .with_stream(key, |s, t| s.play(t, name.as_deref(), options))
            }
            Request::Publish { key, name, how } => self
                .conn
                .with_stream(key, |s, t| s.publish(t, name.as_deref(), how)),
            Request::Pause { key, paused } => {
                self.conn.with_stream(key, |s, t| s.pause(t, paused))
            }
            Request::Seek { key, offset } => self.conn.with_stream(key, |s, t| s.seek(t, offset)),
            Request::Close { key } => self.conn.with_stream(key, |s, t| s.close(t)),
            Request::Send {
                key,
                handler_name,
                arguments,
            } => self
                .conn
                .with_stream(key, |s, t| s.send(t, &handler_name, arguments)),
            Request::ReceiveAudio { key, enabled } => self
                .conn
                .with_stream(key, |s, t| s.set_receive_audio(t, enabled)),
            Request::ReceiveVideo { key, enabled } => self
                .conn
                .with_stream(key, |s, t| s.set_receive_video(t, enabled)),
            Request::AppendAudio { key, payload, time } => self
                .conn
                .with_stream(key, |s, t| s.append_audio(t, payload, time)),
            Request::AppendVideo { key, payload, time } => self
                .conn
                .with_stream(key, |s, t| s.append_video(t, payload, time)),
            Request::Dispose { key } => self.conn.dispose(key),
        };

        if let Err(e) = result {
            tracing::warn!(error = %e, "Request failed");
        }
    }
}

/// Client side of the handshake over the split socket
async fn handshake(reader: &mut Reader, writer: &mut Writer, read_buf: &mut BytesMut) -> Result<()> {
    let mut handshake = Handshake::new();

    let c0c1 = handshake.generate_c0c1()?;
    writer.write_all(&c0c1).await?;
    writer.flush().await?;

    loop {
        if let Some(c2) = handshake.process(read_buf)? {
            writer.write_all(&c2).await?;
            writer.flush().await?;
            tracing::debug!("Handshake complete");
            return Ok(());
        }
        let n = reader.read_buf(&mut *read_buf).await?;
        if n == 0 {
            return Err(Error::ConnectionClosed);
        }
    }
}

async fn flush(conn: &mut NetConnection, writer: &mut Writer) -> Result<()> {
    if let Some(bytes) = conn.take_output() {
        tracing::trace!(len = bytes.len(), "Writing");
        writer.write_all(&bytes).await?;
        writer.flush().await?;
    }
    Ok(())
}
