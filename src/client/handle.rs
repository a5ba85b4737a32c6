//! Async client handles
//!
//! [`RtmpClient`] spawns the connection worker and hands out
//! [`StreamHandle`]s. Every call is a message to the worker, so calls made
//! while the connection is down are applied once it is back.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, watch};

use crate::amf::AmfValue;
use crate::client::config::ClientConfig;
use crate::client::connection::{NetConnection, StreamKey};
use crate::client::worker::{ClientEvent, Request, Worker};
use crate::error::{Error, Result};
use crate::media::pipeline::MediaPipeline;
use crate::session::state::{HowToPublish, ReadyState};
use crate::session::stream::PlayOptions;
use crate::stats::{StreamInfo, StreamStats};

/// Connection to one RTMP application
#[derive(Clone)]
pub struct RtmpClient {
    requests: mpsc::Sender<Request>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl RtmpClient {
    /// Start connecting in the background
    ///
    /// Must be called inside a Tokio runtime. Returns the client and a
    /// receiver for its events.
    pub fn connect(config: ClientConfig) -> Result<(Self, mpsc::Receiver<ClientEvent>)> {
        let capacity = config.request_capacity.max(1);
        let conn = NetConnection::new(config)?;

        let (request_tx, request_rx) = mpsc::channel(capacity);
        let (event_tx, event_rx) = mpsc::channel(1024);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker = Worker::new(conn, request_rx, event_tx, shutdown_rx);
        tokio::spawn(worker.run());

        let client = Self {
            requests: request_tx,
            shutdown: Arc::new(shutdown_tx),
        };
        Ok((client, event_rx))
    }

    /// Create a stream driving `pipeline`
    ///
    /// Resolves once the worker has registered the stream; `createStream`
    /// itself is answered later (see [`ClientEvent::StreamCreated`]).
    pub async fn create_stream(&self, pipeline: impl MediaPipeline) -> Result<StreamHandle> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(Request::CreateStream {
                pipeline: Box::new(pipeline),
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::ConnectionClosed)?;
        let (key, info) = reply_rx.await.map_err(|_| Error::ConnectionClosed)??;

        Ok(StreamHandle {
            key,
            info,
            requests: self.requests.clone(),
            _shutdown: Arc::clone(&self.shutdown),
        })
    }

    /// Close every stream and stop the worker
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Whether the worker is still running
    pub fn is_running(&self) -> bool {
        !self.requests.is_closed()
    }
}

impl std::fmt::Debug for RtmpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtmpClient")
            .field("running", &self.is_running())
            .finish()
    }
}

/// Handle to one stream on an [`RtmpClient`]
pub struct StreamHandle {
    key: StreamKey,
    info: Arc<StreamInfo>,
    requests: mpsc::Sender<Request>,
    /// Keeps the worker alive while a stream handle exists
    _shutdown: Arc<watch::Sender<bool>>,
}

impl StreamHandle {
    pub fn key(&self) -> StreamKey {
        self.key
    }

    pub fn ready_state(&self) -> ReadyState {
        self.info.ready_state()
    }

    pub fn stats(&self) -> StreamStats {
        self.info.snapshot()
    }

    async fn request(&self, request: Request) -> Result<()> {
        self.requests
            .send(request)
            .await
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Play `name`; `None` stops playing
    pub async fn play(&self, name: Option<&str>, options: PlayOptions) -> Result<()> {
        self.request(Request::Play {
            key: self.key,
            name: name.map(str::to_string),
            options,
        })
        .await
    }

    /// Publish as `name`; `None` stops publishing
    pub async fn publish(&self, name: Option<&str>, how: HowToPublish) -> Result<()> {
        self.request(Request::Publish {
            key: self.key,
            name: name.map(str::to_string),
            how,
        })
        .await
    }

    pub async fn pause(&self, paused: bool) -> Result<()> {
        self.request(Request::Pause {
            key: self.key,
            paused,
        })
        .await
    }

    pub async fn seek(&self, offset: f64) -> Result<()> {
        self.request(Request::Seek {
            key: self.key,
            offset,
        })
        .await
    }

    pub async fn close(&self) -> Result<()> {
        self.request(Request::Close { key: self.key }).await
    }

    /// Data message to subscribers, e.g. `onCuePoint`
    pub async fn send(&self, handler_name: &str, arguments: Vec<AmfValue>) -> Result<()> {
        self.request(Request::Send {
            key: self.key,
            handler_name: handler_name.to_string(),
            arguments,
        })
        .await
    }

    pub async fn set_receive_audio(&self, enabled: bool) -> Result<()> {
        self.request(Request::ReceiveAudio {
            key: self.key,
            enabled,
        })
        .await
    }

    pub async fn set_receive_video(&self, enabled: bool) -> Result<()> {
        self.request(Request::ReceiveVideo {
            key: self.key,
            enabled,
        })
        .await
    }

    /// Encoded audio sample (FLV audio tag body) at `time` seconds
    pub async fn append_audio(&self, payload: Bytes, time: f64) -> Result<()> {
        self.request(Request::AppendAudio {
            key: self.key,
            payload,
            time,
        })
        .await
    }

    /// Encoded video sample (FLV video tag body) at `time` seconds
    pub async fn append_video(&self, payload: Bytes, time: f64) -> Result<()> {
        self.request(Request::AppendVideo {
            key: self.key,
            payload,
            time,
        })
        .await
    }

    /// Close, delete the stream on the server and drop the handle
    pub async fn dispose(self) -> Result<()> {
        self.request(Request::Dispose { key: self.key }).await
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("key", &self.key)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::NoopPipeline;
    use std::time::Duration;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_invalid_url_rejected() {
        let err = tokio_test::assert_err!(RtmpClient::connect(ClientConfig::new("http://nowhere")));
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_gives_up_when_server_unreachable() {
        // Bind and drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = ClientConfig::new(format!("rtmp://127.0.0.1:{}/live", port))
            .with_max_retry_count(1)
            .with_retry_base_delay(Duration::from_millis(1))
            .with_connect_timeout(Duration::from_millis(500));
        let (_client, mut events) = RtmpClient::connect(config).unwrap();

        let mut reconnects = 0;
        let fatal = tokio::time::timeout(Duration::from_secs(10), async {
            while let Some(event) = events.recv().await {
                match event {
                    ClientEvent::Reconnecting { .. } => reconnects += 1,
                    ClientEvent::Fatal(reason) => return reason,
                    _ => {}
                }
            }
            String::new()
        })
        .await
        .unwrap();

        // retry_count 0 and 1 retry, the third failure gives up
        assert_eq!(reconnects, 2);
        assert!(fatal.contains("exhausted"));
    }

    #[tokio::test]
    async fn test_requests_fail_after_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = ClientConfig::new(format!("rtmp://127.0.0.1:{}/live", port))
            .with_max_retry_count(0)
            .with_retry_base_delay(Duration::from_secs(60));
        let (client, mut events) = RtmpClient::connect(config).unwrap();

        // Wait for the worker to start backing off, then stop it
        loop {
            if let Some(ClientEvent::Reconnecting { .. }) = events.recv().await {
                break;
            }
        }
        client.shutdown();
        loop {
            match events.recv().await {
                Some(ClientEvent::Disconnected { error: None }) | None => break,
                _ => {}
            }
        }

        tokio::time::timeout(Duration::from_secs(5), async {
            while client.is_running() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        let err = tokio_test::assert_err!(client.create_stream(NoopPipeline).await);
        assert!(matches!(err, Error::ConnectionClosed));
    }
}
