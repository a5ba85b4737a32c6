//! Client configuration

use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::constants::{
    DEFAULT_BUFFER_LENGTH, DEFAULT_FLASH_VER, RECOMMENDED_CHUNK_SIZE, RTMP_PORT,
};

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// RTMP URL to connect to (rtmp://host[:port]/app[/stream])
    pub url: String,

    /// TCP connect plus handshake timeout
    pub connect_timeout: Duration,

    /// Enable TCP_NODELAY
    pub tcp_nodelay: bool,

    /// Flash version string sent in `connect`; an `FMLE/` prefix enables
    /// FCPublish / FCUnpublish
    pub flash_ver: String,

    /// SWF URL to send
    pub swf_url: Option<String>,

    /// Page URL to send
    pub page_url: Option<String>,

    /// Playback buffer in milliseconds, announced before `play`
    pub buffer_length: u32,

    /// Outgoing chunk size negotiated after connecting
    pub chunk_size: u32,

    /// Reconnect attempts before giving up
    pub max_retry_count: u32,

    /// Backoff unit; attempt `n` waits `retry_base_delay * 2^n`
    pub retry_base_delay: Duration,

    /// Capacity of the handle-to-worker request channel
    pub request_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            connect_timeout: Duration::from_secs(10),
            tcp_nodelay: true,
            flash_ver: DEFAULT_FLASH_VER.to_string(),
            swf_url: None,
            page_url: None,
            buffer_length: DEFAULT_BUFFER_LENGTH,
            chunk_size: RECOMMENDED_CHUNK_SIZE,
            max_retry_count: 5,
            retry_base_delay: Duration::from_secs(1),
            request_capacity: 1024,
        }
    }
}

impl ClientConfig {
    /// Create a new config with the given URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_tcp_nodelay(mut self, nodelay: bool) -> Self {
        self.tcp_nodelay = nodelay;
        self
    }

    pub fn with_flash_ver(mut self, flash_ver: impl Into<String>) -> Self {
        self.flash_ver = flash_ver.into();
        self
    }

    pub fn with_swf_url(mut self, swf_url: impl Into<String>) -> Self {
        self.swf_url = Some(swf_url.into());
        self
    }

    pub fn with_page_url(mut self, page_url: impl Into<String>) -> Self {
        self.page_url = Some(page_url.into());
        self
    }

    pub fn with_buffer_length(mut self, millis: u32) -> Self {
        self.buffer_length = millis;
        self
    }

    pub fn with_chunk_size(mut self, size: u32) -> Self {
        self.chunk_size = size;
        self
    }

    pub fn with_max_retry_count(mut self, count: u32) -> Self {
        self.max_retry_count = count;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn with_request_capacity(mut self, capacity: usize) -> Self {
        self.request_capacity = capacity.max(1);
        self
    }

    /// Parse URL into components
    pub fn parse_url(&self) -> Option<ParsedUrl> {
        // rtmp://host[:port]/app[/stream]
        let url = self.url.strip_prefix("rtmp://")?;

        let (host_port, path) = url.split_once('/')?;
        let (host, port) = if let Some((h, p)) = host_port.split_once(':') {
            (h.to_string(), p.parse().ok()?)
        } else {
            (host_port.to_string(), RTMP_PORT)
        };
        if host.is_empty() {
            return None;
        }

        let (app, stream_key) = if let Some((a, s)) = path.split_once('/') {
            (a.to_string(), Some(s.to_string()).filter(|s| !s.is_empty()))
        } else {
            (path.to_string(), None)
        };
        if app.is_empty() {
            return None;
        }

        let tc_url = format!("rtmp://{}:{}/{}", host, port, app);

        Some(ParsedUrl {
            host,
            port,
            app,
            stream_key,
            tc_url,
        })
    }

    /// Check the settings before starting a client
    pub fn validate(&self) -> Result<ParsedUrl> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be positive".into()));
        }
        self.parse_url()
            .ok_or_else(|| Error::Config(format!("Invalid RTMP URL: {}", self.url)))
    }
}

/// Parsed RTMP URL components
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl {
    pub host: String,
    pub port: u16,
    pub app: String,
    pub stream_key: Option<String>,
    /// `tcUrl` sent in `connect`
    pub tc_url: String,
}

impl ParsedUrl {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
