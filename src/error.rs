//! Unified error types for rtmp-netstream

use std::fmt;
use std::io;

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all client operations
#[derive(Debug)]
pub enum Error {
    /// I/O error during network operations
    Io(io::Error),
    /// RTMP protocol violation
    Protocol(ProtocolError),
    /// AMF encoding/decoding error
    Amf(AmfError),
    /// Handshake failure
    Handshake(HandshakeError),
    /// Operation timed out
    Timeout,
    /// Connection was closed
    ConnectionClosed,
    /// Invalid configuration
    Config(String),
    /// Reconnect budget used up
    RetriesExhausted { attempts: u32 },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e),
            Error::Amf(e) => write!(f, "AMF error: {}", e),
            Error::Handshake(e) => write!(f, "Handshake error: {}", e),
            Error::Timeout => write!(f, "Operation timed out"),
            Error::ConnectionClosed => write!(f, "Connection closed"),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::RetriesExhausted { attempts } => {
                write!(f, "Reconnect attempts exhausted after {} retries", attempts)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Protocol(e) => Some(e),
            Error::Amf(e) => Some(e),
            Error::Handshake(e) => Some(e),
            _ => None,
        }
    }
}

impl Error {
    /// Whether this error came from the byte-stream transport itself
    ///
    /// Transport errors take the immediate-reconnect path; everything else
    /// is reported through a status code.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Io(_) | Error::ConnectionClosed | Error::Handshake(_))
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<ProtocolError> for Error {
    fn from(err: ProtocolError) -> Self {
        Error::Protocol(err)
    }
}

impl From<AmfError> for Error {
    fn from(err: AmfError) -> Self {
        Error::Amf(err)
    }
}

impl From<HandshakeError> for Error {
    fn from(err: HandshakeError) -> Self {
        Error::Handshake(err)
    }
}

/// Protocol-level errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    InvalidChunkHeader,
    MessageTooLarge { size: u32, max: u32 },
    /// A compressed chunk header was used before any full header on that chunk stream
    MissingFullHeader { csid: u32 },
    /// A reduced header does not match the state recorded for the chunk stream
    HeaderMismatch { csid: u32 },
    /// A control message body was shorter than its fixed layout
    TruncatedMessage { message_type: u8, len: usize },
    MissingField(String),
    InvalidCommand(String),
    StreamNotFound(u32),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::InvalidChunkHeader => write!(f, "Invalid chunk header"),
            ProtocolError::MessageTooLarge { size, max } => {
                write!(f, "Message too large: {} bytes (max {})", size, max)
            }
            ProtocolError::MissingFullHeader { csid } => {
                write!(f, "Compressed header on chunk stream {} without a prior full header", csid)
            }
            ProtocolError::HeaderMismatch { csid } => {
                write!(f, "Reduced header does not match chunk stream {} state", csid)
            }
            ProtocolError::TruncatedMessage { message_type, len } => {
                write!(f, "Truncated message of type {} ({} bytes)", message_type, len)
            }
            ProtocolError::MissingField(field) => write!(f, "Missing required field: {}", field),
            ProtocolError::InvalidCommand(cmd) => write!(f, "Invalid command: {}", cmd),
            ProtocolError::StreamNotFound(id) => write!(f, "Stream not found: {}", id),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// AMF encoding/decoding errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmfError {
    UnsupportedType(u8),
    UnexpectedEof,
    InvalidUtf8,
    NestingTooDeep,
    InvalidObjectEnd,
}

impl fmt::Display for AmfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmfError::UnsupportedType(m) => write!(f, "Unsupported AMF type marker: 0x{:02x}", m),
            AmfError::UnexpectedEof => write!(f, "Unexpected end of AMF data"),
            AmfError::InvalidUtf8 => write!(f, "Invalid UTF-8 in AMF string"),
            AmfError::NestingTooDeep => write!(f, "AMF nesting too deep"),
            AmfError::InvalidObjectEnd => write!(f, "Invalid object end marker"),
        }
    }
}

impl std::error::Error for AmfError {}

/// Handshake-specific errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    InvalidVersion(u8),
    InvalidState,
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeError::InvalidVersion(v) => write!(f, "Invalid RTMP version: {}", v),
            HandshakeError::InvalidState => write!(f, "Invalid handshake state"),
        }
    }
}

impl std::error::Error for HandshakeError {}
