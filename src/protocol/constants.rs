//! RTMP protocol constants
//!
//! Reference: Adobe RTMP Specification (December 2012)

/// RTMP version number (always 3 for standard RTMP)
pub const RTMP_VERSION: u8 = 3;

/// Default RTMP port
pub const RTMP_PORT: u16 = 1935;

/// Handshake packet sizes
pub const HANDSHAKE_SIZE: usize = 1536;

/// Default chunk size (per RTMP spec)
pub const DEFAULT_CHUNK_SIZE: u32 = 128;

/// Recommended chunk size for efficiency (reduces header overhead)
pub const RECOMMENDED_CHUNK_SIZE: u32 = 4096;

/// Maximum chunk size allowed
pub const MAX_CHUNK_SIZE: u32 = 0xFFFFFF;

/// Maximum message size (sanity limit)
pub const MAX_MESSAGE_SIZE: u32 = 16 * 1024 * 1024;

/// Timestamps >= this value require the extended timestamp field
pub const EXTENDED_TIMESTAMP_THRESHOLD: u32 = 0xFFFFFF;

/// Largest message length a chunk header can carry (24 bits)
pub const MAX_HEADER_MESSAGE_LENGTH: u32 = 0xFFFFFF;

/// Chunk stream ids a basic header can address
pub const MIN_CSID: u32 = 2;
pub const MAX_CSID: u32 = 65599;

// ============================================================================
// Chunk Stream IDs (CSID)
// ============================================================================

/// Protocol control messages (Set Chunk Size, Abort, etc.)
pub const CSID_PROTOCOL_CONTROL: u32 = 2;

/// Command messages (connect, createStream, etc.)
pub const CSID_COMMAND: u32 = 3;

/// Audio data
pub const CSID_AUDIO: u32 = 4;

/// Video data
pub const CSID_VIDEO: u32 = 6;

/// Data messages (@setDataFrame)
pub const CSID_DATA: u32 = 8;

// ============================================================================
// Message Type IDs
// ============================================================================

pub const MSG_SET_CHUNK_SIZE: u8 = 1;
pub const MSG_ABORT: u8 = 2;
pub const MSG_ACKNOWLEDGEMENT: u8 = 3;
pub const MSG_USER_CONTROL: u8 = 4;
pub const MSG_WINDOW_ACK_SIZE: u8 = 5;
pub const MSG_SET_PEER_BANDWIDTH: u8 = 6;
pub const MSG_AUDIO: u8 = 8;
pub const MSG_VIDEO: u8 = 9;

/// AMF3 Data Message (15), AMF0 body behind a format byte
pub const MSG_DATA_AMF3: u8 = 15;

/// AMF3 Command Message (17), AMF0 body behind a format byte
pub const MSG_COMMAND_AMF3: u8 = 17;

/// AMF0 Data Message (18) - @setDataFrame, onMetaData
pub const MSG_DATA_AMF0: u8 = 18;

/// AMF0 Command Message (20) - connect, play, publish, etc.
pub const MSG_COMMAND_AMF0: u8 = 20;

// ============================================================================
// User Control Event Types
// ============================================================================

pub const UC_STREAM_BEGIN: u16 = 0;
pub const UC_STREAM_EOF: u16 = 1;
pub const UC_STREAM_DRY: u16 = 2;
pub const UC_SET_BUFFER_LENGTH: u16 = 3;
pub const UC_STREAM_IS_RECORDED: u16 = 4;
pub const UC_PING_REQUEST: u16 = 6;
pub const UC_PING_RESPONSE: u16 = 7;

// ============================================================================
// Command Names
// ============================================================================

pub const CMD_CONNECT: &str = "connect";
pub const CMD_CLOSE_STREAM: &str = "closeStream";
pub const CMD_CREATE_STREAM: &str = "createStream";
pub const CMD_DELETE_STREAM: &str = "deleteStream";
pub const CMD_PLAY: &str = "play";
pub const CMD_PUBLISH: &str = "publish";
pub const CMD_PAUSE: &str = "pause";
pub const CMD_SEEK: &str = "seek";
pub const CMD_RECEIVE_AUDIO: &str = "receiveAudio";
pub const CMD_RECEIVE_VIDEO: &str = "receiveVideo";

pub const CMD_RESULT: &str = "_result";
pub const CMD_ERROR: &str = "_error";
pub const CMD_ON_STATUS: &str = "onStatus";

// FMLE extended commands
pub const CMD_FC_PUBLISH: &str = "FCPublish";
pub const CMD_FC_UNPUBLISH: &str = "FCUnpublish";

// Data handlers
pub const CMD_SET_DATA_FRAME: &str = "@setDataFrame";
pub const CMD_ON_METADATA: &str = "onMetaData";

// ============================================================================
// Connect parameters
// ============================================================================

/// Flash version string sent by default in the connect object
pub const DEFAULT_FLASH_VER: &str = "FMLE/3.0 (compatible; FMSc/1.0)";

/// Prefix marking an encoder-style client that sends FCPublish/FCUnpublish
pub const FMLE_FLASH_VER_PREFIX: &str = "FMLE/";

pub const CONNECT_CAPABILITIES: f64 = 15.0;

/// SUPPORT_SND_* bit set advertised in the connect object
pub const CONNECT_AUDIO_CODECS: f64 = 3191.0;

/// SUPPORT_VID_* bit set, up to and including H.264
pub const CONNECT_VIDEO_CODECS: f64 = 252.0;

pub const CONNECT_VIDEO_FUNCTION: f64 = 1.0;

/// Default buffer length in milliseconds
pub const DEFAULT_BUFFER_LENGTH: u32 = 1000;
