//! RTMP message types and parsing
//!
//! RTMP messages are classified into:
//! - Protocol Control Messages (types 1-6): Chunk/flow control
//! - Command Messages (types 17, 20): AMF-encoded commands
//! - Data Messages (types 15, 18): Metadata
//! - Audio/Video Messages (types 8, 9): Media data
//!
//! Every message maps to a fixed message type id and a fixed chunk stream:
//! control on 2, commands on 3, audio on 4, video on 6 and data on 8.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::amf::{Amf0Decoder, Amf0Encoder, AmfValue};
use crate::error::{ProtocolError, Result};
use crate::protocol::chunk::RtmpChunk;
use crate::protocol::constants::*;

/// Parsed RTMP message
#[derive(Debug, Clone, PartialEq)]
pub enum RtmpMessage {
    /// Set Chunk Size (type 1)
    SetChunkSize(u32),

    /// Abort Message (type 2)
    Abort { csid: u32 },

    /// Acknowledgement (type 3)
    Acknowledgement { sequence: u32 },

    /// User Control Message (type 4)
    UserControl(UserControlEvent),

    /// Window Acknowledgement Size (type 5)
    WindowAckSize(u32),

    /// Set Peer Bandwidth (type 6)
    SetPeerBandwidth { size: u32, limit_type: u8 },

    /// AMF0 command (type 20, or 17 on input)
    Command(Command),

    /// AMF0 data message (type 18, or 15 on input)
    Data(DataMessage),

    /// Audio data (type 8)
    Audio(MediaMessage),

    /// Video data (type 9)
    Video(MediaMessage),

    /// Any other message type, passed through untouched
    Unknown {
        type_id: u8,
        stream_id: u32,
        data: Bytes,
    },
}

/// User Control Event
#[derive(Debug, Clone, PartialEq)]
pub enum UserControlEvent {
    StreamBegin(u32),
    StreamEof(u32),
    StreamDry(u32),
    SetBufferLength { stream_id: u32, buffer_ms: u32 },
    StreamIsRecorded(u32),
    PingRequest(u32),
    PingResponse(u32),
    Unknown { event_type: u16, data: Bytes },
}

/// RTMP command (connect, publish, play, etc.)
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Message stream ID
    pub stream_id: u32,
    pub transaction_id: u32,
    pub command_name: String,
    /// Command object; encoded as AMF0 null when absent
    pub command_object: Option<AmfValue>,
    pub arguments: Vec<AmfValue>,
}

impl Command {
    pub fn new(stream_id: u32, transaction_id: u32, command_name: impl Into<String>) -> Self {
        Self {
            stream_id,
            transaction_id,
            command_name: command_name.into(),
            command_object: None,
            arguments: Vec::new(),
        }
    }

    pub fn with_object(mut self, object: impl Into<AmfValue>) -> Self {
        self.command_object = Some(object.into());
        self
    }

    pub fn with_args(mut self, arguments: Vec<AmfValue>) -> Self {
        self.arguments = arguments;
        self
    }

    /// First argument, where `_result`, `_error` and `onStatus` carry their info
    pub fn first_argument(&self) -> Option<&AmfValue> {
        self.arguments.first()
    }
}

/// Data message (@setDataFrame, onMetaData, etc.)
#[derive(Debug, Clone, PartialEq)]
pub struct DataMessage {
    pub stream_id: u32,
    pub handler_name: String,
    pub arguments: Vec<AmfValue>,
}

/// Audio or video payload
#[derive(Debug, Clone, PartialEq)]
pub struct MediaMessage {
    pub stream_id: u32,
    /// Milliseconds; a delta when sent with a compressed chunk header
    pub timestamp: u32,
    pub payload: Bytes,
}

impl RtmpMessage {
    /// Message type id written in the chunk header
    pub fn message_type(&self) -> u8 {
        match self {
            RtmpMessage::SetChunkSize(_) => MSG_SET_CHUNK_SIZE,
            RtmpMessage::Abort { .. } => MSG_ABORT,
            RtmpMessage::Acknowledgement { .. } => MSG_ACKNOWLEDGEMENT,
            RtmpMessage::UserControl(_) => MSG_USER_CONTROL,
            RtmpMessage::WindowAckSize(_) => MSG_WINDOW_ACK_SIZE,
            RtmpMessage::SetPeerBandwidth { .. } => MSG_SET_PEER_BANDWIDTH,
            RtmpMessage::Command(_) => MSG_COMMAND_AMF0,
            RtmpMessage::Data(_) => MSG_DATA_AMF0,
            RtmpMessage::Audio(_) => MSG_AUDIO,
            RtmpMessage::Video(_) => MSG_VIDEO,
            RtmpMessage::Unknown { type_id, .. } => *type_id,
        }
    }

    /// Chunk stream this message travels on
    pub fn chunk_stream_id(&self) -> u32 {
        match self {
            RtmpMessage::SetChunkSize(_)
            | RtmpMessage::Abort { .. }
            | RtmpMessage::Acknowledgement { .. }
            | RtmpMessage::UserControl(_)
            | RtmpMessage::WindowAckSize(_)
            | RtmpMessage::SetPeerBandwidth { .. } => CSID_PROTOCOL_CONTROL,
            RtmpMessage::Command(_) | RtmpMessage::Unknown { .. } => CSID_COMMAND,
            RtmpMessage::Data(_) => CSID_DATA,
            RtmpMessage::Audio(_) => CSID_AUDIO,
            RtmpMessage::Video(_) => CSID_VIDEO,
        }
    }

    /// Message stream id; protocol control always uses stream 0
    pub fn stream_id(&self) -> u32 {
        match self {
            RtmpMessage::Command(cmd) => cmd.stream_id,
            RtmpMessage::Data(data) => data.stream_id,
            RtmpMessage::Audio(media) | RtmpMessage::Video(media) => media.stream_id,
            RtmpMessage::Unknown { stream_id, .. } => *stream_id,
            _ => 0,
        }
    }

    pub fn timestamp(&self) -> u32 {
        match self {
            RtmpMessage::Audio(media) | RtmpMessage::Video(media) => media.timestamp,
            _ => 0,
        }
    }

    /// Encode the message body
    pub fn encode_payload(&self) -> Bytes {
        match self {
            RtmpMessage::SetChunkSize(size) => u32_payload(*size & 0x7FFF_FFFF),
            RtmpMessage::Abort { csid } => u32_payload(*csid),
            RtmpMessage::Acknowledgement { sequence } => u32_payload(*sequence),
            RtmpMessage::WindowAckSize(size) => u32_payload(*size),
            RtmpMessage::SetPeerBandwidth { size, limit_type } => {
                let mut buf = BytesMut::with_capacity(5);
                buf.put_u32(*size);
                buf.put_u8(*limit_type);
                buf.freeze()
            }
            RtmpMessage::UserControl(event) => encode_user_control(event),
            RtmpMessage::Command(cmd) => encode_command(cmd),
            RtmpMessage::Data(data) => encode_data(data),
            RtmpMessage::Audio(media) | RtmpMessage::Video(media) => media.payload.clone(),
            RtmpMessage::Unknown { data, .. } => data.clone(),
        }
    }

    /// Frame this message for the chunk encoder
    pub fn to_chunk(&self) -> RtmpChunk {
        RtmpChunk {
            csid: self.chunk_stream_id(),
            timestamp: self.timestamp(),
            message_type: self.message_type(),
            stream_id: self.stream_id(),
            payload: self.encode_payload(),
        }
    }

    /// Parse a message from a reassembled chunk
    pub fn from_chunk(chunk: &RtmpChunk) -> Result<Self> {
        let mut payload = chunk.payload.clone();
        let message_type = chunk.message_type;

        match message_type {
            MSG_SET_CHUNK_SIZE => {
                let size = read_u32(&mut payload, message_type)? & 0x7FFF_FFFF; // Ignore MSB
                Ok(RtmpMessage::SetChunkSize(size))
            }
            MSG_ABORT => Ok(RtmpMessage::Abort {
                csid: read_u32(&mut payload, message_type)?,
            }),
            MSG_ACKNOWLEDGEMENT => Ok(RtmpMessage::Acknowledgement {
                sequence: read_u32(&mut payload, message_type)?,
            }),
            MSG_USER_CONTROL => Self::parse_user_control(&mut payload),
            MSG_WINDOW_ACK_SIZE => Ok(RtmpMessage::WindowAckSize(read_u32(
                &mut payload,
                message_type,
            )?)),
            MSG_SET_PEER_BANDWIDTH => {
                if payload.len() < 5 {
                    return Err(truncated(message_type, payload.len()));
                }
                let size = payload.get_u32();
                let limit_type = payload.get_u8();
                Ok(RtmpMessage::SetPeerBandwidth { size, limit_type })
            }
            MSG_AUDIO => Ok(RtmpMessage::Audio(MediaMessage {
                stream_id: chunk.stream_id,
                timestamp: chunk.timestamp,
                payload,
            })),
            MSG_VIDEO => Ok(RtmpMessage::Video(MediaMessage {
                stream_id: chunk.stream_id,
                timestamp: chunk.timestamp,
                payload,
            })),
            MSG_COMMAND_AMF0 | MSG_COMMAND_AMF3 => {
                if message_type == MSG_COMMAND_AMF3 {
                    skip_amf3_format_byte(&mut payload);
                }
                Ok(RtmpMessage::Command(Self::parse_command(&mut payload, chunk.stream_id)?))
            }
            MSG_DATA_AMF0 | MSG_DATA_AMF3 => {
                if message_type == MSG_DATA_AMF3 {
                    skip_amf3_format_byte(&mut payload);
                }
                Ok(RtmpMessage::Data(Self::parse_data(&mut payload, chunk.stream_id)?))
            }
            _ => Ok(RtmpMessage::Unknown {
                type_id: message_type,
                stream_id: chunk.stream_id,
                data: payload,
            }),
        }
    }

    fn parse_user_control(payload: &mut Bytes) -> Result<Self> {
        if payload.len() < 6 {
            return Err(truncated(MSG_USER_CONTROL, payload.len()));
        }

        let event_type = payload.get_u16();
        let event = match event_type {
            UC_STREAM_BEGIN => UserControlEvent::StreamBegin(payload.get_u32()),
            UC_STREAM_EOF => UserControlEvent::StreamEof(payload.get_u32()),
            UC_STREAM_DRY => UserControlEvent::StreamDry(payload.get_u32()),
            UC_SET_BUFFER_LENGTH => {
                if payload.len() < 8 {
                    return Err(truncated(MSG_USER_CONTROL, payload.len() + 2));
                }
                let stream_id = payload.get_u32();
                let buffer_ms = payload.get_u32();
                UserControlEvent::SetBufferLength { stream_id, buffer_ms }
            }
            UC_STREAM_IS_RECORDED => UserControlEvent::StreamIsRecorded(payload.get_u32()),
            UC_PING_REQUEST => UserControlEvent::PingRequest(payload.get_u32()),
            UC_PING_RESPONSE => UserControlEvent::PingResponse(payload.get_u32()),
            _ => UserControlEvent::Unknown {
                event_type,
                data: payload.clone(),
            },
        };

        Ok(RtmpMessage::UserControl(event))
    }

    fn parse_command(payload: &mut Bytes, stream_id: u32) -> Result<Command> {
        let mut decoder = Amf0Decoder::new();

        let command_name = match decoder.decode(payload)? {
            AmfValue::String(s) => s,
            _ => return Err(ProtocolError::InvalidCommand("Expected command name".into()).into()),
        };

        let transaction_id = match decoder.decode(payload)? {
            AmfValue::Number(n) if n >= 0.0 => n as u32,
            AmfValue::Number(_) => 0,
            _ => {
                return Err(ProtocolError::InvalidCommand(format!(
                    "Expected transaction id for {}",
                    command_name
                ))
                .into())
            }
        };

        let command_object = if payload.has_remaining() {
            match decoder.decode(payload)? {
                AmfValue::Null => None,
                value => Some(value),
            }
        } else {
            None
        };

        let arguments = decoder.decode_all(payload)?;

        Ok(Command {
            stream_id,
            transaction_id,
            command_name,
            command_object,
            arguments,
        })
    }

    fn parse_data(payload: &mut Bytes, stream_id: u32) -> Result<DataMessage> {
        let mut decoder = Amf0Decoder::new();

        let handler_name = match decoder.decode(payload)? {
            AmfValue::String(s) => s,
            _ => {
                return Err(ProtocolError::InvalidCommand("Expected data handler name".into()).into())
            }
        };

        let arguments = decoder.decode_all(payload)?;

        Ok(DataMessage {
            stream_id,
            handler_name,
            arguments,
        })
    }
}

fn read_u32(payload: &mut Bytes, message_type: u8) -> Result<u32> {
    if payload.len() < 4 {
        return Err(truncated(message_type, payload.len()));
    }
    Ok(payload.get_u32())
}

fn truncated(message_type: u8, len: usize) -> crate::error::Error {
    ProtocolError::TruncatedMessage { message_type, len }.into()
}

/// AMF3 command and data bodies start with a format byte before the AMF0 values
fn skip_amf3_format_byte(payload: &mut Bytes) {
    if payload.first() == Some(&0x00) {
        payload.advance(1);
    }
}

fn u32_payload(value: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(4);
    buf.put_u32(value);
    buf.freeze()
}

fn encode_user_control(event: &UserControlEvent) -> Bytes {
    let mut buf = BytesMut::with_capacity(10);
    let (event_type, value) = match event {
        UserControlEvent::StreamBegin(id) => (UC_STREAM_BEGIN, *id),
        UserControlEvent::StreamEof(id) => (UC_STREAM_EOF, *id),
        UserControlEvent::StreamDry(id) => (UC_STREAM_DRY, *id),
        UserControlEvent::StreamIsRecorded(id) => (UC_STREAM_IS_RECORDED, *id),
        UserControlEvent::PingRequest(ts) => (UC_PING_REQUEST, *ts),
        UserControlEvent::PingResponse(ts) => (UC_PING_RESPONSE, *ts),
        UserControlEvent::SetBufferLength { stream_id, buffer_ms } => {
            buf.put_u16(UC_SET_BUFFER_LENGTH);
            buf.put_u32(*stream_id);
            buf.put_u32(*buffer_ms);
            return buf.freeze();
        }
        UserControlEvent::Unknown { event_type, data } => {
            buf.put_u16(*event_type);
            buf.put_slice(data);
            return buf.freeze();
        }
    };
    buf.put_u16(event_type);
    buf.put_u32(value);
    buf.freeze()
}

/// Encode a command to AMF0 bytes
fn encode_command(cmd: &Command) -> Bytes {
    let mut encoder = Amf0Encoder::new();
    encoder.encode(&AmfValue::String(cmd.command_name.clone()));
    encoder.encode(&AmfValue::Number(cmd.transaction_id as f64));
    encoder.encode(cmd.command_object.as_ref().unwrap_or(&AmfValue::Null));
    encoder.encode_all(&cmd.arguments);
    encoder.finish()
}

/// Encode a data message to AMF0 bytes
fn encode_data(data: &DataMessage) -> Bytes {
    let mut encoder = Amf0Encoder::new();
    encoder.encode(&AmfValue::String(data.handler_name.clone()));
    encoder.encode_all(&data.arguments);
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amf::AmfObject;
    use crate::error::Error;

    fn reparse(msg: &RtmpMessage) -> RtmpMessage {
        RtmpMessage::from_chunk(&msg.to_chunk()).unwrap()
    }

    #[test]
    fn test_command_roundtrip() {
        let cmd = Command::new(0, 1, "connect")
            .with_object(AmfObject::new().with("app", "live"))
            .with_args(vec![AmfValue::String("test".into())]);
        let msg = RtmpMessage::Command(cmd);

        assert_eq!(reparse(&msg), msg);
    }

    #[test]
    fn test_command_null_object_is_absent() {
        let cmd = Command::new(1, 4, "play").with_args(vec!["live".into(), AmfValue::Number(-2.0)]);
        let chunk = RtmpMessage::Command(cmd.clone()).to_chunk();

        // name, transaction id, then a null object
        let values = crate::amf::amf0::decode_all(&chunk.payload).unwrap();
        assert_eq!(values[2], AmfValue::Null);

        match RtmpMessage::from_chunk(&chunk).unwrap() {
            RtmpMessage::Command(parsed) => {
                assert_eq!(parsed.command_object, None);
                assert_eq!(parsed.stream_id, 1);
                assert_eq!(parsed, cmd);
            }
            other => panic!("Expected command, got {:?}", other),
        }
    }

    #[test]
    fn test_channel_mapping() {
        let media = MediaMessage {
            stream_id: 1,
            timestamp: 33,
            payload: Bytes::from_static(&[0x17, 0x01]),
        };
        let data = DataMessage {
            stream_id: 1,
            handler_name: CMD_SET_DATA_FRAME.into(),
            arguments: vec![],
        };

        let cases = [
            (RtmpMessage::SetChunkSize(4096), MSG_SET_CHUNK_SIZE, CSID_PROTOCOL_CONTROL),
            (RtmpMessage::Command(Command::new(0, 1, "connect")), MSG_COMMAND_AMF0, CSID_COMMAND),
            (RtmpMessage::Data(data), MSG_DATA_AMF0, CSID_DATA),
            (RtmpMessage::Audio(media.clone()), MSG_AUDIO, CSID_AUDIO),
            (RtmpMessage::Video(media), MSG_VIDEO, CSID_VIDEO),
        ];
        for (msg, message_type, csid) in cases {
            assert_eq!(msg.message_type(), message_type);
            assert_eq!(msg.chunk_stream_id(), csid);
        }
    }

    #[test]
    fn test_media_keeps_timestamp_and_stream() {
        let msg = RtmpMessage::Video(MediaMessage {
            stream_id: 7,
            timestamp: 1250,
            payload: Bytes::from_static(b"frame"),
        });
        let chunk = msg.to_chunk();
        assert_eq!(chunk.timestamp, 1250);
        assert_eq!(chunk.stream_id, 7);
        assert_eq!(reparse(&msg), msg);
    }

    #[test]
    fn test_data_message_roundtrip() {
        let msg = RtmpMessage::Data(DataMessage {
            stream_id: 1,
            handler_name: CMD_SET_DATA_FRAME.into(),
            arguments: vec![
                CMD_ON_METADATA.into(),
                AmfValue::Object(AmfObject::new().with("width", 1280.0)),
            ],
        });
        assert_eq!(reparse(&msg), msg);
    }

    #[test]
    fn test_amf3_command_skips_format_byte() {
        let body = RtmpMessage::Command(Command::new(0, 2, "_result")).encode_payload();
        let mut payload = BytesMut::new();
        payload.put_u8(0x00);
        payload.put_slice(&body);

        let chunk = RtmpChunk {
            csid: CSID_COMMAND,
            timestamp: 0,
            message_type: MSG_COMMAND_AMF3,
            stream_id: 0,
            payload: payload.freeze(),
        };
        match RtmpMessage::from_chunk(&chunk).unwrap() {
            RtmpMessage::Command(cmd) => {
                assert_eq!(cmd.command_name, "_result");
                assert_eq!(cmd.transaction_id, 2);
            }
            other => panic!("Expected command, got {:?}", other),
        }
    }

    #[test]
    fn test_control_roundtrips() {
        for msg in [
            RtmpMessage::SetChunkSize(4096),
            RtmpMessage::Abort { csid: 6 },
            RtmpMessage::Acknowledgement { sequence: 2_500_000 },
            RtmpMessage::WindowAckSize(2_500_000),
            RtmpMessage::SetPeerBandwidth { size: 2_500_000, limit_type: 2 },
            RtmpMessage::UserControl(UserControlEvent::StreamBegin(1)),
            RtmpMessage::UserControl(UserControlEvent::PingRequest(99)),
            RtmpMessage::UserControl(UserControlEvent::SetBufferLength {
                stream_id: 1,
                buffer_ms: 3000,
            }),
        ] {
            assert_eq!(reparse(&msg), msg);
            assert_eq!(msg.stream_id(), 0);
        }
    }

    #[test]
    fn test_truncated_control_message() {
        let chunk = RtmpChunk {
            csid: CSID_PROTOCOL_CONTROL,
            timestamp: 0,
            message_type: MSG_WINDOW_ACK_SIZE,
            stream_id: 0,
            payload: Bytes::from_static(&[0x00, 0x01]),
        };
        let err = RtmpMessage::from_chunk(&chunk).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::TruncatedMessage { message_type: 5, len: 2 })
        ));
    }

    #[test]
    fn test_bad_amf_aborts_message() {
        let chunk = RtmpChunk {
            csid: CSID_COMMAND,
            timestamp: 0,
            message_type: MSG_COMMAND_AMF0,
            stream_id: 0,
            payload: Bytes::from_static(&[0x02, 0x00, 0x01, b'x', 0x00, 0, 0, 0, 0, 0, 0, 0, 0, 0x0B]),
        };
        assert!(matches!(
            RtmpMessage::from_chunk(&chunk),
            Err(Error::Amf(crate::error::AmfError::UnsupportedType(0x0B)))
        ));
    }

    #[test]
    fn test_command_name_must_be_string() {
        let chunk = RtmpChunk {
            csid: CSID_COMMAND,
            timestamp: 0,
            message_type: MSG_COMMAND_AMF0,
            stream_id: 0,
            payload: crate::amf::amf0::encode(&AmfValue::Number(1.0)),
        };
        assert!(matches!(
            RtmpMessage::from_chunk(&chunk),
            Err(Error::Protocol(ProtocolError::InvalidCommand(_)))
        ));
    }

    #[test]
    fn test_unknown_type_passthrough() {
        let chunk = RtmpChunk {
            csid: CSID_COMMAND,
            timestamp: 0,
            message_type: 22,
            stream_id: 1,
            payload: Bytes::from_static(b"aggregate"),
        };
        let msg = RtmpMessage::from_chunk(&chunk).unwrap();
        assert_eq!(msg.message_type(), 22);
        assert_eq!(msg.stream_id(), 1);
        assert_eq!(msg.encode_payload(), chunk.payload);
    }
}
