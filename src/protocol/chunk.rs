//! RTMP chunk stream codec
//!
//! RTMP messages are split into chunks for multiplexing. Each chunk has a header
//! that identifies the chunk stream and message being sent.
//!
//! ```text
//! Chunk Format:
//! +-------------+-----------------+-------------------+
//! | Basic Header| Message Header  | Chunk Data        |
//! | (1-3 bytes) | (0,3,7,11 bytes)| (variable)        |
//! +-------------+-----------------+-------------------+
//!
//! Basic Header formats:
//! - 1 byte:  fmt(2) + csid(6)        for csid 2-63
//! - 2 bytes: fmt(2) + 0 + csid(8)    for csid 64-319
//! - 3 bytes: fmt(2) + 1 + csid(16)   for csid 64-65599
//!
//! Message Header formats (based on fmt):
//! - Type 0 (11 bytes): timestamp(3) + length(3) + type(1) + stream_id(4)
//! - Type 1 (7 bytes):  timestamp_delta(3) + length(3) + type(1)
//! - Type 2 (3 bytes):  timestamp_delta(3)
//! - Type 3 (0 bytes):  (use previous chunk's values)
//!
//! Extended timestamp (4 bytes) follows the message header of every chunk of
//! a message whose timestamp field is >= 0xFFFFFF
//! ```
//!
//! The header format is chosen by the caller. A compressed header inherits
//! fields from the last full header on the same chunk stream, so using one
//! before any full header has been written is an error in both directions.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::HashMap;

use crate::error::{ProtocolError, Result};
use crate::protocol::constants::*;

/// Chunk message header format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChunkFormat {
    /// Type 0: absolute timestamp, length, type and stream id
    Full = 0,
    /// Type 1: timestamp delta, length and type; stream id inherited
    Delta = 1,
    /// Type 2: timestamp delta only
    TimestampDelta = 2,
    /// Type 3: everything inherited
    Continuation = 3,
}

impl ChunkFormat {
    fn from_bits(fmt: u8) -> Self {
        match fmt & 0x03 {
            0 => ChunkFormat::Full,
            1 => ChunkFormat::Delta,
            2 => ChunkFormat::TimestampDelta,
            _ => ChunkFormat::Continuation,
        }
    }

    /// Message header size in bytes, excluding the extended timestamp
    fn header_size(self) -> usize {
        match self {
            ChunkFormat::Full => 11,
            ChunkFormat::Delta => 7,
            ChunkFormat::TimestampDelta => 3,
            ChunkFormat::Continuation => 0,
        }
    }
}

/// A complete RTMP message (reassembled from chunks)
///
/// `timestamp` is the value of the header's timestamp field: absolute for a
/// full header, a delta for every other format. Decoded chunks always carry
/// the absolute timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct RtmpChunk {
    pub csid: u32,
    pub timestamp: u32,
    pub message_type: u8,
    pub stream_id: u32,
    pub payload: Bytes,
}

/// Per-chunk-stream header state
#[derive(Debug, Clone, Default)]
struct ChunkStreamState {
    /// Absolute timestamp of the last message
    timestamp: u32,
    /// Last timestamp field value, reused by type 3 headers
    timestamp_delta: u32,
    message_length: u32,
    message_type: u8,
    stream_id: u32,
    has_extended_timestamp: bool,
}

/// Reassembly state for a chunk stream on the read side
#[derive(Debug, Default)]
struct InboundStream {
    header: ChunkStreamState,
    partial_message: BytesMut,
    /// A message is partially received on this chunk stream
    assembling: bool,
}

/// Header fields parsed from the front of the read buffer
struct ParsedHeader {
    format: ChunkFormat,
    csid: u32,
    /// Basic + message header + extended timestamp
    header_len: usize,
    timestamp_field: u32,
    message_length: u32,
    message_type: u8,
    stream_id: u32,
    extended: bool,
}

/// Chunk stream decoder
///
/// Handles chunk demultiplexing and message reassembly. State is only
/// committed once a whole chunk is present in the buffer, so feeding bytes
/// in arbitrary slices gives the same result as feeding them at once.
pub struct ChunkDecoder {
    chunk_size: u32,
    streams: HashMap<u32, InboundStream>,
    max_message_size: u32,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            streams: HashMap::new(),
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }

    /// Set the chunk size (called when receiving SetChunkSize message)
    pub fn set_chunk_size(&mut self, size: u32) {
        self.chunk_size = size.clamp(1, MAX_CHUNK_SIZE);
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Try to decode a complete message from the buffer
    ///
    /// Consumes as many whole chunks as are available. Returns `Ok(None)` once
    /// the buffer holds no further complete chunk and no message finished.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<RtmpChunk>> {
        loop {
            let header = match self.parse_header(buf)? {
                Some(h) => h,
                None => return Ok(None),
            };

            if header.message_length > self.max_message_size {
                return Err(ProtocolError::MessageTooLarge {
                    size: header.message_length,
                    max: self.max_message_size,
                }
                .into());
            }

            let chunk_size = self.chunk_size as usize;
            let stream = self.streams.entry(header.csid).or_default();

            let continuing = stream.assembling && header.format == ChunkFormat::Continuation;
            if stream.assembling && !continuing {
                tracing::warn!(
                    csid = header.csid,
                    received = stream.partial_message.len(),
                    "New message header interrupted a partial message, discarding it"
                );
            }

            let expected = if continuing {
                stream.header.message_length as usize
            } else {
                header.message_length as usize
            };
            let already = if continuing { stream.partial_message.len() } else { 0 };
            let data_len = (expected - already).min(chunk_size);

            if buf.len() < header.header_len + data_len {
                return Ok(None);
            }

            // Whole chunk present, commit
            buf.advance(header.header_len);

            if !continuing {
                let absolute = match header.format {
                    ChunkFormat::Full => header.timestamp_field,
                    _ => stream.header.timestamp.wrapping_add(header.timestamp_field),
                };
                stream.header = ChunkStreamState {
                    timestamp: absolute,
                    timestamp_delta: header.timestamp_field,
                    message_length: header.message_length,
                    message_type: header.message_type,
                    stream_id: header.stream_id,
                    has_extended_timestamp: header.extended,
                };
                stream.partial_message.clear();
                stream.partial_message.reserve(expected);
                stream.assembling = true;
            }

            stream.partial_message.put_slice(&buf[..data_len]);
            buf.advance(data_len);

            if stream.partial_message.len() >= expected {
                stream.assembling = false;
                let payload = stream.partial_message.split().freeze();
                tracing::trace!(
                    csid = header.csid,
                    message_type = stream.header.message_type,
                    len = payload.len(),
                    "Reassembled message"
                );
                return Ok(Some(RtmpChunk {
                    csid: header.csid,
                    timestamp: stream.header.timestamp,
                    message_type: stream.header.message_type,
                    stream_id: stream.header.stream_id,
                    payload,
                }));
            }
        }
    }

    /// Parse the chunk header at the front of `buf` without consuming it
    fn parse_header(&self, buf: &[u8]) -> Result<Option<ParsedHeader>> {
        let (fmt, csid, basic_len) = match parse_basic_header(buf) {
            Some(v) => v,
            None => return Ok(None),
        };
        let format = ChunkFormat::from_bits(fmt);

        let previous = match (format, self.streams.get(&csid)) {
            (ChunkFormat::Full, _) => None,
            (_, Some(stream)) => Some(&stream.header),
            (_, None) => return Err(ProtocolError::MissingFullHeader { csid }.into()),
        };

        let mut header_len = basic_len + format.header_size();
        if buf.len() < header_len {
            return Ok(None);
        }

        let mut cursor = &buf[basic_len..header_len];
        let (timestamp_field, message_length, message_type, stream_id, extended) =
            match (format, previous) {
                (ChunkFormat::Full, _) => {
                    let ts = cursor.get_uint(3) as u32;
                    let len = cursor.get_uint(3) as u32;
                    let typ = cursor.get_u8();
                    let sid = cursor.get_u32_le(); // Stream ID is little-endian!
                    (ts, len, typ, sid, ts >= EXTENDED_TIMESTAMP_THRESHOLD)
                }
                (ChunkFormat::Delta, Some(prev)) => {
                    let ts = cursor.get_uint(3) as u32;
                    let len = cursor.get_uint(3) as u32;
                    let typ = cursor.get_u8();
                    (ts, len, typ, prev.stream_id, ts >= EXTENDED_TIMESTAMP_THRESHOLD)
                }
                (ChunkFormat::TimestampDelta, Some(prev)) => {
                    let ts = cursor.get_uint(3) as u32;
                    (
                        ts,
                        prev.message_length,
                        prev.message_type,
                        prev.stream_id,
                        ts >= EXTENDED_TIMESTAMP_THRESHOLD,
                    )
                }
                (ChunkFormat::Continuation, Some(prev)) => (
                    prev.timestamp_delta,
                    prev.message_length,
                    prev.message_type,
                    prev.stream_id,
                    prev.has_extended_timestamp,
                ),
                (_, None) => return Err(ProtocolError::MissingFullHeader { csid }.into()),
            };

        let timestamp_field = if extended {
            if buf.len() < header_len + 4 {
                return Ok(None);
            }
            let mut ext = &buf[header_len..header_len + 4];
            header_len += 4;
            ext.get_u32()
        } else {
            timestamp_field
        };

        Ok(Some(ParsedHeader {
            format,
            csid,
            header_len,
            timestamp_field,
            message_length,
            message_type,
            stream_id,
            extended,
        }))
    }

    /// Abort a message on a chunk stream (when receiving Abort message)
    pub fn abort(&mut self, csid: u32) {
        if let Some(stream) = self.streams.get_mut(&csid) {
            stream.partial_message.clear();
            stream.assembling = false;
        }
    }
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse basic header and return (fmt, csid, header_length)
fn parse_basic_header(buf: &[u8]) -> Option<(u8, u32, usize)> {
    let first = *buf.first()?;
    let fmt = (first >> 6) & 0x03;

    match first & 0x3F {
        0 => {
            let second = *buf.get(1)?;
            Some((fmt, 64 + second as u32, 2))
        }
        1 => {
            if buf.len() < 3 {
                return None;
            }
            Some((fmt, 64 + buf[1] as u32 + (buf[2] as u32) * 256, 3))
        }
        csid => Some((fmt, csid as u32, 1)),
    }
}

/// Chunk stream encoder
///
/// Encodes messages into chunks using the header format the caller asks for.
pub struct ChunkEncoder {
    chunk_size: u32,
    streams: HashMap<u32, ChunkStreamState>,
}

impl ChunkEncoder {
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            streams: HashMap::new(),
        }
    }

    /// Set the chunk size (call before encoding to use larger chunks)
    pub fn set_chunk_size(&mut self, size: u32) {
        self.chunk_size = size.clamp(1, MAX_CHUNK_SIZE);
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Encode a message into chunks, returning the number of bytes written
    ///
    /// Compressed formats require a previous full header on the same chunk
    /// stream and must agree with the fields they omit. Nothing is written
    /// when an error is returned.
    pub fn encode(
        &mut self,
        chunk: &RtmpChunk,
        format: ChunkFormat,
        buf: &mut BytesMut,
    ) -> Result<usize> {
        let csid = chunk.csid;
        if !(MIN_CSID..=MAX_CSID).contains(&csid) {
            return Err(ProtocolError::InvalidChunkHeader.into());
        }
        let payload_len = u32::try_from(chunk.payload.len()).unwrap_or(u32::MAX);
        if payload_len > MAX_HEADER_MESSAGE_LENGTH {
            return Err(ProtocolError::MessageTooLarge {
                size: payload_len,
                max: MAX_HEADER_MESSAGE_LENGTH,
            }
            .into());
        }

        let previous = self.streams.get(&csid);
        if format != ChunkFormat::Full {
            let prev = previous.ok_or(ProtocolError::MissingFullHeader { csid })?;
            let mismatch = match format {
                ChunkFormat::Full => false,
                ChunkFormat::Delta => prev.stream_id != chunk.stream_id,
                ChunkFormat::TimestampDelta => {
                    prev.stream_id != chunk.stream_id
                        || prev.message_type != chunk.message_type
                        || prev.message_length != payload_len
                }
                ChunkFormat::Continuation => {
                    prev.stream_id != chunk.stream_id
                        || prev.message_type != chunk.message_type
                        || prev.message_length != payload_len
                        || prev.timestamp_delta != chunk.timestamp
                }
            };
            if mismatch {
                return Err(ProtocolError::HeaderMismatch { csid }.into());
            }
        }

        let extended = match (format, previous) {
            (ChunkFormat::Continuation, Some(prev)) => prev.has_extended_timestamp,
            _ => chunk.timestamp >= EXTENDED_TIMESTAMP_THRESHOLD,
        };
        let timestamp_field = chunk.timestamp.min(EXTENDED_TIMESTAMP_THRESHOLD);

        let absolute = match (format, previous) {
            (ChunkFormat::Full, _) | (_, None) => chunk.timestamp,
            (_, Some(prev)) => prev.timestamp.wrapping_add(chunk.timestamp),
        };
        self.streams.insert(
            csid,
            ChunkStreamState {
                timestamp: absolute,
                timestamp_delta: chunk.timestamp,
                message_length: payload_len,
                message_type: chunk.message_type,
                stream_id: chunk.stream_id,
                has_extended_timestamp: extended,
            },
        );

        let start = buf.len();
        let chunk_size = self.chunk_size as usize;
        let mut offset = 0;
        let mut first_chunk = true;

        // A zero-length message still gets one header
        while first_chunk || offset < chunk.payload.len() {
            let chunk_data_len = (chunk.payload.len() - offset).min(chunk_size);

            if first_chunk {
                write_basic_header(csid, format as u8, buf);
                match format {
                    ChunkFormat::Full => {
                        write_u24(timestamp_field, buf);
                        write_u24(payload_len, buf);
                        buf.put_u8(chunk.message_type);
                        buf.put_u32_le(chunk.stream_id);
                    }
                    ChunkFormat::Delta => {
                        write_u24(timestamp_field, buf);
                        write_u24(payload_len, buf);
                        buf.put_u8(chunk.message_type);
                    }
                    ChunkFormat::TimestampDelta => write_u24(timestamp_field, buf),
                    ChunkFormat::Continuation => {}
                }
            } else {
                write_basic_header(csid, ChunkFormat::Continuation as u8, buf);
            }

            if extended {
                buf.put_u32(chunk.timestamp);
            }

            buf.put_slice(&chunk.payload[offset..offset + chunk_data_len]);
            offset += chunk_data_len;
            first_chunk = false;
        }

        Ok(buf.len() - start)
    }

    /// Whether a full header has been written on this chunk stream
    pub fn has_header(&self, csid: u32) -> bool {
        self.streams.contains_key(&csid)
    }
}

impl Default for ChunkEncoder {
    fn default() -> Self {
        Self::new()
    }
}

fn write_basic_header(csid: u32, fmt: u8, buf: &mut BytesMut) {
    if csid >= 64 + 256 {
        buf.put_u8((fmt << 6) | 1);
        let csid_offset = csid - 64;
        buf.put_u8((csid_offset & 0xFF) as u8);
        buf.put_u8(((csid_offset >> 8) & 0xFF) as u8);
    } else if csid >= 64 {
        buf.put_u8(fmt << 6);
        buf.put_u8((csid - 64) as u8);
    } else {
        buf.put_u8((fmt << 6) | (csid as u8));
    }
}

/// Write 24-bit big-endian value
fn write_u24(value: u32, buf: &mut BytesMut) {
    buf.put_u8(((value >> 16) & 0xFF) as u8);
    buf.put_u8(((value >> 8) & 0xFF) as u8);
    buf.put_u8((value & 0xFF) as u8);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn chunk(csid: u32, timestamp: u32, message_type: u8, stream_id: u32, payload: &[u8]) -> RtmpChunk {
        RtmpChunk {
            csid,
            timestamp,
            message_type,
            stream_id,
            payload: Bytes::copy_from_slice(payload),
        }
    }

    #[test]
    fn test_basic_header_parsing() {
        assert_eq!(parse_basic_header(&[0x03]), Some((0, 3, 1)));
        assert_eq!(parse_basic_header(&[0xC4]), Some((3, 4, 1)));
        assert_eq!(parse_basic_header(&[0x00, 0x00]), Some((0, 64, 2)));
        assert_eq!(parse_basic_header(&[0x01, 0x00, 0x01]), Some((0, 320, 3)));
        assert_eq!(parse_basic_header(&[0x00]), None);
        assert_eq!(parse_basic_header(&[]), None);
    }

    #[test]
    fn test_basic_header_roundtrip_wide_csid() {
        for csid in [2u32, 63, 64, 319, 320, 65599] {
            let mut buf = BytesMut::new();
            write_basic_header(csid, 1, &mut buf);
            assert_eq!(parse_basic_header(&buf), Some((1, csid, buf.len())));
        }
    }

    #[test]
    fn test_full_header_layout() {
        let mut encoder = ChunkEncoder::new();
        let mut buf = BytesMut::new();
        let msg = chunk(CSID_COMMAND, 0x010203, MSG_COMMAND_AMF0, 1, b"xy");

        let written = encoder.encode(&msg, ChunkFormat::Full, &mut buf).unwrap();
        assert_eq!(written, 1 + 11 + 2);
        assert_eq!(
            &buf[..],
            &[0x03, 0x01, 0x02, 0x03, 0x00, 0x00, 0x02, 20, 0x01, 0x00, 0x00, 0x00, b'x', b'y']
        );
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let original = chunk(CSID_COMMAND, 1000, MSG_COMMAND_AMF0, 0, b"test payload data");

        let mut encoder = ChunkEncoder::new();
        let mut decoder = ChunkDecoder::new();
        let mut encoded = BytesMut::new();
        encoder.encode(&original, ChunkFormat::Full, &mut encoded).unwrap();

        let decoded = decoder.decode(&mut encoded).unwrap().unwrap();
        assert_eq!(decoded, original);
        assert!(encoded.is_empty());
    }

    #[test]
    fn test_compressed_header_without_full_is_rejected() {
        let mut encoder = ChunkEncoder::new();
        let mut buf = BytesMut::new();
        let msg = chunk(CSID_AUDIO, 20, MSG_AUDIO, 1, b"aac");

        for format in [ChunkFormat::Delta, ChunkFormat::TimestampDelta, ChunkFormat::Continuation] {
            let err = encoder.encode(&msg, format, &mut buf).unwrap_err();
            assert!(matches!(
                err,
                Error::Protocol(ProtocolError::MissingFullHeader { csid: CSID_AUDIO })
            ));
        }
        assert!(buf.is_empty());
        assert!(!encoder.has_header(CSID_AUDIO));
    }

    #[test]
    fn test_delta_header_with_other_stream_id_is_rejected() {
        let mut encoder = ChunkEncoder::new();
        let mut buf = BytesMut::new();
        encoder
            .encode(&chunk(CSID_AUDIO, 0, MSG_AUDIO, 1, b"a"), ChunkFormat::Full, &mut buf)
            .unwrap();

        let err = encoder
            .encode(&chunk(CSID_AUDIO, 20, MSG_AUDIO, 2, b"b"), ChunkFormat::Delta, &mut buf)
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::HeaderMismatch { .. })));

        let err = encoder
            .encode(
                &chunk(CSID_AUDIO, 20, MSG_AUDIO, 1, b"longer"),
                ChunkFormat::TimestampDelta,
                &mut buf,
            )
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::HeaderMismatch { .. })));
    }

    #[test]
    fn test_delta_headers_accumulate_timestamps() {
        let mut encoder = ChunkEncoder::new();
        let mut decoder = ChunkDecoder::new();
        let mut buf = BytesMut::new();

        encoder
            .encode(&chunk(CSID_AUDIO, 1250, MSG_AUDIO, 1, b"one"), ChunkFormat::Full, &mut buf)
            .unwrap();
        let delta = encoder
            .encode(&chunk(CSID_AUDIO, 1250, MSG_AUDIO, 1, b"two!"), ChunkFormat::Delta, &mut buf)
            .unwrap();
        assert_eq!(delta, 1 + 7 + 4);
        encoder
            .encode(
                &chunk(CSID_AUDIO, 1000, MSG_AUDIO, 1, b"six!"),
                ChunkFormat::TimestampDelta,
                &mut buf,
            )
            .unwrap();
        encoder
            .encode(
                &chunk(CSID_AUDIO, 1000, MSG_AUDIO, 1, b"sev!"),
                ChunkFormat::Continuation,
                &mut buf,
            )
            .unwrap();

        let timestamps: Vec<u32> = std::iter::from_fn(|| decoder.decode(&mut buf).unwrap())
            .map(|c| c.timestamp)
            .collect();
        assert_eq!(timestamps, vec![1250, 2500, 3500, 4500]);
    }

    #[test]
    fn test_large_message_chunking() {
        let payload: Vec<u8> = (0..500u32).map(|i| i as u8).collect();
        let original = chunk(CSID_VIDEO, 0, MSG_VIDEO, 1, &payload);

        let mut encoder = ChunkEncoder::new();
        let mut decoder = ChunkDecoder::new();
        let mut encoded = BytesMut::new();
        let written = encoder.encode(&original, ChunkFormat::Full, &mut encoded).unwrap();

        // 12-byte first header, then three 1-byte continuation headers
        assert_eq!(written, 500 + 12 + 3);
        assert_eq!(encoded[12 + 128], 0xC6);

        let decoded = decoder.decode(&mut encoded).unwrap().unwrap();
        assert_eq!(decoded.payload, original.payload);
    }

    #[test]
    fn test_decode_byte_by_byte() {
        let mut encoder = ChunkEncoder::new();
        encoder.set_chunk_size(64);
        let mut wire = BytesMut::new();
        let first = chunk(CSID_VIDEO, 40, MSG_VIDEO, 1, &[7u8; 200]);
        let second = chunk(CSID_AUDIO, 45, MSG_AUDIO, 1, &[9u8; 10]);
        encoder.encode(&first, ChunkFormat::Full, &mut wire).unwrap();
        encoder.encode(&second, ChunkFormat::Full, &mut wire).unwrap();

        let mut decoder = ChunkDecoder::new();
        decoder.set_chunk_size(64);
        let mut buf = BytesMut::new();
        let mut out = Vec::new();
        for byte in wire.iter() {
            buf.put_u8(*byte);
            while let Some(msg) = decoder.decode(&mut buf).unwrap() {
                out.push(msg);
            }
        }
        assert_eq!(out, vec![first, second]);
    }

    #[test]
    fn test_decode_continues_past_partial_chunks() {
        // Two full chunks of one message in a single buffer must yield the message
        let mut encoder = ChunkEncoder::new();
        let mut buf = BytesMut::new();
        let msg = chunk(CSID_VIDEO, 0, MSG_VIDEO, 1, &[1u8; 300]);
        encoder.encode(&msg, ChunkFormat::Full, &mut buf).unwrap();

        let mut decoder = ChunkDecoder::new();
        assert_eq!(decoder.decode(&mut buf).unwrap(), Some(msg));
        assert_eq!(decoder.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_interleaved_chunk_streams() {
        let mut encoder = ChunkEncoder::new();
        let mut video_wire = BytesMut::new();
        let mut audio_wire = BytesMut::new();
        let video = chunk(CSID_VIDEO, 0, MSG_VIDEO, 1, &[5u8; 200]);
        let audio = chunk(CSID_AUDIO, 0, MSG_AUDIO, 1, &[6u8; 20]);
        encoder.encode(&video, ChunkFormat::Full, &mut video_wire).unwrap();
        encoder.encode(&audio, ChunkFormat::Full, &mut audio_wire).unwrap();

        // video chunk 1, audio message, video chunk 2
        let split = 12 + 128;
        let mut buf = BytesMut::new();
        buf.put_slice(&video_wire[..split]);
        buf.put_slice(&audio_wire);
        buf.put_slice(&video_wire[split..]);

        let mut decoder = ChunkDecoder::new();
        assert_eq!(decoder.decode(&mut buf).unwrap(), Some(audio));
        assert_eq!(decoder.decode(&mut buf).unwrap(), Some(video));
    }

    #[test]
    fn test_extended_timestamp_on_every_chunk() {
        let mut encoder = ChunkEncoder::new();
        let mut buf = BytesMut::new();
        let ts = 0x0100_0000;
        let msg = chunk(CSID_VIDEO, ts, MSG_VIDEO, 1, &[3u8; 200]);
        let written = encoder.encode(&msg, ChunkFormat::Full, &mut buf).unwrap();

        // 12 + 4 for the first chunk, 1 + 4 for the continuation
        assert_eq!(written, 200 + 16 + 5);
        assert_eq!(&buf[1..4], &[0xFF, 0xFF, 0xFF]);
        assert_eq!(&buf[12..16], &ts.to_be_bytes());
        assert_eq!(&buf[16 + 128 + 1..16 + 128 + 5], &ts.to_be_bytes());

        let mut decoder = ChunkDecoder::new();
        let decoded = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.timestamp, ts);
        assert_eq!(decoded.payload.len(), 200);
    }

    #[test]
    fn test_zero_length_message() {
        let mut encoder = ChunkEncoder::new();
        let mut buf = BytesMut::new();
        let msg = chunk(CSID_DATA, 0, MSG_DATA_AMF0, 1, b"");
        assert_eq!(encoder.encode(&msg, ChunkFormat::Full, &mut buf).unwrap(), 12);

        let mut decoder = ChunkDecoder::new();
        let decoded = decoder.decode(&mut buf).unwrap().unwrap();
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_encode_rejects_length_beyond_header_field() {
        let mut encoder = ChunkEncoder::new();
        let mut buf = BytesMut::new();
        let payload = vec![0u8; MAX_HEADER_MESSAGE_LENGTH as usize + 1];
        let msg = chunk(CSID_VIDEO, 0, MSG_VIDEO, 1, &payload);

        let err = encoder.encode(&msg, ChunkFormat::Full, &mut buf).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::MessageTooLarge { size: 0x1000000, max: 0xFFFFFF })
        ));
        assert!(buf.is_empty());
        assert!(!encoder.has_header(CSID_VIDEO));
    }

    #[test]
    fn test_encode_rejects_reserved_csid() {
        let mut encoder = ChunkEncoder::new();
        let mut buf = BytesMut::new();
        for csid in [0, 1, MAX_CSID + 1] {
            let msg = chunk(csid, 0, MSG_AUDIO, 1, b"x");
            let err = encoder.encode(&msg, ChunkFormat::Full, &mut buf).unwrap_err();
            assert!(matches!(err, Error::Protocol(ProtocolError::InvalidChunkHeader)));
        }
        assert!(buf.is_empty());

        let msg = chunk(MAX_CSID, 0, MSG_AUDIO, 1, b"x");
        encoder.encode(&msg, ChunkFormat::Full, &mut buf).unwrap();
        let decoded = ChunkDecoder::new().decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.csid, MAX_CSID);
    }

    #[test]
    fn test_inbound_compressed_header_without_state_is_error() {
        let mut decoder = ChunkDecoder::new();
        let mut buf = BytesMut::from(&[0x44u8, 0, 0, 10, 0, 0, 1, 8, 0xAF][..]);
        let err = decoder.decode(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::MissingFullHeader { csid: 4 })
        ));
    }

    #[test]
    fn test_message_too_large() {
        let mut small = ChunkDecoder {
            max_message_size: 1024,
            ..ChunkDecoder::new()
        };
        let mut buf = BytesMut::from(&[0x03u8, 0, 0, 0, 0xFF, 0xFF, 0xFF, 20, 0, 0, 0, 0][..]);
        assert!(matches!(
            small.decode(&mut buf),
            Err(Error::Protocol(ProtocolError::MessageTooLarge { .. }))
        ));

        // Within the limit the header alone just waits for data
        let mut decoder = ChunkDecoder::new();
        let mut buf = BytesMut::from(&[0x03u8, 0, 0, 0, 0x00, 0x10, 0x00, 20, 0, 0, 0, 0][..]);
        assert_eq!(decoder.decode(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), 12);
    }

    #[test]
    fn test_abort_discards_partial_message() {
        let mut encoder = ChunkEncoder::new();
        let mut wire = BytesMut::new();
        encoder
            .encode(&chunk(CSID_VIDEO, 0, MSG_VIDEO, 1, &[1u8; 200]), ChunkFormat::Full, &mut wire)
            .unwrap();

        let mut decoder = ChunkDecoder::new();
        let mut first = wire.split_to(12 + 128);
        assert_eq!(decoder.decode(&mut first).unwrap(), None);
        decoder.abort(CSID_VIDEO);

        let next = chunk(CSID_VIDEO, 0, MSG_VIDEO, 1, b"fresh");
        let mut buf = BytesMut::new();
        encoder.encode(&next, ChunkFormat::Full, &mut buf).unwrap();
        assert_eq!(decoder.decode(&mut buf).unwrap(), Some(next));
    }
}
