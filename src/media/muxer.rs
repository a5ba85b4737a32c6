//! Encoded samples to timestamped RTMP messages
//!
//! Each track keeps a running accumulator `acc` in seconds. A sample at
//! absolute time `t` goes out with `round((t - acc) * 1000)` milliseconds
//! and then `acc = t + (acc - floor(acc))`.
//!
//! The first message of a track in a publish cycle uses a full chunk header
//! (absolute timestamp), every later one a delta header. Each track also
//! keeps its clock, the sum of the wire values sent so far, for when a delta
//! has to be re-sent with a full header.

use bytes::Bytes;

use crate::amf::AmfObject;
use crate::media::pipeline::MediaCapabilities;
use crate::protocol::chunk::ChunkFormat;
use crate::protocol::message::{MediaMessage, RtmpMessage};

/// Per-track timestamp recurrence
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimestampAccumulator {
    acc: f64,
}

impl TimestampAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current accumulator value in seconds
    pub fn value(&self) -> f64 {
        self.acc
    }

    /// Wire timestamp in milliseconds for a sample at `t` seconds, then advance
    ///
    /// Negative deltas (samples older than the accumulator) go out as 0.
    pub fn advance(&mut self, t: f64) -> u32 {
        let wire = t - self.acc;
        let millis = (wire * 1000.0).round();
        self.acc = t + (self.acc - self.acc.floor());
        if millis <= 0.0 {
            0
        } else {
            millis as u32
        }
    }

    pub fn reset(&mut self) {
        self.acc = 0.0;
    }
}

#[derive(Debug, Default)]
struct Track {
    timestamp: TimestampAccumulator,
    /// Absolute milliseconds of the last message as the peer sees it
    clock: u32,
    was_sent: bool,
}

impl Track {
    fn mux(&mut self, stream_id: u32, payload: Bytes, t: f64) -> (MediaMessage, ChunkFormat) {
        let format = if self.was_sent {
            ChunkFormat::Delta
        } else {
            ChunkFormat::Full
        };
        let timestamp = self.timestamp.advance(t);
        self.clock = if self.was_sent {
            self.clock.wrapping_add(timestamp)
        } else {
            timestamp
        };
        self.was_sent = true;
        (
            MediaMessage {
                stream_id,
                timestamp,
                payload,
            },
            format,
        )
    }
}

/// Audio/video muxer for one stream
#[derive(Debug, Default)]
pub struct Muxer {
    audio: Track,
    video: Track,
}

impl Muxer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new publish cycle: full headers again, accumulators at zero
    pub fn reset(&mut self) {
        self.audio = Track::default();
        self.video = Track::default();
    }

    pub fn mux_audio(&mut self, stream_id: u32, payload: Bytes, t: f64) -> (RtmpMessage, ChunkFormat) {
        let (message, format) = self.audio.mux(stream_id, payload, t);
        (RtmpMessage::Audio(message), format)
    }

    pub fn mux_video(&mut self, stream_id: u32, payload: Bytes, t: f64) -> (RtmpMessage, ChunkFormat) {
        let (message, format) = self.video.mux(stream_id, payload, t);
        if format == ChunkFormat::Full {
            tracing::debug!(stream_id, "First video frame in publish cycle");
        }
        (RtmpMessage::Video(message), format)
    }

    pub fn audio_was_sent(&self) -> bool {
        self.audio.was_sent
    }

    pub fn video_was_sent(&self) -> bool {
        self.video.was_sent
    }

    /// Absolute time in ms of the last audio message
    pub fn audio_clock(&self) -> u32 {
        self.audio.clock
    }

    /// Absolute time in ms of the last video message
    pub fn video_clock(&self) -> u32 {
        self.video.clock
    }

    pub fn audio_timestamp(&self) -> f64 {
        self.audio.timestamp.value()
    }

    pub fn video_timestamp(&self) -> f64 {
        self.video.timestamp.value()
    }
}

/// `onMetaData` object for the active tracks
///
/// Data rates are reported in kbps.
pub fn metadata(caps: &MediaCapabilities) -> AmfObject {
    let mut meta = AmfObject::new();
    if let Some(video) = &caps.video {
        meta.insert("width", video.width);
        meta.insert("height", video.height);
        meta.insert("framerate", video.framerate);
        meta.insert("videocodecid", video.codec_id as u32);
        meta.insert("videodatarate", video.bitrate / 1000);
    }
    if let Some(audio) = &caps.audio {
        meta.insert("audiocodecid", audio.codec_id as u32);
        meta.insert("audiodatarate", audio.bitrate / 1000);
    }
    meta
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amf::AmfValue;
    use crate::media::pipeline::{AudioCapabilities, VideoCapabilities};

    #[test]
    fn test_fractional_carry_sequence() {
        let mut ts = TimestampAccumulator::new();

        assert_eq!(ts.advance(1.25), 1250);
        assert_eq!(ts.value(), 1.25);

        assert_eq!(ts.advance(2.5), 1250);
        assert_eq!(ts.value(), 2.75);

        assert_eq!(ts.advance(3.75), 1000);
        assert_eq!(ts.value(), 4.5);
    }

    #[test]
    fn test_replay_is_deterministic() {
        let samples = [0.0, 0.023, 0.046, 0.069, 1.001, 1.5, 2.25];

        let run = || {
            let mut ts = TimestampAccumulator::new();
            samples.iter().map(|t| ts.advance(*t)).collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_negative_delta_clamps_to_zero() {
        let mut ts = TimestampAccumulator::new();
        ts.advance(5.5);
        // acc is now 5.5; an older sample cannot go back in time on the wire
        assert_eq!(ts.advance(5.0), 0);
        assert_eq!(ts.value(), 5.5);
    }

    #[test]
    fn test_first_sample_full_then_delta() {
        let mut muxer = Muxer::new();
        let payload = Bytes::from_static(&[0xAF, 0x01]);

        let (msg, format) = muxer.mux_audio(1, payload.clone(), 1.25);
        assert_eq!(format, ChunkFormat::Full);
        assert_eq!(msg.timestamp(), 1250);
        assert_eq!(msg.stream_id(), 1);
        assert!(muxer.audio_was_sent());
        assert!(!muxer.video_was_sent());

        let (msg, format) = muxer.mux_audio(1, payload.clone(), 2.5);
        assert_eq!(format, ChunkFormat::Delta);
        assert_eq!(msg.timestamp(), 1250);

        // Video has its own header state and accumulator
        let (msg, format) = muxer.mux_video(1, Bytes::from_static(&[0x17]), 2.5);
        assert_eq!(format, ChunkFormat::Full);
        assert_eq!(msg.timestamp(), 2500);
        assert!(matches!(msg, RtmpMessage::Video(_)));
    }

    #[test]
    fn test_clock_sums_wire_values() {
        let mut muxer = Muxer::new();
        for t in [1.25, 2.5, 3.75] {
            muxer.mux_audio(1, Bytes::new(), t);
        }
        // 1250 + 1250 + 1000
        assert_eq!(muxer.audio_clock(), 3500);
        assert_eq!(muxer.video_clock(), 0);

        muxer.reset();
        muxer.mux_audio(1, Bytes::new(), 0.5);
        assert_eq!(muxer.audio_clock(), 500);
    }

    #[test]
    fn test_reset_starts_new_cycle() {
        let mut muxer = Muxer::new();
        muxer.mux_audio(1, Bytes::new(), 1.25);
        muxer.mux_video(1, Bytes::new(), 1.25);

        muxer.reset();
        assert!(!muxer.audio_was_sent());
        assert!(!muxer.video_was_sent());
        assert_eq!(muxer.audio_timestamp(), 0.0);
        assert_eq!(muxer.video_timestamp(), 0.0);

        let (_, format) = muxer.mux_audio(1, Bytes::new(), 3.0);
        assert_eq!(format, ChunkFormat::Full);
    }

    #[test]
    fn test_metadata_order_and_units() {
        let caps = MediaCapabilities {
            video: Some(VideoCapabilities {
                width: 1920,
                height: 1080,
                framerate: 30.0,
                codec_id: 7,
                bitrate: 2_500_000,
            }),
            audio: Some(AudioCapabilities {
                codec_id: 10,
                bitrate: 128_000,
            }),
        };

        let meta = metadata(&caps);
        let keys: Vec<&str> = meta.keys().collect();
        assert_eq!(
            keys,
            vec![
                "width",
                "height",
                "framerate",
                "videocodecid",
                "videodatarate",
                "audiocodecid",
                "audiodatarate"
            ]
        );
        assert_eq!(meta.get("videodatarate"), Some(&AmfValue::Number(2500.0)));
        assert_eq!(meta.get("audiodatarate"), Some(&AmfValue::Number(128.0)));
        assert_eq!(meta.get("videocodecid"), Some(&AmfValue::Number(7.0)));
    }

    #[test]
    fn test_metadata_audio_only() {
        let caps = MediaCapabilities {
            video: None,
            audio: Some(AudioCapabilities::default()),
        };
        let meta = metadata(&caps);
        assert!(!meta.contains_key("width"));
        assert_eq!(meta.get("audiocodecid"), Some(&AmfValue::Number(10.0)));

        assert!(metadata(&MediaCapabilities::default()).is_empty());
    }
}
