//! Capture, encoding, decoding and recording collaborators
//!
//! The client never touches raw media. A [`MediaPipeline`] is told when to
//! start and stop its work as the stream moves through its states; encoded
//! samples come back through `StreamHandle::append_audio` / `append_video`.

/// FLV video codec id for AVC/H.264
pub const VIDEO_CODEC_AVC: u8 = 7;

/// FLV audio codec id for AAC
pub const AUDIO_CODEC_AAC: u8 = 10;

/// Active video encoder settings
#[derive(Debug, Clone, PartialEq)]
pub struct VideoCapabilities {
    pub width: u32,
    pub height: u32,
    pub framerate: f64,
    pub codec_id: u8,
    /// Bits per second
    pub bitrate: u32,
}

impl Default for VideoCapabilities {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            framerate: 30.0,
            codec_id: VIDEO_CODEC_AVC,
            bitrate: 2_500_000,
        }
    }
}

/// Active audio encoder settings
#[derive(Debug, Clone, PartialEq)]
pub struct AudioCapabilities {
    pub codec_id: u8,
    /// Bits per second
    pub bitrate: u32,
}

impl Default for AudioCapabilities {
    fn default() -> Self {
        Self {
            codec_id: AUDIO_CODEC_AAC,
            bitrate: 128_000,
        }
    }
}

/// What the pipeline is producing; `None` for a track with no input attached
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaCapabilities {
    pub video: Option<VideoCapabilities>,
    pub audio: Option<AudioCapabilities>,
}

/// External media collaborator driven by the stream state machine
///
/// Every method defaults to a no-op, so a play-only client can pass
/// [`NoopPipeline`] and a publisher only implements what it needs.
pub trait MediaPipeline: Send + 'static {
    /// Entering Publish: start capturing sources
    fn start_capture(&mut self) {}

    /// Entering Publishing: start the audio and video encoders
    fn start_encoding(&mut self) {}

    /// Leaving Publishing
    fn stop_encoding(&mut self) {}

    /// Pause/resume while publishing
    fn set_muted(&mut self, _muted: bool) {}

    /// Encoder settings reported in the stream metadata
    fn capabilities(&self) -> MediaCapabilities {
        MediaCapabilities::default()
    }

    /// Entering Playing
    fn start_decoding(&mut self) {}

    /// Leaving Playing
    fn stop_decoding(&mut self) {}

    fn start_recording(&mut self, _file_name: &str) {}

    fn stop_recording(&mut self) {}
}

/// Pipeline that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPipeline;

impl MediaPipeline for NoopPipeline {}

/// Local recording file name for a resource name
///
/// Drops any query string and flattens path separators.
pub fn recording_file_name(resource_name: Option<&str>) -> String {
    let name = resource_name
        .and_then(|name| name.split('?').next())
        .unwrap_or_default();
    if name.is_empty() {
        return "recording".to_string();
    }
    name.replace(['/', '\\'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_file_name() {
        assert_eq!(recording_file_name(Some("live")), "live");
        assert_eq!(recording_file_name(Some("live?key=abc")), "live");
        assert_eq!(recording_file_name(Some("app/inst/live")), "app_inst_live");
        assert_eq!(recording_file_name(Some("")), "recording");
        assert_eq!(recording_file_name(None), "recording");
    }

    #[test]
    fn test_noop_pipeline_defaults() {
        let mut pipeline = NoopPipeline;
        pipeline.start_capture();
        pipeline.set_muted(true);
        assert_eq!(pipeline.capabilities(), MediaCapabilities::default());
    }

    #[test]
    fn test_default_codecs() {
        assert_eq!(VideoCapabilities::default().codec_id, VIDEO_CODEC_AVC);
        assert_eq!(AudioCapabilities::default().codec_id, AUDIO_CODEC_AAC);
    }
}
