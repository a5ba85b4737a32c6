//! Stream ready states
//!
//! A stream moves through ranked states. Ordering matters: `close()` only acts
//! above `Open`, and entry/exit actions fire only on real changes.

/// NetStream lifecycle state, ordered by rank
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ReadyState {
    /// Created, no stream id yet; play/publish are queued
    Initialized = 0,
    /// Stream id assigned, idle
    Open = 1,
    /// `play` sent, waiting for NetStream.Play.Start
    Play = 2,
    Playing = 3,
    /// `publish` sent, waiting for NetStream.Publish.Start
    Publish = 4,
    Publishing = 5,
}

impl ReadyState {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Inverse of [`as_u8`](Self::as_u8); out-of-range values map to `Initialized`
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => ReadyState::Open,
            2 => ReadyState::Play,
            3 => ReadyState::Playing,
            4 => ReadyState::Publish,
            5 => ReadyState::Publishing,
            _ => ReadyState::Initialized,
        }
    }

    pub fn is_playing_family(self) -> bool {
        matches!(self, ReadyState::Play | ReadyState::Playing)
    }

    pub fn is_publishing_family(self) -> bool {
        matches!(self, ReadyState::Publish | ReadyState::Publishing)
    }
}

impl Default for ReadyState {
    fn default() -> Self {
        ReadyState::Initialized
    }
}

/// Publish type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HowToPublish {
    Record,
    Append,
    AppendWithGap,
    #[default]
    Live,
    /// Live on the wire, recorded locally by the pipeline
    LocalRecord,
}

impl HowToPublish {
    /// Value sent as the publish type argument
    pub fn as_str(&self) -> &'static str {
        match self {
            HowToPublish::Record => "record",
            HowToPublish::Append => "append",
            HowToPublish::AppendWithGap => "appendWithGap",
            HowToPublish::Live | HowToPublish::LocalRecord => "live",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_order() {
        assert!(ReadyState::Initialized < ReadyState::Open);
        assert!(ReadyState::Open < ReadyState::Play);
        assert!(ReadyState::Play < ReadyState::Playing);
        assert!(ReadyState::Playing < ReadyState::Publish);
        assert!(ReadyState::Publish < ReadyState::Publishing);
    }

    #[test]
    fn test_u8_roundtrip() {
        for state in [
            ReadyState::Initialized,
            ReadyState::Open,
            ReadyState::Play,
            ReadyState::Playing,
            ReadyState::Publish,
            ReadyState::Publishing,
        ] {
            assert_eq!(ReadyState::from_u8(state.as_u8()), state);
        }
        assert_eq!(ReadyState::from_u8(42), ReadyState::Initialized);
    }

    #[test]
    fn test_families() {
        assert!(ReadyState::Play.is_playing_family());
        assert!(ReadyState::Playing.is_playing_family());
        assert!(!ReadyState::Publish.is_playing_family());
        assert!(ReadyState::Publishing.is_publishing_family());
        assert!(!ReadyState::Open.is_publishing_family());
    }

    #[test]
    fn test_publish_type_strings() {
        assert_eq!(HowToPublish::default(), HowToPublish::Live);
        assert_eq!(HowToPublish::Record.as_str(), "record");
        assert_eq!(HowToPublish::AppendWithGap.as_str(), "appendWithGap");
        assert_eq!(HowToPublish::LocalRecord.as_str(), "live");
    }
}
