//! NetConnection / NetStream status events
//!
//! `onStatus`, `_result` and `_error` carry an info object with `code`,
//! `level` and `description`. It is decoded once into [`Status`] so the rest
//! of the client matches on [`StatusCode`] instead of strings.

use std::fmt;

use crate::amf::{AmfObject, AmfValue};
use crate::error::{ProtocolError, Result};

/// Severity reported alongside a status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Status,
    Warning,
    Error,
}

impl StatusLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusLevel::Status => "status",
            StatusLevel::Warning => "warning",
            StatusLevel::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "status" => Some(StatusLevel::Status),
            "warning" => Some(StatusLevel::Warning),
            "error" => Some(StatusLevel::Error),
            _ => None,
        }
    }
}

macro_rules! status_codes {
    ($($variant:ident => ($code:literal, $level:ident),)*) => {
        /// Known status codes; anything else is kept verbatim in `Other`
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub enum StatusCode {
            $($variant,)*
            Other(String),
        }

        impl StatusCode {
            pub fn as_str(&self) -> &str {
                match self {
                    $(StatusCode::$variant => $code,)*
                    StatusCode::Other(code) => code,
                }
            }

            pub fn parse(code: &str) -> Self {
                match code {
                    $($code => StatusCode::$variant,)*
                    other => StatusCode::Other(other.to_string()),
                }
            }

            /// Level defined for the code; unknown codes report `Status`
            pub fn level(&self) -> StatusLevel {
                match self {
                    $(StatusCode::$variant => StatusLevel::$level,)*
                    StatusCode::Other(_) => StatusLevel::Status,
                }
            }
        }
    };
}

status_codes! {
    CallBadVersion => ("NetConnection.Call.BadVersion", Error),
    CallFailed => ("NetConnection.Call.Failed", Error),
    CallProhibited => ("NetConnection.Call.Prohibited", Error),
    ConnectAppShutdown => ("NetConnection.Connect.AppShutdown", Error),
    ConnectClosed => ("NetConnection.Connect.Closed", Status),
    ConnectFailed => ("NetConnection.Connect.Failed", Error),
    ConnectIdleTimeOut => ("NetConnection.Connect.IdleTimeOut", Status),
    ConnectInvalidApp => ("NetConnection.Connect.InvalidApp", Error),
    ConnectNetworkChange => ("NetConnection.Connect.NetworkChange", Status),
    ConnectRejected => ("NetConnection.Connect.Rejected", Error),
    ConnectSuccess => ("NetConnection.Connect.Success", Status),

    StreamBufferEmpty => ("NetStream.Buffer.Empty", Status),
    StreamBufferFlush => ("NetStream.Buffer.Flush", Status),
    StreamBufferFull => ("NetStream.Buffer.Full", Status),
    StreamConnectClosed => ("NetStream.Connect.Closed", Status),
    StreamConnectFailed => ("NetStream.Connect.Failed", Error),
    StreamConnectRejected => ("NetStream.Connect.Rejected", Error),
    StreamConnectSuccess => ("NetStream.Connect.Success", Status),
    DrmUpdateNeeded => ("NetStream.DRM.UpdateNeeded", Status),
    StreamFailed => ("NetStream.Failed", Error),
    MulticastStreamReset => ("NetStream.MulticastStream.Reset", Status),
    PauseNotify => ("NetStream.Pause.Notify", Status),
    PlayFailed => ("NetStream.Play.Failed", Error),
    PlayFileStructureInvalid => ("NetStream.Play.FileStructureInvalid", Error),
    PlayInsufficientBW => ("NetStream.Play.InsufficientBW", Warning),
    PlayNoSupportedTrackFound => ("NetStream.Play.NoSupportedTrackFound", Status),
    PlayReset => ("NetStream.Play.Reset", Status),
    PlayStart => ("NetStream.Play.Start", Status),
    PlayStop => ("NetStream.Play.Stop", Status),
    PlayStreamNotFound => ("NetStream.Play.StreamNotFound", Error),
    PlayTransition => ("NetStream.Play.Transition", Status),
    PlayUnpublishNotify => ("NetStream.Play.UnpublishNotify", Status),
    PublishBadName => ("NetStream.Publish.BadName", Error),
    PublishIdle => ("NetStream.Publish.Idle", Status),
    PublishStart => ("NetStream.Publish.Start", Status),
    RecordAlreadyExists => ("NetStream.Record.AlreadyExists", Status),
    RecordFailed => ("NetStream.Record.Failed", Error),
    RecordNoAccess => ("NetStream.Record.NoAccess", Error),
    RecordStart => ("NetStream.Record.Start", Status),
    RecordStop => ("NetStream.Record.Stop", Status),
    RecordDiskQuotaExceeded => ("NetStream.Record.DiskQuotaExceeded", Error),
    SecondScreenStart => ("NetStream.SecondScreen.Start", Status),
    SecondScreenStop => ("NetStream.SecondScreen.Stop", Status),
    SeekFailed => ("NetStream.Seek.Failed", Error),
    SeekInvalidTime => ("NetStream.Seek.InvalidTime", Error),
    SeekNotify => ("NetStream.Seek.Notify", Status),
    StepNotify => ("NetStream.Step.Notify", Status),
    UnpauseNotify => ("NetStream.Unpause.Notify", Status),
    UnpublishSuccess => ("NetStream.Unpublish.Success", Status),
    VideoDimensionChange => ("NetStream.Video.DimensionChange", Status),
}

impl StatusCode {
    /// Connection-level code (`NetConnection.*`)
    pub fn is_connection(&self) -> bool {
        self.as_str().starts_with("NetConnection.")
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded status info object
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    pub code: StatusCode,
    pub level: StatusLevel,
    pub description: String,
}

impl Status {
    /// Status for a known code with the code's own level
    pub fn new(code: StatusCode, description: impl Into<String>) -> Self {
        Self {
            level: code.level(),
            code,
            description: description.into(),
        }
    }

    /// Decode an info object
    ///
    /// `code` is required. A missing or unrecognised `level` falls back to
    /// the level defined for the code.
    pub fn from_amf(info: &AmfValue) -> Result<Self> {
        let code = info
            .get_string("code")
            .map(StatusCode::parse)
            .ok_or_else(|| ProtocolError::MissingField("code".into()))?;
        let level = info
            .get_string("level")
            .and_then(StatusLevel::parse)
            .unwrap_or_else(|| code.level());
        let description = info.get_string("description").unwrap_or_default().to_string();

        Ok(Self {
            code,
            level,
            description,
        })
    }

    /// Info object as sent on the wire
    pub fn to_object(&self) -> AmfObject {
        AmfObject::new()
            .with("level", self.level.as_str())
            .with("code", self.code.as_str())
            .with("description", self.description.as_str())
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code, self.level.as_str())?;
        if !self.description.is_empty() {
            write!(f, ": {}", self.description)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_code_roundtrip() {
        for code in [
            StatusCode::ConnectSuccess,
            StatusCode::ConnectClosed,
            StatusCode::PlayStart,
            StatusCode::PublishStart,
            StatusCode::UnpublishSuccess,
        ] {
            assert_eq!(StatusCode::parse(code.as_str()), code);
        }
    }

    #[test]
    fn test_unknown_code_kept_verbatim() {
        let code = StatusCode::parse("NetStream.Custom.Thing");
        assert_eq!(code, StatusCode::Other("NetStream.Custom.Thing".into()));
        assert_eq!(code.as_str(), "NetStream.Custom.Thing");
        assert_eq!(code.level(), StatusLevel::Status);
    }

    #[test]
    fn test_levels() {
        assert_eq!(StatusCode::ConnectFailed.level(), StatusLevel::Error);
        assert_eq!(StatusCode::ConnectClosed.level(), StatusLevel::Status);
        assert_eq!(StatusCode::PlayInsufficientBW.level(), StatusLevel::Warning);
        assert_eq!(StatusCode::PublishBadName.level(), StatusLevel::Error);
        assert!(StatusCode::ConnectRejected.is_connection());
        assert!(!StatusCode::PlayReset.is_connection());
    }

    #[test]
    fn test_from_amf() {
        let info = AmfValue::Object(
            AmfObject::new()
                .with("level", "status")
                .with("code", "NetStream.Publish.Start")
                .with("description", "live is now published"),
        );
        let status = Status::from_amf(&info).unwrap();
        assert_eq!(status.code, StatusCode::PublishStart);
        assert_eq!(status.level, StatusLevel::Status);
        assert_eq!(status.description, "live is now published");
    }

    #[test]
    fn test_from_amf_level_fallback() {
        let info = AmfValue::Object(AmfObject::new().with("code", "NetConnection.Connect.Rejected"));
        let status = Status::from_amf(&info).unwrap();
        assert_eq!(status.level, StatusLevel::Error);
        assert!(status.description.is_empty());
    }

    #[test]
    fn test_from_amf_requires_code() {
        let info = AmfValue::Object(AmfObject::new().with("level", "error"));
        assert!(matches!(
            Status::from_amf(&info),
            Err(Error::Protocol(ProtocolError::MissingField(field))) if field == "code"
        ));
        assert!(Status::from_amf(&AmfValue::Null).is_err());
    }

    #[test]
    fn test_to_object_roundtrip() {
        let status = Status::new(StatusCode::PlayReset, "Playing and resetting live");
        let decoded = Status::from_amf(&AmfValue::Object(status.to_object())).unwrap();
        assert_eq!(decoded, status);
        assert_eq!(
            status.to_string(),
            "NetStream.Play.Reset (status): Playing and resetting live"
        );
    }
}
