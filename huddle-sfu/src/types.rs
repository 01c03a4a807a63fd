//! Common types used throughout the coordination layer

use serde::{Deserialize, Serialize};
use std::fmt;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;

use crate::error::{Result, SfuError};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Identity of one signaling connection, assigned at connect time
    PeerId
);
string_id!(
    /// Engine-assigned transport identifier
    TransportId
);
string_id!(
    /// Engine-assigned producer identifier
    ProducerId
);
string_id!(
    /// Engine-assigned consumer identifier
    ConsumerId
);
string_id!(
    /// Name of a room; a room exists while at least one peer carries it
    RoomName
);

impl PeerId {
    /// Fresh connection identity
    #[must_use]
    pub fn generate() -> Self {
        Self(nanoid::nanoid!(20))
    }
}

impl TransportId {
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl ProducerId {
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl ConsumerId {
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl RoomName {
    /// Validate a client-supplied room name
    ///
    /// Surrounding whitespace is trimmed; empty names, names longer than
    /// `max_len` characters and names containing control characters are rejected.
    pub fn parse(raw: &str, max_len: usize) -> Result<Self> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(SfuError::InvalidRoomName("room name is empty".to_string()));
        }
        if name.chars().count() > max_len {
            return Err(SfuError::InvalidRoomName(format!(
                "room name longer than {max_len} characters"
            )));
        }
        if name.chars().any(char::is_control) {
            return Err(SfuError::InvalidRoomName(
                "room name contains control characters".to_string(),
            ));
        }
        Ok(Self(name.to_string()))
    }
}

/// Media kind of a producer or consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    /// Kind implied by a mime type such as `video/VP8`
    #[must_use]
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        let (prefix, _) = mime_type.split_once('/')?;
        match prefix.to_lowercase().as_str() {
            "audio" => Some(Self::Audio),
            "video" => Some(Self::Video),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<RTPCodecType> for MediaKind {
    type Error = SfuError;

    fn try_from(codec_type: RTPCodecType) -> Result<Self> {
        match codec_type {
            RTPCodecType::Audio => Ok(Self::Audio),
            RTPCodecType::Video => Ok(Self::Video),
            RTPCodecType::Unspecified => {
                Err(SfuError::Malformed("unspecified media kind".to_string()))
            }
        }
    }
}

impl From<MediaKind> for RTPCodecType {
    fn from(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Audio => Self::Audio,
            MediaKind::Video => Self::Video,
        }
    }
}

/// Direction of a transport, from the peer's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportRole {
    /// Carries the peer's producers
    #[serde(alias = "send")]
    Upload,
    /// Carries consumers of other peers' producers
    #[serde(alias = "recv")]
    Download,
}

impl fmt::Display for TransportRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upload => f.write_str("upload"),
            Self::Download => f.write_str("download"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_name_parse() {
        assert_eq!(RoomName::parse("  r1 ", 64).unwrap().as_str(), "r1");
        assert!(RoomName::parse("   ", 64).is_err());
        assert!(RoomName::parse("abcdef", 5).is_err());
        assert!(RoomName::parse("a\u{7}b", 64).is_err());
    }

    #[test]
    fn test_media_kind_from_mime() {
        assert_eq!(MediaKind::from_mime("audio/opus"), Some(MediaKind::Audio));
        assert_eq!(MediaKind::from_mime("Video/VP8"), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_mime("application/data"), None);
        assert_eq!(MediaKind::from_mime("opus"), None);
    }

    #[test]
    fn test_media_kind_codec_type_mapping() {
        assert_eq!(MediaKind::try_from(RTPCodecType::Video).unwrap(), MediaKind::Video);
        assert!(MediaKind::try_from(RTPCodecType::Unspecified).is_err());
        assert_eq!(RTPCodecType::from(MediaKind::Audio), RTPCodecType::Audio);
    }

    #[test]
    fn test_transport_role_aliases() {
        let role: TransportRole = serde_json::from_str("\"send\"").unwrap();
        assert_eq!(role, TransportRole::Upload);
        let role: TransportRole = serde_json::from_str("\"download\"").unwrap();
        assert_eq!(role, TransportRole::Download);
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let id = PeerId::from("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
        assert_ne!(TransportId::generate(), TransportId::generate());
    }
}
