//! Room data as seen by retention resolution.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Room kind, carried on the wire as the single-letter discriminator `t`.
///
/// Discriminators other than `c`, `p` and `d` are kept as [`RoomType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RoomType {
    /// Public channel (`c`).
    Channel,
    /// Private group (`p`).
    PrivateGroup,
    /// Direct message (`d`).
    DirectMessage,
    /// Anything else, e.g. omnichannel rooms.
    Other(String),
}

impl RoomType {
    /// Parse a discriminator. Never fails.
    pub fn from_discriminator(t: &str) -> Self {
        match t {
            "c" => RoomType::Channel,
            "p" => RoomType::PrivateGroup,
            "d" => RoomType::DirectMessage,
            other => RoomType::Other(other.to_string()),
        }
    }

    pub fn discriminator(&self) -> &str {
        match self {
            RoomType::Channel => "c",
            RoomType::PrivateGroup => "p",
            RoomType::DirectMessage => "d",
            RoomType::Other(t) => t,
        }
    }
}

impl From<String> for RoomType {
    fn from(t: String) -> Self {
        match t.as_str() {
            "c" => RoomType::Channel,
            "p" => RoomType::PrivateGroup,
            "d" => RoomType::DirectMessage,
            _ => RoomType::Other(t),
        }
    }
}

impl From<RoomType> for String {
    fn from(room_type: RoomType) -> Self {
        match room_type {
            RoomType::Other(t) => t,
            known => known.discriminator().to_string(),
        }
    }
}

impl fmt::Display for RoomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.discriminator())
    }
}

/// Per-room retention override.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRetention {
    /// Explicit on/off for this room. `None` defers to the room type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Use the fields below instead of the global parameters.
    #[serde(default)]
    pub override_global: bool,

    #[serde(default)]
    pub files_only: bool,

    #[serde(default)]
    pub exclude_pinned: bool,

    /// Maximum message age in days.
    #[serde(default)]
    pub max_age: f64,
}

/// A chat room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    #[serde(rename = "_id", default)]
    pub id: String,

    #[serde(rename = "t")]
    pub room_type: RoomType,

    /// Present when the room carries its own retention settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention: Option<RoomRetention>,
}

impl Room {
    pub fn new(id: impl Into<String>, room_type: RoomType) -> Self {
        Self {
            id: id.into(),
            room_type,
            retention: None,
        }
    }

    pub fn with_retention(mut self, retention: RoomRetention) -> Self {
        self.retention = Some(retention);
        self
    }

    /// Retention override, but only when it replaces the global parameters.
    pub fn overriding_retention(&self) -> Option<&RoomRetention> {
        self.retention.as_ref().filter(|r| r.override_global)
    }
}
