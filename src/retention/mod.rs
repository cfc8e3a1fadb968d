//! Message retention policy resolution for chat rooms.
//!
//! This module decides whether automatic pruning applies to a room and with
//! which parameters, merging the server-wide retention settings with the
//! room's own override.
//!
//! ## Architecture
//!
//! - `config`: Global settings, setting keys, providers and figment loading
//! - `room`: Room model as read from the room store
//! - `policy`: Policy resolution with room override precedence
//!
//! ## Usage
//!
//! ```no_run
//! use room_retention::retention::{GlobalRetentionSettings, RetentionPolicyResolver, Room, RoomType};
//!
//! let settings = GlobalRetentionSettings::load()?;
//! let resolver = RetentionPolicyResolver::new(settings);
//!
//! let room = Room::new("GENERAL", RoomType::Channel);
//! if let Some(policy) = resolver.resolve(Some(&room)) {
//!     println!("Retention for {}: {}", room.id, policy);
//! }
//! # Ok::<(), room_retention::retention::RetentionSettingsError>(())
//! ```

pub mod config;
pub mod policy;
pub mod room;

// Re-export commonly used types
pub use config::{
    GlobalRetentionSettings, RetentionSettingsError, SettingValue, SettingsProvider,
    StaticSettings, keys,
};
pub use policy::{
    ResolvedPolicy, RetentionPolicyResolver, RetentionPolicySource, days_to_milliseconds,
    resolve_retention_policy,
};
pub use room::{Room, RoomRetention, RoomType};
