//! Room Retention Library
//!
//! Resolves the effective message retention (auto-pruning) policy of a chat
//! room from the global retention settings and the room's own override.

pub mod retention;

pub use retention::{
    GlobalRetentionSettings, ResolvedPolicy, RetentionPolicyResolver, Room, RoomRetention,
    RoomType, days_to_milliseconds, resolve_retention_policy,
};
