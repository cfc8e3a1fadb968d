//! Retention policy resolution: global settings merged with room overrides.

use super::config::{GlobalRetentionSettings, SettingsProvider};
use super::room::{Room, RoomType};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

/// Milliseconds in one day.
pub const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Convert a retention age in days to milliseconds.
pub fn days_to_milliseconds(days: f64) -> f64 {
    days * MILLIS_PER_DAY
}

/// Where the retention parameters of a room come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionPolicySource {
    /// Global settings.
    Global,
    /// The room's own retention override.
    Room,
}

impl fmt::Display for RetentionPolicySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetentionPolicySource::Global => f.write_str("global"),
            RetentionPolicySource::Room => f.write_str("room"),
        }
    }
}

/// Effective retention policy of one room.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedPolicy {
    /// Global switch, independent of the room.
    pub enabled: bool,

    /// Whether messages in this room are pruned at all.
    pub is_active: bool,

    /// Prune only file attachments.
    pub files_only: bool,

    /// Keep pinned messages.
    pub exclude_pinned: bool,

    /// Maximum message age in days.
    ///
    /// `f64::NEG_INFINITY` for room types without an age setting, meaning no
    /// age bound applies. Serializes to `null` in that case.
    pub max_age: f64,
}

impl ResolvedPolicy {
    /// Whether `max_age` is a real bound rather than the unbounded sentinel.
    pub fn is_age_bounded(&self) -> bool {
        self.max_age.is_finite()
    }

    pub fn max_age_millis(&self) -> f64 {
        days_to_milliseconds(self.max_age)
    }

    /// `max_age` as a duration, if finite and non-negative.
    pub fn max_age_duration(&self) -> Option<Duration> {
        if !self.is_age_bounded() || self.max_age < 0.0 {
            return None;
        }
        Duration::try_from_secs_f64(self.max_age_millis() / 1000.0).ok()
    }

    /// Instant before which messages are eligible for pruning.
    ///
    /// `None` when the policy is inactive, has no age bound, has a negative
    /// age, or the cutoff falls outside the representable range.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.is_active || !self.is_age_bounded() || self.max_age < 0.0 {
            return None;
        }

        let age = chrono::Duration::try_milliseconds(self.max_age_millis().round() as i64)?;
        now.checked_sub_signed(age)
    }

    /// Check if a message timestamp is past the retention cutoff.
    pub fn is_prunable(&self, now: DateTime<Utc>, message_timestamp: DateTime<Utc>) -> bool {
        self.cutoff(now).is_some_and(|cutoff| message_timestamp < cutoff)
    }
}

impl fmt::Display for ResolvedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "active={}, enabled={}, files_only={}, exclude_pinned={}, max_age=",
            self.is_active, self.enabled, self.files_only, self.exclude_pinned
        )?;

        match self.max_age_duration() {
            Some(age) => write!(f, "{}", humantime::format_duration(age)),
            None if self.is_age_bounded() => write!(f, "{}d", self.max_age),
            None => f.write_str("unbounded"),
        }
    }
}

/// Resolves retention policies against a snapshot of the global settings.
///
/// Resolution order:
/// 1. Room override (if the room carries one)
/// 2. Global setting for the room type
#[derive(Debug, Clone, Default)]
pub struct RetentionPolicyResolver {
    settings: GlobalRetentionSettings,
}

impl RetentionPolicyResolver {
    pub fn new(settings: GlobalRetentionSettings) -> Self {
        Self { settings }
    }

    /// Build a resolver from the current values of a settings provider.
    pub fn from_provider(provider: &impl SettingsProvider) -> Self {
        Self::new(GlobalRetentionSettings::from_provider(provider))
    }

    pub fn settings(&self) -> &GlobalRetentionSettings {
        &self.settings
    }

    /// Replace the settings snapshot. Subsequent resolutions use the new one.
    pub fn update_settings(&mut self, settings: GlobalRetentionSettings) {
        if settings != self.settings {
            info!(
                enabled = settings.enabled,
                applies_to_channels = settings.applies_to_channels,
                applies_to_groups = settings.applies_to_groups,
                applies_to_dms = settings.applies_to_dms,
                "Retention settings updated"
            );
        }
        self.settings = settings;
    }

    /// Resolve the effective policy of `room`, or `None` without a room.
    pub fn resolve(&self, room: Option<&Room>) -> Option<ResolvedPolicy> {
        resolve_retention_policy(room, &self.settings)
    }

    /// Source of the room's pruning parameters.
    pub fn policy_source(room: &Room) -> RetentionPolicySource {
        if room.overriding_retention().is_some() {
            RetentionPolicySource::Room
        } else {
            RetentionPolicySource::Global
        }
    }
}

/// Resolve the effective retention policy of `room` under `settings`.
pub fn resolve_retention_policy(
    room: Option<&Room>,
    settings: &GlobalRetentionSettings,
) -> Option<ResolvedPolicy> {
    let room = room?;

    let policy = ResolvedPolicy {
        enabled: settings.enabled,
        is_active: is_active(room, settings),
        files_only: files_only(room, settings),
        exclude_pinned: exclude_pinned(room, settings),
        max_age: max_age(room, settings),
    };

    debug!(
        room_id = %room.id,
        room_type = %room.room_type,
        source = %RetentionPolicyResolver::policy_source(room),
        is_active = policy.is_active,
        max_age = policy.max_age,
        "Resolved retention policy"
    );

    Some(policy)
}

fn is_active(room: &Room, settings: &GlobalRetentionSettings) -> bool {
    if !settings.enabled {
        return false;
    }

    // An explicit room switch wins even without overrideGlobal
    if let Some(enabled) = room.retention.as_ref().and_then(|r| r.enabled) {
        return enabled;
    }

    match room.room_type {
        RoomType::Channel => settings.applies_to_channels,
        RoomType::PrivateGroup => settings.applies_to_groups,
        RoomType::DirectMessage => settings.applies_to_dms,
        RoomType::Other(_) => false,
    }
}

fn files_only(room: &Room, settings: &GlobalRetentionSettings) -> bool {
    room.overriding_retention().map_or(settings.files_only, |r| r.files_only)
}

fn exclude_pinned(room: &Room, settings: &GlobalRetentionSettings) -> bool {
    room.overriding_retention().map_or(settings.do_not_prune_pinned, |r| r.exclude_pinned)
}

fn max_age(room: &Room, settings: &GlobalRetentionSettings) -> f64 {
    if let Some(retention) = room.overriding_retention() {
        return retention.max_age;
    }

    match room.room_type {
        RoomType::Channel => settings.max_age_channels,
        RoomType::PrivateGroup => settings.max_age_groups,
        RoomType::DirectMessage => settings.max_age_dms,
        RoomType::Other(_) => f64::NEG_INFINITY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retention::room::RoomRetention;
    use chrono::TimeZone;

    fn enabled_settings() -> GlobalRetentionSettings {
        GlobalRetentionSettings {
            enabled: true,
            files_only: false,
            do_not_prune_pinned: false,
            applies_to_channels: true,
            max_age_channels: 30.0,
            applies_to_groups: true,
            max_age_groups: 60.0,
            applies_to_dms: true,
            max_age_dms: 90.0,
        }
    }

    fn room(t: &str) -> Room {
        Room::new("room1", RoomType::from_discriminator(t))
    }

    #[test]
    fn test_absent_room_resolves_to_none() {
        assert!(resolve_retention_policy(None, &enabled_settings()).is_none());
        assert!(resolve_retention_policy(None, &GlobalRetentionSettings::default()).is_none());
    }

    #[test]
    fn test_globally_disabled_is_never_active() {
        let settings = GlobalRetentionSettings {
            enabled: false,
            ..enabled_settings()
        };

        let forced = room("c").with_retention(RoomRetention {
            enabled: Some(true),
            override_global: true,
            ..Default::default()
        });

        for room in [room("c"), room("p"), room("d"), room("l"), forced] {
            let policy = resolve_retention_policy(Some(&room), &settings).unwrap();
            assert!(!policy.enabled);
            assert!(!policy.is_active, "room {} must be inactive", room.room_type);
        }
    }

    #[test]
    fn test_room_switch_beats_room_type() {
        let settings = GlobalRetentionSettings {
            applies_to_channels: false,
            ..enabled_settings()
        };
        let room = room("c").with_retention(RoomRetention {
            enabled: Some(true),
            ..Default::default()
        });

        let policy = resolve_retention_policy(Some(&room), &settings).unwrap();
        assert!(policy.is_active);
    }

    #[test]
    fn test_room_switch_can_disable() {
        let room = room("d").with_retention(RoomRetention {
            enabled: Some(false),
            ..Default::default()
        });

        let policy = resolve_retention_policy(Some(&room), &enabled_settings()).unwrap();
        assert!(!policy.is_active);
    }

    #[test]
    fn test_room_type_dispatch() {
        let settings = GlobalRetentionSettings {
            applies_to_channels: false,
            applies_to_groups: true,
            applies_to_dms: false,
            ..enabled_settings()
        };

        let channel = resolve_retention_policy(Some(&room("c")), &settings).unwrap();
        assert!(!channel.is_active);
        assert_eq!(channel.max_age, 30.0);

        let group = resolve_retention_policy(Some(&room("p")), &settings).unwrap();
        assert!(group.is_active);
        assert_eq!(group.max_age, 60.0);

        let dm = resolve_retention_policy(Some(&room("d")), &settings).unwrap();
        assert!(!dm.is_active);
        assert_eq!(dm.max_age, 90.0);
    }

    #[test]
    fn test_unknown_room_type_is_inactive_and_unbounded() {
        let policy = resolve_retention_policy(Some(&room("l")), &enabled_settings()).unwrap();
        assert!(!policy.is_active);
        assert_eq!(policy.max_age, f64::NEG_INFINITY);
        assert!(!policy.is_age_bounded());
        assert_eq!(policy.max_age_duration(), None);
    }

    #[test]
    fn test_override_global_replaces_parameters() {
        let settings = GlobalRetentionSettings {
            files_only: false,
            do_not_prune_pinned: false,
            ..enabled_settings()
        };
        let room = room("l").with_retention(RoomRetention {
            enabled: None,
            override_global: true,
            files_only: true,
            exclude_pinned: true,
            max_age: 5.0,
        });

        let policy = resolve_retention_policy(Some(&room), &settings).unwrap();
        assert!(policy.files_only);
        assert!(policy.exclude_pinned);
        assert_eq!(policy.max_age, 5.0);
        // Unknown type without an explicit switch stays inactive
        assert!(!policy.is_active);
        assert_eq!(
            RetentionPolicyResolver::policy_source(&room),
            RetentionPolicySource::Room
        );
    }

    #[test]
    fn test_override_files_only_wins_in_both_directions() {
        let global_files_only = GlobalRetentionSettings {
            files_only: true,
            do_not_prune_pinned: true,
            ..enabled_settings()
        };

        let forced_on = room("c").with_retention(RoomRetention {
            override_global: true,
            files_only: true,
            exclude_pinned: true,
            max_age: 10.0,
            ..Default::default()
        });
        let policy = resolve_retention_policy(Some(&forced_on), &global_files_only).unwrap();
        assert!(policy.files_only);
        assert!(policy.exclude_pinned);

        let forced_off = room("c").with_retention(RoomRetention {
            override_global: true,
            files_only: false,
            exclude_pinned: false,
            max_age: 10.0,
            ..Default::default()
        });
        let policy = resolve_retention_policy(Some(&forced_off), &global_files_only).unwrap();
        assert!(!policy.files_only);
        assert!(!policy.exclude_pinned);
    }

    #[test]
    fn test_policy_source_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(RetentionPolicySource::Room).unwrap(),
            serde_json::json!("room")
        );
        assert_eq!(
            serde_json::to_value(RetentionPolicySource::Global).unwrap(),
            serde_json::json!("global")
        );
        assert_eq!(RetentionPolicySource::Room.to_string(), "room");
    }

    #[test]
    fn test_retention_without_override_global_keeps_globals() {
        let settings = GlobalRetentionSettings {
            files_only: true,
            do_not_prune_pinned: true,
            ..enabled_settings()
        };
        let room = room("p").with_retention(RoomRetention {
            enabled: None,
            override_global: false,
            files_only: false,
            exclude_pinned: false,
            max_age: 1.0,
        });

        let policy = resolve_retention_policy(Some(&room), &settings).unwrap();
        assert!(policy.files_only);
        assert!(policy.exclude_pinned);
        assert_eq!(policy.max_age, 60.0);
        assert_eq!(
            RetentionPolicyResolver::policy_source(&room),
            RetentionPolicySource::Global
        );
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let resolver = RetentionPolicyResolver::new(enabled_settings());
        let room = room("c").with_retention(RoomRetention {
            enabled: Some(true),
            override_global: true,
            files_only: true,
            exclude_pinned: false,
            max_age: 12.0,
        });

        assert_eq!(resolver.resolve(Some(&room)), resolver.resolve(Some(&room)));
    }

    #[test]
    fn test_update_settings_is_observed() {
        let mut resolver = RetentionPolicyResolver::default();
        let room = room("c");

        assert!(!resolver.resolve(Some(&room)).unwrap().is_active);

        resolver.update_settings(enabled_settings());
        assert!(resolver.resolve(Some(&room)).unwrap().is_active);
        assert_eq!(resolver.settings(), &enabled_settings());
    }

    #[test]
    fn test_days_to_milliseconds() {
        assert_eq!(days_to_milliseconds(1.0), 86_400_000.0);
        assert_eq!(days_to_milliseconds(0.5), 43_200_000.0);
        assert_eq!(days_to_milliseconds(0.0), 0.0);
        assert_eq!(days_to_milliseconds(f64::NEG_INFINITY), f64::NEG_INFINITY);
    }

    #[test]
    fn test_cutoff() {
        let now = Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap();
        let policy = resolve_retention_policy(Some(&room("c")), &enabled_settings()).unwrap();

        let cutoff = policy.cutoff(now).unwrap();
        assert_eq!(cutoff, Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());

        // Older than cutoff is prunable, the cutoff itself is kept
        assert!(policy.is_prunable(now, cutoff - chrono::Duration::seconds(1)));
        assert!(!policy.is_prunable(now, cutoff));
        assert!(!policy.is_prunable(now, now));
    }

    #[test]
    fn test_no_cutoff_when_inactive_or_unbounded() {
        let now = Utc::now();
        let settings = enabled_settings();

        let unbounded = resolve_retention_policy(Some(&room("l")), &settings).unwrap();
        assert!(unbounded.cutoff(now).is_none());

        let inactive = room("c").with_retention(RoomRetention {
            enabled: Some(false),
            ..Default::default()
        });
        let inactive = resolve_retention_policy(Some(&inactive), &settings).unwrap();
        assert!(inactive.cutoff(now).is_none());
        assert!(!inactive.is_prunable(now, now - chrono::Duration::days(365)));
    }

    #[test]
    fn test_negative_max_age_never_prunes() {
        let now = Utc::now();
        let room = room("c").with_retention(RoomRetention {
            enabled: Some(true),
            override_global: true,
            max_age: -1.0,
            ..Default::default()
        });

        let policy = resolve_retention_policy(Some(&room), &enabled_settings()).unwrap();
        assert!(policy.is_active);
        assert_eq!(policy.max_age, -1.0);
        assert!(policy.cutoff(now).is_none());
        assert!(!policy.is_prunable(now, now));
        assert!(!policy.is_prunable(now, now - chrono::Duration::days(365)));
        assert!(!policy.is_prunable(now, now + chrono::Duration::days(1)));
    }

    #[test]
    fn test_max_age_duration() {
        let policy = ResolvedPolicy {
            enabled: true,
            is_active: true,
            files_only: false,
            exclude_pinned: false,
            max_age: 2.0,
        };
        assert_eq!(
            policy.max_age_duration(),
            Some(Duration::from_secs(2 * 24 * 3600))
        );

        let negative = ResolvedPolicy {
            max_age: -1.0,
            ..policy
        };
        assert_eq!(negative.max_age_duration(), None);
    }

    #[test]
    fn test_display() {
        let policy = resolve_retention_policy(Some(&room("c")), &enabled_settings()).unwrap();
        assert_eq!(
            policy.to_string(),
            "active=true, enabled=true, files_only=false, exclude_pinned=false, max_age=30days"
        );

        let unbounded = resolve_retention_policy(Some(&room("v")), &enabled_settings()).unwrap();
        assert!(unbounded.to_string().ends_with("max_age=unbounded"));
    }

    #[test]
    fn test_serialize_camel_case() {
        let policy = resolve_retention_policy(Some(&room("p")), &enabled_settings()).unwrap();
        let json = serde_json::to_value(&policy).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "enabled": true,
                "isActive": true,
                "filesOnly": false,
                "excludePinned": false,
                "maxAge": 60.0
            })
        );
    }
}
