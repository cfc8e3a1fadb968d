//! Global retention settings and the providers they are read from.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

/// Setting keys as stored by the settings service.
pub mod keys {
    pub const ENABLED: &str = "RetentionPolicy_Enabled";
    pub const FILES_ONLY: &str = "RetentionPolicy_FilesOnly";
    pub const DO_NOT_PRUNE_PINNED: &str = "RetentionPolicy_DoNotPrunePinned";
    pub const APPLIES_TO_CHANNELS: &str = "RetentionPolicy_AppliesToChannels";
    pub const MAX_AGE_CHANNELS: &str = "RetentionPolicy_MaxAge_Channels";
    pub const APPLIES_TO_GROUPS: &str = "RetentionPolicy_AppliesToGroups";
    pub const MAX_AGE_GROUPS: &str = "RetentionPolicy_MaxAge_Groups";
    pub const APPLIES_TO_DMS: &str = "RetentionPolicy_AppliesToDMs";
    pub const MAX_AGE_DMS: &str = "RetentionPolicy_MaxAge_DMs";
}

/// Default TOML file read by [`GlobalRetentionSettings::load`].
pub const DEFAULT_CONFIG_FILE: &str = "retention.toml";

/// Environment prefix read by [`GlobalRetentionSettings::load`].
pub const ENV_PREFIX: &str = "ROOM_RETENTION__";

const DEFAULT_MAX_AGE_DAYS: f64 = 30.0;

/// Snapshot of the server-wide retention settings.
///
/// Max ages are expressed in days and may be fractional.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalRetentionSettings {
    /// Global switch. When off, no room is pruned.
    ///
    /// Env: ROOM_RETENTION__RETENTION__ENABLED
    pub enabled: bool,

    /// Prune only file attachments, keeping message text.
    pub files_only: bool,

    /// Keep pinned messages when pruning.
    pub do_not_prune_pinned: bool,

    /// Apply the policy to public channels.
    pub applies_to_channels: bool,

    /// Maximum message age in public channels.
    ///
    /// Env: ROOM_RETENTION__RETENTION__MAX_AGE_CHANNELS
    pub max_age_channels: f64,

    /// Apply the policy to private groups.
    pub applies_to_groups: bool,

    /// Maximum message age in private groups.
    pub max_age_groups: f64,

    /// Apply the policy to direct messages.
    pub applies_to_dms: bool,

    /// Maximum message age in direct messages.
    pub max_age_dms: f64,
}

impl Default for GlobalRetentionSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            files_only: false,
            do_not_prune_pinned: false,
            applies_to_channels: false,
            max_age_channels: DEFAULT_MAX_AGE_DAYS,
            applies_to_groups: false,
            max_age_groups: DEFAULT_MAX_AGE_DAYS,
            applies_to_dms: false,
            max_age_dms: DEFAULT_MAX_AGE_DAYS,
        }
    }
}

/// Wrapper so the settings live under a `[retention]` table.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct RetentionSection {
    #[serde(default)]
    retention: GlobalRetentionSettings,
}

impl GlobalRetentionSettings {
    /// Load settings from defaults, `retention.toml` and `ROOM_RETENTION__*`
    /// environment variables, later sources winning.
    pub fn load() -> Result<Self, RetentionSettingsError> {
        Self::load_from_path(DEFAULT_CONFIG_FILE)
    }

    /// Same as [`GlobalRetentionSettings::load`] with an explicit TOML path.
    /// A missing file is not an error.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, RetentionSettingsError> {
        let section: RetentionSection =
            Figment::from(Serialized::defaults(RetentionSection::default()))
                .merge(Toml::file(path.as_ref()))
                .merge(Env::prefixed(ENV_PREFIX).split("__"))
                .extract()
                .map_err(|e| RetentionSettingsError::Config(Box::new(e)))?;

        Ok(section.retention)
    }

    /// Read the nine retention keys from a settings provider.
    ///
    /// Missing or mistyped values fall back to the corresponding field of
    /// [`GlobalRetentionSettings::default`].
    pub fn from_provider(provider: &impl SettingsProvider) -> Self {
        let defaults = Self::default();

        Self {
            enabled: bool_or(provider, keys::ENABLED, defaults.enabled),
            files_only: bool_or(provider, keys::FILES_ONLY, defaults.files_only),
            do_not_prune_pinned: bool_or(
                provider,
                keys::DO_NOT_PRUNE_PINNED,
                defaults.do_not_prune_pinned,
            ),
            applies_to_channels: bool_or(
                provider,
                keys::APPLIES_TO_CHANNELS,
                defaults.applies_to_channels,
            ),
            max_age_channels: number_or(
                provider,
                keys::MAX_AGE_CHANNELS,
                defaults.max_age_channels,
            ),
            applies_to_groups: bool_or(
                provider,
                keys::APPLIES_TO_GROUPS,
                defaults.applies_to_groups,
            ),
            max_age_groups: number_or(provider, keys::MAX_AGE_GROUPS, defaults.max_age_groups),
            applies_to_dms: bool_or(provider, keys::APPLIES_TO_DMS, defaults.applies_to_dms),
            max_age_dms: number_or(provider, keys::MAX_AGE_DMS, defaults.max_age_dms),
        }
    }
}

fn bool_or(provider: &impl SettingsProvider, key: &str, default: bool) -> bool {
    read_bool(provider, key).unwrap_or_else(|e| {
        warn!(key = %key, error = %e, default, "Falling back to default retention setting");
        default
    })
}

fn number_or(provider: &impl SettingsProvider, key: &str, default: f64) -> f64 {
    read_number(provider, key).unwrap_or_else(|e| {
        warn!(key = %key, error = %e, default, "Falling back to default retention setting");
        default
    })
}

/// A raw setting value as handed out by the settings service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl SettingValue {
    /// Name of the value's kind, for error reporting.
    pub fn kind(&self) -> &'static str {
        match self {
            SettingValue::Bool(_) => "bool",
            SettingValue::Number(_) => "number",
            SettingValue::String(_) => "string",
        }
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        SettingValue::Bool(value)
    }
}

impl From<f64> for SettingValue {
    fn from(value: f64) -> Self {
        SettingValue::Number(value)
    }
}

impl From<i32> for SettingValue {
    fn from(value: i32) -> Self {
        SettingValue::Number(f64::from(value))
    }
}

impl From<i64> for SettingValue {
    fn from(value: i64) -> Self {
        SettingValue::Number(value as f64)
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        SettingValue::String(value.to_string())
    }
}

/// Synchronous read-by-key access to the settings service.
pub trait SettingsProvider {
    /// Current value of `key`, if set.
    fn setting(&self, key: &str) -> Option<SettingValue>;
}

impl SettingsProvider for HashMap<String, SettingValue> {
    fn setting(&self, key: &str) -> Option<SettingValue> {
        self.get(key).cloned()
    }
}

impl<P: SettingsProvider + ?Sized> SettingsProvider for &P {
    fn setting(&self, key: &str) -> Option<SettingValue> {
        (**self).setting(key)
    }
}

/// In-memory settings store.
#[derive(Clone, Debug, Default)]
pub struct StaticSettings {
    values: HashMap<String, SettingValue>,
}

impl StaticSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`StaticSettings::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<SettingValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<SettingValue>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<SettingValue> {
        self.values.remove(key)
    }
}

impl SettingsProvider for StaticSettings {
    fn setting(&self, key: &str) -> Option<SettingValue> {
        self.values.get(key).cloned()
    }
}

/// Read a boolean setting.
pub fn read_bool(
    provider: &impl SettingsProvider,
    key: &str,
) -> Result<bool, RetentionSettingsError> {
    match provider.setting(key) {
        Some(SettingValue::Bool(value)) => Ok(value),
        Some(other) => Err(RetentionSettingsError::TypeMismatch {
            key: key.to_string(),
            expected: "bool",
            found: other.kind(),
        }),
        None => Err(RetentionSettingsError::Missing {
            key: key.to_string(),
        }),
    }
}

/// Read a numeric setting.
pub fn read_number(
    provider: &impl SettingsProvider,
    key: &str,
) -> Result<f64, RetentionSettingsError> {
    match provider.setting(key) {
        Some(SettingValue::Number(value)) => Ok(value),
        Some(other) => Err(RetentionSettingsError::TypeMismatch {
            key: key.to_string(),
            expected: "number",
            found: other.kind(),
        }),
        None => Err(RetentionSettingsError::Missing {
            key: key.to_string(),
        }),
    }
}

/// Errors raised while loading or reading retention settings.
#[derive(Error, Debug)]
pub enum RetentionSettingsError {
    /// Layered configuration could not be extracted.
    #[error("Failed to load retention settings: {0}")]
    Config(Box<figment::Error>),

    /// The provider has no value for the key.
    #[error("Setting '{key}' is not set")]
    Missing { key: String },

    /// The provider's value has the wrong type.
    #[error("Setting '{key}' has type {found}, expected {expected}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },
}
