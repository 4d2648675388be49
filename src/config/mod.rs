//! Engine configuration.
//!
//! Handles the TOML settings file and environment variable expansion.

mod settings;

pub use settings::{
    expand_env_vars, CacheSettings, DateSettings, LimitPreset, LimitSettings, MetadataSettings,
    Settings, SettingsError,
};
