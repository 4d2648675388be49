//! TOML-based configuration.
//!
//! Supports a config file (soql.toml) with environment variable expansion
//! in paths.
//!
//! Example configuration:
//! ```toml
//! [limits]
//! preset = "recommended"   # or "unlimited"
//! max_records = 10000      # overrides the preset when positive
//!
//! [dates]
//! timezone = "America/New_York"
//! week_start = "sunday"
//! fiscal_year_start = 4
//!
//! [cache]
//! enabled = true
//! capacity = 1000
//!
//! [metadata]
//! path = "${SOQL_HOME}/objects.toml"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Weekday;
use chrono_tz::Tz;

use crate::cache::MemoryQueryCache;
use crate::dates::{Clock, DateResolver, SystemClock};
use crate::limits::Limits;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Unknown timezone: {0}")]
    InvalidTimezone(String),

    #[error("Unknown week day: {0}")]
    InvalidWeekday(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub limits: LimitSettings,
    pub dates: DateSettings,
    pub cache: CacheSettings,
    pub metadata: MetadataSettings,
}

/// Starting point for limits before overrides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitPreset {
    #[default]
    Recommended,
    Unlimited,
}

/// Limit configuration: a preset plus per-field overrides.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitSettings {
    pub preset: LimitPreset,

    /// Positive values replace the preset's.
    #[serde(flatten)]
    pub overrides: Limits,
}

impl LimitSettings {
    pub fn resolve(&self) -> Limits {
        let base = match self.preset {
            LimitPreset::Recommended => Limits::recommended(),
            LimitPreset::Unlimited => Limits::unlimited(),
        };
        base.merge(&self.overrides)
    }
}

/// Date literal configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DateSettings {
    /// IANA zone name used to find day boundaries.
    pub timezone: String,

    /// First day of the week, e.g. "monday" or "sun".
    pub week_start: String,

    /// Month (1-12) the fiscal year starts in.
    pub fiscal_year_start: u32,
}

impl Default for DateSettings {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            week_start: "monday".to_string(),
            fiscal_year_start: 1,
        }
    }
}

/// Compiled query cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,

    /// Maximum entries; 0 is unbounded.
    pub capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 1000,
        }
    }
}

impl CacheSettings {
    /// The configured cache, or `None` when disabled.
    pub fn build(&self) -> Option<MemoryQueryCache> {
        self.enabled
            .then(|| MemoryQueryCache::with_capacity(self.capacity))
    }
}

/// Where object metadata is loaded from.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MetadataSettings {
    /// TOML or JSON metadata file (supports ${ENV_VAR} expansion).
    pub path: Option<String>,
}

impl MetadataSettings {
    /// The metadata path with environment variables expanded.
    pub fn resolved_path(&self) -> Result<Option<PathBuf>, SettingsError> {
        self.path
            .as_deref()
            .map(|p| expand_env_vars(p).map(PathBuf::from))
            .transpose()
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.check()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `SOQL_CONFIG`
    /// 2. `./soql.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("SOQL_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("soql.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        Ok(Settings::default())
    }

    fn check(&self) -> Result<(), SettingsError> {
        if !(1..=12).contains(&self.dates.fiscal_year_start) {
            return Err(SettingsError::InvalidConfig(format!(
                "fiscal_year_start must be between 1 and 12, got {}",
                self.dates.fiscal_year_start
            )));
        }
        self.timezone()?;
        self.week_start()?;
        Ok(())
    }

    pub fn limits(&self) -> Limits {
        self.limits.resolve()
    }

    pub fn timezone(&self) -> Result<Tz, SettingsError> {
        self.dates
            .timezone
            .parse::<Tz>()
            .map_err(|_| SettingsError::InvalidTimezone(self.dates.timezone.clone()))
    }

    pub fn week_start(&self) -> Result<Weekday, SettingsError> {
        self.dates
            .week_start
            .parse::<Weekday>()
            .map_err(|_| SettingsError::InvalidWeekday(self.dates.week_start.clone()))
    }

    /// A date resolver on the system clock.
    pub fn date_resolver(&self) -> Result<DateResolver, SettingsError> {
        self.date_resolver_with_clock(Arc::new(SystemClock))
    }

    pub fn date_resolver_with_clock(&self, clock: Arc<dyn Clock>) -> Result<DateResolver, SettingsError> {
        Ok(DateResolver::new(clock)
            .with_timezone(self.timezone()?)
            .with_week_start(self.week_start()?)
            .with_fiscal_year_start(self.dates.fiscal_year_start))
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let braced = chars.peek() == Some(&'{');
        if braced {
            chars.next();
        }
        let mut var_name = String::new();
        while let Some(&ch) = chars.peek() {
            if braced && ch == '}' {
                chars.next();
                break;
            }
            if !braced && !(ch.is_alphanumeric() || ch == '_') {
                break;
            }
            var_name.push(ch);
            chars.next();
        }

        if var_name.is_empty() && !braced {
            // Just a lone $, keep it
            result.push('$');
            continue;
        }
        let value = env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name))?;
        result.push_str(&value);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::QueryCache;

    #[test]
    fn test_expand_env_vars() {
        env::set_var("SOQL_TEST_HOME", "/srv/soql");
        assert_eq!(
            expand_env_vars("${SOQL_TEST_HOME}/objects.toml").unwrap(),
            "/srv/soql/objects.toml"
        );
        assert_eq!(expand_env_vars("$SOQL_TEST_HOME!").unwrap(), "/srv/soql!");
        assert_eq!(expand_env_vars("cost $ 5").unwrap(), "cost $ 5");
        env::remove_var("SOQL_TEST_HOME");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("${NONEXISTENT_VAR_12345}");
        assert!(matches!(result, Err(SettingsError::MissingEnvVar(_))));
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
[limits]
preset = "unlimited"
max_records = 500

[dates]
timezone = "America/New_York"
week_start = "sunday"
fiscal_year_start = 4

[cache]
capacity = 50
"#;

        let settings = Settings::from_toml_str(toml).unwrap();

        let limits = settings.limits();
        assert_eq!(limits.max_records, 500);
        assert_eq!(limits.max_offset, 0);

        let resolver = settings.date_resolver().unwrap();
        assert_eq!(resolver.timezone(), chrono_tz::America::New_York);
        assert_eq!(resolver.week_start(), Weekday::Sun);
        assert_eq!(resolver.fiscal_year_start(), 4);

        let cache = settings.cache.build().unwrap();
        assert_eq!(cache.capacity(), Some(50));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();

        assert_eq!(settings.limits(), Limits::recommended());
        assert_eq!(settings.timezone().unwrap(), Tz::UTC);
        assert_eq!(settings.week_start().unwrap(), Weekday::Mon);
        assert!(settings.cache.enabled);
        assert!(settings.metadata.resolved_path().unwrap().is_none());
    }

    #[test]
    fn test_invalid_settings() {
        assert!(matches!(
            Settings::from_toml_str("[dates]\ntimezone = \"Mars/Olympus\""),
            Err(SettingsError::InvalidTimezone(_))
        ));
        assert!(matches!(
            Settings::from_toml_str("[dates]\nfiscal_year_start = 13"),
            Err(SettingsError::InvalidConfig(_))
        ));
        assert!(matches!(
            Settings::from_toml_str("[dates]\nweek_start = \"someday\""),
            Err(SettingsError::InvalidWeekday(_))
        ));
    }
}
