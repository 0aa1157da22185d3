//! YAML configuration for reda-sync.
//!
//! # Storage layout
//!
//! ```text
//! ~/.reda-sync/
//!   config.yaml     (mode 0600, created by `reda-sync init`)
//! ```
//!
//! # API pattern
//!
//! Every filesystem function has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Secrets may be left out of the file and supplied through the environment
//! (`REDA_API_KEY`, `REDA_SPREADSHEET_ID`, `REDA_SHEETS_TOKEN`,
//! `REDA_SHEETS_TOKEN_FILE`); environment values win over file values.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{FixedOffset, Offset, Utc, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ConfigError;
use crate::types::ProjectRef;

pub const ENV_API_KEY: &str = "REDA_API_KEY";
pub const ENV_SPREADSHEET_ID: &str = "REDA_SPREADSHEET_ID";
pub const ENV_SHEETS_TOKEN: &str = "REDA_SHEETS_TOKEN";
pub const ENV_SHEETS_TOKEN_FILE: &str = "REDA_SHEETS_TOKEN_FILE";

pub const DEFAULT_API_BASE_URL: &str = "https://api.reda.mx/integracion";
pub const DEFAULT_SHEETS_BASE_URL: &str = "https://sheets.googleapis.com/v4";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = -6;

// ---------------------------------------------------------------------------
// 1. Config structs
// ---------------------------------------------------------------------------

/// Root of `config.yaml`. Built once per run and passed down by reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub sheets: SheetsConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default = "default_utc_offset_hours")]
    pub report_utc_offset_hours: i32,
    #[serde(default = "default_projects")]
    pub projects: Vec<ProjectRef>,
}

/// Source (REDA) API settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

/// Destination spreadsheet settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetsConfig {
    pub base_url: String,
    pub spreadsheet_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<Credential>,
}

/// Bearer-token material for the spreadsheet API, minted by an external tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Credential {
    /// Inline access token.
    Token { token: String },
    /// Path to a file holding the access token; re-read on every publish.
    TokenFile { token_file: PathBuf },
}

/// Weekly trigger time, interpreted in the report offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    #[serde(serialize_with = "ser_weekday", deserialize_with = "de_weekday")]
    pub weekday: Weekday,
    pub hour: u32,
    pub minute: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            sheets: SheetsConfig::default(),
            schedule: ScheduleConfig::default(),
            report_utc_offset_hours: DEFAULT_UTC_OFFSET_HOURS,
            projects: default_projects(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            api_key: String::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SHEETS_BASE_URL.to_string(),
            spreadsheet_id: String::new(),
            credential: None,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            weekday: Weekday::Mon,
            hour: 0,
            minute: 0,
        }
    }
}

impl fmt::Display for ScheduleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:02}:{:02}", self.weekday, self.hour, self.minute)
    }
}

fn default_utc_offset_hours() -> i32 {
    DEFAULT_UTC_OFFSET_HOURS
}

/// The eight developments tracked out of the box, in processing order.
pub fn default_projects() -> Vec<ProjectRef> {
    vec![
        ProjectRef::new("Colina D Santiago", 10),
        ProjectRef::new("Puerto D Marqués", 30),
        ProjectRef::new("Hacienda D San Gabriel", 32),
        ProjectRef::new("LAGRAND", 35),
        ProjectRef::new("Senda D Santino", 57),
        ProjectRef::new("Villa D Nogal", 16),
        ProjectRef::new("Cerrada D Melocotón", 17),
        ProjectRef::new("MooD 08", 179),
    ]
}

fn ser_weekday<S: Serializer>(day: &Weekday, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&day.to_string().to_lowercase())
}

fn de_weekday<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Weekday, D::Error> {
    let raw = String::deserialize(deserializer)?;
    raw.trim()
        .parse::<Weekday>()
        .map_err(|_| serde::de::Error::custom(format!("unknown weekday '{raw}'")))
}

// ---------------------------------------------------------------------------
// 2. Behaviour
// ---------------------------------------------------------------------------

impl Config {
    /// Overlay environment values on top of the file values.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty(ENV_API_KEY) {
            self.api.api_key = key;
        }
        if let Some(id) = non_empty(ENV_SPREADSHEET_ID) {
            self.sheets.spreadsheet_id = id;
        }
        if let Some(token) = non_empty(ENV_SHEETS_TOKEN) {
            self.sheets.credential = Some(Credential::Token { token });
        } else if let Some(path) = non_empty(ENV_SHEETS_TOKEN_FILE) {
            self.sheets.credential = Some(Credential::TokenFile {
                token_file: PathBuf::from(path),
            });
        }
    }

    /// Check everything a run needs. Listing projects does not require this.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.api_key.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "api.api_key is empty; set it in config.yaml or ${ENV_API_KEY}"
            )));
        }
        if self.sheets.spreadsheet_id.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "sheets.spreadsheet_id is empty; set it in config.yaml or ${ENV_SPREADSHEET_ID}"
            )));
        }
        if let Some(bad) = self
            .sheets
            .spreadsheet_id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(ConfigError::Invalid(format!(
                "sheets.spreadsheet_id contains {bad:?}; only letters, digits, '-' and '_' are allowed"
            )));
        }
        if self.api.timeout_secs == 0 {
            return Err(ConfigError::Invalid("api.timeout_secs must be positive".into()));
        }
        if self.schedule.hour > 23 || self.schedule.minute > 59 {
            return Err(ConfigError::Invalid(format!(
                "schedule time {:02}:{:02} is out of range",
                self.schedule.hour, self.schedule.minute
            )));
        }
        if !(-14..=14).contains(&self.report_utc_offset_hours) {
            return Err(ConfigError::Invalid(format!(
                "report_utc_offset_hours {} is outside -14..=14",
                self.report_utc_offset_hours
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for project in &self.projects {
            if project.name.0.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "project with id {} has an empty name",
                    project.id
                )));
            }
            if !seen.insert(project.name.0.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "project '{}' is configured more than once",
                    project.name
                )));
            }
        }
        Ok(())
    }

    /// Offset used for run timestamps and the weekly schedule.
    pub fn report_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.report_utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix())
    }

    /// Look up a configured project by display name (exact match).
    pub fn project(&self, name: &str) -> Option<&ProjectRef> {
        self.projects.iter().find(|p| p.name.0 == name)
    }
}

// ---------------------------------------------------------------------------
// 3. Path helpers
// ---------------------------------------------------------------------------

/// Home directory, or `ConfigError::HomeNotFound`.
pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

/// `<home>/.reda-sync/`: pure, no I/O.
pub fn config_dir_at(home: &Path) -> PathBuf {
    home.join(".reda-sync")
}

/// `<home>/.reda-sync/config.yaml`: pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    config_dir_at(home).join("config.yaml")
}

// ---------------------------------------------------------------------------
// 4. Load
// ---------------------------------------------------------------------------

/// Load `<home>/.reda-sync/config.yaml` and overlay process environment values.
///
/// Returns `ConfigError::ConfigNotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
/// Does not validate; call [`Config::validate`] before running.
pub fn load_at(home: &Path) -> Result<Config, ConfigError> {
    load_with_env_at(home, |key| std::env::var(key).ok())
}

/// `load_at` with an explicit environment lookup.
pub fn load_with_env_at<F>(home: &Path, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let path = config_path_at(home);
    if !path.exists() {
        return Err(ConfigError::ConfigNotFound { path });
    }
    let contents = std::fs::read_to_string(&path)?;
    let mut config: Config =
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })?;
    config.apply_env(lookup);
    Ok(config)
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Config, ConfigError> {
    load_at(&home()?)
}

// ---------------------------------------------------------------------------
// 5. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save `config` to `<home>/.reda-sync/config.yaml`.
///
/// Write flow: serialize → `config.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &Config) -> Result<(), ConfigError> {
    let dir = config_dir_at(home);
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        set_dir_permissions(&dir)?;
    }
    let path = config_path_at(home);
    let tmp_path = path.with_file_name("config.yaml.tmp");

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// 6. Init
// ---------------------------------------------------------------------------

/// Write the default config unless one exists (or `force` is set).
///
/// Idempotent without `force`: an existing file is loaded and returned unchanged.
pub fn init_at(home: &Path, force: bool) -> Result<Config, ConfigError> {
    let path = config_path_at(home);
    if path.exists() && !force {
        let contents = std::fs::read_to_string(&path)?;
        return serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e });
    }
    let config = Config::default();
    save_at(home, &config)?;
    Ok(config)
}

/// `init_at` convenience wrapper.
pub fn init(force: bool) -> Result<Config, ConfigError> {
    init_at(&home()?, force)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn valid() -> Config {
        let mut config = Config::default();
        config.api.api_key = "key".into();
        config.sheets.spreadsheet_id = "sheet".into();
        config
    }

    #[test]
    fn config_path_is_correct() {
        let home = TempDir::new().expect("tempdir");
        assert!(config_path_at(home.path()).ends_with(".reda-sync/config.yaml"));
    }

    #[test]
    fn default_projects_keep_configuration_order() {
        let names: Vec<_> = default_projects().into_iter().map(|p| p.name.0).collect();
        assert_eq!(names.first().map(String::as_str), Some("Colina D Santiago"));
        assert_eq!(names.last().map(String::as_str), Some("MooD 08"));
        assert_eq!(names.len(), 8);
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = Config::default();
        config.api.api_key = "from-file".into();
        config.apply_env(|key| match key {
            ENV_API_KEY => Some("from-env".into()),
            ENV_SHEETS_TOKEN_FILE => Some("/run/token".into()),
            ENV_SPREADSHEET_ID => Some("   ".into()),
            _ => None,
        });
        assert_eq!(config.api.api_key, "from-env");
        assert_eq!(config.sheets.spreadsheet_id, "", "blank env values are ignored");
        assert_eq!(
            config.sheets.credential,
            Some(Credential::TokenFile {
                token_file: PathBuf::from("/run/token")
            })
        );
    }

    #[test]
    fn inline_token_env_beats_token_file_env() {
        let mut config = Config::default();
        config.apply_env(|key| match key {
            ENV_SHEETS_TOKEN => Some("abc".into()),
            ENV_SHEETS_TOKEN_FILE => Some("/run/token".into()),
            _ => None,
        });
        assert_eq!(
            config.sheets.credential,
            Some(Credential::Token { token: "abc".into() })
        );
    }

    #[test]
    fn validate_rejects_missing_secrets() {
        let err = Config::default().validate().unwrap_err();
        assert!(err.to_string().contains("api_key"));

        let mut config = valid();
        config.sheets.spreadsheet_id.clear();
        assert!(config.validate().unwrap_err().to_string().contains("spreadsheet_id"));
    }

    #[rstest::rstest]
    #[case("abc/../other")]
    #[case("abc?fields=x")]
    #[case("abc def")]
    #[case("abc#x")]
    fn validate_rejects_spreadsheet_id_outside_url_safe_set(#[case] id: &str) {
        let mut config = valid();
        config.sheets.spreadsheet_id = id.into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("spreadsheet_id contains"), "got: {err}");
    }

    #[test]
    fn validate_accepts_real_spreadsheet_ids() {
        let mut config = valid();
        config.sheets.spreadsheet_id = "1BxiMVs0XRA5nFMdKvBdBZjgmUUqptlbs74OgvE2upms_-".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_duplicate_projects() {
        let mut config = valid();
        config.projects.push(ProjectRef::new("LAGRAND", 99));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("LAGRAND"), "got: {err}");
    }

    #[test]
    fn validate_rejects_bad_schedule_and_offset() {
        let mut config = valid();
        config.schedule.hour = 24;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.report_utc_offset_hours = 15;
        assert!(config.validate().is_err());

        assert!(valid().validate().is_ok());
    }

    #[test]
    fn report_offset_defaults_to_mexico_city() {
        assert_eq!(Config::default().report_offset().local_minus_utc(), -6 * 3600);
    }

    #[test]
    fn weekday_roundtrips_as_lowercase() {
        let yaml = serde_yaml::to_string(&ScheduleConfig::default()).expect("serialize");
        assert!(yaml.contains("weekday: mon"), "got: {yaml}");
        let parsed: ScheduleConfig =
            serde_yaml::from_str("weekday: Friday\nhour: 6\nminute: 30\n").expect("parse");
        assert_eq!(parsed.weekday, Weekday::Fri);
        assert_eq!(parsed.to_string(), "Fri 06:30");
    }

    #[test]
    fn save_and_load_roundtrip_with_tmp_cleanup() {
        let home = TempDir::new().expect("tempdir");
        let config = valid();
        save_at(home.path(), &config).expect("save");
        let tmp = config_path_at(home.path()).with_file_name("config.yaml.tmp");
        assert!(!tmp.exists(), ".tmp must be gone after successful save");

        let loaded = load_with_env_at(home.path(), |_| None).expect("load");
        assert_eq!(loaded, config);
    }

    #[test]
    fn load_missing_config_returns_not_found() {
        let home = TempDir::new().expect("tempdir");
        let err = load_with_env_at(home.path(), |_| None).unwrap_err();
        assert!(matches!(err, ConfigError::ConfigNotFound { .. }));
    }

    #[test]
    fn home_not_found_error_message() {
        assert!(ConfigError::HomeNotFound.to_string().contains("home directory"));
    }
}
