use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::TimeDelta;
use chrono_tz::Tz;
use dirs::{config_dir, data_local_dir};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CourierError;
use crate::model::RawAclRule;
use crate::provision::CalendarSettings;

const APP_DIR_NAME: &str = "courier";
const CONFIG_FILE_NAME: &str = "config.toml";
const DISCORD_SECRET_FILE_NAME: &str = "discord_secret.json";
const GOOGLE_SECRET_FILE_NAME: &str = "google_secret.json";
const LEDGER_FILE_NAME: &str = "seen_posts.json";
const CALENDAR_STATE_FILE_NAME: &str = "calendar_state.json";

pub const DISCORD_TOKEN_ENV: &str = "COURIER_DISCORD_TOKEN";
pub const GOOGLE_SECRET_ENV: &str = "COURIER_GOOGLE_SECRET";

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_EVENT_DURATION_MIN: u32 = 240;
pub const DEFAULT_TIMEZONE: &str = "UTC";
pub const DEFAULT_CALENDAR_NAME: &str = "Courier Events";
pub const DEFAULT_USER_AGENT: &str = concat!("courier/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_DISCORD_API_BASE: &str = "https://discord.com/api/v10";
pub const DEFAULT_CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Result returned by [`load_config`], capturing the source and any non-fatal issues.
#[derive(Debug, Clone)]
pub struct ConfigLoadResult {
    pub config: FileConfig,
    pub warnings: Vec<String>,
    pub source: ConfigSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// No usable `config.toml`; defaults were synthesized.
    Default,
    File,
}

/// Disk-backed configuration schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub feed: FeedSection,
    #[serde(default)]
    pub discord: DiscordSection,
    #[serde(default)]
    pub calendar: CalendarSection,
    #[serde(default)]
    pub storage: StorageSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSection {
    #[serde(default)]
    pub url: String,
    #[serde(default = "FeedSection::default_user_agent")]
    pub user_agent: String,
    #[serde(default = "FeedSection::default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for FeedSection {
    fn default() -> Self {
        Self {
            url: String::new(),
            user_agent: Self::default_user_agent(),
            poll_interval_secs: Self::default_poll_interval_secs(),
        }
    }
}

impl FeedSection {
    fn default_user_agent() -> String {
        DEFAULT_USER_AGENT.to_string()
    }

    const fn default_poll_interval_secs() -> u64 {
        DEFAULT_POLL_INTERVAL_SECS
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscordSection {
    /// Channel new posts are announced in.
    #[serde(default)]
    pub channel_id: String,
    #[serde(default = "DiscordSection::default_api_base")]
    pub api_base: String,
}

impl Default for DiscordSection {
    fn default() -> Self {
        Self {
            channel_id: String::new(),
            api_base: Self::default_api_base(),
        }
    }
}

impl DiscordSection {
    fn default_api_base() -> String {
        DEFAULT_DISCORD_API_BASE.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarSection {
    #[serde(default = "CalendarSection::default_enabled")]
    pub enabled: bool,
    #[serde(default = "CalendarSection::default_name")]
    pub name: String,
    /// IANA zone for event payloads and for times written without a zone.
    #[serde(default = "CalendarSection::default_timezone")]
    pub timezone: String,
    #[serde(default = "CalendarSection::default_event_duration_min")]
    pub event_duration_min: u32,
    #[serde(default)]
    pub admin_email: Option<String>,
    /// Extra desired rules, validated when the ACL is synchronized.
    #[serde(default)]
    pub acl: Vec<RawAclRule>,
    #[serde(default = "CalendarSection::default_api_base")]
    pub api_base: String,
}

impl Default for CalendarSection {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            name: Self::default_name(),
            timezone: Self::default_timezone(),
            event_duration_min: Self::default_event_duration_min(),
            admin_email: None,
            acl: Vec::new(),
            api_base: Self::default_api_base(),
        }
    }
}

impl CalendarSection {
    const fn default_enabled() -> bool {
        true
    }

    fn default_name() -> String {
        DEFAULT_CALENDAR_NAME.to_string()
    }

    fn default_timezone() -> String {
        DEFAULT_TIMEZONE.to_string()
    }

    const fn default_event_duration_min() -> u32 {
        DEFAULT_EVENT_DURATION_MIN
    }

    fn default_api_base() -> String {
        DEFAULT_CALENDAR_API_BASE.to_string()
    }

    /// The configured zone. Sanitized configs always hold a valid one.
    pub fn tz(&self) -> Tz {
        self.timezone.parse().unwrap_or(Tz::UTC)
    }

    pub fn event_duration(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.event_duration_min))
    }

    pub fn settings(&self) -> CalendarSettings {
        CalendarSettings {
            name: self.name.clone(),
            timezone: self.timezone.clone(),
            admin_email: self.admin_email.clone(),
            extra_acl: self.acl.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSection {
    /// Overrides the platform data directory; `~` and `$VARS` are expanded.
    #[serde(default)]
    pub state_dir: Option<String>,
}

/// Where configuration and state live. Built once at startup and handed to
/// whatever needs a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub state_dir: PathBuf,
}

impl AppPaths {
    pub fn new(config_dir: impl Into<PathBuf>, state_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            state_dir: state_dir.into(),
        }
    }

    /// Platform directories, unless `config_override` names a config directory.
    pub fn discover(config_override: Option<PathBuf>) -> Self {
        let config_dir = config_override.unwrap_or_else(config_directory);
        let state_dir = data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME);
        Self {
            config_dir,
            state_dir,
        }
    }

    /// Applies `[storage] state_dir` from the loaded configuration.
    pub fn with_storage(mut self, storage: &StorageSection) -> Result<Self, CourierError> {
        if let Some(raw) = storage.state_dir.as_deref().filter(|raw| !raw.trim().is_empty()) {
            let expanded = shellexpand::full(raw)
                .map_err(|err| CourierError::config(format!("state_dir {raw:?}: {err}")))?;
            self.state_dir = PathBuf::from(expanded.as_ref());
        }
        Ok(self)
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE_NAME)
    }

    pub fn ledger_file(&self) -> PathBuf {
        self.state_dir.join(LEDGER_FILE_NAME)
    }

    pub fn calendar_state_file(&self) -> PathBuf {
        self.state_dir.join(CALENDAR_STATE_FILE_NAME)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.state_dir.join("logs")
    }

    pub fn discord_secret_file(&self) -> PathBuf {
        self.config_dir.join(DISCORD_SECRET_FILE_NAME)
    }

    pub fn google_secret_file(&self) -> PathBuf {
        self.config_dir.join(GOOGLE_SECRET_FILE_NAME)
    }
}

pub fn parse_timezone(name: &str) -> Result<Tz, CourierError> {
    name.parse()
        .map_err(|_| CourierError::config(format!("unknown timezone '{name}'")))
}

/// Path to the platform configuration directory.
pub fn config_directory() -> PathBuf {
    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Load `config.toml`, falling back to defaults when it is missing or unusable.
pub fn load_config(path: &Path) -> ConfigLoadResult {
    let mut warnings = Vec::new();

    if path.exists() {
        match fs::read_to_string(path) {
            Ok(raw) => match toml::from_str::<FileConfig>(&raw) {
                Ok(config) => {
                    let (config, mut sanitize_warnings) = sanitize_config(config);
                    warnings.append(&mut sanitize_warnings);
                    return ConfigLoadResult {
                        config,
                        warnings,
                        source: ConfigSource::File,
                    };
                }
                Err(err) => warnings.push(format!(
                    "Failed to parse {} as TOML: {}. Falling back to defaults.",
                    path.display(),
                    err
                )),
            },
            Err(err) => warnings.push(format!(
                "Failed to read {}: {}. Falling back to defaults.",
                path.display(),
                err
            )),
        }
    }

    ConfigLoadResult {
        config: FileConfig::default(),
        warnings,
        source: ConfigSource::Default,
    }
}

/// Persist the configuration, creating the directory if needed.
pub fn save_config(path: &Path, config: &FileConfig) -> Result<(), CourierError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let serialized = toml::to_string_pretty(config)
        .map_err(|err| CourierError::config(format!("serialize config: {err}")))?;
    fs::write(path, serialized)?;
    Ok(())
}

fn sanitize_config(mut config: FileConfig) -> (FileConfig, Vec<String>) {
    let mut warnings = Vec::new();

    if config.feed.poll_interval_secs == 0 {
        warnings.push(format!(
            "feed.poll_interval_secs must be positive. Resetting to {DEFAULT_POLL_INTERVAL_SECS}."
        ));
        config.feed.poll_interval_secs = DEFAULT_POLL_INTERVAL_SECS;
    }

    if config.feed.user_agent.trim().is_empty() {
        config.feed.user_agent = DEFAULT_USER_AGENT.to_string();
    }

    if config.calendar.event_duration_min == 0 {
        warnings.push(format!(
            "calendar.event_duration_min must be positive. Resetting to {DEFAULT_EVENT_DURATION_MIN}."
        ));
        config.calendar.event_duration_min = DEFAULT_EVENT_DURATION_MIN;
    }

    if config.calendar.timezone.parse::<Tz>().is_err() {
        warnings.push(format!(
            "Unknown timezone '{}'. Resetting to {DEFAULT_TIMEZONE}.",
            config.calendar.timezone
        ));
        config.calendar.timezone = DEFAULT_TIMEZONE.to_string();
    }

    if config.calendar.name.trim().is_empty() {
        warnings.push(format!(
            "calendar.name is empty. Resetting to '{DEFAULT_CALENDAR_NAME}'."
        ));
        config.calendar.name = DEFAULT_CALENDAR_NAME.to_string();
    }

    (config, warnings)
}

/// The bot token: `COURIER_DISCORD_TOKEN`, else `discord_token` from
/// `discord_secret.json` in the config directory.
pub fn load_discord_token(paths: &AppPaths) -> Result<String, CourierError> {
    if let Some(token) = env::var(DISCORD_TOKEN_ENV).ok().filter(|t| !t.trim().is_empty()) {
        return Ok(token.trim().to_string());
    }

    let path = paths.discord_secret_file();
    let raw = fs::read_to_string(&path).map_err(|err| {
        CourierError::config(format!(
            "no {DISCORD_TOKEN_ENV} set and {} is unreadable: {err}",
            path.display()
        ))
    })?;
    let value: Value = serde_json::from_str(&raw)?;
    value
        .get("discord_token")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            CourierError::config(format!("{} has no discord_token string", path.display()))
        })
}

/// Path of the service-account key: `COURIER_GOOGLE_SECRET`, else
/// `google_secret.json` in the config directory.
pub fn google_secret_path(paths: &AppPaths) -> PathBuf {
    env::var_os(GOOGLE_SECRET_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| paths.google_secret_file())
}
