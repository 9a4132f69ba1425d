//! The duty board configuration file
//!
//! The configuration is a JSON file (path given by the `DUTY_BOARD_CONFIG` environment variable),
//! containing the desired state of the calendars, the refresher timing, the selection of the
//! directory and notifier implementations and the display settings of the web frontend. All
//! sections except `calendars` are optional and fall back to sensible defaults.

use crate::data_store::models::NewCalendar;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Debug, Deserialize)]
pub struct BoardConfig {
    pub calendars: Vec<DutyCalendarConfig>,
    /// Order of the calendar categories in the frontend menu. Categories not listed here are
    /// appended in alphabetical order.
    #[serde(default)]
    pub category_order: Vec<String>,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub directory: Option<DirectoryConfig>,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

impl BoardConfig {
    /// Check all calendar configurations and the uniqueness of their uids
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut uids = HashSet::new();
        for calendar in self.calendars.iter() {
            calendar.validate()?;
            if !uids.insert(calendar.uid.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "Calendar uid '{}' is used more than once",
                    calendar.uid
                )));
            }
        }
        self.sync.validate()?;
        if !(1..=MAX_LOOK_AHEAD_DAYS).contains(&self.feed.look_ahead_days) {
            return Err(ConfigError::Invalid(format!(
                "feed.look_ahead_days must be within 1..={}",
                MAX_LOOK_AHEAD_DAYS
            )));
        }
        Ok(())
    }

    /// The desired state of the calendars table
    pub fn calendar_models(&self) -> Vec<NewCalendar> {
        self.calendars.iter().cloned().map(|c| c.into()).collect()
    }

    /// All calendar categories, ordered by the configured `category_order` first
    pub fn ordered_categories(&self) -> Vec<String> {
        let mut result: Vec<String> = self
            .category_order
            .iter()
            .filter(|c| self.calendars.iter().any(|cal| &cal.category == *c))
            .cloned()
            .collect();
        let mut remaining: Vec<String> = self
            .calendars
            .iter()
            .map(|c| c.category.clone())
            .filter(|c| !self.category_order.contains(c))
            .collect();
        remaining.sort();
        remaining.dedup();
        result.extend(remaining);
        result
    }
}

/// Read, parse and validate the configuration file
pub fn load_board_config(path: &Path) -> Result<BoardConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_owned(),
        error: e,
    })?;
    let config: BoardConfig = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Load the configuration file given by the `DUTY_BOARD_CONFIG` environment variable
pub fn load_board_config_from_env() -> Result<BoardConfig, crate::cli_error::CliError> {
    Ok(load_board_config(
        &crate::setup::get_board_config_path_from_env()?,
    )?)
}

/// Desired configuration of a single duty calendar
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct DutyCalendarConfig {
    /// Stable identifier. Renaming a calendar while keeping its uid keeps its events.
    pub uid: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(alias = "icalendar_url")]
    pub feed_url: String,
    #[serde(default = "default_category")]
    pub category: String,
    /// Display priority. Lower numbers are shown first.
    #[serde(default = "default_order")]
    pub order: i32,
    /// Only events whose summary starts with this prefix are taken into account, e.g. "duty:"
    #[serde(default)]
    pub event_prefix: Option<String>,
}

fn default_category() -> String {
    "default".to_owned()
}

fn default_order() -> i32 {
    99999
}

impl DutyCalendarConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_length("uid", &self.uid, &self.uid, 1, 50)?;
        check_length("name", &self.uid, &self.name, 1, 200)?;
        if let Some(description) = &self.description {
            check_length("description", &self.uid, description, 0, 5000)?;
        }
        check_length("feed_url", &self.uid, &self.feed_url, 1, 500)?;
        url::Url::parse(&self.feed_url).map_err(|e| {
            ConfigError::Invalid(format!(
                "Calendar '{}': feed_url is not a valid URL: {}",
                self.uid, e
            ))
        })?;
        check_length("category", &self.uid, &self.category, 1, 50)?;
        if !(0..=9_999_999).contains(&self.order) {
            return Err(ConfigError::Invalid(format!(
                "Calendar '{}': order must be within 0..=9999999",
                self.uid
            )));
        }
        if let Some(prefix) = &self.event_prefix {
            check_length("event_prefix", &self.uid, prefix, 0, 50)?;
        }
        Ok(())
    }
}

fn check_length(
    field: &str,
    calendar_uid: &str,
    value: &str,
    min: usize,
    max: usize,
) -> Result<(), ConfigError> {
    let length = value.chars().count();
    if length < min || length > max {
        return Err(ConfigError::Invalid(format!(
            "Calendar '{}': {} must have a length between {} and {} characters",
            calendar_uid, field, min, max
        )));
    }
    Ok(())
}

impl From<DutyCalendarConfig> for NewCalendar {
    fn from(value: DutyCalendarConfig) -> Self {
        Self {
            uid: value.uid,
            name: value.name,
            description: value.description,
            category: value.category,
            order: value.order,
            feed_url: value.feed_url,
            event_prefix: value.event_prefix,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Minimum time between two refreshes of the same calendar
    pub calendar_update_frequency_secs: u64,
    /// Minimum time between two refreshes of the same person
    pub person_update_frequency_secs: u64,
    /// Interval of the duty-change watcher
    pub duty_check_interval_secs: u64,
    /// Interval of collecting the entity statistics gauges in the refreshers
    pub metrics_update_interval_secs: u64,
    /// Pause of the refresher loops when there is nothing to refresh
    pub idle_delay_millis: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            calendar_update_frequency_secs: 86400,
            person_update_frequency_secs: 3600,
            duty_check_interval_secs: 60,
            metrics_update_interval_secs: 60,
            idle_delay_millis: 1000,
        }
    }
}

/// Upper bound of all periods in the `sync` section: one year
const MAX_SYNC_PERIOD_SECS: u64 = 366 * 24 * 3600;
const MAX_LOOK_AHEAD_DAYS: u32 = 366;

impl SyncConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            (
                "calendar_update_frequency_secs",
                self.calendar_update_frequency_secs,
            ),
            (
                "person_update_frequency_secs",
                self.person_update_frequency_secs,
            ),
            ("duty_check_interval_secs", self.duty_check_interval_secs),
            (
                "metrics_update_interval_secs",
                self.metrics_update_interval_secs,
            ),
        ] {
            if value > MAX_SYNC_PERIOD_SECS {
                return Err(ConfigError::Invalid(format!(
                    "sync.{} must not exceed {}",
                    field, MAX_SYNC_PERIOD_SECS
                )));
            }
        }
        if self.idle_delay_millis == 0 || self.idle_delay_millis > MAX_SYNC_PERIOD_SECS * 1000 {
            return Err(ConfigError::Invalid(
                "sync.idle_delay_millis must be positive and at most one year".to_owned(),
            ));
        }
        Ok(())
    }

    pub fn calendar_update_frequency(&self) -> chrono::TimeDelta {
        chrono::TimeDelta::seconds(self.calendar_update_frequency_secs as i64)
    }
    pub fn person_update_frequency(&self) -> chrono::TimeDelta {
        chrono::TimeDelta::seconds(self.person_update_frequency_secs as i64)
    }
    pub fn duty_check_interval(&self) -> Duration {
        Duration::from_secs(self.duty_check_interval_secs)
    }
    pub fn metrics_update_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_update_interval_secs)
    }
    pub fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_delay_millis)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub timeout_secs: u64,
    /// Events starting later than this number of days from now are ignored
    pub look_ahead_days: u32,
    /// Maximum number of (earliest) events taken from a feed
    pub max_entries: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            look_ahead_days: 28,
            max_entries: 10,
        }
    }
}

/// Selection and settings of the directory which provides the details about persons
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DirectoryConfig {
    Ldap(LdapDirectoryConfig),
    /// A JSON file with person records, see [crate::directory::static_file]
    Static { path: PathBuf },
}

#[derive(Clone, Debug, Deserialize)]
pub struct LdapDirectoryConfig {
    /// e.g. "ldaps://ldap.example.com:636"
    pub url: String,
    /// e.g. "dc=example,dc=com"
    pub base_dn: String,
    #[serde(default = "default_user_ou")]
    pub user_ou: String,
    /// Attribute holding the account name, compared with username search keys
    #[serde(default = "default_account_attribute")]
    pub account_attribute: String,
    #[serde(default = "default_ldap_attributes")]
    pub attributes: Vec<LdapAttributeMapping>,
    #[serde(default = "default_ldap_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_user_ou() -> String {
    "people".to_owned()
}

fn default_account_attribute() -> String {
    "uid".to_owned()
}

fn default_ldap_timeout_secs() -> u64 {
    5
}

/// Mapping of an LDAP attribute to an extra attribute of the person
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct LdapAttributeMapping {
    pub name: String,
    pub ldap_attribute: String,
    #[serde(default)]
    pub icon: Option<String>,
}

fn default_ldap_attributes() -> Vec<LdapAttributeMapping> {
    vec![
        LdapAttributeMapping {
            name: "fullName".to_owned(),
            ldap_attribute: "cn".to_owned(),
            icon: Some("FaUserCircle".to_owned()),
        },
        LdapAttributeMapping {
            name: "location".to_owned(),
            ldap_attribute: "l".to_owned(),
            icon: Some("FaMapMarkerAlt".to_owned()),
        },
    ]
}

/// Selection of the duty-change notification callback
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotifierConfig {
    #[default]
    Log,
    Webhook {
        url: String,
        #[serde(default = "default_webhook_timeout_secs")]
        timeout_secs: u64,
    },
}

fn default_webhook_timeout_secs() -> u64 {
    10
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Timezone used for formatting timestamps if the client does not request a valid one
    pub default_timezone: String,
    pub text_color: String,
    pub background_color: String,
    pub git_repository_url: Option<String>,
    pub enable_admin_button: bool,
    pub announcement_text_color: String,
    pub announcement_background_color: String,
    pub announcements: Vec<String>,
    pub footer_html: Option<String>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            default_timezone: "UTC".to_owned(),
            text_color: "white".to_owned(),
            background_color: "#3C9C2D".to_owned(),
            git_repository_url: None,
            enable_admin_button: false,
            announcement_text_color: "#FFFFFF".to_owned(),
            announcement_background_color: "#FF0000".to_owned(),
            announcements: Vec::new(),
            footer_html: None,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        error: std::io::Error,
    },
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io { path, error } => {
                write!(
                    f,
                    "Could not read configuration file {}: {}",
                    path.display(),
                    error
                )
            }
            ConfigError::Parse(e) => write!(f, "Could not parse configuration file: {}", e),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calendar(uid: &str) -> DutyCalendarConfig {
        DutyCalendarConfig {
            uid: uid.to_owned(),
            name: "Infrastructure".to_owned(),
            description: None,
            feed_url: "https://calendar.example.com/infra.ics".to_owned(),
            category: default_category(),
            order: default_order(),
            event_prefix: None,
        }
    }

    #[test]
    fn test_parse_minimal_config() {
        let config: BoardConfig = serde_json::from_str(
            r#"{"calendars": [{"uid": "infra", "name": "Infra", "icalendar_url": "https://example.com/a.ics"}]}"#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.calendars[0].category, "default");
        assert_eq!(config.calendars[0].order, 99999);
        assert_eq!(config.sync.calendar_update_frequency_secs, 86400);
        assert_eq!(config.sync.person_update_frequency_secs, 3600);
        assert_eq!(config.feed.max_entries, 10);
        assert!(config.directory.is_none());
        assert!(matches!(config.notifier, NotifierConfig::Log));
        assert_eq!(config.display.default_timezone, "UTC");
    }

    #[test]
    fn test_parse_directory_and_notifier() {
        let config: BoardConfig = serde_json::from_str(
            r#"{
                "calendars": [],
                "directory": {"type": "ldap", "url": "ldap://localhost:389", "base_dn": "dc=example,dc=com"},
                "notifier": {"type": "webhook", "url": "https://chat.example.com/hook"}
            }"#,
        )
        .unwrap();
        match config.directory {
            Some(DirectoryConfig::Ldap(ldap)) => {
                assert_eq!(ldap.user_ou, "people");
                assert_eq!(ldap.account_attribute, "uid");
                assert_eq!(ldap.attributes.len(), 2);
                assert_eq!(ldap.attributes[0].ldap_attribute, "cn");
            }
            _ => panic!("Expected LDAP directory config"),
        }
        match config.notifier {
            NotifierConfig::Webhook { url, timeout_secs } => {
                assert_eq!(url, "https://chat.example.com/hook");
                assert_eq!(timeout_secs, 10);
            }
            _ => panic!("Expected webhook notifier config"),
        }
    }

    #[test]
    fn test_example_config() {
        let config: BoardConfig =
            serde_json::from_str(include_str!("../config/board.example.json")).unwrap();
        config.validate().unwrap();
        assert_eq!(config.calendars.len(), 2);
        assert_eq!(
            config.ordered_categories(),
            vec!["Infrastructure", "Big Data"]
        );
        assert_eq!(config.sync.idle_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_validate_calendar() {
        assert!(calendar("infra").validate().is_ok());

        let mut c = calendar(&"x".repeat(51));
        assert!(c.validate().is_err());
        c = calendar("infra");
        c.order = 10_000_000;
        assert!(c.validate().is_err());
        c = calendar("infra");
        c.order = -1;
        assert!(c.validate().is_err());
        c = calendar("infra");
        c.description = Some("d".repeat(5001));
        assert!(c.validate().is_err());
        c = calendar("infra");
        c.event_prefix = Some("p".repeat(51));
        assert!(c.validate().is_err());
        c = calendar("infra");
        c.feed_url = "not a url".to_owned();
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_validate_sync_periods() {
        let parse = |sync: &str| -> BoardConfig {
            serde_json::from_str(&format!(r#"{{"calendars": [], "sync": {}}}"#, sync)).unwrap()
        };

        assert!(parse(r#"{"calendar_update_frequency_secs": 31622400}"#)
            .validate()
            .is_ok());
        assert!(matches!(
            parse(r#"{"calendar_update_frequency_secs": 31622401}"#).validate(),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            parse(r#"{"person_update_frequency_secs": 18446744073709551615}"#).validate(),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            parse(r#"{"idle_delay_millis": 0}"#).validate(),
            Err(ConfigError::Invalid(_))
        ));

        let config: BoardConfig =
            serde_json::from_str(r#"{"calendars": [], "feed": {"look_ahead_days": 100000}}"#)
                .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_duplicate_uids() {
        let config = BoardConfig {
            calendars: vec![calendar("infra"), calendar("infra")],
            category_order: vec![],
            sync: Default::default(),
            feed: Default::default(),
            directory: None,
            notifier: Default::default(),
            display: Default::default(),
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_ordered_categories() {
        let mut ops = calendar("ops");
        ops.category = "operations".to_owned();
        let mut data = calendar("data");
        data.category = "data".to_owned();
        let config = BoardConfig {
            calendars: vec![calendar("infra"), ops, data],
            category_order: vec!["operations".to_owned(), "unused".to_owned()],
            sync: Default::default(),
            feed: Default::default(),
            directory: None,
            notifier: Default::default(),
            display: Default::default(),
        };
        assert_eq!(
            config.ordered_categories(),
            vec!["operations", "data", "default"]
        );
    }
}
