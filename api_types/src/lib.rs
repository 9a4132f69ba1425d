use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PersonEssentials {
    pub uid: i32,
    pub username: Option<String>,
    pub email: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScheduledEvent {
    pub start_event: String,
    pub end_event: String,
    pub person_uid: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CalendarSchedule {
    pub uid: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub order: i32,
    pub last_update: String,
    pub error_msg: String,
    pub sync: bool,
    pub events: Vec<ScheduledEvent>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScheduleConfig {
    pub timezone: String,
    pub text_color: String,
    pub background_color: String,
    pub categories: Vec<String>,
    pub git_repository_url: Option<String>,
    pub enable_admin_button: bool,
    pub announcement_text_color: String,
    pub announcement_background_color: String,
    pub announcements: Vec<String>,
    pub footer_html: Option<String>,
}

/// Response of the schedule endpoint: all calendars with their current and upcoming duty events
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CurrentSchedule {
    pub config: ScheduleConfig,
    pub calendars: Vec<CalendarSchedule>,
    /// Essentials of every person referenced by one of the events, keyed by person uid
    pub persons: BTreeMap<i32, PersonEssentials>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ExtraInfoOnPerson {
    pub information: String,
    pub icon: String,
    pub icon_color: String,
    pub url: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PersonResponse {
    pub uid: i32,
    pub username: Option<String>,
    pub email: Option<String>,
    /// Name of the image resource below `/api/v1/person_img/`, if the person has a photo
    pub img_filename: Option<String>,
    pub img_width: Option<i32>,
    pub img_height: Option<i32>,
    pub extra_attributes: Vec<ExtraInfoOnPerson>,
    pub last_update: String,
    pub error_msg: String,
    pub sync: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HealthResponse {
    pub result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Payload of the webhook, which is called whenever the set of persons on duty for a calendar
/// changes
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DutyChangeNotification {
    pub calendar_uid: String,
    pub calendar_name: String,
    pub persons: Vec<PersonEssentials>,
    pub changed_at: DateTime<Utc>,
}
