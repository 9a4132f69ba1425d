use crate::data_store::{CalendarId, PersonId, PersonImageId};
use chrono::{DateTime, Utc};
use diesel::deserialize::FromSql;
use diesel::prelude::*;
use diesel::query_builder::bind_collector::RawBytesBindCollector;
use diesel::serialize::ToSql;
use diesel::{AsExpression, FromSqlRow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Point in time used as `last_update` for newly created calendars and persons, such that they
/// are picked up by the next refresher iteration.
pub fn never_updated() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

#[derive(Clone, Debug, Queryable, Selectable)]
#[diesel(table_name=super::schema::calendars)]
pub struct Calendar {
    pub uid: CalendarId,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    #[diesel(column_name=sort_order)]
    pub order: i32,
    pub feed_url: String,
    pub event_prefix: Option<String>,
    pub error_msg: Option<String>,
    pub last_update: DateTime<Utc>,
    pub sync: bool,
}

/// The configurable part of a calendar, as provided by the desired-state calendar configuration.
///
/// Used for inserting new calendars as well as for overwriting the configuration of existing
/// ones. The sync state (`last_update`, `error_msg`, `sync`) is never touched by this changeset.
#[derive(Clone, Debug, PartialEq, Insertable, AsChangeset)]
#[diesel(table_name=super::schema::calendars)]
#[diesel(primary_key(uid))]
#[diesel(treat_none_as_null = true)]
pub struct NewCalendar {
    pub uid: CalendarId,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    #[diesel(column_name=sort_order)]
    pub order: i32,
    pub feed_url: String,
    pub event_prefix: Option<String>,
}

#[derive(Clone, Debug, Queryable, Selectable)]
#[diesel(table_name=super::schema::persons)]
pub struct Person {
    pub uid: PersonId,
    pub username: Option<String>,
    pub email: Option<String>,
    pub image_uid: Option<PersonImageId>,
    pub img_width: Option<i32>,
    pub img_height: Option<i32>,
    pub extra_attributes: ExtraAttributes,
    pub error_msg: Option<String>,
    pub last_update: DateTime<Utc>,
    pub sync: bool,
}

impl Person {
    /// The key for looking up this person in the directory. The username is preferred, if known.
    pub fn directory_search_key(&self) -> Option<&str> {
        self.username.as_deref().or(self.email.as_deref())
    }

    /// Human-readable identification of the person for logs and metric labels
    pub fn display_name(&self) -> String {
        self.username
            .clone()
            .or_else(|| self.email.clone())
            .unwrap_or_else(|| format!("#{}", self.uid))
    }
}

impl From<&Person> for dutyboard_api_types::PersonEssentials {
    fn from(value: &Person) -> Self {
        Self {
            uid: value.uid,
            username: value.username.clone(),
            email: value.email.clone(),
        }
    }
}

#[derive(Clone, Debug, Insertable)]
#[diesel(table_name=super::schema::persons)]
pub struct NewPerson {
    pub username: Option<String>,
    pub email: Option<String>,
    pub last_update: DateTime<Utc>,
    pub sync: bool,
}

impl From<&PersonIdentity> for NewPerson {
    fn from(value: &PersonIdentity) -> Self {
        let (username, email) = match value {
            PersonIdentity::Username(u) => (Some(u.clone()), None),
            PersonIdentity::Email(e) => (None, Some(e.clone())),
        };
        Self {
            username,
            email,
            last_update: never_updated(),
            sync: true,
        }
    }
}

/// The identity of a person, as referenced by a calendar feed entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PersonIdentity {
    Username(String),
    Email(String),
}

impl PersonIdentity {
    /// Interpret a raw identity token from a calendar feed.
    ///
    /// A leading `mailto:` scheme is removed. Tokens containing an "@" are treated as email
    /// addresses, all others as usernames. Returns `None` for empty tokens.
    pub fn from_token(token: &str) -> Option<Self> {
        let token = token.trim();
        let token = match token.get(..7) {
            Some(scheme) if scheme.eq_ignore_ascii_case("mailto:") => token[7..].trim(),
            _ => token,
        };
        if token.is_empty() {
            None
        } else if token.contains('@') {
            Some(Self::Email(token.to_owned()))
        } else {
            Some(Self::Username(token.to_owned()))
        }
    }
}

impl std::fmt::Display for PersonIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersonIdentity::Username(u) => write!(f, "username '{}'", u),
            PersonIdentity::Email(e) => write!(f, "email '{}'", e),
        }
    }
}

/// Photo of a person with its pixel dimensions
#[derive(Clone, Debug, PartialEq)]
pub struct PersonImageData {
    pub image_bytes: Vec<u8>,
    pub width: i32,
    pub height: i32,
}

/// Result of a directory lookup, to be written into an existing person
#[derive(Clone, Debug, PartialEq)]
pub struct PersonDirectoryUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub extra_attributes: ExtraAttributes,
    /// New photo of the person. `None` keeps the current photo (if any).
    pub image: Option<PersonImageData>,
}

#[derive(Clone, Debug, Queryable, Selectable)]
#[diesel(table_name=super::schema::person_images)]
pub struct PersonImage {
    pub uid: PersonImageId,
    pub image_bytes: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Queryable, Selectable)]
#[diesel(table_name=super::schema::on_call_events)]
pub struct OnCallEvent {
    pub uid: i32,
    pub calendar_uid: CalendarId,
    pub person_uid: PersonId,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
}

impl OnCallEvent {
    /// Check if the given point in time is within the half-open interval [start, end) of this event
    pub fn covers(&self, time: DateTime<Utc>) -> bool {
        self.start_utc <= time && time < self.end_utc
    }
}

#[derive(Clone, Debug, PartialEq, Insertable)]
#[diesel(table_name=super::schema::on_call_events)]
pub struct NewOnCallEvent {
    pub calendar_uid: CalendarId,
    pub person_uid: PersonId,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
}

/// Additional display information about a person, e.g. the full name or location, keyed by
/// attribute name.
///
/// Stored as a JSON object in the database.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = diesel::sql_types::Jsonb)]
#[serde(transparent)]
pub struct ExtraAttributes(pub BTreeMap<String, ExtraAttribute>);

impl<DB> FromSql<diesel::sql_types::Jsonb, DB> for ExtraAttributes
where
    DB: diesel::backend::Backend,
    serde_json::Value: FromSql<diesel::sql_types::Jsonb, DB>,
{
    fn from_sql(bytes: DB::RawValue<'_>) -> diesel::deserialize::Result<Self> {
        let value = serde_json::Value::from_sql(bytes)?;
        Ok(serde_json::from_value(value)?)
    }
}

impl<DB> ToSql<diesel::sql_types::Jsonb, DB> for ExtraAttributes
where
    DB: diesel::backend::Backend,
    for<'c> DB: diesel::backend::Backend<BindCollector<'c> = RawBytesBindCollector<DB>>,
    serde_json::Value: ToSql<diesel::sql_types::Jsonb, DB>,
{
    fn to_sql<'b>(
        &'b self,
        out: &mut diesel::serialize::Output<'b, '_, DB>,
    ) -> diesel::serialize::Result {
        let value = serde_json::to_value(self)?;
        value.to_sql(&mut out.reborrow())
    }
}

impl From<ExtraAttributes> for Vec<dutyboard_api_types::ExtraInfoOnPerson> {
    fn from(value: ExtraAttributes) -> Self {
        value.0.into_values().map(|a| a.into()).collect()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtraAttribute {
    pub information: String,
    #[serde(default = "default_icon")]
    pub icon: String,
    #[serde(default = "default_icon_color")]
    pub icon_color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

fn default_icon() -> String {
    "FaMinus".to_owned()
}

fn default_icon_color() -> String {
    "black".to_owned()
}

impl ExtraAttribute {
    pub fn new(information: String, icon: Option<String>) -> Self {
        Self {
            information,
            icon: icon.unwrap_or_else(default_icon),
            icon_color: default_icon_color(),
            url: None,
        }
    }
}

impl From<ExtraAttribute> for dutyboard_api_types::ExtraInfoOnPerson {
    fn from(value: ExtraAttribute) -> Self {
        Self {
            information: value.information,
            icon: value.icon,
            icon_color: value.icon_color,
            url: value.url,
        }
    }
}

/// Aggregated sync state of all calendars or all persons
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EntityStatistics {
    pub total: i64,
    /// Number of entities with `last_update` before the staleness threshold
    pub outdated: i64,
    /// Number of entities with an error message from their last sync attempt
    pub with_errors: i64,
}
