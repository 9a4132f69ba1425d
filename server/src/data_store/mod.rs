//! The persistence part of the duty board: the database interface
//!
//! The primary entry point to this module is the function [get_store_from_env], which returns an
//! object implementing the [DutyBoardStore] trait. This object can be shared between threads (e.g.
//! in the global web application state) and be used to create [DutyBoardStoreFacade] instances for
//! interaction with the database. Every facade method is executed atomically, i.e. within its own
//! database transaction, using the data models from the [models] module.
//!
//! The primary implementation of [DutyBoardStore] ([postgres::PgDataStore]) wraps a PostgreSQL
//! connection pool and its corresponding [DutyBoardStoreFacade] objects
//! ([postgres::PgDataStoreFacade]) hold one pooled connection each, using the Diesel query DSL for
//! implementing the database interaction.
//!
//! There is also a mock implementation for unittests.

use crate::cli_error::CliError;
use crate::cli_error::CliError::UnexpectedStoreError;
use crate::setup;
use chrono::{DateTime, Utc};
use std::fmt::Debug;

pub mod models;
mod postgres;
mod schema;
#[cfg(test)]
pub mod store_mock;

pub use setup::get_database_url_from_env;

/// Get a [DutyBoardStore] instance, according to the "DATABASE_URL" environment variable.
///
/// The DATABASE_URL must be a PosgreSQL connection url, following the schema
/// "postgres://{user}:{password}@{host}/{database}".
pub fn get_store_from_env() -> Result<impl DutyBoardStore, CliError> {
    postgres::PgDataStore::new(&setup::get_database_url_from_env()?)
        .map_err(|err| UnexpectedStoreError(err.to_string()))
}

pub type CalendarId = String;
pub type PersonId = i32;
pub type PersonImageId = i32;

/// Summary of the changes applied by [DutyBoardStoreFacade::sync_calendar_configurations]
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CalendarConfigSyncResult {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

pub trait DutyBoardStoreFacade {
    /// Apply the desired-state calendar configuration: create all calendars that do not exist yet,
    /// overwrite the configuration of existing ones and delete all calendars (including their
    /// events) which are not part of the given list.
    ///
    /// The sync state (last_update, error_msg, sync flag) of existing calendars is kept.
    fn sync_calendar_configurations(
        &mut self,
        calendars: Vec<models::NewCalendar>,
    ) -> Result<CalendarConfigSyncResult, StoreError>;

    /// Get all calendars, sorted by their display order (and uid for equal order)
    fn get_calendars(&mut self) -> Result<Vec<models::Calendar>, StoreError>;
    fn get_calendar(&mut self, calendar_uid: &str) -> Result<models::Calendar, StoreError>;
    /// Get the calendar with `sync` enabled and the oldest `last_update`, if that is at or before
    /// the given point in time.
    fn get_most_outdated_calendar(
        &mut self,
        updated_before: DateTime<Utc>,
    ) -> Result<Option<models::Calendar>, StoreError>;
    /// Replace all events of the calendar with the given ones, atomically.
    fn replace_calendar_events(
        &mut self,
        calendar_uid: &str,
        events: Vec<models::NewOnCallEvent>,
    ) -> Result<(), StoreError>;
    /// Record the result of a sync attempt: set the error message (or clear it with `None`) and
    /// the last_update timestamp.
    fn finish_calendar_sync(
        &mut self,
        calendar_uid: &str,
        error_msg: Option<String>,
        last_update: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    fn get_calendar_statistics(
        &mut self,
        updated_before: DateTime<Utc>,
    ) -> Result<models::EntityStatistics, StoreError>;

    /// Find the person with the given identity (email addresses are compared with the email
    /// field, usernames with the username field) or create a new one, which is immediately
    /// eligible for the person refresher.
    fn get_or_create_person(
        &mut self,
        identity: &models::PersonIdentity,
    ) -> Result<models::Person, StoreError>;
    fn get_person(&mut self, person_uid: PersonId) -> Result<models::Person, StoreError>;
    /// Get all persons with the given uids. Non-existing uids are ignored.
    fn get_persons(&mut self, person_uids: &[PersonId]) -> Result<Vec<models::Person>, StoreError>;
    /// Get the person with `sync` enabled and the oldest `last_update`, if that is at or before
    /// the given point in time.
    fn get_most_outdated_person(
        &mut self,
        updated_before: DateTime<Utc>,
    ) -> Result<Option<models::Person>, StoreError>;
    /// Overwrite the identity and display attributes of the person with the result of a directory
    /// lookup. If the update contains an image, it replaces the current image of the person (or is
    /// stored as a new image).
    fn update_person_from_directory(
        &mut self,
        person_uid: PersonId,
        update: models::PersonDirectoryUpdate,
    ) -> Result<(), StoreError>;
    /// Merge all other persons representing the given identity into the person `person_uid`.
    ///
    /// Duplicates are all persons with a different uid whose username equals `username` or whose
    /// email equals `email` (only the given halves are compared). All events of the duplicates are
    /// moved to `person_uid`, then the duplicates (and their images) are deleted.
    ///
    /// Returns the uids of the deleted duplicates.
    fn merge_duplicate_persons(
        &mut self,
        person_uid: PersonId,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Vec<PersonId>, StoreError>;
    /// Record the result of a sync attempt, see [DutyBoardStoreFacade::finish_calendar_sync]
    fn finish_person_sync(
        &mut self,
        person_uid: PersonId,
        error_msg: Option<String>,
        last_update: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    fn get_person_statistics(
        &mut self,
        updated_before: DateTime<Utc>,
    ) -> Result<models::EntityStatistics, StoreError>;
    fn get_person_image(
        &mut self,
        image_uid: PersonImageId,
    ) -> Result<models::PersonImage, StoreError>;
    /// Delete the image. Fails with [StoreError::ConstraintViolation] while a person refers to it.
    fn delete_person_image(&mut self, image_uid: PersonImageId) -> Result<(), StoreError>;

    /// Get all events which end at or after the given point in time, sorted by start
    fn get_events_ending_after(
        &mut self,
        time: DateTime<Utc>,
    ) -> Result<Vec<models::OnCallEvent>, StoreError>;
    /// Get all events whose half-open interval [start, end) contains the given point in time
    fn get_events_covering(
        &mut self,
        time: DateTime<Utc>,
    ) -> Result<Vec<models::OnCallEvent>, StoreError>;
    /// Get all events of the given calendar, sorted by start
    fn get_calendar_events(
        &mut self,
        calendar_uid: &str,
    ) -> Result<Vec<models::OnCallEvent>, StoreError>;

    /// Execute a trivial query to check if the database is reachable
    fn check_connection(&mut self) -> Result<(), StoreError>;
}

pub trait DutyBoardStore: Send + Sync {
    fn get_facade<'a>(&'a self) -> Result<Box<dyn DutyBoardStoreFacade + 'a>, StoreError>;
}

#[derive(Debug)]
pub enum StoreError {
    /// Connection the database failed. See string description for details.
    ConnectionError(String),
    /// The query could not be executed because of some error not covered by the other members (see
    /// string description)
    QueryError(diesel::result::Error),
    /// Database transaction could not be commited due to a conflicting concurrent transaction
    TransactionConflict,
    /// The requested entity does not exist
    NotExisting,
    /// The operation violates a referential or check constraint, e.g. deleting an image which is
    /// still referenced by a person.
    ConstraintViolation(String),
    /// The provided data is invalid, i.e. it does not match the expected ranges or violates a
    /// uniqueness constraint. See string description for details.
    InvalidInputData(String),
    /// Some data queried from the database could not be deserialized. See string description for
    /// details.
    InvalidDataInDatabase(String),
}

impl From<diesel::result::Error> for StoreError {
    fn from(error: diesel::result::Error) -> Self {
        match error {
            diesel::result::Error::NotFound => Self::NotExisting,
            diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::SerializationFailure,
                _,
            ) => Self::TransactionConflict,
            diesel::result::Error::DatabaseError(
                e @ diesel::result::DatabaseErrorKind::ForeignKeyViolation
                | e @ diesel::result::DatabaseErrorKind::CheckViolation
                | e @ diesel::result::DatabaseErrorKind::NotNullViolation,
                info,
            ) => Self::ConstraintViolation(format!("{:?}: {}", e, info.message())),
            diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                info,
            ) => Self::InvalidInputData(info.message().to_owned()),
            diesel::result::Error::SerializationError(e) => Self::InvalidInputData(e.to_string()),
            diesel::result::Error::DeserializationError(e) => {
                Self::InvalidDataInDatabase(e.to_string())
            }
            _ => Self::QueryError(error),
        }
    }
}

impl From<r2d2::Error> for StoreError {
    fn from(error: r2d2::Error) -> Self {
        Self::ConnectionError(error.to_string())
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionError(e) => write!(f, "Error connecting to database: {}", e),
            Self::QueryError(e) => write!(f, "Error while executing database query: {}", e),
            Self::TransactionConflict => f.write_str("Database transaction could not be commited due to a conflicting concurrent transaction"),
            Self::NotExisting => f.write_str("Database record does not exist."),
            Self::ConstraintViolation(e) => {
                write!(f, "Database constraint violated: {}", e)
            }
            Self::InvalidInputData(e) => {
                write!(f, "Data to be stored in database is not valid: {}", e)
            }
            StoreError::InvalidDataInDatabase(e) => {
                write!(f, "Data queried from database could not be deserialized: {}", e)
            },
        }
    }
}

impl std::error::Error for StoreError {}
