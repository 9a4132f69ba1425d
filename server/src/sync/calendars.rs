//! The calendar refresher: keeps the on-call events of the duty calendars in sync with their feeds

use super::SyncOutcome;
use crate::config::BoardConfig;
use crate::data_store::models::{Calendar, NewOnCallEvent, PersonIdentity};
use crate::data_store::{CalendarConfigSyncResult, DutyBoardStore, StoreError};
use crate::feed::{FeedAdapter, FeedError};
use crate::metrics;
use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, info, warn};
use std::fmt::{Display, Formatter};

/// Reasons for a failed refresh of a single calendar. Recorded in the calendar's `error_msg`.
#[derive(Debug)]
pub enum CalendarSyncError {
    Feed(FeedError),
    /// A feed entry references a person with an unusable identity token
    InvalidIdentity(String),
    Store(StoreError),
}

impl Display for CalendarSyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CalendarSyncError::Feed(e) => write!(f, "{}", e),
            CalendarSyncError::InvalidIdentity(token) => {
                write!(f, "Invalid person identification in calendar feed: '{}'", token)
            }
            CalendarSyncError::Store(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CalendarSyncError {}

impl From<FeedError> for CalendarSyncError {
    fn from(value: FeedError) -> Self {
        Self::Feed(value)
    }
}

impl From<StoreError> for CalendarSyncError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Apply the calendar configuration from the board configuration to the database.
pub fn sync_calendar_configurations(
    store: &dyn DutyBoardStore,
    config: &BoardConfig,
) -> Result<CalendarConfigSyncResult, StoreError> {
    let result = store
        .get_facade()?
        .sync_calendar_configurations(config.calendar_models())?;
    info!(
        "Synced calendar configuration: {} created, {} updated, {} deleted.",
        result.created, result.updated, result.deleted
    );
    Ok(result)
}

/// Refresh the calendar which has not been updated for the longest time, if its last update is
/// at least `update_frequency` ago.
///
/// Failures of the feed or of storing the new events are recorded in the calendar's `error_msg`.
/// Only errors while selecting the calendar or recording the result are returned.
pub fn update_the_most_outdated_calendar(
    store: &dyn DutyBoardStore,
    feed: &dyn FeedAdapter,
    update_frequency: TimeDelta,
    now: DateTime<Utc>,
) -> Result<SyncOutcome, StoreError> {
    let Some(calendar) = store
        .get_facade()?
        .get_most_outdated_calendar(now - update_frequency)?
    else {
        return Ok(SyncOutcome::NothingToUpdate);
    };
    debug!("Refreshing calendar '{}' ({})", calendar.name, calendar.uid);

    let result = refresh_calendar(store, feed, &calendar);
    let (outcome, error_msg) = match result {
        Ok(num_events) => {
            info!(
                "Refreshed calendar '{}': {} events.",
                calendar.name, num_events
            );
            (SyncOutcome::Updated, None)
        }
        Err(e) => {
            warn!("Refreshing calendar '{}' failed: {}", calendar.name, e);
            (SyncOutcome::Failed, Some(e.to_string()))
        }
    };
    if let Err(e) = store
        .get_facade()
        .and_then(|mut facade| facade.finish_calendar_sync(&calendar.uid, error_msg, now))
    {
        metrics::record_calendar_refresh(&calendar.name, false);
        return Err(e);
    }
    metrics::record_calendar_refresh(&calendar.name, outcome == SyncOutcome::Updated);
    Ok(outcome)
}

/// Fetch the feed of the calendar and replace its events. Returns the number of new events.
fn refresh_calendar(
    store: &dyn DutyBoardStore,
    feed: &dyn FeedAdapter,
    calendar: &Calendar,
) -> Result<usize, CalendarSyncError> {
    // The feed is fetched before acquiring a database connection
    let entries = feed.fetch_entries(&calendar.feed_url, calendar.event_prefix.as_deref())?;

    let mut facade = store.get_facade()?;
    let mut events = Vec::with_capacity(entries.len());
    for entry in entries {
        let identity = PersonIdentity::from_token(&entry.identity_token)
            .ok_or_else(|| CalendarSyncError::InvalidIdentity(entry.identity_token.clone()))?;
        let person = facade.get_or_create_person(&identity)?;
        events.push(NewOnCallEvent {
            calendar_uid: calendar.uid.clone(),
            person_uid: person.uid,
            start_utc: entry.start,
            end_utc: entry.end,
        });
    }
    let num_events = events.len();
    facade.replace_calendar_events(&calendar.uid, events)?;
    Ok(num_events)
}

/// Update the calendar statistics gauges
pub fn collect_calendar_metrics(
    store: &dyn DutyBoardStore,
    update_frequency: TimeDelta,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    let statistics = store
        .get_facade()?
        .get_calendar_statistics(now - update_frequency)?;
    metrics::set_calendar_statistics(&statistics);
    Ok(())
}
