//! The duty-change watcher: periodically determines the persons on duty for every calendar and
//! calls the notifier whenever that set changes.
//!
//! The snapshot of the last known on-duty sets only lives in the watcher process. After a
//! restart, every calendar is notified once.

use crate::data_store::models::{Calendar, Person};
use crate::data_store::{CalendarId, DutyBoardStore, PersonId, StoreError};
use crate::metrics;
use crate::notify::DutyChangeNotifier;
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

/// The persons on duty per calendar
pub type DutySnapshot = HashMap<CalendarId, BTreeSet<PersonId>>;

/// A calendar whose set of persons on duty has changed
#[derive(Debug)]
pub struct DutyChange {
    pub calendar: Calendar,
    /// The persons on duty now. Empty if nobody is on duty anymore.
    pub persons: Vec<Person>,
}

/// Compare the persons on duty at `now` with the `previous` snapshot.
///
/// Returns the changes in calendar display order and the new snapshot. Calendars missing in the
/// previous snapshot are always reported as changed. Calendars which don't exist anymore are not
/// part of the new snapshot.
pub fn detect_duty_changes(
    store: &dyn DutyBoardStore,
    previous: &DutySnapshot,
    now: DateTime<Utc>,
) -> Result<(Vec<DutyChange>, DutySnapshot), StoreError> {
    let mut facade = store.get_facade()?;
    let calendars = facade.get_calendars()?;
    let mut on_duty_now = DutySnapshot::new();
    for event in facade.get_events_covering(now)? {
        on_duty_now
            .entry(event.calendar_uid)
            .or_default()
            .insert(event.person_uid);
    }

    let mut snapshot = DutySnapshot::with_capacity(calendars.len());
    let mut changes = Vec::new();
    for calendar in calendars {
        let current = on_duty_now.remove(&calendar.uid).unwrap_or_default();
        if previous.get(&calendar.uid) != Some(&current) {
            let person_uids: Vec<PersonId> = current.iter().copied().collect();
            let mut persons = facade.get_persons(&person_uids)?;
            persons.sort_by_key(|p| p.uid);
            snapshot.insert(calendar.uid.clone(), current);
            changes.push(DutyChange { calendar, persons });
        } else {
            snapshot.insert(calendar.uid.clone(), current);
        }
    }
    Ok((changes, snapshot))
}

/// Call the notifier for each change. A failing notification doesn't keep the remaining ones
/// from being sent. Returns the number of failed notifications.
pub fn notify_duty_changes(changes: &[DutyChange], notifier: &dyn DutyChangeNotifier) -> usize {
    let mut failed = 0;
    for change in changes {
        match notifier.on_duty_changed(&change.calendar, &change.persons) {
            Ok(()) => metrics::record_duty_callback(&change.calendar.name, true),
            Err(e) => {
                error!(
                    "Duty change notification for calendar '{}' failed: {}",
                    change.calendar.name, e
                );
                metrics::record_duty_callback(&change.calendar.name, false);
                failed += 1;
            }
        }
    }
    failed
}

/// Keeps the snapshot between the watcher runs
#[derive(Default)]
pub struct DutyWatcher {
    snapshot: DutySnapshot,
}

impl DutyWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Detect and notify the duty changes since the last check. Returns the number of changes.
    ///
    /// The snapshot is advanced even if notifications fail, so a failed notification is not
    /// repeated.
    pub fn check(
        &mut self,
        store: &dyn DutyBoardStore,
        notifier: &dyn DutyChangeNotifier,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        metrics::record_duty_check();
        let (changes, snapshot) = detect_duty_changes(store, &self.snapshot, now)?;
        self.snapshot = snapshot;
        if changes.is_empty() {
            debug!("No duty changes.");
            return Ok(0);
        }
        info!("Duty changed for {} calendar(s).", changes.len());
        notify_duty_changes(&changes, notifier);
        Ok(changes.len())
    }

    /// Check for duty changes every `interval`, forever
    pub fn run(
        mut self,
        store: &dyn DutyBoardStore,
        notifier: &dyn DutyChangeNotifier,
        interval: Duration,
    ) -> ! {
        loop {
            if let Err(e) = self.check(store, notifier, Utc::now()) {
                error!("Duty watcher: Unexpected store error, retrying: {}", e);
            }
            std::thread::sleep(interval);
        }
    }
}
