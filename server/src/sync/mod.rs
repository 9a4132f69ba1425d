//! The background workers, which reconcile the local database with the external calendar feeds
//! and the user directory, and watch for changes of the persons on duty.
//!
//! Each worker is a separate long-running process (see the cli subcommands) with a polling loop.
//! The workers don't share any in-process state. They only coordinate through the database: each
//! iteration uses fresh store facades and every store operation is atomic. Errors concerning a
//! single calendar or person are recorded in its `error_msg` and never stop the loop. Unexpected
//! store errors (e.g. a lost database connection) are logged and the iteration is retried after the
//! idle delay.

use crate::data_store::StoreError;
use log::{debug, error};
use std::time::{Duration, Instant};

pub mod calendars;
pub mod duty_watcher;
pub mod persons;

/// Result of a single refresher iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No entity is outdated at the moment
    NothingToUpdate,
    /// The most outdated entity has been refreshed successfully
    Updated,
    /// Refreshing the most outdated entity failed. The error has been recorded in the entity.
    Failed,
}

/// Driver of a refresher loop: repeatedly refreshes the most outdated entity and periodically
/// collects the entity statistics.
pub struct PollingLoop {
    name: &'static str,
    idle_delay: Duration,
    metrics_interval: Duration,
    last_metrics_collection: Option<Instant>,
}

impl PollingLoop {
    pub fn new(name: &'static str, idle_delay: Duration, metrics_interval: Duration) -> Self {
        Self {
            name,
            idle_delay,
            metrics_interval,
            last_metrics_collection: None,
        }
    }

    /// Execute a single loop iteration and return the time to wait before the next one.
    pub fn step<F, M>(&mut self, iteration: F, collect_metrics: M) -> Option<Duration>
    where
        F: FnOnce() -> Result<SyncOutcome, StoreError>,
        M: FnOnce() -> Result<(), StoreError>,
    {
        let metrics_due = self
            .last_metrics_collection
            .map_or(true, |t| t.elapsed() >= self.metrics_interval);
        if metrics_due {
            if let Err(e) = collect_metrics() {
                error!("{}: Could not collect statistics: {}", self.name, e);
            }
            self.last_metrics_collection = Some(Instant::now());
        }

        match iteration() {
            Ok(SyncOutcome::NothingToUpdate) => {
                debug!("{}: Nothing to update.", self.name);
                Some(self.idle_delay)
            }
            Ok(SyncOutcome::Updated) | Ok(SyncOutcome::Failed) => None,
            Err(e) => {
                error!("{}: Unexpected store error, retrying: {}", self.name, e);
                Some(self.idle_delay)
            }
        }
    }

    /// Run the loop forever
    pub fn run<F, M>(mut self, mut iteration: F, mut collect_metrics: M) -> !
    where
        F: FnMut() -> Result<SyncOutcome, StoreError>,
        M: FnMut() -> Result<(), StoreError>,
    {
        loop {
            if let Some(delay) = self.step(&mut iteration, &mut collect_metrics) {
                std::thread::sleep(delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::calendars::tests::{entry, now, store_with_calendar, FakeFeed};
    use super::calendars::update_the_most_outdated_calendar;
    use super::persons::tests::{directory_entry, FakeDirectory};
    use super::persons::update_the_most_outdated_person;
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn test_polling_loop_step() {
        let mut polling_loop =
            PollingLoop::new("test", Duration::from_millis(10), Duration::from_secs(3600));
        let mut metrics_collections = 0;

        let delay = polling_loop.step(
            || Ok(SyncOutcome::Updated),
            || {
                metrics_collections += 1;
                Ok(())
            },
        );
        assert_eq!(delay, None);

        let delay = polling_loop.step(
            || Ok(SyncOutcome::NothingToUpdate),
            || {
                metrics_collections += 1;
                Ok(())
            },
        );
        assert_eq!(delay, Some(Duration::from_millis(10)));
        // Statistics are only collected once per interval
        assert_eq!(metrics_collections, 1);

        let delay = polling_loop.step(
            || Err(StoreError::ConnectionError("connection refused".to_owned())),
            || Ok(()),
        );
        assert_eq!(delay, Some(Duration::from_millis(10)));
    }

    #[test]
    fn test_feed_identities_are_merged_by_person_refresh() {
        let store = store_with_calendar("cal1");
        let feed = FakeFeed {
            entries: Ok(vec![
                entry("jan", -1, 1),
                entry("mailto:jan@x.nl", 1, 1),
                entry("henk@y.nl", 2, 20),
            ]),
        };
        let outcome =
            update_the_most_outdated_calendar(&store, &feed, TimeDelta::days(1), now()).unwrap();
        assert_eq!(outcome, SyncOutcome::Updated);
        {
            let data = store.data.lock().unwrap();
            assert_eq!(data.events.len(), 3);
            assert_eq!(data.persons.len(), 3);
            assert_ne!(data.events[0].person_uid, data.events[1].person_uid);
        }

        let jan = directory_entry(Some("jan"), Some("jan@x.nl"));
        let mut directory = FakeDirectory::default()
            .with_entry("jan", jan.clone())
            .with_entry("jan@x.nl", jan)
            .with_entry("henk@y.nl", directory_entry(Some("henk"), Some("henk@y.nl")));
        let mut refreshes = 0;
        while update_the_most_outdated_person(&store, &mut directory, TimeDelta::hours(1), now())
            .unwrap()
            != SyncOutcome::NothingToUpdate
        {
            refreshes += 1;
            assert!(refreshes <= 3);
        }

        let data = store.data.lock().unwrap();
        assert_eq!(data.persons.len(), 2);
        assert_eq!(data.events.len(), 3);
        assert_eq!(data.events[0].person_uid, data.events[1].person_uid);
        let jan = data.person_by_uid(data.events[0].person_uid).unwrap();
        assert_eq!(jan.username.as_deref(), Some("jan"));
        assert_eq!(jan.email.as_deref(), Some("jan@x.nl"));
        let henk = data.person_by_uid(data.events[2].person_uid).unwrap();
        assert_ne!(henk.uid, jan.uid);
        assert_eq!(henk.email.as_deref(), Some("henk@y.nl"));
    }
}
