//! The duty officer refresher: enriches the persons referenced by the calendars with the details
//! from the directory and merges persons which turn out to be the same human.

use super::SyncOutcome;
use crate::data_store::models::{Person, PersonDirectoryUpdate};
use crate::data_store::{DutyBoardStore, StoreError};
use crate::directory::{DirectoryAdapter, DirectoryError};
use crate::metrics;
use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, info, warn};
use std::fmt::{Display, Formatter};

/// Reasons for a failed refresh of a single person. Recorded in the person's `error_msg`.
#[derive(Debug)]
pub enum PersonSyncError {
    /// The person has neither a username nor an email address to search for
    NoIdentity,
    Directory(DirectoryError),
    Store(StoreError),
}

impl Display for PersonSyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PersonSyncError::NoIdentity => {
                f.write_str("Person has neither a username nor an email address")
            }
            PersonSyncError::Directory(e) => write!(f, "{}", e),
            PersonSyncError::Store(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for PersonSyncError {}

impl From<DirectoryError> for PersonSyncError {
    fn from(value: DirectoryError) -> Self {
        Self::Directory(value)
    }
}

impl From<StoreError> for PersonSyncError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Refresh the person which has not been updated for the longest time, if its last update is at
/// least `update_frequency` ago.
///
/// Directory failures and failures of the merge or enrichment writes are recorded in the
/// person's `error_msg`. Only errors while selecting the person or recording the result are
/// returned.
pub fn update_the_most_outdated_person(
    store: &dyn DutyBoardStore,
    directory: &mut dyn DirectoryAdapter,
    update_frequency: TimeDelta,
    now: DateTime<Utc>,
) -> Result<SyncOutcome, StoreError> {
    let Some(person) = store
        .get_facade()?
        .get_most_outdated_person(now - update_frequency)?
    else {
        return Ok(SyncOutcome::NothingToUpdate);
    };
    let name = person.display_name();
    debug!("Refreshing duty officer {} (#{})", name, person.uid);

    let (outcome, error_msg) = match refresh_person(store, directory, &person) {
        Ok(()) => {
            info!("Refreshed duty officer {}.", name);
            (SyncOutcome::Updated, None)
        }
        Err(e) => {
            warn!("Refreshing duty officer {} failed: {}", name, e);
            (SyncOutcome::Failed, Some(e.to_string()))
        }
    };
    match store
        .get_facade()
        .and_then(|mut facade| facade.finish_person_sync(person.uid, error_msg, now))
    {
        Ok(()) => {}
        Err(StoreError::NotExisting) => {
            // Merged into another person by a concurrent refresh
            warn!("Duty officer {} disappeared during the refresh.", name);
            metrics::record_person_refresh(&name, false);
            return Ok(SyncOutcome::Failed);
        }
        Err(e) => {
            metrics::record_person_refresh(&name, false);
            return Err(e);
        }
    }
    metrics::record_person_refresh(&name, outcome == SyncOutcome::Updated);
    Ok(outcome)
}

/// Look up the person in the directory, merge its duplicates into it and store the directory
/// details.
fn refresh_person(
    store: &dyn DutyBoardStore,
    directory: &mut dyn DirectoryAdapter,
    person: &Person,
) -> Result<(), PersonSyncError> {
    let search_key = person
        .directory_search_key()
        .ok_or(PersonSyncError::NoIdentity)?;
    let entry = directory.lookup(search_key)?;

    // Identity fields missing in the directory entry are kept
    let username = entry.username.or_else(|| person.username.clone());
    let email = entry.email.or_else(|| person.email.clone());

    let merged = store.get_facade()?.merge_duplicate_persons(
        person.uid,
        username.as_deref(),
        email.as_deref(),
    )?;
    if !merged.is_empty() {
        info!(
            "Merged {} duplicate(s) into duty officer #{}: {:?}",
            merged.len(),
            person.uid,
            merged
        );
    }

    store.get_facade()?.update_person_from_directory(
        person.uid,
        PersonDirectoryUpdate {
            username,
            email,
            extra_attributes: entry.extra_attributes,
            image: entry.photo,
        },
    )?;
    Ok(())
}

/// Update the duty officer statistics gauges
pub fn collect_person_metrics(
    store: &dyn DutyBoardStore,
    update_frequency: TimeDelta,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    let statistics = store
        .get_facade()?
        .get_person_statistics(now - update_frequency)?;
    metrics::set_person_statistics(&statistics);
    Ok(())
}

#[cfg(test)]
pub(super) mod tests {
    use super::*;
    use crate::data_store::models::{ExtraAttribute, ExtraAttributes, PersonImageData};
    use crate::data_store::store_mock::StoreMock;
    use crate::directory::DirectoryEntry;
    use chrono::TimeZone;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::collections::HashMap;

    #[derive(Default)]
    pub(crate) struct FakeDirectory {
        entries: HashMap<String, DirectoryEntry>,
        lookups: Vec<String>,
    }

    impl FakeDirectory {
        pub(crate) fn with_entry(mut self, search_key: &str, entry: DirectoryEntry) -> Self {
            self.entries.insert(search_key.to_owned(), entry);
            self
        }
    }

    impl DirectoryAdapter for FakeDirectory {
        fn lookup(&mut self, search_key: &str) -> Result<DirectoryEntry, DirectoryError> {
            self.lookups.push(search_key.to_owned());
            self.entries
                .get(search_key)
                .cloned()
                .ok_or_else(|| DirectoryError::NotFound(search_key.to_owned()))
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 11, 20, 12, 0, 0).unwrap()
    }

    pub(crate) fn directory_entry(username: Option<&str>, email: Option<&str>) -> DirectoryEntry {
        DirectoryEntry {
            username: username.map(|u| u.to_owned()),
            email: email.map(|e| e.to_owned()),
            extra_attributes: ExtraAttributes(
                [(
                    "fullName".to_owned(),
                    ExtraAttribute::new("Jan Jansen".to_owned(), None),
                )]
                .into(),
            ),
            photo: None,
        }
    }

    #[test]
    fn test_update_person() {
        let store = StoreMock::default();
        let jan = store.data.lock().unwrap().add_person(Some("jan"), None);
        let mut entry = directory_entry(Some("jan"), Some("jan@x.nl"));
        entry.photo = Some(PersonImageData {
            image_bytes: vec![1, 2, 3],
            width: 80,
            height: 100,
        });
        let mut directory = FakeDirectory::default().with_entry("jan", entry);

        let outcome =
            update_the_most_outdated_person(&store, &mut directory, TimeDelta::hours(1), now())
                .unwrap();
        assert_eq!(outcome, SyncOutcome::Updated);
        assert_eq!(directory.lookups, vec!["jan".to_owned()]);

        let data = store.data.lock().unwrap();
        let person = data.person_by_uid(jan).unwrap();
        assert_eq!(person.email.as_deref(), Some("jan@x.nl"));
        assert_eq!(
            person.extra_attributes.0["fullName"].information,
            "Jan Jansen"
        );
        assert_eq!((person.img_width, person.img_height), (Some(80), Some(100)));
        assert_eq!(data.person_images.len(), 1);
        assert_eq!(person.last_update, now());
        assert_eq!(person.error_msg, None);
    }

    #[test]
    fn test_update_person_merges_duplicates() {
        let store = StoreMock::default();
        let (jan, jan_by_email) = {
            let mut data = store.data.lock().unwrap();
            let jan = data.add_person(Some("jan"), None);
            let jan_by_email = data.add_person(None, Some("jan@x.nl"));
            data.add_event("cal1", jan, now(), now() + TimeDelta::hours(8));
            data.add_event("cal1", jan_by_email, now(), now() + TimeDelta::hours(8));
            data.add_event("cal2", jan_by_email, now(), now() + TimeDelta::hours(8));
            (jan, jan_by_email)
        };
        let mut directory = FakeDirectory::default()
            .with_entry("jan", directory_entry(Some("jan"), Some("jan@x.nl")));

        update_the_most_outdated_person(&store, &mut directory, TimeDelta::hours(1), now())
            .unwrap();

        let data = store.data.lock().unwrap();
        assert_eq!(data.persons.len(), 1);
        let person = &data.persons[0];
        assert_eq!(person.uid, jan);
        assert_eq!(person.username.as_deref(), Some("jan"));
        assert_eq!(person.email.as_deref(), Some("jan@x.nl"));
        assert!(data.person_by_uid(jan_by_email).is_none());
        assert!(data.events.iter().all(|e| e.person_uid == jan));
        assert_eq!(data.events.len(), 3);
    }

    #[test]
    fn test_update_person_merge_from_email_side() {
        let store = StoreMock::default();
        let jan_by_email = {
            let mut data = store.data.lock().unwrap();
            let jan = data.add_person(Some("jan"), None);
            data.persons[0].last_update = now();
            let jan_by_email = data.add_person(None, Some("jan@x.nl"));
            data.add_event("cal1", jan, now(), now() + TimeDelta::hours(8));
            jan_by_email
        };
        let mut directory = FakeDirectory::default()
            .with_entry("jan@x.nl", directory_entry(Some("jan"), Some("jan@x.nl")));

        update_the_most_outdated_person(&store, &mut directory, TimeDelta::hours(1), now())
            .unwrap();

        let data = store.data.lock().unwrap();
        assert_eq!(data.persons.len(), 1);
        assert_eq!(data.persons[0].uid, jan_by_email);
        assert_eq!(data.persons[0].username.as_deref(), Some("jan"));
        assert_eq!(data.events[0].person_uid, jan_by_email);
    }

    #[test]
    fn test_update_person_directory_failure() {
        let store = StoreMock::default();
        let piet = {
            let mut data = store.data.lock().unwrap();
            let piet = data.add_person(Some("piet"), None);
            data.persons[0].extra_attributes = directory_entry(None, None).extra_attributes;
            piet
        };
        let mut directory = FakeDirectory::default();

        let outcome =
            update_the_most_outdated_person(&store, &mut directory, TimeDelta::hours(1), now())
                .unwrap();
        assert_eq!(outcome, SyncOutcome::Failed);

        let data = store.data.lock().unwrap();
        let person = data.person_by_uid(piet).unwrap();
        assert!(person
            .error_msg
            .as_ref()
            .is_some_and(|e| e.contains("piet")));
        assert_eq!(person.last_update, now());
        assert_eq!(person.extra_attributes.0.len(), 1);
    }

    #[test]
    fn test_update_person_keeps_missing_identity_fields() {
        let store = StoreMock::default();
        let jan = store
            .data
            .lock()
            .unwrap()
            .add_person(Some("jan"), Some("jan@x.nl"));
        let mut directory =
            FakeDirectory::default().with_entry("jan", directory_entry(Some("jan"), None));

        update_the_most_outdated_person(&store, &mut directory, TimeDelta::hours(1), now())
            .unwrap();

        let data = store.data.lock().unwrap();
        assert_eq!(
            data.person_by_uid(jan).unwrap().email.as_deref(),
            Some("jan@x.nl")
        );
    }

    #[test]
    fn test_person_selection() {
        let store = StoreMock::default();
        {
            let mut data = store.data.lock().unwrap();
            data.add_person(Some("fresh"), None);
            data.persons[0].last_update = now() - TimeDelta::minutes(10);
            data.add_person(Some("disabled"), None);
            data.persons[1].sync = false;
        }
        let mut directory = FakeDirectory::default();

        let outcome =
            update_the_most_outdated_person(&store, &mut directory, TimeDelta::hours(1), now())
                .unwrap();
        assert_eq!(outcome, SyncOutcome::NothingToUpdate);
        assert!(directory.lookups.is_empty());
    }

    #[test]
    fn test_person_staleness_boundary() {
        let store = StoreMock::default();
        store.data.lock().unwrap().add_person(Some("jan"), None);
        let mut directory = FakeDirectory::default()
            .with_entry("jan", directory_entry(Some("jan"), Some("jan@x.nl")));

        store.data.lock().unwrap().persons[0].last_update =
            now() - TimeDelta::hours(1) + TimeDelta::seconds(1);
        let outcome =
            update_the_most_outdated_person(&store, &mut directory, TimeDelta::hours(1), now())
                .unwrap();
        assert_eq!(outcome, SyncOutcome::NothingToUpdate);

        store.data.lock().unwrap().persons[0].last_update = now() - TimeDelta::hours(1);
        let outcome =
            update_the_most_outdated_person(&store, &mut directory, TimeDelta::hours(1), now())
                .unwrap();
        assert_eq!(outcome, SyncOutcome::Updated);
    }

    /// A directory which fails and makes the following store operation fail as well
    struct ConnectionLosingDirectory<'a> {
        store: &'a StoreMock,
    }

    impl DirectoryAdapter for ConnectionLosingDirectory<'_> {
        fn lookup(&mut self, _search_key: &str) -> Result<DirectoryEntry, DirectoryError> {
            self.store.data.lock().unwrap().next_error =
                Some(StoreError::ConnectionError("connection lost".to_owned()));
            Err(DirectoryError::Fetch("directory unreachable".to_owned()))
        }
    }

    #[test]
    fn test_update_person_failed_recording_is_counted() {
        let store = StoreMock::default();
        store.data.lock().unwrap().add_person(Some("jan"), None);
        let mut directory = ConnectionLosingDirectory { store: &store };
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        let result = ::metrics::with_local_recorder(&recorder, || {
            update_the_most_outdated_person(&store, &mut directory, TimeDelta::hours(1), now())
        });
        assert!(matches!(result, Err(StoreError::ConnectionError(_))));

        let rendered = handle.render();
        assert!(rendered.contains("duty_officers_refresh_total 1"));
        assert!(rendered.contains("duty_officers_refresh_failed_total 1"));
    }
}
