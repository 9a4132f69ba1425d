use crate::data_store::models::{
    Calendar, EntityStatistics, NewCalendar, NewOnCallEvent, OnCallEvent, Person,
    PersonDirectoryUpdate, PersonIdentity, PersonImage,
};
use crate::data_store::{
    models, CalendarConfigSyncResult, DutyBoardStore, DutyBoardStoreFacade, PersonId,
    PersonImageId, StoreError,
};
use chrono::{DateTime, Utc};
use std::sync::Mutex;

/**
 * A mock [DutyBoardStore] implementation for testing.
 *
 * The simulated database consists of the [StoreMockData] structure with vectors of entities. These
 * can be directly modified by the tests.
 *
 * The mock keeps the referential behaviour of the real database (cascading deletion of events,
 * restricted deletion of images in use), but does not check any field constraints. The
 * [StoreMockData.next_error] attribute can be set to simulate a database error.
 */
#[derive(Default)]
pub struct StoreMock {
    pub data: Mutex<StoreMockData>,
}

impl DutyBoardStore for StoreMock {
    fn get_facade<'a>(&'a self) -> Result<Box<dyn DutyBoardStoreFacade + 'a>, StoreError> {
        Ok(Box::new(StoreMockFacade { store: self }))
    }
}

#[derive(Default)]
pub struct StoreMockData {
    pub calendars: Vec<Calendar>,
    pub persons: Vec<Person>,
    pub person_images: Vec<PersonImage>,
    pub events: Vec<OnCallEvent>,
    /// If not none, the next call to a store facade method will return this error.
    pub next_error: Option<StoreError>,
    next_uid: i32,
}

impl StoreMockData {
    fn generate_uid(&mut self) -> i32 {
        self.next_uid += 1;
        self.next_uid
    }

    /// Add a person with the given identity fields, which has never been synced, and return its uid
    pub fn add_person(&mut self, username: Option<&str>, email: Option<&str>) -> PersonId {
        let uid = self.generate_uid();
        self.persons.push(Person {
            uid,
            username: username.map(|u| u.to_owned()),
            email: email.map(|e| e.to_owned()),
            image_uid: None,
            img_width: None,
            img_height: None,
            extra_attributes: Default::default(),
            error_msg: None,
            last_update: models::never_updated(),
            sync: true,
        });
        uid
    }

    /// Add an event to the given calendar and return its uid
    pub fn add_event(
        &mut self,
        calendar_uid: &str,
        person_uid: PersonId,
        start_utc: DateTime<Utc>,
        end_utc: DateTime<Utc>,
    ) -> i32 {
        let uid = self.generate_uid();
        self.events.push(OnCallEvent {
            uid,
            calendar_uid: calendar_uid.to_owned(),
            person_uid,
            start_utc,
            end_utc,
        });
        uid
    }

    pub fn person_by_uid(&self, uid: PersonId) -> Option<&Person> {
        self.persons.iter().find(|p| p.uid == uid)
    }
}

pub fn calendar_from_config(config: NewCalendar) -> Calendar {
    Calendar {
        uid: config.uid,
        name: config.name,
        description: config.description,
        category: config.category,
        order: config.order,
        feed_url: config.feed_url,
        event_prefix: config.event_prefix,
        error_msg: None,
        last_update: models::never_updated(),
        sync: true,
    }
}

struct StoreMockFacade<'a> {
    store: &'a StoreMock,
}

impl StoreMockFacade<'_> {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, StoreMockData>, StoreError> {
        let mut data = self.store.data.lock().expect("Error while locking mutex.");
        if let Some(e) = data.next_error.take() {
            return Err(e);
        }
        Ok(data)
    }
}

fn statistics<I>(entities: I, updated_before: DateTime<Utc>) -> EntityStatistics
where
    I: Iterator<Item = (bool, DateTime<Utc>, bool)>,
{
    let mut result = EntityStatistics::default();
    for (sync, last_update, has_error) in entities {
        result.total += 1;
        if sync && last_update <= updated_before {
            result.outdated += 1;
        }
        if has_error {
            result.with_errors += 1;
        }
    }
    result
}

impl DutyBoardStoreFacade for StoreMockFacade<'_> {
    fn sync_calendar_configurations(
        &mut self,
        calendars: Vec<NewCalendar>,
    ) -> Result<CalendarConfigSyncResult, StoreError> {
        let mut data = self.lock()?;
        let mut result = CalendarConfigSyncResult::default();
        for config in calendars.iter() {
            match data.calendars.iter_mut().find(|c| c.uid == config.uid) {
                Some(existing) => {
                    existing.name = config.name.clone();
                    existing.description = config.description.clone();
                    existing.category = config.category.clone();
                    existing.order = config.order;
                    existing.feed_url = config.feed_url.clone();
                    existing.event_prefix = config.event_prefix.clone();
                    result.updated += 1;
                }
                None => {
                    data.calendars.push(calendar_from_config(config.clone()));
                    result.created += 1;
                }
            }
        }
        let count_before = data.calendars.len();
        data.calendars
            .retain(|c| calendars.iter().any(|config| config.uid == c.uid));
        result.deleted = count_before - data.calendars.len();
        let remaining: Vec<String> = data.calendars.iter().map(|c| c.uid.clone()).collect();
        data.events.retain(|e| remaining.contains(&e.calendar_uid));
        Ok(result)
    }

    fn get_calendars(&mut self) -> Result<Vec<Calendar>, StoreError> {
        let data = self.lock()?;
        let mut result = data.calendars.clone();
        result.sort_by(|a, b| (a.order, &a.uid).cmp(&(b.order, &b.uid)));
        Ok(result)
    }

    fn get_calendar(&mut self, calendar_uid: &str) -> Result<Calendar, StoreError> {
        let data = self.lock()?;
        data.calendars
            .iter()
            .find(|c| c.uid == calendar_uid)
            .cloned()
            .ok_or(StoreError::NotExisting)
    }

    fn get_most_outdated_calendar(
        &mut self,
        updated_before: DateTime<Utc>,
    ) -> Result<Option<Calendar>, StoreError> {
        let data = self.lock()?;
        Ok(data
            .calendars
            .iter()
            .filter(|c| c.sync && c.last_update <= updated_before)
            .min_by(|a, b| (a.last_update, &a.uid).cmp(&(b.last_update, &b.uid)))
            .cloned())
    }

    fn replace_calendar_events(
        &mut self,
        calendar_uid: &str,
        events: Vec<NewOnCallEvent>,
    ) -> Result<(), StoreError> {
        let mut data = self.lock()?;
        if !data.calendars.iter().any(|c| c.uid == calendar_uid) {
            return Err(StoreError::ConstraintViolation(
                "ForeignKeyViolation: calendar does not exist".to_owned(),
            ));
        }
        data.events.retain(|e| e.calendar_uid != calendar_uid);
        for event in events {
            data.add_event(
                &event.calendar_uid,
                event.person_uid,
                event.start_utc,
                event.end_utc,
            );
        }
        Ok(())
    }

    fn finish_calendar_sync(
        &mut self,
        calendar_uid: &str,
        error_msg: Option<String>,
        last_update: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut data = self.lock()?;
        let calendar = data
            .calendars
            .iter_mut()
            .find(|c| c.uid == calendar_uid)
            .ok_or(StoreError::NotExisting)?;
        calendar.error_msg = error_msg;
        calendar.last_update = last_update;
        Ok(())
    }

    fn get_calendar_statistics(
        &mut self,
        updated_before: DateTime<Utc>,
    ) -> Result<EntityStatistics, StoreError> {
        let data = self.lock()?;
        Ok(statistics(
            data.calendars
                .iter()
                .map(|c| (c.sync, c.last_update, c.error_msg.is_some())),
            updated_before,
        ))
    }

    fn get_or_create_person(&mut self, identity: &PersonIdentity) -> Result<Person, StoreError> {
        let mut data = self.lock()?;
        let existing = data.persons.iter().find(|p| match identity {
            PersonIdentity::Username(u) => p.username.as_ref() == Some(u),
            PersonIdentity::Email(e) => p.email.as_ref() == Some(e),
        });
        if let Some(person) = existing {
            return Ok(person.clone());
        }
        let new_person = models::NewPerson::from(identity);
        let uid = data.add_person(new_person.username.as_deref(), new_person.email.as_deref());
        data.person_by_uid(uid).cloned().ok_or(StoreError::NotExisting)
    }

    fn get_person(&mut self, person_uid: PersonId) -> Result<Person, StoreError> {
        let data = self.lock()?;
        data.person_by_uid(person_uid)
            .cloned()
            .ok_or(StoreError::NotExisting)
    }

    fn get_persons(&mut self, person_uids: &[PersonId]) -> Result<Vec<Person>, StoreError> {
        let data = self.lock()?;
        Ok(data
            .persons
            .iter()
            .filter(|p| person_uids.contains(&p.uid))
            .cloned()
            .collect())
    }

    fn get_most_outdated_person(
        &mut self,
        updated_before: DateTime<Utc>,
    ) -> Result<Option<Person>, StoreError> {
        let data = self.lock()?;
        Ok(data
            .persons
            .iter()
            .filter(|p| p.sync && p.last_update <= updated_before)
            .min_by_key(|p| (p.last_update, p.uid))
            .cloned())
    }

    fn update_person_from_directory(
        &mut self,
        person_uid: PersonId,
        update: PersonDirectoryUpdate,
    ) -> Result<(), StoreError> {
        let mut data = self.lock()?;
        let current_image_uid = data
            .person_by_uid(person_uid)
            .ok_or(StoreError::NotExisting)?
            .image_uid;
        let new_image = match update.image {
            Some(image) => {
                let image_uid = match current_image_uid {
                    Some(image_uid) => {
                        if let Some(existing) =
                            data.person_images.iter_mut().find(|i| i.uid == image_uid)
                        {
                            existing.image_bytes = image.image_bytes;
                        }
                        image_uid
                    }
                    None => {
                        let image_uid = data.generate_uid();
                        data.person_images.push(PersonImage {
                            uid: image_uid,
                            image_bytes: image.image_bytes,
                        });
                        image_uid
                    }
                };
                Some((image_uid, image.width, image.height))
            }
            None => None,
        };
        let person = data
            .persons
            .iter_mut()
            .find(|p| p.uid == person_uid)
            .ok_or(StoreError::NotExisting)?;
        if let Some((image_uid, width, height)) = new_image {
            person.image_uid = Some(image_uid);
            person.img_width = Some(width);
            person.img_height = Some(height);
        }
        person.username = update.username;
        person.email = update.email;
        person.extra_attributes = update.extra_attributes;
        Ok(())
    }

    fn merge_duplicate_persons(
        &mut self,
        person_uid: PersonId,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Vec<PersonId>, StoreError> {
        let mut data = self.lock()?;
        let duplicates: Vec<(PersonId, Option<PersonImageId>)> = data
            .persons
            .iter()
            .filter(|p| p.uid != person_uid)
            .filter(|p| {
                (username.is_some() && p.username.as_deref() == username)
                    || (email.is_some() && p.email.as_deref() == email)
            })
            .map(|p| (p.uid, p.image_uid))
            .collect();
        for (duplicate_uid, duplicate_image_uid) in duplicates.iter() {
            for event in data
                .events
                .iter_mut()
                .filter(|e| e.person_uid == *duplicate_uid)
            {
                event.person_uid = person_uid;
            }
            data.persons.retain(|p| p.uid != *duplicate_uid);
            if let Some(image_uid) = duplicate_image_uid {
                data.person_images.retain(|i| i.uid != *image_uid);
            }
        }
        Ok(duplicates.into_iter().map(|(uid, _)| uid).collect())
    }

    fn finish_person_sync(
        &mut self,
        person_uid: PersonId,
        error_msg: Option<String>,
        last_update: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut data = self.lock()?;
        let person = data
            .persons
            .iter_mut()
            .find(|p| p.uid == person_uid)
            .ok_or(StoreError::NotExisting)?;
        person.error_msg = error_msg;
        person.last_update = last_update;
        Ok(())
    }

    fn get_person_statistics(
        &mut self,
        updated_before: DateTime<Utc>,
    ) -> Result<EntityStatistics, StoreError> {
        let data = self.lock()?;
        Ok(statistics(
            data.persons
                .iter()
                .map(|p| (p.sync, p.last_update, p.error_msg.is_some())),
            updated_before,
        ))
    }

    fn get_person_image(&mut self, image_uid: PersonImageId) -> Result<PersonImage, StoreError> {
        let data = self.lock()?;
        data.person_images
            .iter()
            .find(|i| i.uid == image_uid)
            .cloned()
            .ok_or(StoreError::NotExisting)
    }

    fn delete_person_image(&mut self, image_uid: PersonImageId) -> Result<(), StoreError> {
        let mut data = self.lock()?;
        if data.persons.iter().any(|p| p.image_uid == Some(image_uid)) {
            return Err(StoreError::ConstraintViolation(
                "ForeignKeyViolation: image is referenced by a person".to_owned(),
            ));
        }
        let count_before = data.person_images.len();
        data.person_images.retain(|i| i.uid != image_uid);
        if data.person_images.len() == count_before {
            return Err(StoreError::NotExisting);
        }
        Ok(())
    }

    fn get_events_ending_after(
        &mut self,
        time: DateTime<Utc>,
    ) -> Result<Vec<OnCallEvent>, StoreError> {
        let data = self.lock()?;
        let mut result: Vec<OnCallEvent> = data
            .events
            .iter()
            .filter(|e| e.end_utc >= time)
            .cloned()
            .collect();
        result.sort_by_key(|e| (e.start_utc, e.uid));
        Ok(result)
    }

    fn get_events_covering(&mut self, time: DateTime<Utc>) -> Result<Vec<OnCallEvent>, StoreError> {
        let data = self.lock()?;
        let mut result: Vec<OnCallEvent> =
            data.events.iter().filter(|e| e.covers(time)).cloned().collect();
        result.sort_by_key(|e| (e.start_utc, e.uid));
        Ok(result)
    }

    fn get_calendar_events(&mut self, calendar_uid: &str) -> Result<Vec<OnCallEvent>, StoreError> {
        let data = self.lock()?;
        let mut result: Vec<OnCallEvent> = data
            .events
            .iter()
            .filter(|e| e.calendar_uid == calendar_uid)
            .cloned()
            .collect();
        result.sort_by_key(|e| (e.start_utc, e.uid));
        Ok(result)
    }

    fn check_connection(&mut self) -> Result<(), StoreError> {
        self.lock()?;
        Ok(())
    }
}
