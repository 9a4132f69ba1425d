use super::{
    models, schema, CalendarConfigSyncResult, DutyBoardStore, DutyBoardStoreFacade, PersonId,
    PersonImageId, StoreError,
};
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;

#[derive(Clone)]
pub struct PgDataStore {
    pool: diesel::r2d2::Pool<diesel::r2d2::ConnectionManager<PgConnection>>,
}

impl PgDataStore {
    pub fn new(database_url: &str) -> Result<Self, StoreError> {
        let connection_manager = diesel::r2d2::ConnectionManager::<PgConnection>::new(database_url);
        Ok(Self {
            pool: diesel::r2d2::Pool::builder()
                .test_on_check_out(true)
                .min_idle(Some(2))
                .build(connection_manager)?,
        })
    }
}

impl DutyBoardStore for PgDataStore {
    fn get_facade<'a>(&'a self) -> Result<Box<dyn DutyBoardStoreFacade + 'a>, StoreError> {
        Ok(Box::new(PgDataStoreFacade::with_pooled_connection(
            self.pool.get()?,
        )))
    }
}

pub struct PgDataStoreFacade {
    connection: diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<PgConnection>>,
}

impl PgDataStoreFacade {
    pub fn with_pooled_connection(
        connection: diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<PgConnection>>,
    ) -> Self {
        Self { connection }
    }
}

/// Create an Sql expression to check if a row has been created or updated by a Postgres "upsert"
/// statement
fn sql_upsert_is_updated() -> diesel::expression::SqlLiteral<diesel::sql_types::Bool> {
    // See https://stackoverflow.com/q/34762732 and https://stackoverflow.com/q/49597793
    diesel::dsl::sql("xmax::text <> '0'")
}

impl DutyBoardStoreFacade for PgDataStoreFacade {
    fn sync_calendar_configurations(
        &mut self,
        new_calendars: Vec<models::NewCalendar>,
    ) -> Result<CalendarConfigSyncResult, StoreError> {
        use schema::calendars::dsl::*;

        self.connection.transaction(|connection| {
            let mut result = CalendarConfigSyncResult::default();
            for calendar in new_calendars.iter() {
                let is_updated = diesel::insert_into(calendars)
                    .values(calendar)
                    .on_conflict(uid)
                    .do_update()
                    .set(calendar)
                    .returning(sql_upsert_is_updated())
                    .get_result::<bool>(connection)?;
                if is_updated {
                    result.updated += 1;
                } else {
                    result.created += 1;
                }
            }

            // Events of the deleted calendars are removed by ON DELETE CASCADE
            let configured_uids: Vec<&str> = new_calendars.iter().map(|c| c.uid.as_str()).collect();
            result.deleted = diesel::delete(calendars.filter(uid.ne_all(configured_uids)))
                .execute(connection)?;
            Ok(result)
        })
    }

    fn get_calendars(&mut self) -> Result<Vec<models::Calendar>, StoreError> {
        use schema::calendars::dsl::*;

        calendars
            .select(models::Calendar::as_select())
            .order_by((sort_order.asc(), uid.asc()))
            .load::<models::Calendar>(&mut self.connection)
            .map_err(|e| e.into())
    }

    fn get_calendar(&mut self, the_calendar_uid: &str) -> Result<models::Calendar, StoreError> {
        use schema::calendars::dsl::*;

        calendars
            .filter(uid.eq(the_calendar_uid))
            .select(models::Calendar::as_select())
            .first::<models::Calendar>(&mut self.connection)
            .map_err(|e| e.into())
    }

    fn get_most_outdated_calendar(
        &mut self,
        updated_before: DateTime<Utc>,
    ) -> Result<Option<models::Calendar>, StoreError> {
        use schema::calendars::dsl::*;

        calendars
            .filter(sync.eq(true))
            .filter(last_update.le(updated_before))
            .order_by((last_update.asc(), uid.asc()))
            .select(models::Calendar::as_select())
            .first::<models::Calendar>(&mut self.connection)
            .optional()
            .map_err(|e| e.into())
    }

    fn replace_calendar_events(
        &mut self,
        the_calendar_uid: &str,
        events: Vec<models::NewOnCallEvent>,
    ) -> Result<(), StoreError> {
        use schema::on_call_events::dsl::*;

        self.connection.transaction(|connection| {
            diesel::delete(on_call_events.filter(calendar_uid.eq(the_calendar_uid)))
                .execute(connection)?;
            if !events.is_empty() {
                diesel::insert_into(on_call_events)
                    .values(&events)
                    .execute(connection)?;
            }
            Ok(())
        })
    }

    fn finish_calendar_sync(
        &mut self,
        the_calendar_uid: &str,
        the_error_msg: Option<String>,
        the_last_update: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        use schema::calendars::dsl::*;

        let count = diesel::update(calendars.filter(uid.eq(the_calendar_uid)))
            .set((
                error_msg.eq(the_error_msg),
                last_update.eq(the_last_update),
            ))
            .execute(&mut self.connection)?;
        if count == 1 {
            Ok(())
        } else {
            Err(StoreError::NotExisting)
        }
    }

    fn get_calendar_statistics(
        &mut self,
        updated_before: DateTime<Utc>,
    ) -> Result<models::EntityStatistics, StoreError> {
        use schema::calendars::dsl::*;

        self.connection.transaction(|connection| {
            Ok(models::EntityStatistics {
                total: calendars.count().get_result(connection)?,
                outdated: calendars
                    .filter(sync.eq(true))
                    .filter(last_update.le(updated_before))
                    .count()
                    .get_result(connection)?,
                with_errors: calendars
                    .filter(error_msg.is_not_null())
                    .count()
                    .get_result(connection)?,
            })
        })
    }

    fn get_or_create_person(
        &mut self,
        identity: &models::PersonIdentity,
    ) -> Result<models::Person, StoreError> {
        use schema::persons::dsl::*;

        self.connection.transaction(|connection| {
            let existing = match identity {
                models::PersonIdentity::Username(the_username) => persons
                    .filter(username.eq(the_username.as_str()))
                    .order_by(uid.asc())
                    .select(models::Person::as_select())
                    .first::<models::Person>(connection)
                    .optional()?,
                models::PersonIdentity::Email(the_email) => persons
                    .filter(email.eq(the_email.as_str()))
                    .order_by(uid.asc())
                    .select(models::Person::as_select())
                    .first::<models::Person>(connection)
                    .optional()?,
            };
            if let Some(person) = existing {
                return Ok(person);
            }

            Ok(diesel::insert_into(persons)
                .values(models::NewPerson::from(identity))
                .returning(models::Person::as_returning())
                .get_result::<models::Person>(connection)?)
        })
    }

    fn get_person(&mut self, person_id: PersonId) -> Result<models::Person, StoreError> {
        use schema::persons::dsl::*;

        persons
            .filter(uid.eq(person_id))
            .select(models::Person::as_select())
            .first::<models::Person>(&mut self.connection)
            .map_err(|e| e.into())
    }

    fn get_persons(&mut self, person_ids: &[PersonId]) -> Result<Vec<models::Person>, StoreError> {
        use schema::persons::dsl::*;

        persons
            .filter(uid.eq_any(person_ids.to_vec()))
            .order_by(uid.asc())
            .select(models::Person::as_select())
            .load::<models::Person>(&mut self.connection)
            .map_err(|e| e.into())
    }

    fn get_most_outdated_person(
        &mut self,
        updated_before: DateTime<Utc>,
    ) -> Result<Option<models::Person>, StoreError> {
        use schema::persons::dsl::*;

        persons
            .filter(sync.eq(true))
            .filter(last_update.le(updated_before))
            .order_by((last_update.asc(), uid.asc()))
            .select(models::Person::as_select())
            .first::<models::Person>(&mut self.connection)
            .optional()
            .map_err(|e| e.into())
    }

    fn update_person_from_directory(
        &mut self,
        person_id: PersonId,
        update: models::PersonDirectoryUpdate,
    ) -> Result<(), StoreError> {
        use schema::person_images;
        use schema::persons::dsl::*;

        self.connection.transaction(|connection| {
            let current_image_uid = persons
                .filter(uid.eq(person_id))
                .select(image_uid)
                .first::<Option<PersonImageId>>(connection)?;

            if let Some(image) = update.image {
                let new_image_uid = match current_image_uid {
                    Some(existing_image_uid) => {
                        diesel::update(
                            person_images::table
                                .filter(person_images::uid.eq(existing_image_uid)),
                        )
                        .set(person_images::image_bytes.eq(&image.image_bytes))
                        .execute(connection)?;
                        existing_image_uid
                    }
                    None => diesel::insert_into(person_images::table)
                        .values(person_images::image_bytes.eq(&image.image_bytes))
                        .returning(person_images::uid)
                        .get_result::<PersonImageId>(connection)?,
                };
                diesel::update(persons.filter(uid.eq(person_id)))
                    .set((
                        image_uid.eq(Some(new_image_uid)),
                        img_width.eq(Some(image.width)),
                        img_height.eq(Some(image.height)),
                    ))
                    .execute(connection)?;
            }

            diesel::update(persons.filter(uid.eq(person_id)))
                .set((
                    username.eq(update.username),
                    email.eq(update.email),
                    extra_attributes.eq(update.extra_attributes),
                ))
                .execute(connection)?;
            Ok(())
        })
    }

    fn merge_duplicate_persons(
        &mut self,
        person_id: PersonId,
        the_username: Option<&str>,
        the_email: Option<&str>,
    ) -> Result<Vec<PersonId>, StoreError> {
        use schema::on_call_events;
        use schema::person_images;
        use schema::persons::dsl::*;

        self.connection.transaction(|connection| {
            let query = persons
                .filter(uid.ne(person_id))
                .select((uid, image_uid))
                .into_boxed();
            let query = match (the_username, the_email) {
                (Some(u), Some(e)) => query.filter(username.eq(u).or(email.eq(e))),
                (Some(u), None) => query.filter(username.eq(u)),
                (None, Some(e)) => query.filter(email.eq(e)),
                (None, None) => return Ok(Vec::new()),
            };
            let duplicates = query.load::<(PersonId, Option<PersonImageId>)>(connection)?;

            for (duplicate_uid, duplicate_image_uid) in duplicates.iter() {
                diesel::update(
                    on_call_events::table.filter(on_call_events::person_uid.eq(*duplicate_uid)),
                )
                .set(on_call_events::person_uid.eq(person_id))
                .execute(connection)?;
                diesel::delete(persons.filter(uid.eq(*duplicate_uid))).execute(connection)?;
                if let Some(duplicate_image_uid) = duplicate_image_uid {
                    diesel::delete(
                        person_images::table.filter(person_images::uid.eq(*duplicate_image_uid)),
                    )
                    .execute(connection)?;
                }
            }
            Ok(duplicates.into_iter().map(|(id, _)| id).collect())
        })
    }

    fn finish_person_sync(
        &mut self,
        person_id: PersonId,
        the_error_msg: Option<String>,
        the_last_update: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        use schema::persons::dsl::*;

        let count = diesel::update(persons.filter(uid.eq(person_id)))
            .set((
                error_msg.eq(the_error_msg),
                last_update.eq(the_last_update),
            ))
            .execute(&mut self.connection)?;
        if count == 1 {
            Ok(())
        } else {
            Err(StoreError::NotExisting)
        }
    }

    fn get_person_statistics(
        &mut self,
        updated_before: DateTime<Utc>,
    ) -> Result<models::EntityStatistics, StoreError> {
        use schema::persons::dsl::*;

        self.connection.transaction(|connection| {
            Ok(models::EntityStatistics {
                total: persons.count().get_result(connection)?,
                outdated: persons
                    .filter(sync.eq(true))
                    .filter(last_update.le(updated_before))
                    .count()
                    .get_result(connection)?,
                with_errors: persons
                    .filter(error_msg.is_not_null())
                    .count()
                    .get_result(connection)?,
            })
        })
    }

    fn get_person_image(
        &mut self,
        image_id: PersonImageId,
    ) -> Result<models::PersonImage, StoreError> {
        use schema::person_images::dsl::*;

        person_images
            .filter(uid.eq(image_id))
            .select(models::PersonImage::as_select())
            .first::<models::PersonImage>(&mut self.connection)
            .map_err(|e| e.into())
    }

    fn delete_person_image(&mut self, image_id: PersonImageId) -> Result<(), StoreError> {
        use schema::person_images::dsl::*;

        // Fails with a foreign key violation (ON DELETE RESTRICT) while the image is in use
        let count =
            diesel::delete(person_images.filter(uid.eq(image_id))).execute(&mut self.connection)?;
        if count == 1 {
            Ok(())
        } else {
            Err(StoreError::NotExisting)
        }
    }

    fn get_events_ending_after(
        &mut self,
        time: DateTime<Utc>,
    ) -> Result<Vec<models::OnCallEvent>, StoreError> {
        use schema::on_call_events::dsl::*;

        on_call_events
            .filter(end_utc.ge(time))
            .order_by((start_utc.asc(), uid.asc()))
            .select(models::OnCallEvent::as_select())
            .load::<models::OnCallEvent>(&mut self.connection)
            .map_err(|e| e.into())
    }

    fn get_events_covering(
        &mut self,
        time: DateTime<Utc>,
    ) -> Result<Vec<models::OnCallEvent>, StoreError> {
        use schema::on_call_events::dsl::*;

        on_call_events
            .filter(start_utc.le(time))
            .filter(end_utc.gt(time))
            .order_by((start_utc.asc(), uid.asc()))
            .select(models::OnCallEvent::as_select())
            .load::<models::OnCallEvent>(&mut self.connection)
            .map_err(|e| e.into())
    }

    fn get_calendar_events(
        &mut self,
        the_calendar_uid: &str,
    ) -> Result<Vec<models::OnCallEvent>, StoreError> {
        use schema::on_call_events::dsl::*;

        on_call_events
            .filter(calendar_uid.eq(the_calendar_uid))
            .order_by((start_utc.asc(), uid.asc()))
            .select(models::OnCallEvent::as_select())
            .load::<models::OnCallEvent>(&mut self.connection)
            .map_err(|e| e.into())
    }

    fn check_connection(&mut self) -> Result<(), StoreError> {
        diesel::sql_query("SELECT 1").execute(&mut self.connection)?;
        Ok(())
    }
}
