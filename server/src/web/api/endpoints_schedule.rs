use crate::config::BoardConfig;
use crate::data_store::models::OnCallEvent;
use crate::data_store::{DutyBoardStoreFacade, StoreError};
use crate::web::api::{APIError, TimezoneQuery};
use crate::web::time_format::{format_timestamp, resolve_timezone};
use crate::web::AppState;
use actix_web::{get, web, Responder};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use dutyboard_api_types::{
    CalendarSchedule, CurrentSchedule, PersonEssentials, ScheduleConfig, ScheduledEvent,
};
use std::collections::{BTreeMap, HashMap};

#[get("/schedule")]
async fn get_schedule(
    query: web::Query<TimezoneQuery>,
    state: web::Data<AppState>,
) -> Result<impl Responder, APIError> {
    let timezone = resolve_timezone(
        query.timezone.as_deref(),
        &state.config.display.default_timezone,
    );
    let schedule = web::block(move || -> Result<_, APIError> {
        let mut store = state.store.get_facade()?;
        Ok(build_schedule(
            store.as_mut(),
            &state.config,
            &timezone,
            Utc::now(),
        )?)
    })
    .await??;

    for calendar in schedule.calendars.iter() {
        crate::metrics::set_events_per_calendar(&calendar.name, calendar.events.len());
    }
    Ok(web::Json(schedule))
}

/// Collect all calendars with their current and upcoming events (those ending at or after `now`)
/// and the persons referenced by these events.
fn build_schedule(
    store: &mut dyn DutyBoardStoreFacade,
    config: &BoardConfig,
    timezone: &Tz,
    now: DateTime<Utc>,
) -> Result<CurrentSchedule, StoreError> {
    let calendars = store.get_calendars()?;
    let mut events_by_calendar: HashMap<String, Vec<OnCallEvent>> = HashMap::new();
    for event in store.get_events_ending_after(now)? {
        events_by_calendar
            .entry(event.calendar_uid.clone())
            .or_default()
            .push(event);
    }

    let mut person_uids: Vec<i32> = events_by_calendar
        .values()
        .flatten()
        .map(|e| e.person_uid)
        .collect();
    person_uids.sort();
    person_uids.dedup();
    let persons: BTreeMap<i32, PersonEssentials> = store
        .get_persons(&person_uids)?
        .iter()
        .map(|p| (p.uid, p.into()))
        .collect();

    let calendars = calendars
        .into_iter()
        .map(|calendar| {
            let events = events_by_calendar
                .remove(&calendar.uid)
                .unwrap_or_default()
                .into_iter()
                .map(|event| ScheduledEvent {
                    start_event: format_timestamp(&event.start_utc, timezone),
                    end_event: format_timestamp(&event.end_utc, timezone),
                    person_uid: event.person_uid,
                })
                .collect();
            CalendarSchedule {
                uid: calendar.uid,
                name: calendar.name,
                description: calendar.description.unwrap_or_default(),
                category: calendar.category,
                order: calendar.order,
                last_update: format_timestamp(&calendar.last_update, timezone),
                error_msg: calendar.error_msg.unwrap_or_default(),
                sync: calendar.sync,
                events,
            }
        })
        .collect();

    Ok(CurrentSchedule {
        config: schedule_config(config, timezone),
        calendars,
        persons,
    })
}

fn schedule_config(config: &BoardConfig, timezone: &Tz) -> ScheduleConfig {
    let display = &config.display;
    ScheduleConfig {
        timezone: timezone.name().to_owned(),
        text_color: display.text_color.clone(),
        background_color: display.background_color.clone(),
        categories: config.ordered_categories(),
        git_repository_url: display.git_repository_url.clone(),
        enable_admin_button: display.enable_admin_button,
        announcement_text_color: display.announcement_text_color.clone(),
        announcement_background_color: display.announcement_background_color.clone(),
        announcements: display.announcements.clone(),
        footer_html: display.footer_html.clone(),
    }
}
