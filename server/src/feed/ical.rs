//! iCalendar feed adapter, fetching .ics files via HTTP(S)

use super::{FeedAdapter, FeedEntry, FeedError};
use crate::config::FeedConfig;
use chrono::{DateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use icalendar::{CalendarComponent, CalendarDateTime, Component, DatePerhapsTime};
use log::{debug, info};
use rrule::{RRule, Unvalidated};
use std::collections::HashSet;
use std::time::Duration;

pub struct ICalFeedAdapter {
    client: reqwest::blocking::Client,
    look_ahead: TimeDelta,
    max_entries: usize,
}

impl ICalFeedAdapter {
    pub fn new(config: &FeedConfig) -> Result<Self, FeedError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("duty-board/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FeedError::Fetch(e.to_string()))?;
        Ok(Self {
            client,
            look_ahead: TimeDelta::days(config.look_ahead_days as i64),
            max_entries: config.max_entries,
        })
    }
}

impl FeedAdapter for ICalFeedAdapter {
    fn fetch_entries(
        &self,
        feed_url: &str,
        event_prefix: Option<&str>,
    ) -> Result<Vec<FeedEntry>, FeedError> {
        info!("Loading calendar feed {}", feed_url);
        let text = self
            .client
            .get(feed_url)
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.text())
            .map_err(|e| FeedError::Fetch(e.to_string()))?;
        let now = Utc::now();
        parse_feed(
            &text,
            event_prefix.unwrap_or(""),
            now,
            now + self.look_ahead,
            self.max_entries,
        )
    }
}

/// Parse the iCalendar `text` and return the earliest `max_entries` events overlapping the window
/// [`window_start`, `window_end`), whose summary starts with `prefix`.
///
/// Recurring events are expanded within the window, in the timezone of their DTSTART. Occurrences
/// listed as EXDATE or replaced by a separate event with the same UID and a matching RECURRENCE-ID
/// are skipped. The identity token of an entry is the first attendee of the event (without
/// "mailto:" scheme) or, if there is none, the summary without the prefix.
///
/// Events outside of the window are not validated, so a broken event from the past does not make
/// the whole feed unusable.
pub fn parse_feed(
    text: &str,
    prefix: &str,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    max_entries: usize,
) -> Result<Vec<FeedEntry>, FeedError> {
    let calendar: icalendar::Calendar = text.parse().map_err(FeedError::Parse)?;
    let events: Vec<&icalendar::Event> = calendar
        .components
        .iter()
        .filter_map(|component| match component {
            CalendarComponent::Event(event) => Some(event),
            _ => None,
        })
        .collect();

    let overridden: HashSet<(&str, DateTime<Utc>)> = events
        .iter()
        .filter_map(|event| {
            let recurrence_id = to_utc(event.get_recurrence_id()?).ok()?;
            Some((event.get_uid()?, recurrence_id))
        })
        .collect();

    let mut entries = Vec::new();
    for event in events.iter() {
        let Some(summary) = event.get_summary() else {
            continue;
        };
        let Some(summary_without_prefix) = summary.strip_prefix(prefix) else {
            continue;
        };

        let start = event
            .get_start()
            .ok_or_else(|| FeedError::Parse(format!("Event '{}' has no DTSTART", summary)))
            .and_then(to_zoned)?;
        let start_utc = start.with_timezone(&Utc);
        let end = match event.get_end() {
            Some(end) => to_utc(end)?,
            None => start_utc,
        };
        let duration = end - start_utc;

        let occurrences: Vec<DateTime<Utc>> = match event.property_value("RRULE") {
            Some(rrule_text) if event.get_recurrence_id().is_none() => {
                let exception_dates = exception_dates(event);
                let uid = event.get_uid();
                expand_recurrence(rrule_text, start, duration, window_start, window_end)?
                    .into_iter()
                    .filter(|occurrence| {
                        !exception_dates.contains(occurrence)
                            && !uid.is_some_and(|uid| overridden.contains(&(uid, *occurrence)))
                    })
                    .collect()
            }
            _ => vec![start_utc],
        };
        let occurrences: Vec<DateTime<Utc>> = occurrences
            .into_iter()
            .filter(|occurrence| *occurrence < window_end && *occurrence + duration > window_start)
            .collect();
        if occurrences.is_empty() {
            continue;
        }

        if duration < TimeDelta::zero() {
            return Err(FeedError::Parse(format!(
                "Event '{}' ends before it starts",
                summary
            )));
        }
        let identity_token = match first_attendee(event) {
            Some(attendee) => strip_mailto(attendee).trim().to_owned(),
            None => summary_without_prefix.trim().to_owned(),
        };
        if identity_token.is_empty() {
            return Err(FeedError::Parse(format!(
                "Event '{}' does not identify a person",
                summary
            )));
        }

        for occurrence in occurrences {
            entries.push(FeedEntry {
                identity_token: identity_token.clone(),
                start: occurrence,
                end: occurrence + duration,
            });
        }
    }

    entries.sort_by_key(|e| (e.start, e.end));
    entries.truncate(max_entries);
    debug!("Found {} matching events in calendar feed", entries.len());
    Ok(entries)
}

fn first_attendee(event: &icalendar::Event) -> Option<&str> {
    event
        .multi_properties()
        .get("ATTENDEE")
        .and_then(|attendees| attendees.first())
        .map(|attendee| attendee.value())
        .or_else(|| event.property_value("ATTENDEE"))
}

fn strip_mailto(value: &str) -> &str {
    match value.get(..7) {
        Some(scheme) if scheme.eq_ignore_ascii_case("mailto:") => &value[7..],
        _ => value,
    }
}

/// All EXDATE values of the event. A single EXDATE property may hold a comma-separated list.
fn exception_dates(event: &icalendar::Event) -> HashSet<DateTime<Utc>> {
    event
        .multi_properties()
        .get("EXDATE")
        .into_iter()
        .flatten()
        .chain(event.properties().get("EXDATE"))
        .flat_map(|property| {
            property.value().split(',').filter_map(move |value| {
                let mut single = icalendar::Property::new("EXDATE", value.trim());
                for (key, parameter) in property.params() {
                    single.add_parameter(key, parameter.value());
                }
                DatePerhapsTime::from_property(&single)
            })
        })
        .filter_map(|value| to_utc(value).ok())
        .collect()
}

/// Convert a DTSTART-like value into a point in time, keeping its timezone for recurrence
/// expansion. Floating times and dates are interpreted as UTC; unknown TZIDs fall back to UTC.
fn to_zoned(value: DatePerhapsTime) -> Result<DateTime<rrule::Tz>, FeedError> {
    match value {
        DatePerhapsTime::DateTime(CalendarDateTime::Utc(date_time)) => {
            Ok(date_time.with_timezone(&rrule::Tz::UTC))
        }
        DatePerhapsTime::DateTime(CalendarDateTime::Floating(date_time)) => {
            Ok(date_time.and_utc().with_timezone(&rrule::Tz::UTC))
        }
        DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, tzid }) => {
            let timezone: chrono_tz::Tz = tzid.trim_matches('"').parse().unwrap_or(chrono_tz::UTC);
            timezone
                .from_local_datetime(&date_time)
                .earliest()
                .map(|d| d.with_timezone(&rrule::Tz::Tz(timezone)))
                .ok_or_else(|| {
                    FeedError::Parse(format!(
                        "Local time {} does not exist in timezone {}",
                        date_time, tzid
                    ))
                })
        }
        DatePerhapsTime::Date(date) => Ok(date
            .and_time(NaiveTime::MIN)
            .and_utc()
            .with_timezone(&rrule::Tz::UTC)),
    }
}

fn to_utc(value: DatePerhapsTime) -> Result<DateTime<Utc>, FeedError> {
    to_zoned(value).map(|d| d.with_timezone(&Utc))
}

/// Get the start times of all occurrences of a recurring event which overlap the window.
///
/// The rule is evaluated in the timezone of `start`, so a weekly 09:00 shift stays at 09:00 local
/// time across daylight saving time changes.
fn expand_recurrence(
    rrule_text: &str,
    start: DateTime<rrule::Tz>,
    duration: TimeDelta,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Result<Vec<DateTime<Utc>>, FeedError> {
    let rrule = rrule_text
        .parse::<RRule<Unvalidated>>()
        .map_err(|e| FeedError::Parse(format!("Invalid RRULE '{}': {}", rrule_text, e)))?;
    let timezone = start.timezone();
    let rrule_set = rrule
        .build(start)
        .map_err(|e| FeedError::Parse(format!("Invalid RRULE '{}': {}", rrule_text, e)))?;
    Ok(rrule_set
        .after((window_start - duration.max(TimeDelta::zero())).with_timezone(&timezone))
        .before(window_end.with_timezone(&timezone))
        .all(u16::MAX)
        .dates
        .into_iter()
        .map(|d| d.with_timezone(&Utc))
        .collect())
}
