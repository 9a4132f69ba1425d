//! Calendar feed adapters: fetching the on-call shifts of a duty calendar from an external source

use chrono::{DateTime, Utc};
use std::fmt::{Display, Formatter};

pub mod ical;

/// One shift of a duty calendar, as found in the calendar feed
#[derive(Clone, Debug, PartialEq)]
pub struct FeedEntry {
    /// Raw identification of the person on duty: an email address or a username
    pub identity_token: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

pub trait FeedAdapter {
    /// Fetch the feed at `feed_url` and return its upcoming entries, sorted by start.
    ///
    /// Only entries whose summary starts with `event_prefix` (if given) are returned.
    fn fetch_entries(
        &self,
        feed_url: &str,
        event_prefix: Option<&str>,
    ) -> Result<Vec<FeedEntry>, FeedError>;
}

#[derive(Debug)]
pub enum FeedError {
    /// The feed could not be retrieved (connection error, timeout, non-success HTTP status)
    Fetch(String),
    /// The feed content is not a valid calendar or contains invalid events
    Parse(String),
}

impl Display for FeedError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedError::Fetch(e) => write!(f, "Could not fetch calendar feed: {}", e),
            FeedError::Parse(e) => write!(f, "Could not parse calendar feed: {}", e),
        }
    }
}

impl std::error::Error for FeedError {}
