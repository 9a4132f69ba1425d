//! Callbacks for changes of the persons on duty

use crate::cli_error::CliError;
use crate::config::NotifierConfig;
use crate::data_store::models::{Calendar, Person};
use dutyboard_api_types::DutyChangeNotification;
use log::info;
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub trait DutyChangeNotifier {
    /// Called whenever the set of persons on duty for the calendar changes. `persons` is empty if
    /// nobody is on duty anymore.
    fn on_duty_changed(&self, calendar: &Calendar, persons: &[Person]) -> Result<(), NotifyError>;
}

#[derive(Debug)]
pub struct NotifyError(pub String);

impl Display for NotifyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Duty change notification failed: {}", self.0)
    }
}

impl std::error::Error for NotifyError {}

/// Create the notifier selected in the board configuration
pub fn create_notifier(config: &NotifierConfig) -> Result<Box<dyn DutyChangeNotifier>, CliError> {
    match config {
        NotifierConfig::Log => Ok(Box::new(LogNotifier)),
        NotifierConfig::Webhook { url, timeout_secs } => Ok(Box::new(
            WebhookNotifier::new(url.clone(), Duration::from_secs(*timeout_secs))
                .map_err(|e| CliError::AdapterSetupError(e.to_string()))?,
        )),
    }
}

/// Only writes the change to the log
pub struct LogNotifier;

impl DutyChangeNotifier for LogNotifier {
    fn on_duty_changed(&self, calendar: &Calendar, persons: &[Person]) -> Result<(), NotifyError> {
        if persons.is_empty() {
            info!("Nobody is on duty for '{}' anymore", calendar.name);
        } else {
            info!(
                "Now on duty for '{}': {}",
                calendar.name,
                persons
                    .iter()
                    .map(|p| p.display_name())
                    .collect::<Vec<String>>()
                    .join(", ")
            );
        }
        Ok(())
    }
}

/// Posts a [DutyChangeNotification] as JSON to an HTTP endpoint
pub struct WebhookNotifier {
    client: reqwest::blocking::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String, timeout: Duration) -> Result<Self, NotifyError> {
        url::Url::parse(&url).map_err(|e| NotifyError(format!("Invalid webhook URL: {}", e)))?;
        Ok(Self {
            client: reqwest::blocking::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| NotifyError(e.to_string()))?,
            url,
        })
    }
}

impl DutyChangeNotifier for WebhookNotifier {
    fn on_duty_changed(&self, calendar: &Calendar, persons: &[Person]) -> Result<(), NotifyError> {
        let notification = DutyChangeNotification {
            calendar_uid: calendar.uid.clone(),
            calendar_name: calendar.name.clone(),
            persons: persons.iter().map(|p| p.into()).collect(),
            changed_at: chrono::Utc::now(),
        };
        self.client
            .post(&self.url)
            .json(&notification)
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(|e| NotifyError(e.to_string()))?;
        Ok(())
    }
}
