//! Prometheus metrics of the refreshers, the duty-change watcher and the web API
//!
//! The metrics are recorded through the `metrics` facade. Without an installed recorder (e.g. in
//! unittests or in a worker without `METRICS_LISTEN_PORT`), recording is a no-op.

use crate::cli_error::CliError;
use crate::data_store::models::EntityStatistics;
use log::info;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

pub const CALENDARS_AMOUNT: &str = "duty_calendars_amount";
pub const CALENDARS_OUTDATED_AMOUNT: &str = "duty_calendars_outdated_amount";
pub const CALENDARS_ERRORS_AMOUNT: &str = "duty_calendars_errors_amount";
pub const CALENDARS_REFRESH_TOTAL: &str = "duty_calendars_refresh_total";
pub const CALENDARS_REFRESH_SUCCESS_TOTAL: &str = "duty_calendars_refresh_success_total";
pub const CALENDARS_REFRESH_FAILED_TOTAL: &str = "duty_calendars_refresh_failed_total";
pub const CALENDARS_LAST_REFRESH_FAILED: &str = "duty_calendars_last_refresh_failed";

pub const OFFICERS_AMOUNT: &str = "duty_officers_amount";
pub const OFFICERS_OUTDATED_AMOUNT: &str = "duty_officers_outdated_amount";
pub const OFFICERS_ERRORS_AMOUNT: &str = "duty_officers_errors_amount";
pub const OFFICERS_REFRESH_TOTAL: &str = "duty_officers_refresh_total";
pub const OFFICERS_REFRESH_SUCCESS_TOTAL: &str = "duty_officers_refresh_success_total";
pub const OFFICERS_REFRESH_FAILED_TOTAL: &str = "duty_officers_refresh_failed_total";
pub const OFFICERS_LAST_REFRESH_FAILED: &str = "duty_officers_last_refresh_failed";

pub const DUTY_CHANGE_CHECKS_TOTAL: &str = "duty_change_checks_total";
pub const DUTY_CHANGE_CALLBACKS_TOTAL: &str = "duty_change_callbacks_total";
pub const DUTY_CHANGE_CALLBACKS_SUCCESS_TOTAL: &str = "duty_change_callbacks_success_total";
pub const DUTY_CHANGE_CALLBACKS_FAILED_TOTAL: &str = "duty_change_callbacks_failed_total";
pub const DUTY_CHANGE_LAST_CALLBACK_FAILED: &str = "duty_change_last_callback_failed";

pub const EVENTS_PER_CALENDAR: &str = "duty_events_per_calendar";

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder for rendering the metrics in the web server's `/metrics`
/// endpoint.
///
/// Subsequent calls return the handle of the recorder installed first.
pub fn init_metrics() -> Result<PrometheusHandle, CliError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| CliError::AdapterSetupError(format!("Prometheus recorder: {}", e)))?;
    describe_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Install the Prometheus recorder with its own HTTP listener for a background worker, if a port
/// is given.
pub fn init_worker_metrics(listen_port: Option<u16>) -> Result<(), CliError> {
    let Some(port) = listen_port else {
        return Ok(());
    };
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .map_err(|e| CliError::AdapterSetupError(format!("Prometheus listener: {}", e)))?;
    describe_metrics();
    info!("Serving Prometheus metrics on port {}", port);
    Ok(())
}

fn describe_metrics() {
    describe_gauge!(CALENDARS_AMOUNT, "Number of duty calendars");
    describe_gauge!(
        CALENDARS_OUTDATED_AMOUNT,
        "Number of duty calendars which should have been refreshed already"
    );
    describe_gauge!(
        CALENDARS_ERRORS_AMOUNT,
        "Number of duty calendars whose last refresh failed"
    );
    describe_counter!(CALENDARS_REFRESH_TOTAL, "Calendar refresh attempts");
    describe_counter!(CALENDARS_REFRESH_SUCCESS_TOTAL, "Successful calendar refreshes");
    describe_counter!(CALENDARS_REFRESH_FAILED_TOTAL, "Failed calendar refreshes");
    describe_gauge!(
        CALENDARS_LAST_REFRESH_FAILED,
        "1 if the last refresh of the calendar failed"
    );
    describe_gauge!(OFFICERS_AMOUNT, "Number of known duty officers");
    describe_gauge!(
        OFFICERS_OUTDATED_AMOUNT,
        "Number of duty officers which should have been refreshed already"
    );
    describe_gauge!(
        OFFICERS_ERRORS_AMOUNT,
        "Number of duty officers whose last refresh failed"
    );
    describe_counter!(OFFICERS_REFRESH_TOTAL, "Duty officer refresh attempts");
    describe_counter!(OFFICERS_REFRESH_SUCCESS_TOTAL, "Successful duty officer refreshes");
    describe_counter!(OFFICERS_REFRESH_FAILED_TOTAL, "Failed duty officer refreshes");
    describe_gauge!(
        OFFICERS_LAST_REFRESH_FAILED,
        "1 if the last refresh of the duty officer failed"
    );
    describe_counter!(DUTY_CHANGE_CHECKS_TOTAL, "Runs of the duty-change watcher");
    describe_counter!(DUTY_CHANGE_CALLBACKS_TOTAL, "Duty change callback invocations");
    describe_counter!(
        DUTY_CHANGE_CALLBACKS_SUCCESS_TOTAL,
        "Successful duty change callbacks"
    );
    describe_counter!(DUTY_CHANGE_CALLBACKS_FAILED_TOTAL, "Failed duty change callbacks");
    describe_gauge!(
        DUTY_CHANGE_LAST_CALLBACK_FAILED,
        "1 if the last duty change callback of the calendar failed"
    );
    describe_gauge!(
        EVENTS_PER_CALENDAR,
        "Number of current and upcoming events per calendar"
    );
}

pub fn record_calendar_refresh(calendar_name: &str, success: bool) {
    counter!(CALENDARS_REFRESH_TOTAL).increment(1);
    if success {
        counter!(CALENDARS_REFRESH_SUCCESS_TOTAL).increment(1);
    } else {
        counter!(CALENDARS_REFRESH_FAILED_TOTAL).increment(1);
    }
    gauge!(CALENDARS_LAST_REFRESH_FAILED, "calendar_name" => calendar_name.to_owned())
        .set(if success { 0.0 } else { 1.0 });
}

pub fn set_calendar_statistics(statistics: &EntityStatistics) {
    gauge!(CALENDARS_AMOUNT).set(statistics.total as f64);
    gauge!(CALENDARS_OUTDATED_AMOUNT).set(statistics.outdated as f64);
    gauge!(CALENDARS_ERRORS_AMOUNT).set(statistics.with_errors as f64);
}

pub fn record_person_refresh(person: &str, success: bool) {
    counter!(OFFICERS_REFRESH_TOTAL).increment(1);
    if success {
        counter!(OFFICERS_REFRESH_SUCCESS_TOTAL).increment(1);
    } else {
        counter!(OFFICERS_REFRESH_FAILED_TOTAL).increment(1);
    }
    gauge!(OFFICERS_LAST_REFRESH_FAILED, "person" => person.to_owned())
        .set(if success { 0.0 } else { 1.0 });
}

pub fn set_person_statistics(statistics: &EntityStatistics) {
    gauge!(OFFICERS_AMOUNT).set(statistics.total as f64);
    gauge!(OFFICERS_OUTDATED_AMOUNT).set(statistics.outdated as f64);
    gauge!(OFFICERS_ERRORS_AMOUNT).set(statistics.with_errors as f64);
}

pub fn record_duty_check() {
    counter!(DUTY_CHANGE_CHECKS_TOTAL).increment(1);
}

pub fn record_duty_callback(calendar_name: &str, success: bool) {
    counter!(DUTY_CHANGE_CALLBACKS_TOTAL).increment(1);
    if success {
        counter!(DUTY_CHANGE_CALLBACKS_SUCCESS_TOTAL).increment(1);
    } else {
        counter!(DUTY_CHANGE_CALLBACKS_FAILED_TOTAL).increment(1);
    }
    gauge!(DUTY_CHANGE_LAST_CALLBACK_FAILED, "calendar_name" => calendar_name.to_owned())
        .set(if success { 0.0 } else { 1.0 });
}

pub fn set_events_per_calendar(calendar_name: &str, amount: usize) {
    gauge!(EVENTS_PER_CALENDAR, "calendar_name" => calendar_name.to_owned()).set(amount as f64);
}
