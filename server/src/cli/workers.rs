//! Entry points of the long-running background workers
//!
//! Every worker refuses to start while database migrations are pending, loads the board
//! configuration and optionally exposes its metrics on `METRICS_LISTEN_PORT`.

use crate::cli::database_migration::check_migration_state;
use crate::cli_error::CliError;
use crate::config::{load_board_config_from_env, BoardConfig};
use crate::data_store::{get_store_from_env, DutyBoardStore};
use crate::directory::create_directory_adapter;
use crate::feed::ical::ICalFeedAdapter;
use crate::notify::create_notifier;
use crate::setup::get_metrics_listen_port_from_env;
use crate::sync::calendars::{
    collect_calendar_metrics, sync_calendar_configurations, update_the_most_outdated_calendar,
};
use crate::sync::duty_watcher::DutyWatcher;
use crate::sync::persons::{collect_person_metrics, update_the_most_outdated_person};
use crate::sync::PollingLoop;
use chrono::Utc;
use log::info;

fn prepare_worker() -> Result<(impl DutyBoardStore, BoardConfig), CliError> {
    check_migration_state()?;
    let config = load_board_config_from_env()?;
    crate::metrics::init_worker_metrics(get_metrics_listen_port_from_env()?)?;
    Ok((get_store_from_env()?, config))
}

/// Apply the calendar configuration, then keep refreshing the most outdated calendar.
pub fn run_calendar_refresher() -> Result<(), CliError> {
    let (store, config) = prepare_worker()?;
    sync_calendar_configurations(&store, &config)?;
    let feed = ICalFeedAdapter::new(&config.feed)
        .map_err(|e| CliError::AdapterSetupError(e.to_string()))?;
    let update_frequency = config.sync.calendar_update_frequency();

    info!("Starting calendar refresher.");
    PollingLoop::new(
        "Calendar refresher",
        config.sync.idle_delay(),
        config.sync.metrics_update_interval(),
    )
    .run(
        || update_the_most_outdated_calendar(&store, &feed, update_frequency, Utc::now()),
        || collect_calendar_metrics(&store, update_frequency, Utc::now()),
    )
}

/// Keep refreshing the most outdated duty officer from the configured directory.
pub fn run_duty_officer_refresher() -> Result<(), CliError> {
    let (store, config) = prepare_worker()?;
    let mut directory = create_directory_adapter(config.directory.as_ref())?;
    let update_frequency = config.sync.person_update_frequency();

    info!("Starting duty officer refresher.");
    PollingLoop::new(
        "Duty officer refresher",
        config.sync.idle_delay(),
        config.sync.metrics_update_interval(),
    )
    .run(
        || {
            update_the_most_outdated_person(
                &store,
                directory.as_mut(),
                update_frequency,
                Utc::now(),
            )
        },
        || collect_person_metrics(&store, update_frequency, Utc::now()),
    )
}

/// Check for changes of the persons on duty and notify them.
pub fn run_duty_watcher() -> Result<(), CliError> {
    let (store, config) = prepare_worker()?;
    let notifier = create_notifier(&config.notifier)?;

    info!("Starting duty watcher.");
    DutyWatcher::new().run(&store, notifier.as_ref(), config.sync.duty_check_interval())
}
