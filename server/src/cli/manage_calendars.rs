use crate::cli_error::CliError;
use crate::config::BoardConfig;
use crate::data_store::DutyBoardStore;
use crate::sync::calendars::sync_calendar_configurations;

/// Apply the calendars of the board configuration to the database and print a summary
pub fn update_calendars(store: &dyn DutyBoardStore, config: &BoardConfig) -> Result<(), CliError> {
    let result = sync_calendar_configurations(store, config)?;
    println!(
        "Calendars created: {}, updated: {}, deleted: {}",
        result.created, result.updated, result.deleted
    );
    Ok(())
}

pub fn print_calendar_list(store: &dyn DutyBoardStore) -> Result<(), CliError> {
    let mut data_store = store.get_facade()?;

    let calendars = data_store.get_calendars()?;

    let mut table = comfy_table::Table::new();
    table
        .load_preset(comfy_table::presets::ASCII_BORDERS_ONLY_CONDENSED)
        .set_header(vec![
            "uid",
            "name",
            "category",
            "order",
            "sync",
            "last update",
            "error",
        ])
        .add_rows(calendars.into_iter().map(|calendar| {
            [
                calendar.uid,
                calendar.name,
                calendar.category,
                calendar.order.to_string(),
                calendar.sync.to_string(),
                calendar.last_update.to_rfc3339(),
                calendar.error_msg.unwrap_or_default(),
            ]
        }));

    println!("{table}");
    Ok(())
}
