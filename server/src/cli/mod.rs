pub mod database_migration;
pub mod manage_calendars;
pub mod workers;
