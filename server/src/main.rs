use clap::ArgAction;
use clap::{Args, Parser, Subcommand};
use dotenvy::dotenv;
use dutyboard_server::cli::{database_migration, manage_calendars, workers};
use dutyboard_server::cli_error::CliError;
use dutyboard_server::config::load_board_config_from_env;
use dutyboard_server::get_store_from_env;
use log::{error, warn};

fn main() {
    let args = CliArgs::parse();
    let dotenv_result = dotenv();

    let env = env_logger::Env::new().filter_or(
        "RUST_LOG",
        match args.global_opts.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        },
    );
    env_logger::Builder::from_env(env).init();
    if let Err(e) = dotenv_result {
        warn!("Could not read .env file: {}", e);
    }

    if let Err(e) = run_command(args.command) {
        error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn run_command(command: Command) -> Result<(), CliError> {
    match command {
        Command::MigrateDb => database_migration::run_migrations(),
        Command::UpdateCalendars => {
            database_migration::check_migration_state()?;
            let config = load_board_config_from_env()?;
            manage_calendars::update_calendars(&get_store_from_env()?, &config)
        }
        Command::ListCalendars => {
            database_migration::check_migration_state()?;
            manage_calendars::print_calendar_list(&get_store_from_env()?)
        }
        Command::Serve => {
            database_migration::check_migration_state()?;
            let config = load_board_config_from_env()?;
            dutyboard_server::web::serve(get_store_from_env()?, config)
        }
        Command::CalendarRefresher => workers::run_calendar_refresher(),
        Command::DutyOfficerRefresher => workers::run_duty_officer_refresher(),
        Command::DutyWatcher => workers::run_duty_watcher(),
    }
}

/// On-call duty board: shows who is on duty, based on calendar feeds and a user directory
#[derive(Debug, Parser)]
#[clap(name = "dutyboard", version)]
pub struct CliArgs {
    #[clap(flatten)]
    global_opts: GlobalOpts,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Migrate the database schema to the current version
    MigrateDb,
    /// Apply the calendars from the configuration file to the database
    UpdateCalendars,
    /// Print all calendars with their sync state
    ListCalendars,
    /// Serve the duty board web API
    Serve,
    /// Run the worker keeping the calendar events in sync with the calendar feeds
    CalendarRefresher,
    /// Run the worker enriching the duty officers with details from the directory
    DutyOfficerRefresher,
    /// Run the worker notifying changes of the persons on duty
    DutyWatcher,
}

#[derive(Debug, Args)]
struct GlobalOpts {
    /// Verbosity level (can be specified multiple times)
    #[clap(long, short, global = true, action = ArgAction::Count)]
    verbose: u8,
}
