//! The read-only web API of the duty board
//!
//! All store calls are executed on actix' blocking thread pool (`web::block`), each with its own
//! store facade.

use crate::cli_error::CliError;
use crate::config::BoardConfig;
use crate::data_store::DutyBoardStore;
use crate::setup::{get_listen_address_from_env, get_listen_port_from_env};
use actix_web::middleware::from_fn;
use actix_web::{middleware, web, App, HttpServer};
use log::info;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

mod api;
mod http_error_logging;
mod time_format;

pub fn serve(store: impl DutyBoardStore + 'static, config: BoardConfig) -> Result<(), CliError> {
    let state = AppState {
        store: Arc::new(store),
        config: Arc::new(config),
        prometheus: crate::metrics::init_metrics()?,
    };
    let listen_address = get_listen_address_from_env()?;
    let listen_port = get_listen_port_from_env()?;
    info!("Serving duty board API on {}:{}", listen_address, listen_port);
    actix_web::rt::System::new()
        .block_on(
            HttpServer::new(move || {
                App::new()
                    .configure(api::configure_app)
                    .app_data(web::Data::new(state.clone()))
                    .wrap(from_fn(http_error_logging::error_logging_middleware))
                    .wrap(middleware::Compress::default())
            })
            .bind((listen_address, listen_port))
            .map_err(CliError::BindError)?
            .run(),
        )
        .map_err(CliError::ServerError)
}

#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn DutyBoardStore>,
    config: Arc<BoardConfig>,
    prometheus: PrometheusHandle,
}
