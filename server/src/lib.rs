mod data_store;

pub mod cli;
pub mod cli_error;
pub mod config;
mod directory;
mod feed;
mod metrics;
mod notify;
mod setup;
mod sync;
pub mod web;

pub use data_store::get_store_from_env;
