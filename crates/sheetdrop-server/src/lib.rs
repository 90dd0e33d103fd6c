//! sheetdrop-server: hosts the CSV export handler on hyper

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod config;
pub mod server;

pub use config::ServerConfig;
pub use server::{bind, serve, to_hyper_response, App, ConnectionTracker, HEALTH_PATH};
