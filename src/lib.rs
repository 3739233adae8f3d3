pub mod config;
pub mod couch;
pub mod database;
pub mod feed;
pub mod models;
pub mod reconciler;
pub mod server;
pub mod store;
