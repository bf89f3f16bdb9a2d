pub mod analytics;
pub mod config;
pub mod errors;
pub mod feeds;
pub mod hedge;
pub mod models;
pub mod server;
pub mod state;
pub mod strategy;
