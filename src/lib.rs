pub mod actions;
pub mod api;
pub mod config;
pub mod error;
pub mod filter;
pub mod models;
pub mod quality;
pub mod scheduler;
pub mod store;
pub mod telemetry;
pub mod tokens;
pub mod ui;
