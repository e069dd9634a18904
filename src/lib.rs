pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod publisher;
pub mod relay;
pub mod server;
pub mod state;
pub mod store;
pub mod subscribe;
pub mod telemetry;
pub mod transfer;
pub mod utils;
