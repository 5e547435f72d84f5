pub mod config;
pub mod logging;
pub mod server;
pub mod state;
