pub mod api;
pub mod backtest;
pub mod config;
pub mod data;
pub mod report;
pub mod server;
pub mod strategy;

pub use config::Config;
