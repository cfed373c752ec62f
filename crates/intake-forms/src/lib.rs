pub mod config;
pub mod error;
pub mod intake;
pub mod staff;
pub mod store;
pub mod telemetry;
