pub mod bus;
pub mod config;
pub mod error;
pub mod registry;
pub mod relayer;
pub mod signal;
pub mod store;
pub mod telemetry;
pub mod watcher;
