// Infrastructure module - External dependencies and adapters
pub mod serial;
pub mod sink;
pub mod logging;
pub mod config;
