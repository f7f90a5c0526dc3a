// Library exports for the binary and integration tests

pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod file_watcher;
pub mod logging;
pub mod shutdown;
pub mod upload_queue;
