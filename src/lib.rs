// FScan - Double-sided document scanning with NAPS2
//
// This is the library crate containing the scan session processor and its collaborators.
// The binary crate (main.rs) provides the console entry point.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod processor;
pub mod services;
pub mod state;
pub mod ui;

// Re-export commonly used types for convenience
pub use config::ConfigStore;
pub use models::{Installation, ProfileConfig, ScanSide, ScanStatus, StateSnapshot};
pub use processor::{Command, Processor, ProcessorHandle, ProcessorOptions};
pub use state::ProcessorEvent;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
