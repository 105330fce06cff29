// UI module - Terminal front-end
//
// This module contains:
// - ConsoleController: Reads commands from stdin and renders processor events

pub mod console;

pub use console::{ConsoleController, ConsoleOutcome};
