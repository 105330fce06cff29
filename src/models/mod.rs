//! Data models for the FScan application.
//!
//! This module contains the value types shared by the processor, its
//! collaborators and the presentation layer:
//! - [`Installation`]: A located NAPS2 deployment (app directory + data directory)
//! - [`ProfileConfig`]: The front/back profile name pair used for two-sided scans
//! - [`SessionState`]: The processor's mutable scan session
//! - [`ScanStatus`]: The derived four-valued status label
//! - [`StateSnapshot`]: The immutable copy published after every mutation
//!
//! # Architecture Note
//!
//! [`Installation`] and [`ProfileConfig`] are immutable values that are replaced
//! wholesale. [`SessionState`] is owned by exactly one thread, the processor's,
//! and observers only ever see [`StateSnapshot`] clones.

pub mod installation;
pub mod profile;
pub mod session;

pub use installation::{CONSOLE_EXE_NAME, Installation, PROFILES_XML_NAME};
pub use profile::{ProfileConfig, ScanSide};
pub use session::{ScanStatus, SessionError, SessionState, StateSnapshot};
