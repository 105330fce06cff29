//! Services module - Collaborators of the scan session processor.
//!
//! Everything here talks to the outside world (configuration, the filesystem,
//! GitHub, and the NAPS2 executable). The processor only sees the traits, so
//! it can be driven against mocks in tests.
//!
//! # Components
//!
//! - [`InstallationResolver`]: Finds, validates, and persists the NAPS2 installation.
//!   The [`Naps2InstallationResolver`] implementation searches for a portable copy next
//!   to the executable and then for a standard install under Program Files.
//!
//! - [`PortableInstaller`]: Downloads the latest portable release from GitHub and
//!   unpacks it next to the executable.
//!
//! - [`ProfileResolver`]: Reads `profiles.xml` and validates the configured
//!   front/back profile names.
//!
//! - [`ScanInvoker`]: Runs `NAPS2.Console.exe` for one scan. [`ConsoleScanInvoker`]
//!   streams the child's output into the log while the processor thread waits.
//!
//! - [`ScanOutputPolicy`]: Decides where each scan is written.
//!
//! # Error Handling
//!
//! The resolvers log and swallow lookup problems, returning `None` or an empty
//! set. Persistence failures are returned as `anyhow::Error`. Scan failures are
//! returned as [`ScanError`] so the processor can tell them apart from fatal errors.

pub mod installation;
pub mod installer;
pub mod output;
pub mod process;
pub mod profiles;
pub mod scan;

pub use installation::{InstallationResolver, Naps2InstallationResolver, validate_installation};
pub use installer::{InstallError, PortableInstaller};
pub use output::ScanOutputPolicy;
pub use process::run_process;
pub use profiles::{Naps2ProfileResolver, ProfileError, ProfileResolver, ScanDevice};
pub use scan::{ConsoleScanInvoker, ScanError, ScanInvoker};
