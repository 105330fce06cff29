use crate::models::{Installation, ProfileConfig, ScanSide};

/// Requests accepted by the scan session processor
///
/// Commands are queued FIFO and each one is executed exactly once on the
/// processor thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Rebuild the session from configuration
    Bootstrap,

    /// Prompt for an installation, pre-filled with the best candidate
    RequestConfigureInstallation,

    /// Prompt for front/back profiles of the current installation
    RequestConfigureProfiles,

    /// Persist a chosen installation, then bootstrap
    SetInstallation(Installation),

    /// Persist a chosen profile pair, then bootstrap
    SetProfileConfig(ProfileConfig),

    /// Persist the opt-out flag, then bootstrap
    DisableIntegration,

    /// Install a portable copy and use it
    AutoInstall,

    /// Scan one side with its configured profile
    Scan { side: ScanSide },

    /// Stop the processor; commands queued behind this one are dropped
    Exit,
}

impl Command {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Command::Bootstrap => "Bootstrap",
            Command::RequestConfigureInstallation => "RequestConfigureInstallation",
            Command::RequestConfigureProfiles => "RequestConfigureProfiles",
            Command::SetInstallation(_) => "SetInstallation",
            Command::SetProfileConfig(_) => "SetProfileConfig",
            Command::DisableIntegration => "DisableIntegration",
            Command::AutoInstall => "AutoInstall",
            Command::Scan { .. } => "Scan",
            Command::Exit => "Exit",
        }
    }
}
