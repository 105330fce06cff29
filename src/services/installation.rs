use super::installer::{PORTABLE_INSTALL_SUBDIR, PortableInstaller};
use crate::config::{ConfigStore, keys};
use crate::models::Installation;
use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::Arc;

/// Environment variables naming the Windows program directories, in search order
const PROGRAM_FILES_VARS: [&str; 2] = ["ProgramFiles(x86)", "ProgramFiles"];

/// Folder name NAPS2 uses under Program Files and under the roaming data directory
const NAPS2_DIR_NAME: &str = "NAPS2";

/// Locates, validates, and persists the NAPS2 installation to use
///
/// Lookups never fail: anything that prevents resolving an installation is
/// logged and reported as `None`.
#[cfg_attr(test, mockall::automock)]
pub trait InstallationResolver: Send {
    /// The installation persisted in configuration, if it is still valid
    fn configured(&self) -> Option<Installation>;

    /// A valid installation found on this system, if any
    fn suggested(&self) -> Option<Installation>;

    /// Persist `installation` and clear the opt-out flag
    fn set_configured(&self, installation: &Installation) -> Result<()>;

    /// Persist the user's choice not to use NAPS2 at all
    fn disable(&self) -> Result<()>;

    /// True when the user opted out of the NAPS2 integration
    fn is_disabled(&self) -> bool;

    /// Download and unpack a portable copy, returning it on success
    fn install_portable(&self) -> Option<Installation>;
}

/// True when `installation` has a console executable and a data directory.
pub fn validate_installation(installation: &Installation) -> bool {
    let exe = installation.console_exe();
    if !exe.is_file() {
        tracing::debug!("{} not found", exe);
        return false;
    }
    if !installation.data_dir().is_dir() {
        tracing::debug!("Data directory {} not found", installation.data_dir());
        return false;
    }
    true
}

/// [`InstallationResolver`] backed by the configuration store and the local filesystem
pub struct Naps2InstallationResolver {
    config: Arc<ConfigStore>,
    installer: PortableInstaller,
    program_dirs: Vec<Utf8PathBuf>,
    roaming_dir: Option<Utf8PathBuf>,
}

impl Naps2InstallationResolver {
    pub fn new(config: Arc<ConfigStore>, installer: PortableInstaller) -> Self {
        let mut program_dirs: Vec<Utf8PathBuf> = Vec::new();
        for var in PROGRAM_FILES_VARS {
            if let Ok(dir) = std::env::var(var) {
                let dir = Utf8PathBuf::from(dir);
                if !program_dirs.contains(&dir) {
                    program_dirs.push(dir);
                }
            }
        }

        let roaming_dir = dirs::config_dir().and_then(|dir| Utf8PathBuf::try_from(dir).ok());

        Self {
            config,
            installer,
            program_dirs,
            roaming_dir,
        }
    }

    /// Replace the system directories searched for a standard install
    pub fn with_system_dirs(
        mut self,
        program_dirs: Vec<Utf8PathBuf>,
        roaming_dir: Option<Utf8PathBuf>,
    ) -> Self {
        self.program_dirs = program_dirs;
        self.roaming_dir = roaming_dir;
        self
    }

    fn resolve_path(&self, value: &str) -> Utf8PathBuf {
        let path = Utf8PathBuf::from(value.trim());
        if path.is_absolute() {
            path
        } else {
            self.config.base_dir().join(path)
        }
    }

    /// Store paths under the application directory relative to it, so a
    /// portable copy keeps working when the whole folder moves.
    fn storable_path(&self, path: &Utf8Path) -> String {
        match path.strip_prefix(self.config.base_dir()) {
            Ok(relative) if !relative.as_str().is_empty() => relative.to_string(),
            _ => path.to_string(),
        }
    }

    fn portable_candidate(&self) -> Option<Installation> {
        let root = self.config.base_dir().join(PORTABLE_INSTALL_SUBDIR);
        Installation::from_portable_root(&root).filter(validate_installation)
    }

    fn standard_candidate(&self) -> Option<Installation> {
        let data_dir = self.roaming_dir.as_ref()?.join(NAPS2_DIR_NAME);
        self.program_dirs
            .iter()
            .map(|dir| Installation::new(dir.join(NAPS2_DIR_NAME), data_dir.clone()))
            .find(validate_installation)
    }
}

impl InstallationResolver for Naps2InstallationResolver {
    fn configured(&self) -> Option<Installation> {
        if self.is_disabled() {
            tracing::debug!("NAPS2 integration is disabled ({} is set).", keys::NAPS2_DISABLED);
            return None;
        }

        let app_dir = self
            .config
            .get(keys::NAPS2_APP_DIR)
            .filter(|v| !v.trim().is_empty());
        let data_dir = self
            .config
            .get(keys::NAPS2_DATA_DIR)
            .filter(|v| !v.trim().is_empty());

        let (app_dir, data_dir) = match (app_dir, data_dir) {
            (Some(app_dir), Some(data_dir)) => (app_dir, data_dir),
            (None, None) => {
                tracing::debug!(
                    "NAPS2 paths ({}, {}) not configured.",
                    keys::NAPS2_APP_DIR,
                    keys::NAPS2_DATA_DIR
                );
                return None;
            }
            (Some(_), None) => {
                tracing::warn!(
                    "Incomplete NAPS2 configuration: {} is not set.",
                    keys::NAPS2_DATA_DIR
                );
                return None;
            }
            (None, Some(_)) => {
                tracing::warn!(
                    "Incomplete NAPS2 configuration: {} is not set.",
                    keys::NAPS2_APP_DIR
                );
                return None;
            }
        };

        let installation =
            Installation::new(self.resolve_path(&app_dir), self.resolve_path(&data_dir));
        if !validate_installation(&installation) {
            tracing::warn!(
                "Configured NAPS2 installation is invalid (app: {}, data: {}).",
                installation.app_dir(),
                installation.data_dir()
            );
            return None;
        }

        Some(installation)
    }

    fn suggested(&self) -> Option<Installation> {
        let candidate = self
            .portable_candidate()
            .or_else(|| self.standard_candidate());
        match &candidate {
            Some(installation) => tracing::info!(
                "Found NAPS2 {} installation at {}",
                if installation.is_portable() {
                    "portable"
                } else {
                    "standard"
                },
                installation.app_dir()
            ),
            None => tracing::info!("No NAPS2 installation found on this system."),
        }
        candidate
    }

    fn set_configured(&self, installation: &Installation) -> Result<()> {
        tracing::info!(
            "Saving NAPS2 installation: app={}, data={}",
            installation.app_dir(),
            installation.data_dir()
        );
        self.config.update([
            (
                keys::NAPS2_APP_DIR,
                Some(self.storable_path(installation.app_dir())),
            ),
            (
                keys::NAPS2_DATA_DIR,
                Some(self.storable_path(installation.data_dir())),
            ),
            (keys::NAPS2_DISABLED, Some("0".to_string())),
        ])
    }

    fn disable(&self) -> Result<()> {
        tracing::info!("Disabling NAPS2 integration.");
        self.config
            .update([(keys::NAPS2_DISABLED, Some("1".to_string()))])
    }

    fn is_disabled(&self) -> bool {
        self.config.get_flag(keys::NAPS2_DISABLED)
    }

    fn install_portable(&self) -> Option<Installation> {
        match self.installer.install() {
            Ok(installation) => Some(installation),
            Err(e) => {
                tracing::error!("Failed to install NAPS2 portable: {}", e);
                None
            }
        }
    }
}
