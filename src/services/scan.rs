use super::process::run_process;
use crate::models::Installation;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use thiserror::Error;

/// Errors from a single scan invocation
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Failed to create output directory {path}: {source}")]
    OutputDirectory {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to launch {exe}: {source}")]
    Launch {
        exe: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("NAPS2.Console.exe failed with exit code {0}")]
    ProcessFailed(i32),

    #[error("NAPS2.Console.exe failed to write file: {0}")]
    OutputMissing(Utf8PathBuf),
}

/// Runs one scan with the external tool
///
/// Implementations block until the tool exits. The processor calls this on
/// its own thread, so nothing else executes while a scan is in flight.
#[cfg_attr(test, mockall::automock)]
pub trait ScanInvoker: Send {
    fn invoke(
        &self,
        installation: &Installation,
        profile_name: &str,
        output_path: &Utf8Path,
    ) -> Result<(), ScanError>;
}

/// Build the NAPS2 console arguments for a scan
pub fn build_scan_args(profile_name: &str, output_path: &Utf8Path) -> Vec<String> {
    vec![
        "-v".to_string(),
        "-p".to_string(),
        profile_name.to_string(),
        "-o".to_string(),
        output_path.to_string(),
    ]
}

/// [`ScanInvoker`] backed by `NAPS2.Console.exe`
///
/// The child process runs on the shared tokio runtime so its output can be
/// streamed into the log while the calling thread waits.
pub struct ConsoleScanInvoker {
    runtime: tokio::runtime::Handle,
}

impl ConsoleScanInvoker {
    pub fn new(runtime: tokio::runtime::Handle) -> Self {
        Self { runtime }
    }
}

impl ScanInvoker for ConsoleScanInvoker {
    fn invoke(
        &self,
        installation: &Installation,
        profile_name: &str,
        output_path: &Utf8Path,
    ) -> Result<(), ScanError> {
        if let Some(parent) = output_path.parent() {
            if !parent.as_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|source| ScanError::OutputDirectory {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let exe = installation.console_exe();
        let args = build_scan_args(profile_name, output_path);

        tracing::info!("Invoking NAPS2.Console.exe with profile '{}'...", profile_name);

        let exit_code = self
            .runtime
            .block_on(run_process(&exe, &args))
            .map_err(|source| ScanError::Launch {
                exe: exe.clone(),
                source,
            })?;

        if exit_code != 0 {
            return Err(ScanError::ProcessFailed(exit_code));
        }
        if !output_path.is_file() {
            return Err(ScanError::OutputMissing(output_path.to_path_buf()));
        }

        tracing::info!("Scan finished: {}", output_path);
        Ok(())
    }
}
