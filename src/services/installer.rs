//! Portable NAPS2 installation from the latest GitHub release.

use crate::models::Installation;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::fs;
use std::io::{Read, Seek};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

pub const NAPS2_RELEASES_API_URL: &str =
    "https://api.github.com/repos/cyanfish/naps2/releases/latest";

const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";
const API_TIMEOUT: Duration = Duration::from_secs(5);

/// Directory name, under the application directory, that portable copies are unpacked into
pub const PORTABLE_INSTALL_SUBDIR: &str = "naps2";

/// Errors while downloading or unpacking a portable release
#[derive(Error, Debug)]
pub enum InstallError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Failed to get release data from GitHub API: Error {status}{}", api_detail(.message))]
    Api {
        status: u16,
        message: Option<String>,
    },

    #[error("Failed to decode response data as JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Release contains no asset named {0}")]
    MissingAsset(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to extract archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Archive did not contain App and Data directories under {0}")]
    IncompleteArchive(Utf8PathBuf),
}

fn api_detail(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|m| format!(": {}", m))
        .unwrap_or_default()
}

/// The subset of the GitHub release payload we use
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub updated_at: String,
    pub browser_download_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Expected asset name of the portable archive for `release_name`
pub fn portable_asset_name(release_name: &str) -> String {
    format!("naps2-{}-portable.zip", release_name)
}

/// Find the portable archive among the release's assets
pub fn select_asset(release: &Release) -> Result<&ReleaseAsset, InstallError> {
    let expected = portable_asset_name(&release.name);
    match release.assets.iter().find(|a| a.name == expected) {
        Some(asset) => Ok(asset),
        None => {
            tracing::debug!(
                "Could not find portable .zip archive with expected name; dumping {} asset names:",
                release.assets.len()
            );
            for asset in &release.assets {
                tracing::debug!("- {}", asset.name);
            }
            Err(InstallError::MissingAsset(expected))
        }
    }
}

/// Extract every entry of `archive_path` into `dest_dir`
pub fn unpack_archive(archive_path: &Utf8Path, dest_dir: &Utf8Path) -> Result<(), InstallError> {
    let file = fs::File::open(archive_path).map_err(|source| InstallError::Io {
        path: archive_path.to_path_buf(),
        source,
    })?;
    tracing::debug!("Extracting {}", archive_path);
    unpack_reader(file, dest_dir)
}

fn unpack_reader<R: Read + Seek>(reader: R, dest_dir: &Utf8Path) -> Result<(), InstallError> {
    let mut archive = zip::ZipArchive::new(reader)?;
    tracing::debug!("Extracting {} entries into {}", archive.len(), dest_dir);
    archive.extract(dest_dir.as_std_path())?;
    Ok(())
}

/// Move every top-level entry of `from` into `to`, replacing what is already there
fn replace_entries(from: &Utf8Path, to: &Utf8Path) -> Result<(), InstallError> {
    let io_err = |path: &Utf8Path| {
        let path = path.to_path_buf();
        move |source| InstallError::Io { path, source }
    };

    for entry in fs::read_dir(from).map_err(io_err(from))? {
        let entry = entry.map_err(io_err(from))?;
        let name = entry.file_name();
        let dest = to.as_std_path().join(&name);
        let dest_utf8 = to.join(&*name.to_string_lossy());

        if dest.is_dir() {
            fs::remove_dir_all(&dest).map_err(io_err(&dest_utf8))?;
        } else if dest.exists() {
            fs::remove_file(&dest).map_err(io_err(&dest_utf8))?;
        }
        fs::rename(entry.path(), &dest).map_err(io_err(&dest_utf8))?;
    }
    Ok(())
}

/// Downloads and unpacks the latest NAPS2 portable release
///
/// HTTP runs on the shared tokio runtime; the caller blocks until the copy
/// is unpacked.
pub struct PortableInstaller {
    client: reqwest::Client,
    runtime: tokio::runtime::Handle,
    api_url: String,
    install_dir: Utf8PathBuf,
}

impl PortableInstaller {
    /// Installer that unpacks into `<base_dir>/naps2`
    pub fn new(runtime: tokio::runtime::Handle, base_dir: &Utf8Path) -> Result<Self, InstallError> {
        let client = reqwest::Client::builder()
            .user_agent(format!("{}/{}", crate::APP_NAME, crate::VERSION))
            .build()?;

        Ok(Self {
            client,
            runtime,
            api_url: NAPS2_RELEASES_API_URL.to_string(),
            install_dir: base_dir.join(PORTABLE_INSTALL_SUBDIR),
        })
    }

    /// Point the installer at a different release endpoint
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn install_dir(&self) -> &Utf8Path {
        &self.install_dir
    }

    /// Download, unpack, and return the new portable installation
    pub fn install(&self) -> Result<Installation, InstallError> {
        tracing::info!("Checking GitHub for latest NAPS2 release...");
        let release = self.runtime.block_on(self.fetch_latest_release())?;
        tracing::info!("Latest version is {}; release ID {}", release.name, release.id);

        let asset = select_asset(&release)?;
        tracing::info!(
            "{} is asset ID {}; last updated {}; {} bytes total",
            asset.name,
            asset.id,
            asset.updated_at,
            asset.size
        );

        let created_dir = !self.install_dir.is_dir();
        if created_dir {
            tracing::info!("Creating directory: {}", self.install_dir);
            fs::create_dir_all(&self.install_dir).map_err(|source| InstallError::Io {
                path: self.install_dir.clone(),
                source,
            })?;
        } else {
            tracing::debug!("Directory exists: {}", self.install_dir);
        }

        let result = self.download_and_unpack(&release, asset);
        if result.is_err() && created_dir {
            tracing::debug!("Removing {} after failed install", self.install_dir);
            if let Err(e) = fs::remove_dir_all(&self.install_dir) {
                tracing::warn!("Failed to remove {}: {}", self.install_dir, e);
            }
        }
        let installation = result?;

        tracing::info!(
            "Installed NAPS2 v{} Portable to {}.",
            release.name,
            self.install_dir
        );
        Ok(installation)
    }

    /// Download into a temporary archive and unpack through a staging directory.
    ///
    /// Both live under the install directory and are removed when dropped, so
    /// a failure at any step leaves no archive or partial unpack behind.
    fn download_and_unpack(
        &self,
        release: &Release,
        asset: &ReleaseAsset,
    ) -> Result<Installation, InstallError> {
        let io_err = |source| InstallError::Io {
            path: self.install_dir.clone(),
            source,
        };

        let mut archive = tempfile::Builder::new()
            .prefix(&asset.name)
            .suffix(".part")
            .tempfile_in(&self.install_dir)
            .map_err(io_err)?;

        tracing::info!("Downloading NAPS2 v{} portable release...", release.name);
        tracing::info!("From: {}", asset.browser_download_url);
        tracing::info!("  To: {}", self.install_dir.join(&asset.name));
        let file = archive.as_file().try_clone().map_err(io_err)?;
        self.runtime.block_on(self.download(
            &asset.browser_download_url,
            tokio::fs::File::from_std(file),
            &self.install_dir.join(&asset.name),
        ))?;
        tracing::info!("Downloaded {}.", asset.name);

        tracing::info!("Extracting NAPS2 to {}...", self.install_dir);
        let staging = tempfile::Builder::new()
            .prefix(".extract-")
            .tempdir_in(&self.install_dir)
            .map_err(io_err)?;
        let staging_path = Utf8Path::from_path(staging.path())
            .ok_or_else(|| InstallError::IncompleteArchive(self.install_dir.clone()))?;

        archive.as_file_mut().rewind().map_err(io_err)?;
        unpack_reader(archive.as_file(), staging_path)?;
        Installation::from_portable_root(staging_path)
            .ok_or_else(|| InstallError::IncompleteArchive(self.install_dir.clone()))?;

        replace_entries(staging_path, &self.install_dir)?;

        tracing::info!("Deleting {}...", asset.name);
        archive.close().map_err(io_err)?;

        Installation::from_portable_root(&self.install_dir)
            .ok_or_else(|| InstallError::IncompleteArchive(self.install_dir.clone()))
    }

    async fn fetch_latest_release(&self) -> Result<Release, InstallError> {
        let response = self
            .client
            .get(&self.api_url)
            .header(reqwest::header::ACCEPT, GITHUB_ACCEPT)
            .timeout(API_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ApiErrorBody>()
                .await
                .ok()
                .map(|body| body.message);
            return Err(InstallError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn download(
        &self,
        url: &str,
        mut file: tokio::fs::File,
        dest: &Utf8Path,
    ) -> Result<(), InstallError> {
        let io_err = |source| InstallError::Io {
            path: dest.to_path_buf(),
            source,
        };

        let mut response = self.client.get(url).send().await?.error_for_status()?;

        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await.map_err(io_err)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(io_err)?;

        tracing::debug!("Wrote {} bytes to {}", written, dest);
        Ok(())
    }
}
