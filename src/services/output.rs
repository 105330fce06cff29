use crate::config::{ConfigStore, keys};
use crate::models::ScanSide;
use camino::Utf8PathBuf;
use chrono::{DateTime, Local};

pub const DEFAULT_OUTPUT_SUBDIR: &str = "scans";
pub const DEFAULT_OUTPUT_FORMAT: &str = "jpg";

/// Where scan output files are written and how they are named.
///
/// Files are named `<YYYYMMDD-HHMMSS-mmm>-<side>.<format>` so that repeated
/// scans never overwrite each other and front/back pages sort next to each
/// other. NAPS2 picks the image format from the extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutputPolicy {
    output_dir: Utf8PathBuf,
    extension: String,
}

impl ScanOutputPolicy {
    pub fn new(output_dir: impl Into<Utf8PathBuf>, extension: impl Into<String>) -> Self {
        let extension: String = extension.into();
        Self {
            output_dir: output_dir.into(),
            extension: extension.trim_start_matches('.').to_ascii_lowercase(),
        }
    }

    /// `SCAN_OUTPUT_DIR` (relative paths resolve against the application directory)
    /// and `SCAN_OUTPUT_FORMAT`, defaulting to `<app>/scans` and `jpg`.
    pub fn from_config(config: &ConfigStore) -> Self {
        let output_dir = match config.get(keys::SCAN_OUTPUT_DIR) {
            Some(dir) if !dir.trim().is_empty() => {
                let dir = Utf8PathBuf::from(dir.trim());
                if dir.is_absolute() {
                    dir
                } else {
                    config.base_dir().join(dir)
                }
            }
            _ => config.base_dir().join(DEFAULT_OUTPUT_SUBDIR),
        };

        Self::new(
            output_dir,
            config.get_or(keys::SCAN_OUTPUT_FORMAT, DEFAULT_OUTPUT_FORMAT),
        )
    }

    pub fn output_dir(&self) -> &Utf8PathBuf {
        &self.output_dir
    }

    /// Output path for a scan of `side` started at `timestamp`
    pub fn path_for(&self, side: ScanSide, timestamp: DateTime<Local>) -> Utf8PathBuf {
        let stem = timestamp.format("%Y%m%d-%H%M%S-%3f");
        self.output_dir
            .join(format!("{}-{}.{}", stem, side, self.extension))
    }
}
