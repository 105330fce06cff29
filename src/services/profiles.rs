//! NAPS2 scan profile discovery.
//!
//! NAPS2 stores its profiles in `<data_dir>/profiles.xml`:
//!
//! ```xml
//! <ArrayOfScanProfile>
//!   <ScanProfile>
//!     <Device><ID>{6BDD1FC6-...}\0000</ID><Name>Canon DR-C225</Name></Device>
//!     <DisplayName>FrontScan</DisplayName>
//!     ...
//!   </ScanProfile>
//! </ArrayOfScanProfile>
//! ```
//!
//! The document is flat and machine-written, so the handful of elements we
//! need are extracted with pre-compiled regexes rather than a full XML parser.

use crate::config::{ConfigStore, keys};
use crate::models::{PROFILES_XML_NAME, ProfileConfig};
use anyhow::Result;
use camino::Utf8Path;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::sync::Arc;
use thiserror::Error;

/// A scanner referenced by at least one profile
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScanDevice {
    pub id: String,
    pub name: String,
}

/// A single `<ScanProfile>` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanProfileEntry {
    pub display_name: String,
    pub device: Option<ScanDevice>,
}

/// Errors reading `profiles.xml`
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Unexpected root element in profiles.xml (expected ArrayOfScanProfile)")]
    UnexpectedRoot,

    #[error("Profile #{0} has no DisplayName")]
    MissingDisplayName(usize),
}

/// Looks up scan profiles defined in an installation's data directory
#[cfg_attr(test, mockall::automock)]
pub trait ProfileResolver: Send {
    /// Names of all profiles defined in `data_dir`, sorted
    fn list_profile_names(&self, data_dir: &Utf8Path) -> BTreeSet<String>;

    /// Devices referenced by the profiles in `data_dir`, unique by id, sorted by name
    fn list_devices(&self, data_dir: &Utf8Path) -> Vec<ScanDevice>;

    /// The persisted front/back selection, if both names exist in `data_dir`
    fn profile_config(&self, data_dir: &Utf8Path) -> Option<ProfileConfig>;

    /// Persist a front/back selection
    fn set_profile_config(&self, config: &ProfileConfig) -> Result<()>;
}

/// Parser for `profiles.xml`
///
/// The regexes are compiled once at construction:
/// - `root_pattern`: the `<ArrayOfScanProfile>` root element
/// - `profile_pattern`: each `<ScanProfile>...</ScanProfile>` block
/// - `display_name_pattern`: `<DisplayName>` inside a profile
/// - `device_pattern`: the `<Device>...</Device>` block inside a profile
/// - `id_pattern` / `name_pattern`: `<ID>` and `<Name>` inside a device
pub struct ProfilesParser {
    root_pattern: Regex,
    profile_pattern: Regex,
    display_name_pattern: Regex,
    device_pattern: Regex,
    id_pattern: Regex,
    name_pattern: Regex,
}

impl ProfilesParser {
    pub fn new() -> Self {
        Self {
            root_pattern: Regex::new(r"<ArrayOfScanProfile[\s>/]").expect("Invalid root regex"),
            profile_pattern: Regex::new(r"(?s)<ScanProfile(?:\s[^>]*)?>(.*?)</ScanProfile>")
                .expect("Invalid profile regex"),
            display_name_pattern: Regex::new(r"(?s)<DisplayName>(.*?)</DisplayName>")
                .expect("Invalid display name regex"),
            device_pattern: Regex::new(r"(?s)<Device(?:\s[^>]*)?>(.*?)</Device>")
                .expect("Invalid device regex"),
            id_pattern: Regex::new(r"(?s)<ID>(.*?)</ID>").expect("Invalid ID regex"),
            name_pattern: Regex::new(r"(?s)<Name>(.*?)</Name>").expect("Invalid name regex"),
        }
    }

    /// Parse the contents of a `profiles.xml` document
    pub fn parse(&self, xml: &str) -> Result<Vec<ScanProfileEntry>, ProfileError> {
        if !self.root_pattern.is_match(xml) {
            return Err(ProfileError::UnexpectedRoot);
        }

        let mut entries = Vec::new();
        for (index, profile) in self.profile_pattern.captures_iter(xml).enumerate() {
            let body = &profile[1];

            // Device blocks contain their own <Name>, so strip them before
            // looking at profile-level fields
            let device = self.device_pattern.captures(body).and_then(|device| {
                let device_body = &device[1];
                let id = self.id_pattern.captures(device_body)?;
                let name = self.name_pattern.captures(device_body)?;
                Some(ScanDevice {
                    id: unescape_xml(id[1].trim()),
                    name: unescape_xml(name[1].trim()),
                })
            });

            let display_name = self
                .display_name_pattern
                .captures(body)
                .map(|c| unescape_xml(c[1].trim()))
                .ok_or(ProfileError::MissingDisplayName(index))?;

            entries.push(ScanProfileEntry {
                display_name,
                device,
            });
        }

        Ok(entries)
    }
}

impl Default for ProfilesParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Replace the five predefined XML entities and numeric character references
pub fn unescape_xml(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let Some(semi) = tail.find(';') else {
            out.push_str(tail);
            return out;
        };

        let entity = &tail[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };

        match decoded {
            Some(c) => out.push(c),
            None => out.push_str(&tail[..=semi]),
        }
        rest = &tail[semi + 1..];
    }
    out.push_str(rest);
    out
}

/// [`ProfileResolver`] reading NAPS2's `profiles.xml` and the front/back
/// selection from the configuration store
pub struct Naps2ProfileResolver {
    config: Arc<ConfigStore>,
    parser: ProfilesParser,
}

impl Naps2ProfileResolver {
    pub fn new(config: Arc<ConfigStore>) -> Self {
        Self {
            config,
            parser: ProfilesParser::new(),
        }
    }

    /// Read and parse `profiles.xml`; a missing file means no profiles.
    pub fn read_profiles(&self, data_dir: &Utf8Path) -> Result<Vec<ScanProfileEntry>, ProfileError> {
        let path = data_dir.join(PROFILES_XML_NAME);
        if !path.is_file() {
            tracing::debug!("No profiles.xml at {}", path);
            return Ok(Vec::new());
        }

        let xml = fs::read_to_string(&path).map_err(|source| ProfileError::Read {
            path: path.to_string(),
            source,
        })?;

        self.parser.parse(&xml)
    }

    fn read_profiles_or_empty(&self, data_dir: &Utf8Path) -> Vec<ScanProfileEntry> {
        match self.read_profiles(data_dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Could not read NAPS2 profiles from {}: {}", data_dir, e);
                Vec::new()
            }
        }
    }
}

impl ProfileResolver for Naps2ProfileResolver {
    fn list_profile_names(&self, data_dir: &Utf8Path) -> BTreeSet<String> {
        self.read_profiles_or_empty(data_dir)
            .into_iter()
            .map(|entry| entry.display_name)
            .collect()
    }

    fn list_devices(&self, data_dir: &Utf8Path) -> Vec<ScanDevice> {
        let by_id: BTreeMap<String, String> = self
            .read_profiles_or_empty(data_dir)
            .into_iter()
            .filter_map(|entry| entry.device)
            .map(|device| (device.id, device.name))
            .collect();

        let mut devices: Vec<ScanDevice> = by_id
            .into_iter()
            .map(|(id, name)| ScanDevice { id, name })
            .collect();
        devices.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        devices
    }

    fn profile_config(&self, data_dir: &Utf8Path) -> Option<ProfileConfig> {
        let front = non_empty(self.config.get(keys::SCAN_PROFILE_NAME_FRONT));
        let back = non_empty(self.config.get(keys::SCAN_PROFILE_NAME_BACK));

        let (front, back) = match (front, back) {
            (None, None) => {
                tracing::debug!(
                    "NAPS2 profile names ({}, {}) not configured.",
                    keys::SCAN_PROFILE_NAME_FRONT,
                    keys::SCAN_PROFILE_NAME_BACK
                );
                return None;
            }
            (Some(_), None) => {
                tracing::warn!(
                    "Incomplete profile configuration: {} is not set.",
                    keys::SCAN_PROFILE_NAME_BACK
                );
                return None;
            }
            (None, Some(_)) => {
                tracing::warn!(
                    "Incomplete profile configuration: {} is not set.",
                    keys::SCAN_PROFILE_NAME_FRONT
                );
                return None;
            }
            (Some(front), Some(back)) => (front, back),
        };

        let profile_names = self.list_profile_names(data_dir);
        for (key, name) in [
            (keys::SCAN_PROFILE_NAME_FRONT, &front),
            (keys::SCAN_PROFILE_NAME_BACK, &back),
        ] {
            if !profile_names.contains(name) {
                tracing::warn!(
                    "Invalid {}: no profile named '{}' exists in the currently-configured NAPS2 installation.",
                    key,
                    name
                );
                return None;
            }
        }

        Some(ProfileConfig::new(front, back))
    }

    fn set_profile_config(&self, config: &ProfileConfig) -> Result<()> {
        tracing::info!(
            "Saving scan profiles: front='{}', back='{}'",
            config.front_profile_name(),
            config.back_profile_name()
        );
        self.config.update([
            (
                keys::SCAN_PROFILE_NAME_FRONT,
                Some(config.front_profile_name().to_string()),
            ),
            (
                keys::SCAN_PROFILE_NAME_BACK,
                Some(config.back_profile_name().to_string()),
            ),
        ])
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
