use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde_yaml_ng::Value;
use std::fs;
use std::sync::RwLock;

/// Name of the settings file, both next to the executable and in the home directory.
pub const SETTINGS_FILE_NAME: &str = "fscan.yaml";

/// Setting names understood by the application.
pub mod keys {
    pub const NAPS2_APP_DIR: &str = "NAPS2_APP_DIR";
    pub const NAPS2_DATA_DIR: &str = "NAPS2_DATA_DIR";
    pub const NAPS2_DISABLED: &str = "NAPS2_DISABLED";
    pub const SCAN_PROFILE_NAME_FRONT: &str = "SCAN_PROFILE_NAME_FRONT";
    pub const SCAN_PROFILE_NAME_BACK: &str = "SCAN_PROFILE_NAME_BACK";
    pub const SCAN_OUTPUT_DIR: &str = "SCAN_OUTPUT_DIR";
    pub const SCAN_OUTPUT_FORMAT: &str = "SCAN_OUTPUT_FORMAT";
    pub const LOG_DIR: &str = "LOG_DIR";
    pub const DEBUG: &str = "DEBUG";
    pub const LOG_JSON: &str = "LOG_JSON";
}

type Settings = IndexMap<String, String>;

#[derive(Debug, Default)]
struct Layers {
    defaults: Settings,
    user: Settings,
}

/// Layered key-value settings store.
///
/// Lookups resolve, in order of precedence:
/// 1. An environment variable with the same name
/// 2. The user settings file (`~/fscan.yaml`)
/// 3. The defaults shipped next to the executable (`<app>/fscan.yaml`)
///
/// Only the user layer is ever written. The store is built once in `main` and
/// shared as `Arc<ConfigStore>` with the resolvers that need it.
#[derive(Debug)]
pub struct ConfigStore {
    base_dir: Utf8PathBuf,
    defaults_path: Utf8PathBuf,
    user_path: Utf8PathBuf,
    use_environment: bool,
    layers: RwLock<Layers>,
}

impl ConfigStore {
    /// Load settings for an application installed in `base_dir`.
    ///
    /// # Arguments
    /// * `base_dir` - Application directory; holds the default settings file
    /// * `user_path` - Path of the user settings file that `update` writes to
    pub fn load<P: AsRef<Utf8Path>>(base_dir: P, user_path: P) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        let defaults_path = base_dir.join(SETTINGS_FILE_NAME);
        let user_path = user_path.as_ref().to_path_buf();

        let defaults = read_settings_file(&defaults_path)?;
        let user = read_settings_file(&user_path)?;

        tracing::info!(
            "Loaded settings: {} defaults from {}, {} user overrides from {}",
            defaults.len(),
            defaults_path,
            user.len(),
            user_path
        );

        Ok(Self {
            base_dir,
            defaults_path,
            user_path,
            use_environment: true,
            layers: RwLock::new(Layers { defaults, user }),
        })
    }

    /// Load settings for the running executable.
    ///
    /// The defaults live beside the executable; user overrides live in the home
    /// directory, or beside the executable when no home directory is known.
    pub fn for_current_exe() -> Result<Self> {
        let exe = std::env::current_exe().context("Failed to locate the running executable")?;
        let exe = Utf8PathBuf::try_from(exe).context("Executable path is not valid UTF-8")?;
        let base_dir = exe
            .parent()
            .map(Utf8Path::to_path_buf)
            .context("Executable path has no parent directory")?;

        let user_path = dirs::home_dir()
            .and_then(|home| Utf8PathBuf::try_from(home).ok())
            .unwrap_or_else(|| base_dir.clone())
            .join(SETTINGS_FILE_NAME);

        Self::load(base_dir, user_path)
    }

    /// Disable the environment-variable layer.
    pub fn without_environment(mut self) -> Self {
        self.use_environment = false;
        self
    }

    /// Directory the application runs from
    pub fn base_dir(&self) -> &Utf8Path {
        &self.base_dir
    }

    pub fn defaults_path(&self) -> &Utf8Path {
        &self.defaults_path
    }

    pub fn user_path(&self) -> &Utf8Path {
        &self.user_path
    }

    /// Resolve a setting, returning `None` when no layer defines it.
    pub fn get(&self, name: &str) -> Option<String> {
        if self.use_environment {
            if let Ok(value) = std::env::var(name) {
                return Some(value);
            }
        }

        let layers = self.layers.read().unwrap();
        layers
            .user
            .get(name)
            .or_else(|| layers.defaults.get(name))
            .cloned()
    }

    /// Resolve a setting, falling back to `default`.
    pub fn get_or(&self, name: &str, default: &str) -> String {
        self.get(name).unwrap_or_else(|| default.to_string())
    }

    /// Interpret a setting as a boolean flag (`1`, `true`, `yes`, `on`).
    pub fn get_flag(&self, name: &str) -> bool {
        self.get(name)
            .map(|v| {
                matches!(
                    v.trim().to_ascii_lowercase().as_str(),
                    "1" | "true" | "yes" | "on"
                )
            })
            .unwrap_or(false)
    }

    /// Apply changes to the user layer and persist it.
    ///
    /// A `None` value removes the key from the user file, letting the defaults
    /// (or the environment) show through again.
    pub fn update<'a, I>(&self, changes: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, Option<String>)>,
    {
        let mut layers = self.layers.write().unwrap();
        let mut user = layers.user.clone();

        for (name, value) in changes {
            match value {
                Some(value) => {
                    tracing::debug!("Setting {} = {}", name, value);
                    user.insert(name.to_string(), value);
                }
                None => {
                    tracing::debug!("Removing {}", name);
                    user.shift_remove(name);
                }
            }
        }

        write_settings_file(&self.user_path, &user)?;
        layers.user = user;

        tracing::info!("Saved user settings to {}", self.user_path);
        Ok(())
    }
}

/// Read a flat YAML mapping, treating a missing file as empty.
fn read_settings_file(path: &Utf8Path) -> Result<Settings> {
    if !path.exists() {
        tracing::debug!("Settings file not found at {}, skipping", path);
        return Ok(Settings::new());
    }

    let file_contents =
        fs::read_to_string(path).with_context(|| format!("Failed to read settings: {}", path))?;

    if file_contents.trim().is_empty() {
        return Ok(Settings::new());
    }

    let raw: IndexMap<String, Value> = serde_yaml_ng::from_str(&file_contents)
        .with_context(|| format!("Failed to parse settings: {}", path))?;

    let mut settings = Settings::new();
    for (name, value) in raw {
        match scalar_to_string(&value) {
            Some(text) => {
                settings.insert(name, text);
            }
            None if value.is_null() => {}
            None => {
                tracing::warn!("Ignoring non-scalar setting {} in {}", name, path);
            }
        }
    }

    Ok(settings)
}

fn write_settings_file(path: &Utf8Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create settings directory: {}", parent))?;
        }
    }

    let yaml_string =
        serde_yaml_ng::to_string(settings).context("Failed to serialize settings to YAML")?;

    fs::write(path, yaml_string).with_context(|| format!("Failed to write settings: {}", path))
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
