use camino::{Utf8Path, Utf8PathBuf};

/// File name of the NAPS2 command-line executable inside `app_dir`.
pub const CONSOLE_EXE_NAME: &str = "NAPS2.Console.exe";

/// File name of the profile definitions inside `data_dir`.
pub const PROFILES_XML_NAME: &str = "profiles.xml";

/// A NAPS2 deployment that has been located on this system.
///
/// A standard install keeps binaries under Program Files and profiles under the
/// roaming application data directory. A portable install keeps both side by
/// side as `<root>/App` and `<root>/Data`.
///
/// Values are immutable once constructed; the processor replaces them wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Installation {
    app_dir: Utf8PathBuf,
    data_dir: Utf8PathBuf,
}

impl Installation {
    pub fn new(app_dir: impl Into<Utf8PathBuf>, data_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            app_dir: app_dir.into(),
            data_dir: data_dir.into(),
        }
    }

    /// Build an installation from the root of a portable deployment.
    ///
    /// Returns `None` unless both `<root>/App` and `<root>/Data` are directories.
    pub fn from_portable_root(root: &Utf8Path) -> Option<Self> {
        let app_dir = root.join("App");
        let data_dir = root.join("Data");
        if app_dir.is_dir() && data_dir.is_dir() {
            Some(Self::new(app_dir, data_dir))
        } else {
            None
        }
    }

    /// Directory containing `NAPS2.exe` and `NAPS2.Console.exe`
    pub fn app_dir(&self) -> &Utf8Path {
        &self.app_dir
    }

    /// Directory containing `profiles.xml`
    pub fn data_dir(&self) -> &Utf8Path {
        &self.data_dir
    }

    pub fn console_exe(&self) -> Utf8PathBuf {
        self.app_dir.join(CONSOLE_EXE_NAME)
    }

    /// True when the two directories are the `App`/`Data` siblings of one portable root.
    ///
    /// Directory names and parents are compared case-insensitively, since the
    /// tool only ships for Windows.
    pub fn is_portable(&self) -> bool {
        let (Some(app_name), Some(data_name)) = (self.app_dir.file_name(), self.data_dir.file_name())
        else {
            return false;
        };

        if !app_name.eq_ignore_ascii_case("app") || !data_name.eq_ignore_ascii_case("data") {
            return false;
        }

        match (self.app_dir.parent(), self.data_dir.parent()) {
            (Some(app_parent), Some(data_parent)) => {
                normalized_key(app_parent) == normalized_key(data_parent)
            }
            _ => false,
        }
    }
}

/// Lowercased, separator-agnostic form of a path for equality checks.
fn normalized_key(path: &Utf8Path) -> String {
    path.components()
        .map(|c| c.as_str().to_lowercase())
        .filter(|c| c != ".")
        .collect::<Vec<_>>()
        .join("/")
}
