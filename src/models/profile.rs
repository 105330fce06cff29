use std::fmt;

/// Which side of the page a scan captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanSide {
    Front,
    Back,
}

impl ScanSide {
    pub fn from_is_front(is_front: bool) -> Self {
        if is_front { Self::Front } else { Self::Back }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Front => "front",
            Self::Back => "back",
        }
    }
}

impl fmt::Display for ScanSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The pair of NAPS2 profiles used for a two-sided scan.
///
/// Both names refer to profiles defined in the installation's `profiles.xml`.
/// The pair is always replaced as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProfileConfig {
    front_profile_name: String,
    back_profile_name: String,
}

impl ProfileConfig {
    pub fn new(front_profile_name: impl Into<String>, back_profile_name: impl Into<String>) -> Self {
        Self {
            front_profile_name: front_profile_name.into(),
            back_profile_name: back_profile_name.into(),
        }
    }

    pub fn front_profile_name(&self) -> &str {
        &self.front_profile_name
    }

    pub fn back_profile_name(&self) -> &str {
        &self.back_profile_name
    }

    /// Profile name to pass to NAPS2 when scanning `side`
    pub fn profile_for(&self, side: ScanSide) -> &str {
        match side {
            ScanSide::Front => &self.front_profile_name,
            ScanSide::Back => &self.back_profile_name,
        }
    }
}
