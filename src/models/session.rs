use super::{Installation, ProfileConfig};
use std::fmt;
use thiserror::Error;

/// The four-valued status the presentation layer renders.
///
/// This is never stored: it is always computed from [`SessionState`] so it
/// cannot drift out of sync with the underlying fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanStatus {
    /// No installation is configured
    Uninitialized,
    /// Installation present, no valid front/back profiles
    NoProfiles,
    /// Fully configured and idle
    ReadyToScan,
    /// A scan is running
    Scanning,
}

impl ScanStatus {
    /// Collapse the 2x2x2 truth table of session flags into a status label.
    pub fn derive(has_installation: bool, has_profile_config: bool, is_scanning: bool) -> Self {
        match (has_installation, has_profile_config, is_scanning) {
            (false, _, _) => Self::Uninitialized,
            (true, false, _) => Self::NoProfiles,
            (true, true, false) => Self::ReadyToScan,
            (true, true, true) => Self::Scanning,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "UNINITIALIZED",
            Self::NoProfiles => "NO_PROFILES",
            Self::ReadyToScan => "READY_TO_SCAN",
            Self::Scanning => "SCANNING",
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected session mutations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("session cannot be reconfigured while a scan is running")]
    ScanInProgress,

    #[error("no NAPS2 installation is configured")]
    NoInstallation,

    #[error("scan profiles are not configured")]
    NoProfileConfig,
}

/// Immutable copy of the session handed to observers after every mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSnapshot {
    pub status: ScanStatus,
    pub installation: Option<Installation>,
    pub profile_config: Option<ProfileConfig>,
}

/// Mutable scan session owned by the processor thread.
///
/// Fields are private so every mutation goes through a method that upholds:
/// - `is_scanning` implies both an installation and a profile config are present
/// - installation and profile config never change while `is_scanning` is set
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    installation: Option<Installation>,
    profile_config: Option<ProfileConfig>,
    is_scanning: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn installation(&self) -> Option<&Installation> {
        self.installation.as_ref()
    }

    pub fn profile_config(&self) -> Option<&ProfileConfig> {
        self.profile_config.as_ref()
    }

    pub fn is_scanning(&self) -> bool {
        self.is_scanning
    }

    pub fn status(&self) -> ScanStatus {
        ScanStatus::derive(
            self.installation.is_some(),
            self.profile_config.is_some(),
            self.is_scanning,
        )
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            status: self.status(),
            installation: self.installation.clone(),
            profile_config: self.profile_config.clone(),
        }
    }

    /// Drop both the installation and the profile config.
    pub fn clear(&mut self) -> Result<(), SessionError> {
        self.ensure_idle()?;
        self.installation = None;
        self.profile_config = None;
        Ok(())
    }

    /// Replace the installation. Any profile config belonged to the old one and is dropped.
    pub fn set_installation(&mut self, installation: Installation) -> Result<(), SessionError> {
        self.ensure_idle()?;
        self.installation = Some(installation);
        self.profile_config = None;
        Ok(())
    }

    pub fn set_profile_config(&mut self, profile_config: ProfileConfig) -> Result<(), SessionError> {
        self.ensure_idle()?;
        if self.installation.is_none() {
            return Err(SessionError::NoInstallation);
        }
        self.profile_config = Some(profile_config);
        Ok(())
    }

    pub fn begin_scan(&mut self) -> Result<(), SessionError> {
        self.ensure_idle()?;
        if self.installation.is_none() {
            return Err(SessionError::NoInstallation);
        }
        if self.profile_config.is_none() {
            return Err(SessionError::NoProfileConfig);
        }
        self.is_scanning = true;
        Ok(())
    }

    pub fn finish_scan(&mut self) {
        self.is_scanning = false;
    }

    fn ensure_idle(&self) -> Result<(), SessionError> {
        if self.is_scanning {
            Err(SessionError::ScanInProgress)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn installation() -> Installation {
        Installation::new("C:/naps2/App", "C:/naps2/Data")
    }

    fn profiles() -> ProfileConfig {
        ProfileConfig::new("FrontScan", "BackScan")
    }

    #[test]
    fn test_new_session_is_uninitialized() {
        let state = SessionState::new();
        assert_eq!(state.status(), ScanStatus::Uninitialized);
        assert!(!state.is_scanning());
    }

    #[test]
    fn test_status_progression() {
        let mut state = SessionState::new();

        state.set_installation(installation()).unwrap();
        assert_eq!(state.status(), ScanStatus::NoProfiles);

        state.set_profile_config(profiles()).unwrap();
        assert_eq!(state.status(), ScanStatus::ReadyToScan);

        state.begin_scan().unwrap();
        assert_eq!(state.status(), ScanStatus::Scanning);

        state.finish_scan();
        assert_eq!(state.status(), ScanStatus::ReadyToScan);
    }

    #[test]
    fn test_profiles_require_installation() {
        let mut state = SessionState::new();
        assert_eq!(
            state.set_profile_config(profiles()),
            Err(SessionError::NoInstallation)
        );
    }

    #[test]
    fn test_new_installation_drops_stale_profiles() {
        let mut state = SessionState::new();
        state.set_installation(installation()).unwrap();
        state.set_profile_config(profiles()).unwrap();

        state
            .set_installation(Installation::new("D:/other/App", "D:/other/Data"))
            .unwrap();

        assert!(state.profile_config().is_none());
        assert_eq!(state.status(), ScanStatus::NoProfiles);
    }

    #[test]
    fn test_mutations_rejected_while_scanning() {
        let mut state = SessionState::new();
        state.set_installation(installation()).unwrap();
        state.set_profile_config(profiles()).unwrap();
        state.begin_scan().unwrap();

        assert_eq!(state.clear(), Err(SessionError::ScanInProgress));
        assert_eq!(
            state.set_installation(installation()),
            Err(SessionError::ScanInProgress)
        );
        assert_eq!(state.begin_scan(), Err(SessionError::ScanInProgress));
        assert!(state.installation().is_some());
    }

    #[test]
    fn test_begin_scan_requires_profiles() {
        let mut state = SessionState::new();
        state.set_installation(installation()).unwrap();
        assert_eq!(state.begin_scan(), Err(SessionError::NoProfileConfig));
        assert!(!state.is_scanning());
    }

    #[test]
    fn test_snapshot_matches_state() {
        let mut state = SessionState::new();
        state.set_installation(installation()).unwrap();

        let snapshot = state.snapshot();
        assert_eq!(snapshot.status, ScanStatus::NoProfiles);
        assert_eq!(snapshot.installation, Some(installation()));
        assert_eq!(snapshot.profile_config, None);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Clear,
        SetInstallation,
        SetProfiles,
        BeginScan,
        FinishScan,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Clear),
            Just(Op::SetInstallation),
            Just(Op::SetProfiles),
            Just(Op::BeginScan),
            Just(Op::FinishScan),
        ]
    }

    proptest! {
        #[test]
        fn prop_status_is_one_of_four_labels(has_install: bool, has_profiles: bool, scanning: bool) {
            let status = ScanStatus::derive(has_install, has_profiles, scanning);
            let expected = if !has_install {
                ScanStatus::Uninitialized
            } else if !has_profiles {
                ScanStatus::NoProfiles
            } else if scanning {
                ScanStatus::Scanning
            } else {
                ScanStatus::ReadyToScan
            };
            prop_assert_eq!(status, expected);
        }

        #[test]
        fn prop_scanning_implies_fully_configured(ops in proptest::collection::vec(op_strategy(), 0..40)) {
            let mut state = SessionState::new();
            for op in ops {
                let _ = match op {
                    Op::Clear => state.clear(),
                    Op::SetInstallation => state.set_installation(installation()),
                    Op::SetProfiles => state.set_profile_config(profiles()),
                    Op::BeginScan => state.begin_scan(),
                    Op::FinishScan => {
                        state.finish_scan();
                        Ok(())
                    }
                };

                if state.is_scanning() {
                    prop_assert!(state.installation().is_some());
                    prop_assert!(state.profile_config().is_some());
                    prop_assert_eq!(state.status(), ScanStatus::Scanning);
                }
            }
        }
    }
}
