//! Integration tests for the NAPS2 resolvers
//!
//! These tests verify:
//! - Profile discovery from a real profiles.xml on disk
//! - Validation of the persisted front/back selection
//! - Installation discovery, persistence, and opt-out

use camino::{Utf8Path, Utf8PathBuf};
use fscan::config::{SETTINGS_FILE_NAME, keys};
use fscan::models::{CONSOLE_EXE_NAME, PROFILES_XML_NAME};
use fscan::services::{
    InstallationResolver, Naps2InstallationResolver, Naps2ProfileResolver, PortableInstaller,
    ProfileResolver, ScanDevice,
};
use fscan::{ConfigStore, Installation, ProfileConfig};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

const PROFILES_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<ArrayOfScanProfile xmlns:xsd="http://www.w3.org/2001/XMLSchema" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <ScanProfile>
    <Version>5</Version>
    <Device>
      <ID>{6BDD1FC6-810F-11D0-BEC7-08002BE2092F}\0002</ID>
      <Name>Fujitsu fi-7160</Name>
    </Device>
    <DriverName>twain</DriverName>
    <DisplayName>FrontScan</DisplayName>
    <IsDefault>true</IsDefault>
  </ScanProfile>
  <ScanProfile>
    <Version>5</Version>
    <Device>
      <ID>{6BDD1FC6-810F-11D0-BEC7-08002BE2092F}\0001</ID>
      <Name>Canon DR-C225</Name>
    </Device>
    <DriverName>wia</DriverName>
    <DisplayName>BackScan</DisplayName>
  </ScanProfile>
  <ScanProfile>
    <Version>5</Version>
    <Device>
      <ID>{6BDD1FC6-810F-11D0-BEC7-08002BE2092F}\0001</ID>
      <Name>Canon DR-C225</Name>
    </Device>
    <DisplayName>Greyscale &amp; Duplex</DisplayName>
  </ScanProfile>
</ArrayOfScanProfile>
"#;

struct TestEnv {
    _temp_dir: TempDir,
    base: Utf8PathBuf,
    config: Arc<ConfigStore>,
}

fn create_test_env() -> TestEnv {
    let temp_dir = TempDir::new().unwrap();
    let base = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    let config = Arc::new(
        ConfigStore::load(base.clone(), base.join("home").join("fscan.yaml"))
            .unwrap()
            .without_environment(),
    );
    TestEnv {
        _temp_dir: temp_dir,
        base,
        config,
    }
}

fn create_portable_install(root: &Utf8Path, profiles_xml: Option<&str>) -> Installation {
    let installation = Installation::new(root.join("App"), root.join("Data"));
    fs::create_dir_all(installation.app_dir()).unwrap();
    fs::create_dir_all(installation.data_dir()).unwrap();
    fs::write(installation.app_dir().join(CONSOLE_EXE_NAME), "MZ").unwrap();
    if let Some(xml) = profiles_xml {
        fs::write(installation.data_dir().join(PROFILES_XML_NAME), xml).unwrap();
    }
    installation
}

#[test]
fn test_list_profile_names_sorted() {
    let env = create_test_env();
    let installation = create_portable_install(&env.base.join("naps2"), Some(PROFILES_XML));
    let resolver = Naps2ProfileResolver::new(Arc::clone(&env.config));

    let names: Vec<String> = resolver
        .list_profile_names(installation.data_dir())
        .into_iter()
        .collect();

    assert_eq!(names, vec!["BackScan", "FrontScan", "Greyscale & Duplex"]);
}

#[test]
fn test_list_devices_unique_and_sorted() {
    let env = create_test_env();
    let installation = create_portable_install(&env.base.join("naps2"), Some(PROFILES_XML));
    let resolver = Naps2ProfileResolver::new(Arc::clone(&env.config));

    let devices = resolver.list_devices(installation.data_dir());

    assert_eq!(
        devices,
        vec![
            ScanDevice {
                id: r"{6BDD1FC6-810F-11D0-BEC7-08002BE2092F}\0001".to_string(),
                name: "Canon DR-C225".to_string(),
            },
            ScanDevice {
                id: r"{6BDD1FC6-810F-11D0-BEC7-08002BE2092F}\0002".to_string(),
                name: "Fujitsu fi-7160".to_string(),
            },
        ]
    );
}

#[test]
fn test_missing_profiles_xml_means_no_profiles() {
    let env = create_test_env();
    let installation = create_portable_install(&env.base.join("naps2"), None);
    let resolver = Naps2ProfileResolver::new(Arc::clone(&env.config));

    assert!(resolver.list_profile_names(installation.data_dir()).is_empty());
    assert!(resolver.list_devices(installation.data_dir()).is_empty());
}

#[test]
fn test_unexpected_root_means_no_profiles() {
    let env = create_test_env();
    let installation = create_portable_install(
        &env.base.join("naps2"),
        Some("<AppConfig><ScanProfile><DisplayName>X</DisplayName></ScanProfile></AppConfig>"),
    );
    let resolver = Naps2ProfileResolver::new(Arc::clone(&env.config));

    assert!(resolver.list_profile_names(installation.data_dir()).is_empty());
}

#[test]
fn test_profile_config_requires_selection() {
    let env = create_test_env();
    let installation = create_portable_install(&env.base.join("naps2"), Some(PROFILES_XML));
    let resolver = Naps2ProfileResolver::new(Arc::clone(&env.config));

    // Profiles exist, but nothing has been chosen yet
    assert_eq!(resolver.profile_config(installation.data_dir()), None);

    // Only one side chosen
    env.config
        .update([(keys::SCAN_PROFILE_NAME_FRONT, Some("FrontScan".to_string()))])
        .unwrap();
    assert_eq!(resolver.profile_config(installation.data_dir()), None);
}

#[test]
fn test_profile_config_round_trip_through_store() {
    let env = create_test_env();
    let installation = create_portable_install(&env.base.join("naps2"), Some(PROFILES_XML));
    let resolver = Naps2ProfileResolver::new(Arc::clone(&env.config));
    let chosen = ProfileConfig::new("FrontScan", "Greyscale & Duplex");

    resolver.set_profile_config(&chosen).unwrap();

    assert_eq!(resolver.profile_config(installation.data_dir()), Some(chosen));
}

#[test]
fn test_profile_config_rejects_names_missing_from_installation() {
    let env = create_test_env();
    let first = create_portable_install(&env.base.join("first"), Some(PROFILES_XML));
    let second = create_portable_install(
        &env.base.join("second"),
        Some("<ArrayOfScanProfile><ScanProfile><DisplayName>FrontScan</DisplayName></ScanProfile></ArrayOfScanProfile>"),
    );
    let resolver = Naps2ProfileResolver::new(Arc::clone(&env.config));
    resolver
        .set_profile_config(&ProfileConfig::new("FrontScan", "BackScan"))
        .unwrap();

    assert!(resolver.profile_config(first.data_dir()).is_some());
    assert_eq!(resolver.profile_config(second.data_dir()), None);
}

mod installation {
    use super::*;

    fn resolver(env: &TestEnv, runtime: &tokio::runtime::Runtime) -> Naps2InstallationResolver {
        let installer = PortableInstaller::new(runtime.handle().clone(), &env.base).unwrap();
        Naps2InstallationResolver::new(Arc::clone(&env.config), installer)
            .with_system_dirs(Vec::new(), None)
    }

    #[test]
    fn test_fresh_system_has_nothing() {
        let env = create_test_env();
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let resolver = resolver(&env, &runtime);

        assert_eq!(resolver.configured(), None);
        assert_eq!(resolver.suggested(), None);
        assert!(!resolver.is_disabled());
    }

    #[test]
    fn test_suggest_then_configure_portable() {
        let env = create_test_env();
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let resolver = resolver(&env, &runtime);
        let portable = create_portable_install(&env.base.join("naps2"), Some(PROFILES_XML));

        let suggested = resolver.suggested().unwrap();
        assert_eq!(suggested, portable);
        assert!(suggested.is_portable());
        assert_eq!(resolver.configured(), None);

        resolver.set_configured(&suggested).unwrap();
        assert_eq!(resolver.configured(), Some(portable));
    }

    #[test]
    fn test_configured_absolute_paths_outside_base() {
        let env = create_test_env();
        let elsewhere = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(elsewhere.path().to_path_buf()).unwrap();
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let resolver = resolver(&env, &runtime);
        let installation = create_portable_install(&root, None);

        resolver.set_configured(&installation).unwrap();

        assert_eq!(
            env.config.get(keys::NAPS2_APP_DIR).as_deref(),
            Some(installation.app_dir().as_str())
        );
        assert_eq!(resolver.configured(), Some(installation));
    }

    #[test]
    fn test_removed_installation_is_no_longer_configured() {
        let env = create_test_env();
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let resolver = resolver(&env, &runtime);
        let installation = create_portable_install(&env.base.join("naps2"), None);
        resolver.set_configured(&installation).unwrap();

        fs::remove_file(installation.console_exe()).unwrap();

        assert_eq!(resolver.configured(), None);
    }

    #[test]
    fn test_configuring_overrides_bundled_opt_out() {
        let env = create_test_env();
        fs::write(env.base.join(SETTINGS_FILE_NAME), "NAPS2_DISABLED: 1\n").unwrap();
        let config = Arc::new(
            ConfigStore::load(env.base.clone(), env.config.user_path().to_path_buf())
                .unwrap()
                .without_environment(),
        );
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let installer = PortableInstaller::new(runtime.handle().clone(), &env.base).unwrap();
        let resolver = Naps2InstallationResolver::new(Arc::clone(&config), installer)
            .with_system_dirs(Vec::new(), None);
        let installation = create_portable_install(&env.base.join("naps2"), None);
        assert!(resolver.is_disabled());

        resolver.set_configured(&installation).unwrap();

        assert!(!resolver.is_disabled());
        assert_eq!(resolver.configured(), Some(installation));
    }

    #[test]
    fn test_disable_persists() {
        let env = create_test_env();
        let runtime = tokio::runtime::Runtime::new().unwrap();
        resolver(&env, &runtime).disable().unwrap();

        let reloaded = ConfigStore::load(env.base.clone(), env.config.user_path().to_path_buf())
            .unwrap()
            .without_environment();
        assert!(reloaded.get_flag(keys::NAPS2_DISABLED));
    }
}
