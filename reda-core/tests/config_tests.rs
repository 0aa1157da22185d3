//! Config error-message, atomic-write-safety, and init integration tests.

use assert_fs::prelude::*;
use predicates::prelude::predicate;
use reda_core::{
    config::{self, Credential},
    ConfigError,
};
use rstest::rstest;
use std::fs;

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn load_missing_config_mentions_init() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let err = config::load_with_env_at(home.path(), |_| None).unwrap_err();
    assert!(matches!(err, ConfigError::ConfigNotFound { .. }), "got: {err}");
    assert!(err.to_string().contains("config.yaml"));
    assert!(err.to_string().contains("reda-sync init"));
}

#[test]
fn load_corrupt_yaml_returns_parse_error_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let dir = config::config_dir_at(home.path());
    fs::create_dir_all(&dir).expect("mkdir");
    fs::write(dir.join("config.yaml"), b": : corrupt : yaml : !!!\n  - broken: [unclosed")
        .expect("write");

    let err = config::load_with_env_at(home.path(), |_| None).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("config.yaml"));
}

#[rstest]
#[case("schedule:\n  weekday: someday\n")]
#[case("projects:\n  - name: LAGRAND\n    id: not-a-number\n")]
#[case("- a list, not a mapping\n")]
fn load_wrong_shape_returns_parse_error(#[case] yaml: &str) {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let dir = config::config_dir_at(home.path());
    fs::create_dir_all(&dir).expect("mkdir");
    fs::write(dir.join("config.yaml"), yaml).expect("write");

    let err = config::load_with_env_at(home.path(), |_| None).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
}

// ---------------------------------------------------------------------------
// 2. Partial files fall back to defaults
// ---------------------------------------------------------------------------

#[test]
fn minimal_file_gets_defaults_and_env_secrets() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".reda-sync/config.yaml")
        .write_str("sheets:\n  spreadsheet_id: abc123\n  credential:\n    token_file: /etc/reda/token\n")
        .expect("write");

    let loaded = config::load_with_env_at(home.path(), |key| {
        (key == config::ENV_API_KEY).then(|| "secret".to_string())
    })
    .expect("load");

    assert_eq!(loaded.api.base_url, config::DEFAULT_API_BASE_URL);
    assert_eq!(loaded.api.api_key, "secret");
    assert_eq!(loaded.sheets.spreadsheet_id, "abc123");
    assert_eq!(
        loaded.sheets.credential,
        Some(Credential::TokenFile {
            token_file: "/etc/reda/token".into()
        })
    );
    assert_eq!(loaded.projects, config::default_projects());
    loaded.validate().expect("valid");
}

#[test]
fn explicit_project_list_replaces_defaults_in_order() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".reda-sync/config.yaml")
        .write_str("projects:\n  - name: MooD 08\n    id: 179\n  - name: LAGRAND\n    id: 35\n")
        .expect("write");

    let loaded = config::load_with_env_at(home.path(), |_| None).expect("load");
    let names: Vec<_> = loaded.projects.iter().map(|p| p.name.0.as_str()).collect();
    assert_eq!(names, vec!["MooD 08", "LAGRAND"]);
    assert_eq!(loaded.project("LAGRAND").map(|p| p.id), Some(35));
    assert!(loaded.project("lagrand").is_none(), "lookup is exact");
}

// ---------------------------------------------------------------------------
// 3. Init
// ---------------------------------------------------------------------------

#[test]
fn init_writes_default_file_once() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    config::init_at(home.path(), false).expect("init");

    home.child(".reda-sync/config.yaml")
        .assert(predicate::path::exists())
        .assert(predicate::str::contains("LAGRAND"));
    home.child(".reda-sync/config.yaml.tmp")
        .assert(predicate::path::missing());

    // Operator edits survive a second init without --force.
    let path = config::config_path_at(home.path());
    let edited = fs::read_to_string(&path)
        .expect("read")
        .replace("timeout_secs: 30", "timeout_secs: 90");
    fs::write(&path, edited).expect("write");

    let again = config::init_at(home.path(), false).expect("init again");
    assert_eq!(again.api.timeout_secs, 90);

    let forced = config::init_at(home.path(), true).expect("init --force");
    assert_eq!(forced.api.timeout_secs, config::DEFAULT_TIMEOUT_SECS);
}

#[test]
#[cfg(unix)]
fn init_sets_private_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let home = assert_fs::TempDir::new().expect("tempdir");
    config::init_at(home.path(), false).expect("init");
    let mode = fs::metadata(config::config_path_at(home.path()))
        .expect("metadata")
        .permissions()
        .mode()
        & 0o777;
    assert_eq!(mode, 0o600);
}
