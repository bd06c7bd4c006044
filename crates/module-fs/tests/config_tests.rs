//! Tests for ConfigStore

use module_fs::{ConfigStore, Error};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tempfile::TempDir;

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
struct Statuses {
    modules: BTreeMap<String, bool>,
}

fn sample() -> Statuses {
    let mut modules = BTreeMap::new();
    modules.insert("forum".to_string(), true);
    modules.insert("gallery".to_string(), false);
    Statuses { modules }
}

#[rstest]
#[case("statuses.toml")]
#[case("statuses.json")]
#[case("statuses.yaml")]
fn save_then_load_in_every_format(#[case] file: &str) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(file);
    let store = ConfigStore::new();

    store.save(&path, &sample()).unwrap();
    let loaded: Statuses = store.load(&path).unwrap();

    assert_eq!(loaded, sample());
}

#[test]
fn unknown_extension_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("statuses.ini");

    let err = ConfigStore::new().save(&path, &sample()).unwrap_err();

    assert!(matches!(err, Error::UnsupportedFormat { ref extension } if extension == "ini"));
}

#[test]
fn parse_error_names_the_format_and_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "modules = [not toml").unwrap();

    let err = ConfigStore::new().load::<Statuses>(&path).unwrap_err();
    let msg = err.to_string();

    assert!(msg.contains("TOML"), "{msg}");
    assert!(msg.contains("broken.toml"), "{msg}");
}

#[test]
fn missing_file_falls_back_to_default() {
    let dir = TempDir::new().unwrap();
    let loaded: Statuses = ConfigStore::new()
        .load_or_default(&dir.path().join("absent.json"))
        .unwrap();

    assert_eq!(loaded, Statuses::default());
}
