//! Integration tests for the modman CLI binary.
//!
//! These tests exercise the compiled binary using assert_cmd. None of them
//! reach a real release host; update runs are served by a loopback
//! [`ReleaseServer`].

use assert_cmd::Command;
use module_test_utils::{ModuleFixture, ReleaseServer, TestSite, release_json};
use predicates::prelude::*;

/// Get a Command for the modman binary
fn modman_cmd() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("modman"));
    cmd.env_remove("MODMAN_CONFIG")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}

/// Write `modman.toml` into the site and return its path as a string.
fn write_config(site: &TestSite, content: &str) -> String {
    let path = site.root().join("modman.toml");
    std::fs::write(&path, content).unwrap();
    path.to_string_lossy().into_owned()
}

// ============================================================================
// Help and Version Tests
// ============================================================================

#[test]
fn test_help_lists_commands() {
    modman_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("module:update"))
        .stdout(predicate::str::contains("core:check-updates"));
}

#[test]
fn test_no_command_shows_hint() {
    modman_cmd()
        .assert()
        .success()
        .stdout(predicate::str::contains("modman --help"));
}

#[test]
fn test_core_version_from_config() {
    let site = TestSite::new();
    let config = write_config(&site, "[core]\nversion = \"1.4.2\"\n");

    modman_cmd()
        .args(["core:version", "--config", &config])
        .assert()
        .success()
        .stdout(predicate::str::contains("1.4.2"));
}

#[test]
fn test_config_from_environment() {
    let site = TestSite::new();
    let config = write_config(&site, "[core]\nversion = \"3.0.1\"\n");

    modman_cmd()
        .env("MODMAN_CONFIG", &config)
        .arg("core:version")
        .assert()
        .success()
        .stdout(predicate::str::contains("3.0.1"));
}

// ============================================================================
// Error Reporting Tests
// ============================================================================

#[test]
fn test_broken_config_is_reported() {
    let site = TestSite::new();
    let config = write_config(&site, "[paths\n");

    modman_cmd()
        .args(["core:version", "--config", &config])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Could not read config"));
}

#[test]
fn test_core_check_requires_repository() {
    let site = TestSite::new();
    let config = write_config(&site, "[core]\nversion = \"1.0.0\"\n");

    modman_cmd()
        .args(["core:check-updates", "--config", &config])
        .assert()
        .failure()
        .stderr(predicate::str::contains("core.repository"));
}

#[test]
fn test_update_unknown_module_fails() {
    let site = TestSite::new();
    site.install(&ModuleFixture::new("forum", "1.0.0"));
    let config = write_config(&site, "");

    modman_cmd()
        .args(["module:update", "wiki", "--config", &config])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Module not found: wiki"));
}

#[test]
fn test_update_rejects_name_with_all() {
    modman_cmd()
        .args(["module:update", "forum", "--all"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn test_unreachable_release_host_fails_check() {
    let site = TestSite::new();
    site.install(&ModuleFixture::new("forum", "1.0.0"));
    let config = write_config(
        &site,
        r#"
[releases]
api_base = "http://127.0.0.1:9"
token_env = "MODMAN_TEST_UNSET_TOKEN"
request_timeout_secs = 5

[update]
check_tries = 1
"#,
    );

    modman_cmd()
        .args(["module:check-updates", "--config", &config])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

// ============================================================================
// Empty Installation Tests
// ============================================================================

#[test]
fn test_check_updates_without_modules_is_empty_json() {
    let site = TestSite::new();
    let config = write_config(&site, "");

    modman_cmd()
        .args(["module:check-updates", "--json", "--config", &config])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("[]"));
}

#[test]
fn test_update_all_without_updates_is_noop() {
    let site = TestSite::new();
    let config = write_config(&site, "");

    modman_cmd()
        .args(["module:update", "--all", "--config", &config])
        .assert()
        .success()
        .stdout(predicate::str::contains("All modules are up to date"));
}

// ============================================================================
// Update Pipeline Tests
// ============================================================================

/// A runtime binary answering the version and extension queries.
#[cfg(unix)]
fn stub_runtime(site: &TestSite) -> String {
    use std::os::unix::fs::PermissionsExt;

    let path = site.root().join("bin").join("php");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(
        &path,
        "#!/bin/sh\ncase \"$1\" in\n  -r) printf '8.3.4' ;;\n  -m) printf '[PHP Modules]\\ngd\\n' ;;\nesac\n",
    )
    .unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().into_owned()
}

/// Install forum 1.0.0, publish forum 1.1.0 and write a config pointing at
/// both.
#[cfg(unix)]
fn publish_forum(
    site: &TestSite,
    runtime_binary: &str,
    health_command: &str,
) -> (ReleaseServer, String) {
    site.install(&ModuleFixture::new("forum", "1.0.0"));
    let archive = site.package(&ModuleFixture::new("forum", "1.1.0"));
    let server = ReleaseServer::latest("acme/forum", release_json("1.1.0", &archive));
    let config = write_config(
        site,
        &format!(
            r#"
[host]
runtime_binary = "{runtime_binary}"

[releases]
api_base = "{api_base}"
token_env = "MODMAN_TEST_UNSET_TOKEN"
request_timeout_secs = 5

[update]
extract_command = "tar -xf {{archive}} -C {{target}}"
health_command = "{health_command}"
check_tries = 1
"#,
            api_base = server.base_url(),
        ),
    );
    (server, config)
}

#[cfg(unix)]
fn installed_manifest(site: &TestSite) -> String {
    std::fs::read_to_string(site.modules_dir().join("forum").join("module.json")).unwrap()
}

#[cfg(unix)]
#[test]
fn test_update_applies_release() {
    let site = TestSite::new();
    let runtime = stub_runtime(&site);
    let (_server, config) = publish_forum(&site, &runtime, "true");

    modman_cmd()
        .args(["module:update", "forum", "--config", &config])
        .assert()
        .success()
        .stdout(predicate::str::contains("forum updated (1.0.0 -> 1.1.0)"));

    assert!(installed_manifest(&site).contains(r#""version": "1.1.0""#));
}

#[cfg(unix)]
#[test]
fn test_rolled_back_update_exits_with_failure() {
    let site = TestSite::new();
    let runtime = stub_runtime(&site);
    let (_server, config) = publish_forum(&site, &runtime, "exit 3");

    modman_cmd()
        .args(["module:update", "forum", "--config", &config])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("forum failed and was rolled back"));

    assert!(installed_manifest(&site).contains(r#""version": "1.0.0""#));
}

#[cfg(unix)]
#[test]
fn test_dry_run_does_not_need_runtime_binary() {
    let site = TestSite::new();
    let (_server, config) = publish_forum(&site, "/nonexistent/runtime/php", "true");

    modman_cmd()
        .args(["module:update", "forum", "--dry-run", "--config", &config])
        .assert()
        .success()
        .stdout(predicate::str::contains("forum 1.0.0 -> 1.1.0"))
        .stdout(predicate::str::contains("Dry run"));

    assert!(installed_manifest(&site).contains(r#""version": "1.0.0""#));
}
