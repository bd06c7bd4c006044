//! Step implementation that works on the local filesystem.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use module_resolver::{MANIFEST_FILENAME, ModuleManifest};

use super::shell::run_hook;
use super::{StepContext, UpdateSteps};
use crate::backup::BackupManager;
use crate::config::UpdateConfig;
use crate::error::{Error, Result};
use crate::release::ReleaseInfo;

const MIGRATIONS_DIR: &str = "migrations";

/// Downloads over HTTP (or copies local/`file://` archives), extracts with
/// the configured command and runs the configured hooks.
///
/// Migrations already run are recorded in `<ledger_dir>/<module>.txt`,
/// outside the module directory that `apply` replaces.
#[derive(Debug, Clone)]
pub struct FilesystemSteps {
    config: UpdateConfig,
    staging_dir: PathBuf,
    ledger_dir: PathBuf,
    backups: BackupManager,
    client: reqwest::Client,
}

impl FilesystemSteps {
    pub fn new(
        config: UpdateConfig,
        staging_dir: impl Into<PathBuf>,
        backups_dir: impl Into<PathBuf>,
        ledger_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("modman/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(300))
            .build()?;
        Ok(Self {
            config,
            staging_dir: staging_dir.into(),
            ledger_dir: ledger_dir.into(),
            backups: BackupManager::new(backups_dir),
            client,
        })
    }

    fn archive_path(&self, ctx: &StepContext) -> PathBuf {
        self.staging_dir
            .join(format!("{}-{}.zip", ctx.module, ctx.to_version))
    }

    fn extract_dir(&self, ctx: &StepContext) -> PathBuf {
        self.staging_dir
            .join(format!("{}-{}", ctx.module, ctx.to_version))
    }

    async fn fetch_bytes(&self, step: &'static str, url: &str) -> Result<Vec<u8>> {
        if url.starts_with("http://") || url.starts_with("https://") {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| Error::step(step, format!("request to {url} failed: {e}")))?;
            let status = response.status();
            if !status.is_success() {
                return Err(Error::step(step, format!("{url} returned {status}")));
            }
            let bytes = response
                .bytes()
                .await
                .map_err(|e| Error::step(step, format!("reading {url} failed: {e}")))?;
            return Ok(bytes.to_vec());
        }

        let path = local_path(url);
        tokio::fs::read(&path)
            .await
            .map_err(|e| Error::step(step, format!("cannot read {}: {e}", path.display())))
    }

    fn ledger_path(&self, ctx: &StepContext) -> PathBuf {
        self.ledger_dir.join(format!("{}.txt", ctx.module))
    }

    fn recorded_migrations(&self, ctx: &StepContext) -> Result<BTreeSet<String>> {
        let path = self.ledger_path(ctx);
        if !path.exists() {
            return Ok(BTreeSet::new());
        }
        Ok(module_fs::io::read_text(&path)?
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    fn unrecorded_migrations(&self, ctx: &StepContext) -> Result<Vec<String>> {
        let recorded = self.recorded_migrations(ctx)?;
        Ok(module_fs::tree::list_files(&ctx.module_path.join(MIGRATIONS_DIR))?
            .into_iter()
            .filter(|name| !recorded.contains(name))
            .collect())
    }
}

/// `file://` URLs and plain paths both name local files.
fn local_path(url: &str) -> PathBuf {
    PathBuf::from(url.strip_prefix("file://").unwrap_or(url))
}

/// A hook command, unless unset or blank.
fn configured(command: &Option<String>) -> Option<&str> {
    command.as_deref().map(str::trim).filter(|c| !c.is_empty())
}

/// A release archive usually wraps the module in one top-level directory.
fn package_root(extracted: &Path) -> Result<PathBuf> {
    if extracted.join(MANIFEST_FILENAME).is_file() {
        return Ok(extracted.to_path_buf());
    }
    let dirs: Vec<PathBuf> = std::fs::read_dir(extracted)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    match dirs.as_slice() {
        [only] if only.join(MANIFEST_FILENAME).is_file() => Ok(only.clone()),
        _ => Err(Error::step(
            "apply",
            format!("archive contains no {MANIFEST_FILENAME}"),
        )),
    }
}

#[async_trait]
impl UpdateSteps for FilesystemSteps {
    async fn download(&self, ctx: &StepContext, release: &ReleaseInfo) -> Result<PathBuf> {
        if !release.has_downloadable_assets() {
            return Err(Error::step(
                "download",
                format!("release {} has no .zip asset", release.tag),
            ));
        }

        let bytes = self.fetch_bytes("download", &release.download_url).await?;
        let archive = self.archive_path(ctx);
        tokio::fs::create_dir_all(&self.staging_dir).await?;
        tokio::fs::write(&archive, &bytes).await?;

        tracing::info!(module = %ctx.module, bytes = bytes.len(), "Downloaded release archive");
        Ok(archive)
    }

    async fn verify(&self, ctx: &StepContext, release: &ReleaseInfo, archive: &Path) -> Result<()> {
        if !release.has_checksum() {
            if self.config.require_checksum {
                return Err(Error::step(
                    "verify",
                    format!("release {} publishes no checksum", release.tag),
                ));
            }
            tracing::warn!(module = %ctx.module, tag = %release.tag, "Release has no checksum, skipping verification");
            return Ok(());
        }

        let content = self.fetch_bytes("verify", &release.checksum_url).await?;
        let expected = module_fs::parse_checksum_file(&String::from_utf8_lossy(&content))
            .ok_or_else(|| Error::step("verify", "checksum file is malformed"))?;
        let actual = module_fs::compute_file_checksum(archive)
            .map_err(|e| Error::step("verify", format!("cannot hash archive: {e}")))?;

        if !actual.eq_ignore_ascii_case(&expected) {
            return Err(Error::step(
                "verify",
                format!("checksum mismatch: expected {expected}, got {actual}"),
            ));
        }
        tracing::debug!(module = %ctx.module, "Checksum verified");
        Ok(())
    }

    async fn backup(&self, ctx: &StepContext) -> Result<PathBuf> {
        let backup = self
            .backups
            .create(&ctx.module, &ctx.from_version, &ctx.module_path)?;
        if let Err(e) = self.backups.prune(&ctx.module, self.config.keep_backups) {
            tracing::warn!(module = %ctx.module, error = %e, "Could not prune old backups");
        }
        Ok(backup.path)
    }

    async fn apply(&self, ctx: &StepContext, archive: &Path) -> Result<()> {
        let target = self.extract_dir(ctx);
        module_fs::tree::remove_dir_if_exists(&target)?;
        tokio::fs::create_dir_all(&target).await?;

        let archive_arg = archive.to_string_lossy();
        let target_arg = target.to_string_lossy();
        run_hook(
            "apply",
            &self.config.extract_command,
            ctx,
            &self.staging_dir,
            &[("archive", archive_arg.as_ref()), ("target", target_arg.as_ref())],
        )
        .await?;

        let root = package_root(&target)?;
        module_fs::tree::replace_dir(&ctx.module_path, &root)?;
        tracing::info!(module = %ctx.module, version = %ctx.to_version, "Applied release");
        Ok(())
    }

    async fn migrate(&self, ctx: &StepContext) -> Result<usize> {
        let pending = self.unrecorded_migrations(ctx)?;
        if let Some(command) = configured(&self.config.migrate_command) {
            run_hook("migrate", command, ctx, &ctx.module_path, &[]).await?;
        }

        if !pending.is_empty() {
            let mut recorded = self.recorded_migrations(ctx)?;
            recorded.extend(pending.iter().cloned());
            let content: String = recorded.iter().map(|m| format!("{m}\n")).collect();
            module_fs::io::write_text(&self.ledger_path(ctx), &content)?;
        }
        Ok(pending.len())
    }

    async fn seed(&self, ctx: &StepContext) -> Result<()> {
        match configured(&self.config.seed_command) {
            Some(command) => run_hook("seed", command, ctx, &ctx.module_path, &[]).await,
            None => Ok(()),
        }
    }

    async fn health_check(&self, ctx: &StepContext) -> Result<()> {
        let manifest = ModuleManifest::from_path(&ctx.module_path.join(MANIFEST_FILENAME))
            .map_err(|e| Error::step("health_check", e.to_string()))?;
        if manifest.version != ctx.to_version {
            return Err(Error::step(
                "health_check",
                format!(
                    "installed manifest reports {}, expected {}",
                    manifest.version, ctx.to_version
                ),
            ));
        }

        match configured(&self.config.health_command) {
            Some(command) => run_hook("health_check", command, ctx, &ctx.module_path, &[]).await,
            None => Ok(()),
        }
    }

    async fn restore(&self, ctx: &StepContext, backup: &Path) -> Result<()> {
        self.backups.restore(backup, &ctx.module_path)
    }

    async fn pending_migrations(&self, ctx: &StepContext) -> Result<usize> {
        Ok(self.unrecorded_migrations(ctx)?.len())
    }

    async fn cleanup(&self, ctx: &StepContext, archive: Option<&Path>) -> Result<()> {
        if let Some(archive) = archive
            && archive.exists()
        {
            tokio::fs::remove_file(archive).await?;
        }
        module_fs::tree::remove_dir_if_exists(&self.extract_dir(ctx))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use module_resolver::SemanticVersion;
    use std::fs;

    fn context(root: &Path) -> StepContext {
        let module_path = root.join("modules").join("forum");
        fs::create_dir_all(module_path.join(MIGRATIONS_DIR)).unwrap();
        fs::write(
            module_path.join(MANIFEST_FILENAME),
            r#"{"name":"forum","version":"1.0.0","namespace":"N","provider":"P"}"#,
        )
        .unwrap();
        StepContext {
            module: "forum".into(),
            from_version: SemanticVersion::new(1, 0, 0),
            to_version: SemanticVersion::new(2, 0, 0),
            module_path,
        }
    }

    fn steps(root: &Path, config: UpdateConfig) -> FilesystemSteps {
        FilesystemSteps::new(
            config,
            root.join("staging"),
            root.join("backups"),
            root.join("ledger"),
        )
        .unwrap()
    }

    fn release(download_url: String, checksum_url: String) -> ReleaseInfo {
        ReleaseInfo {
            tag: "v2.0.0".into(),
            version: SemanticVersion::new(2, 0, 0),
            download_url,
            checksum_url,
            notes: String::new(),
            published_at: Utc::now(),
            is_prerelease: false,
        }
    }

    #[tokio::test]
    async fn download_copies_local_archive_and_verifies_checksum() {
        let root = tempfile::tempdir().unwrap();
        let ctx = context(root.path());
        let source = root.path().join("forum-2.0.0.zip");
        fs::write(&source, b"archive bytes").unwrap();
        let digest = module_fs::checksum::compute_bytes_checksum(b"archive bytes");
        let checksum = root.path().join("forum-2.0.0.zip.sha256");
        fs::write(&checksum, format!("{digest}  forum-2.0.0.zip\n")).unwrap();

        let steps = steps(root.path(), UpdateConfig::default());
        let release = release(
            format!("file://{}", source.display()),
            checksum.display().to_string(),
        );

        let archive = steps.download(&ctx, &release).await.unwrap();
        assert_eq!(fs::read(&archive).unwrap(), b"archive bytes");
        steps.verify(&ctx, &release, &archive).await.unwrap();

        fs::write(&archive, b"tampered").unwrap();
        let err = steps.verify(&ctx, &release, &archive).await.unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));

        steps.cleanup(&ctx, Some(&archive)).await.unwrap();
        assert!(!archive.exists());
    }

    #[tokio::test]
    async fn release_without_zip_fails_download() {
        let root = tempfile::tempdir().unwrap();
        let ctx = context(root.path());
        let steps = steps(root.path(), UpdateConfig::default());
        let err = steps
            .download(&ctx, &release(String::new(), String::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Step { step: "download", .. }));
    }

    #[tokio::test]
    async fn missing_checksum_respects_requirement() {
        let root = tempfile::tempdir().unwrap();
        let ctx = context(root.path());
        let archive = root.path().join("a.zip");
        fs::write(&archive, b"zip").unwrap();
        let rel = release("file:///unused.zip".into(), String::new());

        steps(root.path(), UpdateConfig::default())
            .verify(&ctx, &rel, &archive)
            .await
            .unwrap();

        let strict = UpdateConfig {
            require_checksum: true,
            ..UpdateConfig::default()
        };
        assert!(steps(root.path(), strict).verify(&ctx, &rel, &archive).await.is_err());
    }

    #[tokio::test]
    async fn migrations_are_recorded_once() {
        let root = tempfile::tempdir().unwrap();
        let ctx = context(root.path());
        let migrations = ctx.module_path.join(MIGRATIONS_DIR);
        fs::write(migrations.join("2024_01_01_create_threads.php"), "").unwrap();
        fs::write(migrations.join("2024_02_01_add_pins.php"), "").unwrap();

        let steps = steps(root.path(), UpdateConfig::default());
        assert_eq!(steps.pending_migrations(&ctx).await.unwrap(), 2);
        assert_eq!(steps.migrate(&ctx).await.unwrap(), 2);
        assert_eq!(steps.pending_migrations(&ctx).await.unwrap(), 0);

        fs::write(migrations.join("2024_03_01_add_tags.php"), "").unwrap();
        assert_eq!(steps.migrate(&ctx).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn health_check_compares_installed_version() {
        let root = tempfile::tempdir().unwrap();
        let ctx = context(root.path());
        let steps = steps(root.path(), UpdateConfig::default());

        let err = steps.health_check(&ctx).await.unwrap_err();
        assert!(err.to_string().contains("expected 2.0.0"));

        fs::write(
            ctx.module_path.join(MANIFEST_FILENAME),
            r#"{"name":"forum","version":"2.0.0","namespace":"N","provider":"P"}"#,
        )
        .unwrap();
        steps.health_check(&ctx).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn apply_unwraps_single_top_level_directory() {
        let root = tempfile::tempdir().unwrap();
        let ctx = context(root.path());
        let package = root.path().join("package");
        fs::create_dir_all(package.join("forum-2.0.0")).unwrap();
        fs::write(
            package.join("forum-2.0.0").join(MANIFEST_FILENAME),
            r#"{"name":"forum","version":"2.0.0","namespace":"N","provider":"P"}"#,
        )
        .unwrap();

        // Stand-in extractor: copy a prepared tree instead of unzipping
        let config = UpdateConfig {
            extract_command: format!("cp -R {}/. {{target}}", package.display()),
            ..UpdateConfig::default()
        };
        let steps = steps(root.path(), config);
        let archive = root.path().join("unused.zip");
        fs::write(&archive, b"").unwrap();

        steps.apply(&ctx, &archive).await.unwrap();
        steps.health_check(&ctx).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn migration_ledger_survives_apply() {
        let root = tempfile::tempdir().unwrap();
        let ctx = context(root.path());
        fs::write(
            ctx.module_path.join(MIGRATIONS_DIR).join("2024_01_01_create_threads.php"),
            "",
        )
        .unwrap();

        let package_dir = root.path().join("package");
        let package = package_dir.join("forum-2.0.0");
        fs::create_dir_all(package.join(MIGRATIONS_DIR)).unwrap();
        fs::write(
            package.join(MANIFEST_FILENAME),
            r#"{"name":"forum","version":"2.0.0","namespace":"N","provider":"P"}"#,
        )
        .unwrap();
        for migration in ["2024_01_01_create_threads.php", "2024_02_01_add_pins.php"] {
            fs::write(package.join(MIGRATIONS_DIR).join(migration), "").unwrap();
        }
        let config = UpdateConfig {
            extract_command: format!("cp -R {}/. {{target}}", package_dir.display()),
            ..UpdateConfig::default()
        };
        let steps = steps(root.path(), config);
        let archive = root.path().join("unused.zip");
        fs::write(&archive, b"").unwrap();

        assert_eq!(steps.migrate(&ctx).await.unwrap(), 1);
        steps.apply(&ctx, &archive).await.unwrap();

        assert!(root.path().join("ledger").join("forum.txt").is_file());
        assert_eq!(steps.pending_migrations(&ctx).await.unwrap(), 1);
        assert_eq!(steps.migrate(&ctx).await.unwrap(), 1);
        assert_eq!(steps.pending_migrations(&ctx).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn backup_prunes_old_backups() {
        let root = tempfile::tempdir().unwrap();
        let ctx = context(root.path());
        let config = UpdateConfig {
            keep_backups: 2,
            ..UpdateConfig::default()
        };
        let steps = steps(root.path(), config);

        let mut paths = Vec::new();
        for minor in 0..3 {
            let ctx = StepContext {
                from_version: SemanticVersion::new(1, minor, 0),
                ..ctx.clone()
            };
            paths.push(steps.backup(&ctx).await.unwrap());
        }

        assert!(!paths[0].exists());
        assert!(paths[1].exists());
        assert!(paths[2].exists());
    }
}
