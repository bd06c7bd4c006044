//! Whole-directory helpers used for module backups and package installs.

use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Recursively copy `source` into `dest`, creating `dest` if needed.
///
/// Symlinks are not followed; they are skipped with a warning so a backup can
/// never escape the module directory.
pub fn copy_dir(source: &Path, dest: &Path) -> Result<u64> {
    fs::create_dir_all(dest).map_err(|e| Error::io(dest, e))?;
    let mut copied = 0;

    for entry in fs::read_dir(source).map_err(|e| Error::io(source, e))? {
        let entry = entry.map_err(|e| Error::io(source, e))?;
        let path = entry.path();
        let target = dest.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| Error::io(&path, e))?;

        if file_type.is_symlink() {
            tracing::warn!(path = %path.display(), "Skipping symlink while copying directory");
        } else if file_type.is_dir() {
            copied += copy_dir(&path, &target)?;
        } else {
            fs::copy(&path, &target).map_err(|e| Error::io(&path, e))?;
            copied += 1;
        }
    }

    Ok(copied)
}

/// Replace the directory at `target` with `replacement`.
///
/// The previous directory is moved aside first and only deleted once the
/// replacement is in place; if the final rename fails the original is moved
/// back.
pub fn replace_dir(target: &Path, replacement: &Path) -> Result<()> {
    if !replacement.is_dir() {
        return Err(Error::UnsafeReplace {
            path: target.to_path_buf(),
            reason: format!("replacement {} is not a directory", replacement.display()),
        });
    }

    let aside = sibling_path(target, "old");
    let had_previous = target.exists();
    if had_previous {
        remove_dir_if_exists(&aside)?;
        fs::rename(target, &aside).map_err(|e| Error::io(target, e))?;
    } else if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    if let Err(e) = rename_or_copy(replacement, target) {
        if had_previous {
            let _ = fs::rename(&aside, target);
        }
        return Err(e);
    }

    if had_previous {
        remove_dir_if_exists(&aside)?;
    }
    Ok(())
}

/// Remove a directory tree, ignoring a missing path.
pub fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(path, e)),
    }
}

/// List the regular files directly inside `dir`, sorted by name.
///
/// A missing directory yields an empty list.
pub fn list_files(dir: &Path) -> Result<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::io(dir, e)),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        if entry.file_type().map_err(|e| Error::io(dir, e))?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

fn rename_or_copy(from: &Path, to: &Path) -> Result<()> {
    // Staging and module directories may live on different filesystems
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    copy_dir(from, to)?;
    remove_dir_if_exists(from)
}

fn sibling_path(target: &Path, suffix: &str) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.{suffix}"))
}
