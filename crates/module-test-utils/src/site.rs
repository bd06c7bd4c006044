//! A temporary modules directory populated with `module.json` manifests.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use module_resolver::{MANIFEST_FILENAME, ModuleRegistry};
use tempfile::TempDir;

/// A module manifest under construction.
#[derive(Debug, Clone)]
pub struct ModuleFixture {
    name: String,
    version: String,
    dependencies: Vec<String>,
    php_version: Option<String>,
    required_modules: Vec<String>,
    required_extensions: Vec<String>,
    repository: Option<String>,
    migrations: Vec<String>,
}

impl ModuleFixture {
    /// A module published from `acme/<name>`.
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            dependencies: Vec::new(),
            php_version: None,
            required_modules: Vec::new(),
            required_extensions: Vec::new(),
            repository: Some(format!("acme/{name}")),
            migrations: Vec::new(),
        }
    }

    pub fn depends_on(mut self, module: &str) -> Self {
        self.dependencies.push(module.to_string());
        self
    }

    pub fn requires_php(mut self, constraint: &str) -> Self {
        self.php_version = Some(constraint.to_string());
        self
    }

    pub fn requires_module(mut self, module: &str) -> Self {
        self.required_modules.push(module.to_string());
        self
    }

    pub fn requires_extension(mut self, extension: &str) -> Self {
        self.required_extensions.push(extension.to_string());
        self
    }

    /// Ship an (empty) migration file under `migrations/`.
    pub fn with_migration(mut self, file: &str) -> Self {
        self.migrations.push(file.to_string());
        self
    }

    pub fn without_repository(mut self) -> Self {
        self.repository = None;
        self
    }

    pub fn to_json(&self) -> String {
        let title = {
            let mut chars = self.name.chars();
            chars
                .next()
                .map(|c| c.to_uppercase().chain(chars).collect::<String>())
                .unwrap_or_default()
        };
        let mut manifest = serde_json::json!({
            "name": self.name,
            "version": self.version,
            "namespace": format!("Modules\\{title}"),
            "provider": format!("Modules\\{title}\\Providers\\{title}ServiceProvider"),
            "requires": {
                "required_modules": self.required_modules,
                "required_extensions": self.required_extensions,
            },
            "dependencies": self.dependencies,
        });
        if let Some(php) = &self.php_version {
            manifest["requires"]["php_version"] = php.clone().into();
        }
        if let Some(repository) = &self.repository {
            manifest["repository"] = repository.clone().into();
        }
        serde_json::to_string_pretty(&manifest).unwrap()
    }

    fn write_to(&self, dir: &Path) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(MANIFEST_FILENAME), self.to_json()).unwrap();
        if !self.migrations.is_empty() {
            fs::create_dir_all(dir.join("migrations")).unwrap();
            for migration in &self.migrations {
                fs::write(dir.join("migrations").join(migration), "").unwrap();
            }
        }
    }
}

/// A temporary directory laid out like an installation: `modules/` holds
/// one directory per module, `.modman/` holds manager state.
pub struct TestSite {
    dir: TempDir,
}

impl TestSite {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        fs::create_dir_all(dir.path().join("modules")).unwrap();
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn modules_dir(&self) -> PathBuf {
        self.root().join("modules")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root().join(".modman")
    }

    /// Write the module's manifest and migrations; returns the module
    /// directory.
    pub fn install(&self, module: &ModuleFixture) -> PathBuf {
        let dir = self.modules_dir().join(&module.name);
        module.write_to(&dir);
        dir
    }

    /// Pack `module` as a release archive: a tar holding one top-level
    /// `<name>/` directory. Extract it with `tar -xf {archive} -C {target}`.
    pub fn package(&self, module: &ModuleFixture) -> PathBuf {
        let label = format!("{}-{}", module.name, module.version);
        let stage = self.root().join("packages").join(&label);
        module.write_to(&stage.join(&module.name));

        let archive = self.root().join("packages").join(format!("{label}.tar"));
        let status = Command::new("tar")
            .arg("-cf")
            .arg(&archive)
            .arg("-C")
            .arg(&stage)
            .arg(&module.name)
            .status()
            .expect("tar must be installed");
        assert!(status.success(), "tar failed for {label}");
        archive
    }

    /// Discover every installed module, all enabled.
    pub fn registry(&self) -> ModuleRegistry {
        ModuleRegistry::discover(&self.modules_dir(), &Default::default())
            .expect("fixture modules must be discoverable")
    }
}

impl Default for TestSite {
    fn default() -> Self {
        Self::new()
    }
}
