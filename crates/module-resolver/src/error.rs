use std::path::PathBuf;

/// Errors that can occur while resolving modules.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A version string is not strict `major.minor.patch`.
    #[error("invalid version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },

    /// A constraint expression could not be parsed.
    #[error("invalid version constraint '{constraint}': {reason}")]
    InvalidConstraint { constraint: String, reason: String },

    /// A module name is not lowercase kebab-case.
    #[error("invalid module name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// A required manifest field is absent.
    #[error("module manifest is missing required field '{field}'")]
    MissingField { field: &'static str },

    /// The manifest is not valid JSON or has the wrong shape.
    #[error("failed to parse module manifest: {0}")]
    ManifestParse(#[from] serde_json::Error),

    /// A discovered manifest failed validation.
    #[error("invalid manifest at {path}: {source}")]
    InvalidManifest {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    /// Module manifest file not found at the expected path.
    #[error("module manifest not found: {0}")]
    ManifestNotFound(PathBuf),

    /// Two discovered modules share a name.
    #[error("module '{0}' is already registered")]
    DuplicateModule(String),

    /// Module not present in the registry.
    #[error("unknown module: {0}")]
    UnknownModule(String),

    /// The runtime could not be queried for its version or extensions.
    #[error("failed to inspect runtime '{binary}': {reason}")]
    EnvironmentDetection { binary: String, reason: String },

    /// Filesystem error from module-fs.
    #[error(transparent)]
    Fs(#[from] module_fs::Error),

    /// I/O error reading module directories.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
