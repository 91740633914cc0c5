//! Error types for repowright
//!
//! Domain-specific error types using thiserror.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
///
/// All of these are fatal: they are raised before any pass starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file '{path}': {error}")]
    Read { path: PathBuf, error: String },

    /// Failed to parse config file
    #[error("Failed to parse config file: {error}")]
    Parse { error: String },

    /// Invalid target database path
    #[error("Invalid target database '{path}': {reason}")]
    InvalidTargetDb { path: PathBuf, reason: String },

    /// Invalid duration string
    #[error("Invalid duration '{value}': {reason}")]
    InvalidDuration { value: String, reason: String },

    /// Invalid worker count
    #[error("Worker count must be greater than 0")]
    InvalidWorkers,

    /// Invalid target name
    #[error("Invalid package name '{name}'")]
    InvalidTargetName { name: String },

    /// Same target declared twice
    #[error("Package '{name}' is declared more than once")]
    DuplicateTarget { name: String },

    /// Invalid proxy URL
    #[error("Invalid proxy '{proxy}': {reason}")]
    InvalidProxy { proxy: String, reason: String },

    /// Empty required field
    #[error("Field '{field}' in section [{section}] cannot be empty")]
    EmptyField { section: String, field: String },
}

/// Recipe fetch errors
#[derive(Error, Debug)]
pub enum FetchError {
    /// Network error
    #[error("Network error fetching '{url}': {error}")]
    NetworkError { url: String, error: String },

    /// Non-success HTTP status
    #[error("Fetching '{url}' returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    /// Recipe exceeded the size cap
    #[error("Recipe at '{url}' exceeds {limit} bytes")]
    TooLarge { url: String, limit: usize },

    /// Local recipe could not be read
    #[error("IO error for '{path}': {error}")]
    IoError { path: PathBuf, error: String },

    /// Local recipe path is a directory
    #[error("Recipe '{path}' is a directory")]
    IsDirectory { path: PathBuf },

    /// Proxy could not be configured
    #[error("Invalid proxy '{proxy}': {error}")]
    Proxy { proxy: String, error: String },
}

/// External command errors
#[derive(Error, Debug)]
pub enum CommandError {
    /// Command could not be started
    #[error("Failed to run '{program}': {error}")]
    Spawn { program: String, error: String },

    /// Command exited with a non-zero status
    #[error("'{program}' exited with {status} (see {})", log.display())]
    Failed {
        program: String,
        status: String,
        log: PathBuf,
    },

    /// Log file could not be opened
    #[error("Failed to open log file '{path}': {error}")]
    Log { path: PathBuf, error: String },
}

/// Build backend errors
#[derive(Error, Debug)]
pub enum BackendError {
    /// A backend command failed
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Filesystem problem in a build directory
    #[error("IO error for '{path}': {error}")]
    Io { path: PathBuf, error: String },

    /// Ephemeral file could not be created
    #[error("Failed to write ephemeral file '{path}': {error}")]
    Ephemeral { path: PathBuf, error: String },

    /// Proxy could not be translated for the build tool
    #[error("Invalid proxy '{proxy}': {reason}")]
    Proxy { proxy: String, reason: String },
}

/// Which hook failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    /// Runs before the build tool
    PreBuild,
    /// Runs after the build tool
    PostBuild,
}

impl std::fmt::Display for HookKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookKind::PreBuild => write!(f, "pre-build"),
            HookKind::PostBuild => write!(f, "post-build"),
        }
    }
}

/// Hook errors
#[derive(Error, Debug)]
#[error("{kind} hook failed: {source}")]
pub struct HookError {
    /// Which hook failed
    pub kind: HookKind,
    /// Underlying command error
    #[source]
    pub source: CommandError,
}

/// Publish errors
#[derive(Error, Debug)]
pub enum PublishError {
    /// Build produced no package
    #[error("Build of '{target}' produced no package")]
    NoArtifacts { target: String },

    /// Signing failed
    #[error("Failed to sign '{}': {source}", path.display())]
    Sign {
        path: PathBuf,
        #[source]
        source: CommandError,
    },

    /// Updating the output index failed
    #[error("Failed to add '{}' to the repository database: {source}", path.display())]
    Index {
        path: PathBuf,
        #[source]
        source: CommandError,
    },

    /// Copying an artifact failed
    #[error("Failed to copy '{}' to '{}': {error}", from.display(), to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        error: String,
    },

    /// Listing artifacts failed
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Idempotency cache errors
#[derive(Error, Debug)]
pub enum CacheError {
    /// Marker or recipe could not be read or written
    #[error("IO error for '{path}': {error}")]
    Io { path: PathBuf, error: String },

    /// Applied recipe path exists but is a directory
    #[error("Recipe path '{path}' exists but is a directory")]
    RecipeIsDirectory { path: PathBuf },

    /// Applied recipe could not be compared or written
    #[error("{0}")]
    Filesystem(#[from] FilesystemError),
}

/// Filesystem errors
#[derive(Error, Debug)]
pub enum FilesystemError {
    /// Failed to create directory
    #[error("Failed to create directory '{path}': {error}")]
    CreateDir { path: PathBuf, error: String },

    /// Failed to read file
    #[error("Failed to read file '{path}': {error}")]
    ReadFile { path: PathBuf, error: String },

    /// Failed to write file
    #[error("Failed to write file '{path}': {error}")]
    WriteFile { path: PathBuf, error: String },
}

/// Any error that moves a pipeline to `Failed`
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Recipe fetch failed
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Idempotency cache failed
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Environment config reconciliation failed
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] FilesystemError),

    /// Backend failed
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Hook failed
    #[error("Hook error: {0}")]
    Hook(#[from] HookError),

    /// Publish failed
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),
}

/// Top-level repowright error type
#[derive(Error, Debug)]
pub enum RepowrightError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Required host tools are missing
    #[error("Missing required dependencies: {}", missing.join(", "))]
    MissingDependencies { missing: Vec<String> },

    /// Working directory setup failed
    #[error("Setup error: {0}")]
    Filesystem(#[from] FilesystemError),

    /// Chroot setup failed
    #[error("Failed to prepare build environment for '{target}': {source}")]
    Environment {
        target: String,
        #[source]
        source: CommandError,
    },

    /// Cache error outside a pipeline
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Unknown target name
    #[error("Package '{name}' is not configured")]
    UnknownTarget { name: String },
}
