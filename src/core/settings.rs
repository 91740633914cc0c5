//! Daemon settings
//!
//! Reads the TOML config file into [`ConfigFile`], then validates it into the
//! immutable [`Settings`] every component shares through an `Arc`.
//!
//! ```toml
//! [general]
//! dir = "/var/lib/repowright"
//! target_db = "/srv/repo/custom.db.tar.gz"
//! user = "builder"
//! group = "builder"
//!
//! [[package]]
//! name = "yay"
//! priority = 10
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::defaults::{
    self, CONF_MAKEPKG, CONF_PACMAN, SIGN_USE_DEFAULT, TARGET_DB_SUFFIX,
};
use crate::config::urls::aur_pkgbuild_url;
use crate::core::target::{is_valid_target_name, RecipeLocator, Target, TargetRegistry};
use crate::error::ConfigError;

/// Raw config file contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Global settings
    pub general: GeneralSection,

    /// Package sections, in declaration order
    #[serde(default, rename = "package")]
    pub packages: Vec<PackageSection>,
}

/// `[general]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralSection {
    /// Working directory
    pub dir: PathBuf,
    /// Repository database the packages are published into
    pub target_db: PathBuf,
    /// Build user
    pub user: String,
    /// Build group
    pub group: String,
    /// Concurrent builds
    pub workers: Option<usize>,
    /// Interval between passes, e.g. "24h" or "1h30m"
    pub schedule: Option<String>,
    /// Default proxy for all packages
    pub proxy: Option<String>,
    /// Signing key, or "DEFAULT" for gpg's default key
    pub key: Option<String>,
    /// makepkg.conf installed into every chroot
    pub makepkg_conf: Option<PathBuf>,
    /// pacman.conf installed into every chroot
    pub pacman_conf: Option<PathBuf>,
    /// Directory for ephemeral files
    pub runtime_dir: Option<PathBuf>,
    /// Log every command line
    #[serde(default)]
    pub debug: bool,
    /// Skip the startup pass
    #[serde(default)]
    pub skip_initial_build: bool,
}

/// `[[package]]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageSection {
    /// Package name
    pub name: String,
    /// PKGBUILD path or URL (defaults to the AUR)
    pub pkgbuild: Option<String>,
    /// Proxy override
    pub proxy: Option<String>,
    /// Pre-build shell command
    pub pre_build: Option<String>,
    /// Post-build shell command
    pub post_build: Option<String>,
    /// Dispatch priority
    #[serde(default)]
    pub priority: i32,
    /// Skip this package in the startup pass
    #[serde(default)]
    pub skip_initial_build: bool,
}

/// Signing configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignKey {
    /// gpg's default key
    Default,
    /// Explicit key id
    Named(String),
}

impl SignKey {
    fn parse(value: &str) -> Self {
        if value == SIGN_USE_DEFAULT {
            Self::Default
        } else {
            Self::Named(value.to_string())
        }
    }
}

/// A config file copied into every build environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvFile {
    /// Host file
    pub source: PathBuf,
    /// Destination relative to the environment root
    pub relative: PathBuf,
}

/// Validated, immutable settings
#[derive(Debug, Clone)]
pub struct Settings {
    /// Working directory
    pub working_dir: PathBuf,
    /// Repository database path
    pub target_db: PathBuf,
    /// Build user
    pub user: String,
    /// Build group
    pub group: String,
    /// Concurrent builds
    pub workers: usize,
    /// Interval between passes
    pub schedule: Duration,
    /// Signing key
    pub sign_key: Option<SignKey>,
    /// Files reconciled into every environment
    pub env_files: Vec<EnvFile>,
    /// Directory for ephemeral files
    pub runtime_dir: PathBuf,
    /// Log every command line
    pub debug: bool,
    /// Skip the startup pass
    pub skip_initial_build: bool,
    /// Build targets
    pub registry: TargetRegistry,
}

impl Settings {
    /// Load and validate settings from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate settings from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content).map_err(|e| ConfigError::Parse {
            error: e.to_string(),
        })?;
        Self::from_file(file)
    }

    /// Validate raw config contents
    pub fn from_file(file: ConfigFile) -> Result<Self, ConfigError> {
        let general = file.general;

        require_non_empty("dir", &general.dir.to_string_lossy())?;
        require_non_empty("user", &general.user)?;
        require_non_empty("group", &general.group)?;
        validate_target_db(&general.target_db)?;

        let workers = general.workers.unwrap_or_else(num_cpus::get);
        if workers == 0 {
            return Err(ConfigError::InvalidWorkers);
        }

        let schedule = match general.schedule.as_deref() {
            Some(value) => parse_duration(value)?,
            None => Duration::from_secs(defaults::DEFAULT_SCHEDULE_SECS),
        };

        if let Some(proxy) = &general.proxy {
            validate_proxy(proxy)?;
        }

        let mut env_files = Vec::new();
        if let Some(source) = general.makepkg_conf {
            env_files.push(EnvFile {
                source,
                relative: PathBuf::from(CONF_MAKEPKG),
            });
        }
        if let Some(source) = general.pacman_conf {
            env_files.push(EnvFile {
                source,
                relative: PathBuf::from(CONF_PACMAN),
            });
        }

        let mut targets: Vec<Target> = Vec::with_capacity(file.packages.len());
        for section in file.packages {
            if !is_valid_target_name(&section.name) {
                return Err(ConfigError::InvalidTargetName { name: section.name });
            }
            if targets.iter().any(|t| t.name == section.name) {
                return Err(ConfigError::DuplicateTarget { name: section.name });
            }
            let proxy = section.proxy.or_else(|| general.proxy.clone());
            if let Some(proxy) = &proxy {
                validate_proxy(proxy)?;
            }
            let recipe = match section.pkgbuild.as_deref() {
                Some(value) if !value.is_empty() => RecipeLocator::parse(value),
                _ => {
                    tracing::debug!(
                        "Package {} will be built from the AUR PKGBUILD",
                        section.name
                    );
                    RecipeLocator::Remote(aur_pkgbuild_url(&section.name))
                }
            };
            targets.push(Target {
                name: section.name,
                recipe,
                proxy,
                pre_build: section.pre_build.filter(|h| !h.trim().is_empty()),
                post_build: section.post_build.filter(|h| !h.trim().is_empty()),
                priority: section.priority,
                skip_initial_build: section.skip_initial_build,
            });
        }

        Ok(Self {
            working_dir: general.dir,
            target_db: general.target_db,
            user: general.user,
            group: general.group,
            workers,
            schedule,
            sign_key: general
                .key
                .filter(|k| !k.is_empty())
                .map(|k| SignKey::parse(&k)),
            env_files,
            runtime_dir: general
                .runtime_dir
                .unwrap_or_else(|| PathBuf::from(defaults::DEFAULT_RUNTIME_DIR)),
            debug: general.debug,
            skip_initial_build: general.skip_initial_build,
            registry: TargetRegistry::new(targets),
        })
    }

    /// Directory packages are published into
    pub fn output_dir(&self) -> PathBuf {
        self.target_db
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
    }

    /// Check if any target is built through a proxy
    pub fn uses_proxy(&self) -> bool {
        self.registry.targets().iter().any(|t| t.proxy.is_some())
    }
}

/// Default config file location
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/etc"))
        .join(defaults::APP_NAME)
        .join(defaults::CONFIG_FILE_NAME)
}

fn require_non_empty(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::EmptyField {
            section: "general".to_string(),
            field: field.to_string(),
        });
    }
    Ok(())
}

fn validate_target_db(path: &Path) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidTargetDb {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    if !path.to_string_lossy().ends_with(TARGET_DB_SUFFIX) {
        return Err(invalid(&format!("must end with {TARGET_DB_SUFFIX}")));
    }
    match path.parent() {
        Some(parent) if parent.as_os_str().is_empty() || parent.is_dir() => Ok(()),
        _ => Err(invalid("parent directory does not exist")),
    }
}

fn validate_proxy(proxy: &str) -> Result<(), ConfigError> {
    let url = reqwest::Url::parse(proxy).map_err(|e| ConfigError::InvalidProxy {
        proxy: proxy.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" | "socks4" | "socks5" | "socks5h" => {}
        other => {
            return Err(ConfigError::InvalidProxy {
                proxy: proxy.to_string(),
                reason: format!("unsupported scheme '{other}'"),
            })
        }
    }
    if url.host_str().is_none() || url.port_or_known_default().is_none() {
        return Err(ConfigError::InvalidProxy {
            proxy: proxy.to_string(),
            reason: "host and port are required".to_string(),
        });
    }
    Ok(())
}

/// Parse a duration such as `90s`, `30m`, `1h30m`, `2d` or a bare number of seconds
pub fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidDuration {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty"));
    }
    if let Ok(secs) = trimmed.parse::<u64>() {
        return if secs == 0 {
            Err(invalid("must be greater than zero"))
        } else {
            Ok(Duration::from_secs(secs))
        };
    }

    let mut total: u64 = 0;
    let mut digits = String::new();
    for ch in trimmed.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let unit = match ch {
            's' => 1,
            'm' => 60,
            'h' => 60 * 60,
            'd' => 24 * 60 * 60,
            _ => return Err(invalid(&format!("unknown unit '{ch}'"))),
        };
        if digits.is_empty() {
            return Err(invalid("unit without a number"));
        }
        let amount: u64 = digits.parse().map_err(|_| invalid("number too large"))?;
        total = amount
            .checked_mul(unit)
            .and_then(|v| total.checked_add(v))
            .ok_or_else(|| invalid("number too large"))?;
        digits.clear();
    }
    if !digits.is_empty() {
        return Err(invalid("missing unit after number"));
    }
    if total == 0 {
        return Err(invalid("must be greater than zero"));
    }
    Ok(Duration::from_secs(total))
}
