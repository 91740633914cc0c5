//! Default configuration values

/// Default interval between scheduled passes (in seconds)
pub const DEFAULT_SCHEDULE_SECS: u64 = 24 * 60 * 60;

/// Default directory for ephemeral files such as proxy configs
pub const DEFAULT_RUNTIME_DIR: &str = "/dev/shm";

/// Maximum number of recipe download attempts
pub const MAX_FETCH_RETRIES: u32 = 3;

/// Base delay for fetch retry backoff (in milliseconds)
pub const FETCH_RETRY_BASE_DELAY_MS: u64 = 1000;

/// Upper bound for a fetched recipe
pub const MAX_RECIPE_BYTES: usize = 4 * 1024 * 1024;

/// Sign key value that selects gpg's default key
pub const SIGN_USE_DEFAULT: &str = "DEFAULT";

/// Required suffix of the target database path
pub const TARGET_DB_SUFFIX: &str = ".db.tar.gz";

/// Suffix of built package files
pub const PACKAGE_SUFFIX: &str = ".pkg.tar.zst";

/// Suffix of detached package signatures
pub const SIGNATURE_SUFFIX: &str = ".pkg.tar.zst.sig";

/// Name of the recipe file inside a target build directory
pub const RECIPE_FILE: &str = "PKGBUILD";

/// Extension of success marker files
pub const MARKER_EXTENSION: &str = "done";

/// Working directory layout
pub const DIR_BUILDING: &str = "building";
pub const DIR_LOGS: &str = "logs";
pub const DIR_MARKERS: &str = "markers";
pub const DIR_CHROOT: &str = "chroot";
pub const DIR_ROOT: &str = "root";

/// Log file used while creating a chroot
pub const LOG_FILE_MKARCHROOT: &str = "mkarchroot.log";

/// Environment config files, relative to the chroot root
pub const CONF_MAKEPKG: &str = "etc/makepkg.conf";
pub const CONF_PACMAN: &str = "etc/pacman.conf";

/// Config file name under the user config directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Application name used in directory paths
pub const APP_NAME: &str = "repowright";
