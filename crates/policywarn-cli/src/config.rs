//! CLI configuration – reads/writes `~/.policywarn/config.toml`.
//!
//! ```toml
//! db_path = "/home/me/.policywarn/settings.db"
//!
//! [warnings]
//! grace_period_secs = 86400
//! notification_code = 1005
//! settings_key = "notified_noncompliant_services"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use policywarn_kernel::WarningConfig;
use serde::{Deserialize, Serialize};

pub const GRACE_PERIOD_ENV: &str = "POLICYWARN_GRACE_PERIOD_SECS";
pub const DB_PATH_ENV: &str = "POLICYWARN_DB_PATH";

/// Persisted CLI configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// SQLite file holding the per-user resolution sets.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Controller tunables.
    #[serde(default)]
    pub warnings: WarningConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            warnings: WarningConfig::default(),
        }
    }
}

fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

fn default_db_path() -> PathBuf {
    policywarn_dir_for_home(&home_dir()).join("settings.db")
}

fn policywarn_dir_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".policywarn")
}

/// Return the path to `~/.policywarn/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    policywarn_dir_for_home(home).join("config.toml")
}

/// Load the config, falling back to defaults when the file is absent.
/// Environment overrides apply either way.
pub fn load_or_default() -> Result<Config, String> {
    let mut cfg = load_from(&config_path())?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Load the config from a specific path. Returns `None` if it does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `POLICYWARN_*` environment overrides.
///
/// | Variable | Config field |
/// |---|---|
/// | `POLICYWARN_GRACE_PERIOD_SECS` | `warnings.grace_period_secs` |
/// | `POLICYWARN_DB_PATH` | `db_path` |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var(GRACE_PERIOD_ENV)
        && let Ok(secs) = v.trim().parse::<u64>()
    {
        cfg.warnings.grace_period_secs = secs;
    }
    if let Ok(v) = std::env::var(DB_PATH_ENV)
        && !v.is_empty()
    {
        cfg.db_path = PathBuf::from(v);
    }
}

/// Save the config to `~/.policywarn/config.toml`.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        ensure_private_dir(parent)?;
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

/// Create `dir` (and parents) readable by the owner only.
pub fn ensure_private_dir(dir: &Path) -> Result<(), String> {
    fs::create_dir_all(dir)
        .map_err(|e| format!("Failed to create directory {}: {}", dir.display(), e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
            .map_err(|e| format!("Failed to set permissions on {}: {}", dir.display(), e))?;
    }
    Ok(())
}
