// ── Loop configuration ────────────────────────────────────────────────────────
//
// Optional JSON file naming the loop thread and sizing its stack.  The path
// comes from `MSGPUMP_CONFIG`; a missing or unreadable file means defaults.
// No `unsafe`: pure safe Rust + serde_json.

use std::{fs, io, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

// ── On-disk types ─────────────────────────────────────────────────────────────

/// Root of the JSON config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopConfig {
    pub version: u32,
    /// Name given to the loop thread (shows up in panics and debuggers).
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
    /// Stack size in bytes; `None` keeps the platform default.
    #[serde(default)]
    pub stack_size: Option<usize>,
}

// ── Format version ────────────────────────────────────────────────────────────

const CONFIG_VERSION: u32 = 1;

/// Environment variable holding the config file path.
pub const CONFIG_ENV: &str = "MSGPUMP_CONFIG";

fn default_thread_name() -> String {
    "msgpump-loop".to_owned()
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            thread_name: default_thread_name(),
            stack_size: None,
        }
    }
}

impl LoopConfig {
    /// Parse a config document.  Unlike [`load`], errors are reported.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Write the config to `path`, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let file = fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self).map_err(io::Error::other)
    }
}

// ── Path ──────────────────────────────────────────────────────────────────────

/// Return the config path from `MSGPUMP_CONFIG`, if set.
pub fn config_path() -> Option<PathBuf> {
    std::env::var_os(CONFIG_ENV).map(PathBuf::from)
}

// ── Load ──────────────────────────────────────────────────────────────────────

/// Read and parse the config file named by `MSGPUMP_CONFIG`.
///
/// Returns `None` on any error: variable unset, file missing, JSON parse
/// failure, or an unrecognised version number.
pub fn load() -> Option<LoopConfig> {
    load_from(&config_path()?)
}

/// As [`load`], for an explicit path.
pub fn load_from(path: &Path) -> Option<LoopConfig> {
    let data = fs::read(path).ok()?;
    let cfg: LoopConfig = match serde_json::from_slice(&data) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config");
            return None;
        }
    };
    if cfg.version != CONFIG_VERSION {
        tracing::warn!(version = cfg.version, "ignoring config with unknown version");
        return None;
    }
    Some(cfg)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
