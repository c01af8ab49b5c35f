//! User configuration.
//!
//! A single YAML file at a platform-conventional path provides the
//! request defaults (`model`, `fxx`, `product`, `priority`, `save_dir`,
//! `overwrite`, `verbose`). The file is created with sane defaults on
//! first use; environment-variable references in paths are expanded.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{FetchError, Result};

/// Defaults consumed when building requests and the HTTP client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default model when none is given.
    #[serde(default = "default_model")]
    pub model: String,
    /// Default forecast lead time in hours.
    #[serde(default)]
    pub fxx: u32,
    /// Default product. `None` uses the first product of the template.
    #[serde(default)]
    pub product: Option<String>,
    /// Default source priority. `None` uses the template's own order.
    #[serde(default)]
    pub priority: Option<Vec<String>>,
    /// Root of the local GRIB2 cache.
    #[serde(default = "default_save_dir")]
    pub save_dir: PathBuf,
    /// Ignore locally cached files when resolving.
    #[serde(default)]
    pub overwrite: bool,
    /// Chatty output from the CLI.
    #[serde(default = "default_verbose")]
    pub verbose: bool,
    /// Directory of user-provided YAML model templates.
    #[serde(default)]
    pub template_dir: Option<PathBuf>,
    /// Timeout for existence probes (HEAD), seconds.
    #[serde(default = "default_head_timeout_secs")]
    pub head_timeout_secs: u64,
    /// Timeout for data transfers (GET), seconds.
    #[serde(default = "default_get_timeout_secs")]
    pub get_timeout_secs: u64,
}

fn default_model() -> String {
    "hrrr".to_string()
}

pub(crate) fn default_save_dir() -> PathBuf {
    expand_path("~/data")
}

fn default_verbose() -> bool {
    true
}

fn default_head_timeout_secs() -> u64 {
    5
}

fn default_get_timeout_secs() -> u64 {
    30
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            model: default_model(),
            fxx: 0,
            product: None,
            priority: None,
            save_dir: default_save_dir(),
            overwrite: false,
            verbose: default_verbose(),
            template_dir: None,
            head_timeout_secs: default_head_timeout_secs(),
            get_timeout_secs: default_get_timeout_secs(),
        }
    }
}

impl AppConfig {
    /// Conventional location of the config file
    /// (`$XDG_CONFIG_HOME/gribfetch/config.yaml`).
    pub fn config_path() -> PathBuf {
        let base = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| expand_path("~/.config"));
        base.join("gribfetch").join("config.yaml")
    }

    /// Load the user config, creating it with defaults on first use.
    pub fn load_or_init() -> Result<Self> {
        let path = Self::config_path();
        if path.exists() {
            return Self::load(&path);
        }

        let config = AppConfig::default();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let rendered = serde_yaml::to_string(&config)
            .map_err(|e| FetchError::Config(format!("cannot render default config: {e}")))?;
        std::fs::write(&path, rendered)?;
        info!(path = %path.display(), "Created default configuration file");
        Ok(config)
    }

    /// Load the config from an explicit path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: AppConfig = serde_yaml::from_str(&content).map_err(|e| {
            FetchError::Config(format!("cannot parse {}: {e}", path.display()))
        })?;
        config.save_dir = expand_path(&config.save_dir.to_string_lossy());
        if let Some(dir) = &config.template_dir {
            config.template_dir = Some(expand_path(&dir.to_string_lossy()));
        }
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn head_timeout(&self) -> Duration {
        Duration::from_secs(self.head_timeout_secs)
    }

    pub fn get_timeout(&self) -> Duration {
        Duration::from_secs(self.get_timeout_secs)
    }
}

/// Expand `~`, `$VAR`, and `${VAR}` references in a path string.
pub fn expand_path(raw: &str) -> PathBuf {
    let mut s = raw.to_string();

    if s == "~" || s.starts_with("~/") {
        if let Ok(home) = std::env::var("HOME") {
            s = format!("{}{}", home, &s[1..]);
        }
    }

    while let Some(start) = s.find('$') {
        let rest = &s[start + 1..];
        let (name, consumed) = if let Some(stripped) = rest.strip_prefix('{') {
            match stripped.find('}') {
                Some(end) => (stripped[..end].to_string(), end + 3),
                None => break,
            }
        } else {
            let end = rest
                .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
                .unwrap_or(rest.len());
            if end == 0 {
                break;
            }
            (rest[..end].to_string(), end + 1)
        };
        let value = std::env::var(&name).unwrap_or_default();
        s.replace_range(start..start + consumed, &value);
    }

    PathBuf::from(s)
}
