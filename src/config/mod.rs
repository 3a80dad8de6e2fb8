use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info};

/// Default config location, `~/.config/botvisor/botvisor.toml` on Linux
pub fn default_config_path() -> String {
    dirs::config_dir()
        .map(|dir| dir.join("botvisor").join("botvisor.toml"))
        .map(|path| path.to_string_lossy().into_owned())
        .unwrap_or_else(|| "~/.config/botvisor/botvisor.toml".to_string())
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    #[serde(default)]
    pub watch: WatchConfig,

    /// Directory relative paths are anchored at, set by `resolve_bots_dir`.
    /// Empty means relative paths stay as given.
    #[serde(skip)]
    pub workdir: PathBuf,
}

/// How workers are found and launched
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Workers root; `<bots_dir>/<name>` is a worker's base directory
    pub bots_dir: PathBuf,
    pub program: String,
    pub args: Vec<String>,
    /// Extra arguments used only in dev mode (e.g. a hot-reload preload)
    pub dev_args: Vec<String>,
    pub entry: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            bots_dir: PathBuf::from("bots"),
            program: "ts-node".to_string(),
            args: vec!["-r".to_string(), "dotenv/config".to_string()],
            dev_args: Vec::new(),
            entry: "index.ts".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct WatchConfig {
    /// Collapse repeated notifications for one path inside this window
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 100 }
    }
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Config {
    /// Load from `path`; a missing file yields the defaults
    pub async fn load(path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(path);

        if !Path::new(expanded_path.as_ref()).exists() {
            info!("📄 No config at {}, using defaults", expanded_path);
            return Ok(Self::default());
        }

        info!("📄 Reading config from: {}", expanded_path);
        let content = fs::read_to_string(expanded_path.as_ref())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", expanded_path, e))?;

        let config = Self::from_toml_str(&content)?;
        debug!(
            "📋 Config loaded: bots_dir={:?}, program={}",
            config.supervisor.bots_dir, config.supervisor.program
        );

        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))
    }

    /// Anchor a relative `bots_dir` at `cwd` and remember `cwd` for resolver
    /// paths reported by the bots. No canonicalization.
    pub fn resolve_bots_dir(&mut self, cwd: &Path) {
        if self.workdir.as_os_str().is_empty() {
            self.workdir = cwd.to_path_buf();
        }
        if self.supervisor.bots_dir.is_relative() {
            self.supervisor.bots_dir = self.workdir.join(&self.supervisor.bots_dir);
        }
    }

    /// Full argument list for a launch
    pub fn launch_args(&self, dev: bool) -> Vec<String> {
        let mut args = self.supervisor.args.clone();
        if dev {
            args.extend(self.supervisor.dev_args.iter().cloned());
        }
        args.push(self.supervisor.entry.clone());
        args
    }
}
