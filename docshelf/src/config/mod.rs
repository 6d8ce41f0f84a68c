use crate::error::{DocShelfError, Result};
use crate::fetch::{GitFetcher, LocalFetcher, SourceFetcher};
use crate::sync::SourceConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an optional YAML config file.
pub const CONFIG_PATH_VAR: &str = "DOCSHELF_CONFIG";

/// Runtime settings for a docshelf server.
///
/// Read from a YAML file, then overridden by `DOCSHELF_*` environment
/// variables. Every field has a default, so an empty file is valid as long
/// as a repository directory ends up set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Git remote to mirror. Without one the repository directory is used as is.
    pub remote_url: Option<String>,
    pub repository_dir: PathBuf,
    pub webhook_secret: Option<String>,
    pub webhook_header: String,
    pub host: String,
    pub port: u16,
    pub sync_on_start: bool,
    pub refresh_interval_secs: Option<u64>,
    pub watch: bool,
    pub cooldown_ms: u64,
    pub watch_debounce_ms: u64,
    /// Origins allowed to call the HTTP API from a browser. Empty allows any.
    pub cors_allowed_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            remote_url: None,
            repository_dir: PathBuf::new(),
            webhook_secret: None,
            webhook_header: "X-Webhook-Token".to_string(),
            host: "127.0.0.1".to_string(),
            port: 9001,
            sync_on_start: true,
            refresh_interval_secs: None,
            watch: false,
            cooldown_ms: 1000,
            watch_debounce_ms: 250,
            cors_allowed_origins: Vec::new(),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| DocShelfError::Config(format!("{name}: cannot parse '{value}'")))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(DocShelfError::Config(format!(
            "{name}: expected a boolean, got '{value}'"
        ))),
    }
}

/// Empty strings unset optional values.
fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

impl Config {
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            DocShelfError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Ok(serde_yaml::from_str(&text)?)
    }

    /// Override fields from `DOCSHELF_*` environment variables.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = var("DOCSHELF_REMOTE_URL") {
            self.remote_url = non_empty(v);
        }
        if let Some(v) = var("DOCSHELF_REPOSITORY_DIR") {
            self.repository_dir = PathBuf::from(v);
        }
        if let Some(v) = var("DOCSHELF_WEBHOOK_SECRET") {
            self.webhook_secret = non_empty(v);
        }
        if let Some(v) = var("DOCSHELF_WEBHOOK_HEADER") {
            self.webhook_header = v;
        }
        if let Some(v) = var("DOCSHELF_HOST") {
            self.host = v;
        }
        if let Some(v) = var("DOCSHELF_PORT") {
            self.port = parse_var("DOCSHELF_PORT", &v)?;
        }
        if let Some(v) = var("DOCSHELF_SYNC_ON_START") {
            self.sync_on_start = parse_bool("DOCSHELF_SYNC_ON_START", &v)?;
        }
        if let Some(v) = var("DOCSHELF_REFRESH_INTERVAL_SECS") {
            self.refresh_interval_secs = match non_empty(v) {
                Some(v) => Some(parse_var("DOCSHELF_REFRESH_INTERVAL_SECS", &v)?),
                None => None,
            };
        }
        if let Some(v) = var("DOCSHELF_WATCH") {
            self.watch = parse_bool("DOCSHELF_WATCH", &v)?;
        }
        if let Some(v) = var("DOCSHELF_COOLDOWN_MS") {
            self.cooldown_ms = parse_var("DOCSHELF_COOLDOWN_MS", &v)?;
        }
        if let Some(v) = var("DOCSHELF_WATCH_DEBOUNCE_MS") {
            self.watch_debounce_ms = parse_var("DOCSHELF_WATCH_DEBOUNCE_MS", &v)?;
        }
        if let Some(v) = var("DOCSHELF_CORS_ALLOWED_ORIGINS") {
            self.cors_allowed_origins = v
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_string)
                .collect();
        }
        Ok(())
    }

    /// Defaults, then the file named by `DOCSHELF_CONFIG` if set, then the
    /// environment. The result is validated.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) if !path.trim().is_empty() => {
                log::info!("Loading configuration from {path}");
                Config::from_yaml_file(Path::new(&path))?
            }
            _ => Config::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.repository_dir.as_os_str().is_empty() {
            return Err(DocShelfError::Config(
                "repository_dir must be set (DOCSHELF_REPOSITORY_DIR)".into(),
            ));
        }
        if self.port == 0 {
            return Err(DocShelfError::Config("port must be non-zero".into()));
        }
        if self.refresh_interval_secs == Some(0) {
            return Err(DocShelfError::Config(
                "refresh_interval_secs must be positive".into(),
            ));
        }
        if self.watch && self.watch_debounce_ms == 0 {
            return Err(DocShelfError::Config(
                "watch_debounce_ms must be positive".into(),
            ));
        }
        if let Some(origin) = self
            .cors_allowed_origins
            .iter()
            .find(|o| !(o.starts_with("http://") || o.starts_with("https://")))
        {
            return Err(DocShelfError::Config(format!(
                "cors_allowed_origins: '{origin}' is not an http(s) origin"
            )));
        }
        if self.webhook_header.trim().is_empty() {
            return Err(DocShelfError::Config("webhook_header must not be empty".into()));
        }
        Ok(())
    }

    pub fn source(&self) -> SourceConfig {
        SourceConfig {
            remote: self.remote_url.clone().unwrap_or_default(),
            local_dir: self.repository_dir.clone(),
        }
    }

    pub fn fetcher(&self) -> SourceFetcher {
        match self.remote_url {
            Some(_) => SourceFetcher::Git(GitFetcher::new()),
            None => SourceFetcher::Local(LocalFetcher),
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn watch_debounce(&self) -> Duration {
        Duration::from_millis(self.watch_debounce_ms)
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval_secs.map(Duration::from_secs)
    }
}
