//! Node configuration.
//!
//! Loaded from a TOML file, then overridden from the environment:
//!
//! ```toml
//! device_name = "door-1"
//! location = "lobby"
//! pre_shared_key = "secret"
//! queue_dir = "/var/lib/tagpost"
//! discovery_port = 5000
//! reader_command = "tagpost-reader"
//! reader_args = []
//! reader_input = "/run/tagpost/tags"
//! ```
//!
//! Without `reader_input` the reader reads tag lines from the node's own
//! stdin, so a driver can be piped in: `tag-driver | tagpost-node`.
//!
//! | Variable | Field |
//! |----------|-------|
//! | `TAGPOST_DEVICE_NAME` | `device_name` |
//! | `TAGPOST_LOCATION` | `location` |
//! | `TAGPOST_PRESHARED_KEY` | `pre_shared_key` |
//! | `TAGPOST_QUEUE_DIR` | `queue_dir` |
//! | `TAGPOST_READER_INPUT` | `reader_input` |

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tagpost_core::constants::{
    DEFAULT_DELIVERY_TIMEOUT_MS, DEFAULT_DISCOVERY_PORT, DEFAULT_IDENTITY_REFRESH_SECS,
    DEFAULT_LINGER_SECS, DEFAULT_NAME_LINGER_SECS, DEFAULT_STATUS_INTERVAL_SECS, UNKNOWN_DEVICE,
    UNKNOWN_LOCATION,
};
use tracing::warn;

use crate::error::{NodeError, NodeResult};

pub const DEFAULT_CONFIG_PATH: &str = "./tagpost.toml";
pub const DEFAULT_READER_COMMAND: &str = "tagpost-reader";
pub const DEFAULT_PANEL_WIDTH: usize = 40;

/// Narrowest panel that still fits the status line.
const MIN_PANEL_WIDTH: usize = 20;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub device_name: String,
    pub location: String,
    /// File holding the current location; re-read on every identity refresh.
    pub location_file: Option<PathBuf>,
    pub pre_shared_key: String,
    /// Defaults to `./tagpost-<device_name>`.
    pub queue_dir: Option<PathBuf>,
    pub discovery_port: u16,
    pub reader_command: String,
    pub reader_args: Vec<String>,
    /// File or FIFO the reader takes tag lines from; stdin when unset.
    pub reader_input: Option<PathBuf>,
    pub linger_secs: u64,
    pub name_linger_secs: u64,
    pub status_interval_secs: u64,
    pub identity_refresh_secs: u64,
    pub delivery_timeout_ms: u64,
    pub panel_width: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            device_name: UNKNOWN_DEVICE.to_string(),
            location: UNKNOWN_LOCATION.to_string(),
            location_file: None,
            pre_shared_key: String::new(),
            queue_dir: None,
            discovery_port: DEFAULT_DISCOVERY_PORT,
            reader_command: DEFAULT_READER_COMMAND.to_string(),
            reader_args: Vec::new(),
            reader_input: None,
            linger_secs: DEFAULT_LINGER_SECS,
            name_linger_secs: DEFAULT_NAME_LINGER_SECS,
            status_interval_secs: DEFAULT_STATUS_INTERVAL_SECS,
            identity_refresh_secs: DEFAULT_IDENTITY_REFRESH_SECS,
            delivery_timeout_ms: DEFAULT_DELIVERY_TIMEOUT_MS,
            panel_width: DEFAULT_PANEL_WIDTH,
        }
    }
}

impl NodeConfig {
    /// Load from `path`, falling back to defaults when the file is missing.
    ///
    /// # Errors
    /// Returns `NodeError::ConfigRead`/`ConfigParse` for an unreadable or
    /// invalid file and `NodeError::Config` if validation fails.
    pub async fn load(path: &Path) -> NodeResult<Self> {
        let mut config = match tokio::fs::read_to_string(path).await {
            Ok(content) => Self::from_toml(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
            Err(source) => {
                return Err(NodeError::ConfigRead {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        config.apply_overrides(|key| env::var(key).ok());
        config.resolve_paths(path.parent());
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns `NodeError::ConfigParse` if `content` is not valid.
    pub fn from_toml(content: &str) -> NodeResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply overrides looked up through `lookup` (the environment in
    /// production).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup("TAGPOST_DEVICE_NAME") {
            self.device_name = value;
        }
        if let Some(value) = lookup("TAGPOST_LOCATION") {
            self.location = value;
        }
        if let Some(value) = lookup("TAGPOST_PRESHARED_KEY") {
            self.pre_shared_key = value;
        }
        if let Some(value) = lookup("TAGPOST_QUEUE_DIR") {
            self.queue_dir = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup("TAGPOST_READER_INPUT") {
            self.reader_input = Some(PathBuf::from(value));
        }
    }

    fn resolve_paths(&mut self, base_dir: Option<&Path>) {
        let Some(base) = base_dir else {
            return;
        };
        if let Some(dir) = &self.queue_dir
            && dir.is_relative()
        {
            self.queue_dir = Some(base.join(dir));
        }
        if let Some(file) = &self.location_file
            && file.is_relative()
        {
            self.location_file = Some(base.join(file));
        }
        if let Some(input) = &self.reader_input
            && input.is_relative()
        {
            self.reader_input = Some(base.join(input));
        }
    }

    pub fn normalize(&mut self) {
        self.device_name = self.device_name.trim().to_string();
        if self.device_name.is_empty() {
            self.device_name = UNKNOWN_DEVICE.to_string();
        }
        self.location = self.location.trim().to_string();
        if self.location.is_empty() {
            self.location = UNKNOWN_LOCATION.to_string();
        }
        if self
            .queue_dir
            .as_ref()
            .is_some_and(|dir| dir.as_os_str().is_empty())
        {
            self.queue_dir = None;
        }
        if self
            .reader_input
            .as_ref()
            .is_some_and(|input| input.as_os_str().is_empty())
        {
            self.reader_input = None;
        }
    }

    /// # Errors
    /// Returns `NodeError::Config` naming the first offending field.
    pub fn validate(&self) -> NodeResult<()> {
        let positive = [
            ("linger_secs", self.linger_secs),
            ("name_linger_secs", self.name_linger_secs),
            ("status_interval_secs", self.status_interval_secs),
            ("identity_refresh_secs", self.identity_refresh_secs),
            ("delivery_timeout_ms", self.delivery_timeout_ms),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(NodeError::Config(format!("{name} must be greater than 0")));
        }
        if self.reader_command.trim().is_empty() {
            return Err(NodeError::Config("reader_command must not be empty".to_string()));
        }
        if self.panel_width < MIN_PANEL_WIDTH {
            return Err(NodeError::Config(format!(
                "panel_width must be at least {MIN_PANEL_WIDTH}"
            )));
        }
        if self.pre_shared_key.is_empty() {
            warn!("pre_shared_key is empty, every card will validate against the empty key");
        }
        Ok(())
    }

    pub fn queue_dir(&self) -> PathBuf {
        self.queue_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("./tagpost-{}", self.device_name)))
    }

    /// Environment handed to the reader process.
    pub fn reader_env(&self) -> Vec<(&'static str, String)> {
        let mut env = vec![
            ("TAGPOST_PRESHARED_KEY", self.pre_shared_key.clone()),
            ("TAGPOST_LINGER", self.linger_secs.to_string()),
        ];
        if let Some(input) = &self.reader_input {
            env.push(("TAGPOST_READER_INPUT", input.display().to_string()));
        }
        env
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs)
    }

    pub fn identity_refresh(&self) -> Duration {
        Duration::from_secs(self.identity_refresh_secs)
    }

    pub fn name_linger(&self) -> Duration {
        Duration::from_secs(self.name_linger_secs)
    }

    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = name.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_queue_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.queue_dir = Some(dir.into());
        self
    }

    pub fn with_reader(mut self, command: impl Into<String>, args: Vec<String>) -> Self {
        self.reader_command = command.into();
        self.reader_args = args;
        self
    }

    pub fn with_reader_input(mut self, input: impl Into<PathBuf>) -> Self {
        self.reader_input = Some(input.into());
        self
    }

    pub fn with_pre_shared_key(mut self, key: impl Into<String>) -> Self {
        self.pre_shared_key = key.into();
        self
    }

    pub fn with_status_interval(mut self, secs: u64) -> Self {
        self.status_interval_secs = secs;
        self
    }

    pub fn with_identity_refresh(mut self, secs: u64) -> Self {
        self.identity_refresh_secs = secs;
        self
    }

    pub fn with_delivery_timeout(mut self, ms: u64) -> Self {
        self.delivery_timeout_ms = ms;
        self
    }
}
