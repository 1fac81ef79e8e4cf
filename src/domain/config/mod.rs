// Copyright 2025 JiangLong.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! CLI configuration: TOML file, then `-D` overrides

pub mod dynamic;

pub use self::dynamic::{apply_overrides, parse_dynamic_configs};

use crate::infrastructure::constants::{
    CONFIG_DIR_NAME, CONFIG_FILE_ENV, CONFIG_FILE_NAME, DEFAULT_DRAIN_GRACE_MS,
    DEFAULT_FORWARD_ADDRESS, DEFAULT_HANDSHAKE_TIMEOUT_SECS, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_TAIL_LINES,
};
use crate::shared::error::{KubeError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::read_to_string;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub timeouts: TimeoutConf,
    pub logs: LogsConf,
    pub port_forward: PortForwardConf,
    pub output: OutputConf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConf {
    /// Bounded verbs: get, delete, scale, apply per document
    pub request_secs: u64,
    pub handshake_secs: u64,
    /// Per read/write on a stream; 0 disables the idle limit
    pub stream_idle_secs: u64,
    pub drain_grace_ms: u64,
}

impl Default for TimeoutConf {
    fn default() -> Self {
        Self {
            request_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            handshake_secs: DEFAULT_HANDSHAKE_TIMEOUT_SECS,
            stream_idle_secs: 0,
            drain_grace_ms: DEFAULT_DRAIN_GRACE_MS,
        }
    }
}

impl TimeoutConf {
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    pub fn handshake(&self) -> Duration {
        Duration::from_secs(self.handshake_secs)
    }

    pub fn stream_idle(&self) -> Option<Duration> {
        (self.stream_idle_secs > 0).then(|| Duration::from_secs(self.stream_idle_secs))
    }

    pub fn drain_grace(&self) -> Duration {
        Duration::from_millis(self.drain_grace_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogsConf {
    pub tail: i64,
}

impl Default for LogsConf {
    fn default() -> Self {
        Self {
            tail: DEFAULT_TAIL_LINES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortForwardConf {
    pub address: String,
}

impl Default for PortForwardConf {
    fn default() -> Self {
        Self {
            address: DEFAULT_FORWARD_ADDRESS.to_string(),
        }
    }
}

impl PortForwardConf {
    pub fn address(&self) -> Result<IpAddr> {
        self.address.parse().map_err(|_| {
            KubeError::ConfigError(format!(
                "port_forward.address is not an IP address: {}",
                self.address
            ))
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConf {
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Yaml,
}

impl FromStr for OutputFormat {
    type Err = KubeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "table" | "wide" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "yaml" | "yml" => Ok(OutputFormat::Yaml),
            other => Err(KubeError::ValidationError(format!(
                "Unknown output format '{}', expected table, json or yaml",
                other
            ))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Table => "table",
            OutputFormat::Json => "json",
            OutputFormat::Yaml => "yaml",
        })
    }
}

impl CliConfig {
    /// Load configuration from a TOML file
    pub fn from<T: AsRef<Path>>(path: T) -> Result<Self> {
        let path = path.as_ref();
        let content = read_to_string(path).map_err(|e| {
            KubeError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let conf: Self = toml::from_str(&content)?;
        Ok(conf)
    }

    /// Explicit path, else `K8S_CLI_CONFIG`, else the user config file when it
    /// exists, else defaults. An explicitly named file must exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from(path);
        }

        if let Some(path) = std::env::var_os(CONFIG_FILE_ENV).filter(|p| !p.is_empty()) {
            return Self::from(PathBuf::from(path));
        }

        match default_config_path() {
            Some(path) if path.exists() => {
                debug!("Loading config from {}", path.display());
                Self::from(path)
            }
            _ => Ok(Self::default()),
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))?;
    Some(base.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}
