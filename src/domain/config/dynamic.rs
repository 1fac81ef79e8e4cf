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

use super::{CliConfig, OutputFormat};
use crate::shared::error::{KubeError, Result};
use std::collections::HashMap;
use std::str::FromStr;

/// Parse `-D key=value` pairs. Later pairs override earlier ones.
pub fn parse_dynamic_configs(configs: &[String]) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();

    for config in configs {
        let (key, value) = config.split_once('=').ok_or_else(|| {
            KubeError::ConfigError(format!(
                "Invalid config format: '{}'. Expected 'key=value'",
                config
            ))
        })?;

        let key = key.trim();
        if key.is_empty() {
            return Err(KubeError::ConfigError(format!(
                "Empty key in config: '{}'",
                config
            )));
        }

        map.insert(key.to_string(), value.trim().to_string());
    }

    Ok(map)
}

/// Apply overrides on top of file configuration. Unknown keys are rejected so
/// typos do not pass silently.
pub fn apply_overrides(configs: &HashMap<String, String>, conf: &mut CliConfig) -> Result<()> {
    for (key, value) in configs {
        match key.as_str() {
            "timeout.request" => conf.timeouts.request_secs = parse_value(key, value)?,
            "timeout.handshake" => conf.timeouts.handshake_secs = parse_value(key, value)?,
            "timeout.stream-idle" => conf.timeouts.stream_idle_secs = parse_value(key, value)?,
            "timeout.drain-grace" => conf.timeouts.drain_grace_ms = parse_value(key, value)?,
            "logs.tail" => conf.logs.tail = parse_value(key, value)?,
            "port-forward.address" => {
                conf.port_forward.address = value.clone();
                conf.port_forward.address()?;
            }
            "output.format" => conf.output.format = OutputFormat::from_str(value)?,
            other => {
                return Err(KubeError::ConfigError(format!(
                    "Unknown config key '{}'",
                    other
                )))
            }
        }
    }
    Ok(())
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        KubeError::ConfigError(format!("Invalid value for {}: '{}'", key, value))
    })
}
