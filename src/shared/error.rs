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

use thiserror::Error;
pub type Result<T> = std::result::Result<T, KubeError>;

/// One failed target of a selector-based verb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFailure {
    pub target: String,
    pub reason: String,
}

#[derive(Error, Debug)]
pub enum KubeError {
    #[error("Kubernetes API error: {0}")]
    KubeError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Context '{0}' not found in kubeconfig")]
    UnknownContext(String),

    #[error("No current context is set in kubeconfig (use --context)")]
    NoCurrentContext,

    #[error("Connection to {target} failed: {reason}")]
    ConnectionError { target: String, reason: String },

    #[error("Resource not found: {resource_type} '{name}' in namespace '{namespace}'")]
    NotFound {
        resource_type: String,
        name: String,
        namespace: String,
    },

    #[error("Resource already exists: {resource_type} '{name}' in namespace '{namespace}'")]
    AlreadyExists {
        resource_type: String,
        name: String,
        namespace: String,
    },

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Interrupted: {0}")]
    Cancelled(String),

    #[error("'{verb}' is not supported for resource kind '{kind}'")]
    InvalidVerbForResource { verb: String, kind: String },

    #[error("{verb} failed for all {total} targets: {}", join_failures(.failures))]
    PartialFailure {
        verb: String,
        total: usize,
        failures: Vec<TargetFailure>,
    },

    #[error("Stream closed abnormally: {0}")]
    StreamClosedAbnormally(String),

    #[error("Document {document} could not be applied: {reason}")]
    ApplyDocumentError { document: String, reason: String },

    #[error("A streaming session is already active ({0})")]
    SessionBusy(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl From<kube::Error> for KubeError {
    fn from(err: kube::Error) -> Self {
        KubeError::KubeError(err.to_string())
    }
}

fn join_failures(failures: &[TargetFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.target, f.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

impl KubeError {
    pub fn config_error(context: impl Into<String>) -> Self {
        Self::ConfigError(context.into())
    }

    pub fn not_found(
        resource_type: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    pub fn already_exists(
        resource_type: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self::AlreadyExists {
            resource_type: resource_type.into(),
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    pub fn connection(target: impl Into<String>, reason: impl ToString) -> Self {
        Self::ConnectionError {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_verb(verb: impl ToString, kind: impl ToString) -> Self {
        Self::InvalidVerbForResource {
            verb: verb.to_string(),
            kind: kind.to_string(),
        }
    }
}
