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

use crate::infrastructure::constants::{
    DEFAULT_NAMESPACE, IN_CLUSTER_CONTEXT, KUBECONFIG_ENV, SERVICE_ACCOUNT_NAMESPACE_FILE,
    SERVICE_HOST_ENV, SERVICE_PORT_ENV,
};
use crate::shared::error::{KubeError, Result};
use kube::config::{Kubeconfig, KubeconfigError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// A named cluster endpoint with its credential reference and default namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterContext {
    pub name: String,
    pub cluster: String,
    /// API server URL, empty when the cluster entry is missing
    pub server: String,
    pub credentials: CredentialRef,
    pub namespace: String,
}

/// The user a context authenticates as, and where its auth material lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRef {
    pub user: String,
    pub source: CredentialSource,
}

#[derive(Debug, Clone)]
pub enum CredentialSource {
    /// The merged kubeconfig the context was resolved from
    Kubeconfig(Arc<Kubeconfig>),
    /// The service account mounted into the current pod
    InCluster,
}

impl PartialEq for CredentialSource {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CredentialSource::Kubeconfig(a), CredentialSource::Kubeconfig(b)) => Arc::ptr_eq(a, b),
            (CredentialSource::InCluster, CredentialSource::InCluster) => true,
            _ => false,
        }
    }
}

impl Eq for CredentialSource {}

/// Read-only set of contexts loaded once per process.
#[derive(Debug, Clone, Default)]
pub struct ContextRegistry {
    contexts: Vec<ClusterContext>,
    current: Option<String>,
}

impl ContextRegistry {
    /// Load from an explicit kubeconfig path, or from the files listed in
    /// `KUBECONFIG`, or from `~/.kube/config`.
    pub fn load(kubeconfig: Option<&Path>) -> Result<Self> {
        let config = match kubeconfig {
            Some(path) => Kubeconfig::read_from(path).map_err(|e| {
                KubeError::ConfigError(format!(
                    "Failed to load kubeconfig {}: {}",
                    path.display(),
                    e
                ))
            })?,
            None => Kubeconfig::read().map_err(|e| {
                KubeError::ConfigError(format!(
                    "Failed to load kubeconfig: {} (set {} or --kubeconfig)",
                    e, KUBECONFIG_ENV
                ))
            })?,
        };
        Ok(Self::from_kubeconfig(config))
    }

    /// Merge several kubeconfig files with the usual kubectl rules: the first
    /// file to define a name or `current-context` wins. A context may refer to
    /// clusters and users defined in any of the files.
    pub fn load_paths(paths: &[PathBuf]) -> Result<Self> {
        let merged = paths
            .iter()
            .try_fold(Kubeconfig::default(), |merged, path| {
                Kubeconfig::read_from(path).and_then(|next| merged.merge(next))
            })
            .map_err(merge_error)?;
        Ok(Self::from_kubeconfig(merged))
    }

    /// Parse kubeconfig text, which may hold several YAML documents.
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Kubeconfig::from_yaml(content)
            .map(Self::from_kubeconfig)
            .map_err(merge_error)
    }

    pub fn from_kubeconfig(config: Kubeconfig) -> Self {
        let config = Arc::new(config);

        let contexts = config
            .contexts
            .iter()
            .map(|named| {
                let entry = named.context.clone().unwrap_or_default();
                let server = config
                    .clusters
                    .iter()
                    .find(|c| c.name == entry.cluster)
                    .and_then(|c| c.cluster.as_ref())
                    .and_then(|c| c.server.clone())
                    .unwrap_or_default();

                ClusterContext {
                    name: named.name.clone(),
                    cluster: entry.cluster,
                    server,
                    credentials: CredentialRef {
                        user: entry.user,
                        source: CredentialSource::Kubeconfig(config.clone()),
                    },
                    namespace: entry
                        .namespace
                        .filter(|ns| !ns.is_empty())
                        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
                }
            })
            .collect::<Vec<_>>();

        let current = config.current_context.clone().filter(|c| !c.is_empty());
        debug!(contexts = contexts.len(), current = ?current, "Loaded kubeconfig contexts");
        Self { contexts, current }
    }

    /// A single current context backed by the pod service account.
    pub fn in_cluster() -> Result<Self> {
        Self::in_cluster_from(
            std::env::var(SERVICE_HOST_ENV).ok(),
            std::env::var(SERVICE_PORT_ENV).ok(),
            Path::new(SERVICE_ACCOUNT_NAMESPACE_FILE),
        )
    }

    fn in_cluster_from(
        host: Option<String>,
        port: Option<String>,
        namespace_file: &Path,
    ) -> Result<Self> {
        let host = host.filter(|h| !h.is_empty()).ok_or_else(|| {
            KubeError::ConfigError(format!(
                "Not running inside a cluster: {} is not set",
                SERVICE_HOST_ENV
            ))
        })?;
        let port = port.filter(|p| !p.is_empty()).unwrap_or_else(|| "443".to_string());
        let host = if host.contains(':') {
            format!("[{}]", host)
        } else {
            host
        };
        let namespace = std::fs::read_to_string(namespace_file)
            .ok()
            .map(|ns| ns.trim().to_string())
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

        Ok(Self {
            contexts: vec![ClusterContext {
                name: IN_CLUSTER_CONTEXT.to_string(),
                cluster: IN_CLUSTER_CONTEXT.to_string(),
                server: format!("https://{}:{}", host, port),
                credentials: CredentialRef {
                    user: "serviceaccount".to_string(),
                    source: CredentialSource::InCluster,
                },
                namespace,
            }],
            current: Some(IN_CLUSTER_CONTEXT.to_string()),
        })
    }

    /// Resolve the context a command runs against. An explicit override wins
    /// over `current-context`.
    pub fn resolve(&self, explicit: Option<&str>) -> Result<ClusterContext> {
        let name = match explicit {
            Some(name) => name,
            None => self.current.as_deref().ok_or(KubeError::NoCurrentContext)?,
        };

        self.contexts
            .iter()
            .find(|c| c.name == name)
            .cloned()
            .ok_or_else(|| KubeError::UnknownContext(name.to_string()))
    }

    pub fn list(&self) -> &[ClusterContext] {
        &self.contexts
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }
}

fn merge_error(e: KubeconfigError) -> KubeError {
    KubeError::ConfigError(format!("Failed to load kubeconfig: {}", e))
}
