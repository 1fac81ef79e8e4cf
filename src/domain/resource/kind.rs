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

use crate::domain::command::Verb;
use crate::shared::error::KubeError;
use std::fmt;

/// Resource kinds the CLI knows how to operate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Pod,
    Deployment,
    StatefulSet,
    DaemonSet,
    Service,
    Node,
    ConfigMap,
    Namespace,
}

/// What a kind supports beyond plain get/describe/delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub namespaced: bool,
    pub scalable: bool,
    pub restartable: bool,
    /// Logs, exec and port-forward target a single pod.
    pub streamable: bool,
}

impl Capabilities {
    const fn new(namespaced: bool, scalable: bool, restartable: bool, streamable: bool) -> Self {
        Self {
            namespaced,
            scalable,
            restartable,
            streamable,
        }
    }
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 8] = [
        ResourceKind::Pod,
        ResourceKind::Deployment,
        ResourceKind::StatefulSet,
        ResourceKind::DaemonSet,
        ResourceKind::Service,
        ResourceKind::Node,
        ResourceKind::ConfigMap,
        ResourceKind::Namespace,
    ];

    pub fn capabilities(&self) -> Capabilities {
        match self {
            ResourceKind::Pod => Capabilities::new(true, false, false, true),
            ResourceKind::Deployment => Capabilities::new(true, true, true, false),
            ResourceKind::StatefulSet => Capabilities::new(true, true, true, false),
            ResourceKind::DaemonSet => Capabilities::new(true, false, true, false),
            ResourceKind::Service => Capabilities::new(true, false, false, false),
            ResourceKind::Node => Capabilities::new(false, false, false, false),
            ResourceKind::ConfigMap => Capabilities::new(true, false, false, false),
            ResourceKind::Namespace => Capabilities::new(false, false, false, false),
        }
    }

    /// Capability lookup for a verb. Verbs that do not target a kind
    /// (apply, cluster-info) are never supported here.
    pub fn supports(&self, verb: Verb) -> bool {
        let caps = self.capabilities();
        match verb {
            Verb::Get | Verb::Describe | Verb::Delete => true,
            Verb::Scale => caps.scalable,
            Verb::Restart => caps.restartable,
            Verb::Logs | Verb::Exec | Verb::PortForward => caps.streamable,
            Verb::Apply | Verb::ClusterInfo => false,
        }
    }

    pub fn is_namespaced(&self) -> bool {
        self.capabilities().namespaced
    }

    /// Lowercase singular name used on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Pod => "pod",
            ResourceKind::Deployment => "deployment",
            ResourceKind::StatefulSet => "statefulset",
            ResourceKind::DaemonSet => "daemonset",
            ResourceKind::Service => "service",
            ResourceKind::Node => "node",
            ResourceKind::ConfigMap => "configmap",
            ResourceKind::Namespace => "namespace",
        }
    }

    /// Plural name, as in `get pods`.
    pub fn plural(&self) -> String {
        format!("{}s", self.as_str())
    }

    /// API `kind` as it appears in manifests.
    pub fn api_kind(&self) -> &'static str {
        match self {
            ResourceKind::Pod => "Pod",
            ResourceKind::Deployment => "Deployment",
            ResourceKind::StatefulSet => "StatefulSet",
            ResourceKind::DaemonSet => "DaemonSet",
            ResourceKind::Service => "Service",
            ResourceKind::Node => "Node",
            ResourceKind::ConfigMap => "ConfigMap",
            ResourceKind::Namespace => "Namespace",
        }
    }

    /// Match a manifest `kind` back to a known kind.
    pub fn from_api_kind(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.api_kind() == kind)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = KubeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "po" | "pod" | "pods" => Ok(ResourceKind::Pod),
            "deploy" | "deployment" | "deployments" => Ok(ResourceKind::Deployment),
            "sts" | "statefulset" | "statefulsets" => Ok(ResourceKind::StatefulSet),
            "ds" | "daemonset" | "daemonsets" => Ok(ResourceKind::DaemonSet),
            "svc" | "service" | "services" => Ok(ResourceKind::Service),
            "no" | "node" | "nodes" => Ok(ResourceKind::Node),
            "cm" | "configmap" | "configmaps" => Ok(ResourceKind::ConfigMap),
            "ns" | "namespace" | "namespaces" => Ok(ResourceKind::Namespace),
            _ => Err(KubeError::ValidationError(format!(
                "Unknown resource kind: {}",
                s
            ))),
        }
    }
}
