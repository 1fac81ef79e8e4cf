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

use crate::domain::apply::ManifestDocument;
use crate::domain::context::ClusterContext;
use crate::domain::resource::{ResourceKind, Selector};
use crate::shared::error::KubeError;
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verb {
    Get,
    Describe,
    Logs,
    Delete,
    Scale,
    Restart,
    PortForward,
    Exec,
    Apply,
    ClusterInfo,
}

impl Verb {
    pub const ALL: [Verb; 10] = [
        Verb::Get,
        Verb::Describe,
        Verb::Logs,
        Verb::Delete,
        Verb::Scale,
        Verb::Restart,
        Verb::PortForward,
        Verb::Exec,
        Verb::Apply,
        Verb::ClusterInfo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "get",
            Verb::Describe => "describe",
            Verb::Logs => "logs",
            Verb::Delete => "delete",
            Verb::Scale => "scale",
            Verb::Restart => "restart",
            Verb::PortForward => "port-forward",
            Verb::Exec => "exec",
            Verb::Apply => "apply",
            Verb::ClusterInfo => "cluster-info",
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, Verb::Logs | Verb::Exec | Verb::PortForward)
    }

    /// Verbs that operate on a resource kind. Apply takes its kinds from the
    /// documents, cluster-info from nothing.
    pub fn requires_kind(&self) -> bool {
        !matches!(self, Verb::Apply | Verb::ClusterInfo)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogOptions {
    pub container: Option<String>,
    pub tail_lines: Option<i64>,
    pub follow: bool,
    pub previous: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOptions {
    pub container: Option<String>,
    pub command: Vec<String>,
    pub tty: bool,
    pub stdin: bool,
}

/// `[LOCAL:]REMOTE`; a local port of 0 binds an ephemeral port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    pub local: u16,
    pub remote: u16,
}

impl std::str::FromStr for PortMapping {
    type Err = KubeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |part: &str| {
            part.trim().parse::<u16>().map_err(|_| {
                KubeError::ValidationError(format!("Invalid port mapping '{}'", s))
            })
        };

        let (local, remote) = match s.split_once(':') {
            Some(("", remote)) => (0, parse(remote)?),
            Some((local, remote)) => (parse(local)?, parse(remote)?),
            None => {
                let port = parse(s)?;
                (port, port)
            }
        };

        if remote == 0 {
            return Err(KubeError::ValidationError(format!(
                "Remote port must be non-zero in '{}'",
                s
            )));
        }

        Ok(Self { local, remote })
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.local, self.remote)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortForwardOptions {
    pub address: IpAddr,
    pub mappings: Vec<PortMapping>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum VerbParams {
    #[default]
    None,
    Scale {
        replicas: i32,
    },
    Logs(LogOptions),
    Exec(ExecOptions),
    PortForward(PortForwardOptions),
    /// Decoded manifests for `apply -f` and `delete -f`
    Documents(Vec<ManifestDocument>),
}

impl VerbParams {
    pub fn documents(&self) -> Option<&[ManifestDocument]> {
        match self {
            VerbParams::Documents(documents) => Some(documents),
            _ => None,
        }
    }
}

/// One fully parsed invocation. Built once, never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRequest {
    pub verb: Verb,
    pub kind: Option<ResourceKind>,
    pub selector: Selector,
    pub namespace: Option<String>,
    pub context: Option<String>,
    pub params: VerbParams,
    /// Delete with a zero grace period.
    pub force: bool,
}

impl CommandRequest {
    pub fn new(verb: Verb) -> Self {
        Self {
            verb,
            kind: None,
            selector: Selector::All,
            namespace: None,
            context: None,
            params: VerbParams::None,
            force: false,
        }
    }

    pub fn with_kind(mut self, kind: ResourceKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_selector(mut self, selector: Selector) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace.filter(|ns| !ns.is_empty());
        self
    }

    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }

    pub fn with_params(mut self, params: VerbParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Command namespace, falling back to the context default.
    pub fn effective_namespace(&self, context: &ClusterContext) -> String {
        self.namespace
            .clone()
            .unwrap_or_else(|| context.namespace.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::context::{CredentialRef, CredentialSource};

    fn context(namespace: &str) -> ClusterContext {
        ClusterContext {
            name: "dev".to_string(),
            cluster: "dev".to_string(),
            server: "https://dev:6443".to_string(),
            credentials: CredentialRef {
                user: "admin".to_string(),
                source: CredentialSource::InCluster,
            },
            namespace: namespace.to_string(),
        }
    }

    #[test]
    fn test_port_mapping_forms() {
        assert_eq!(
            "8080:80".parse::<PortMapping>().unwrap(),
            PortMapping {
                local: 8080,
                remote: 80
            }
        );
        assert_eq!(
            "5432".parse::<PortMapping>().unwrap(),
            PortMapping {
                local: 5432,
                remote: 5432
            }
        );
        assert_eq!(
            ":9090".parse::<PortMapping>().unwrap(),
            PortMapping {
                local: 0,
                remote: 9090
            }
        );
        assert!("8080:0".parse::<PortMapping>().is_err());
        assert!("http".parse::<PortMapping>().is_err());
        assert!("1:2:3".parse::<PortMapping>().is_err());
    }

    #[test]
    fn test_effective_namespace() {
        let ctx = context("team-a");
        let request = CommandRequest::new(Verb::Get).with_kind(ResourceKind::Pod);
        assert_eq!(request.effective_namespace(&ctx), "team-a");

        let request = request.with_namespace(Some("production".to_string()));
        assert_eq!(request.effective_namespace(&ctx), "production");

        let request = CommandRequest::new(Verb::Get).with_namespace(Some(String::new()));
        assert_eq!(request.effective_namespace(&ctx), "team-a");
    }

    #[test]
    fn test_streaming_verbs() {
        let streaming: Vec<_> = Verb::ALL.into_iter().filter(|v| v.is_streaming()).collect();
        assert_eq!(streaming, vec![Verb::Logs, Verb::PortForward, Verb::Exec]);
        assert!(!Verb::Apply.requires_kind());
        assert!(Verb::Delete.requires_kind());
    }
}
