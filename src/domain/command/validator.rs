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

use super::request::{CommandRequest, Verb, VerbParams};
use crate::domain::resource::Selector;
use crate::shared::error::KubeError;

/// Checks a request before anything reaches the transport.
pub struct RequestValidator;

impl RequestValidator {
    pub fn validate(request: &CommandRequest) -> Result<(), KubeError> {
        Self::validate_kind(request)?;
        Self::validate_selector(request)?;
        Self::validate_params(request)?;

        if let Some(namespace) = &request.namespace {
            if !is_valid_k8s_name(namespace) {
                return Err(KubeError::ValidationError(format!(
                    "Invalid namespace: {}",
                    namespace
                )));
            }
        }

        Ok(())
    }

    fn validate_kind(request: &CommandRequest) -> Result<(), KubeError> {
        // `delete -f` takes its kinds from the manifests.
        let from_documents = request.params.documents().is_some();
        match (request.verb.requires_kind() && !from_documents, request.kind) {
            (true, None) => Err(KubeError::ValidationError(format!(
                "'{}' requires a resource kind",
                request.verb
            ))),
            (false, Some(kind)) => Err(KubeError::invalid_verb(request.verb, kind)),
            (true, Some(kind)) if !kind.supports(request.verb) => {
                Err(KubeError::invalid_verb(request.verb, kind))
            }
            _ => Ok(()),
        }
    }

    fn validate_selector(request: &CommandRequest) -> Result<(), KubeError> {
        if request.verb.is_streaming() && request.selector.as_name().is_none() {
            return Err(KubeError::ValidationError(format!(
                "'{}' targets exactly one pod; pass a pod name",
                request.verb
            )));
        }

        match &request.selector {
            Selector::Name(name) if name.is_empty() => Err(KubeError::ValidationError(
                "Resource name must not be empty".to_string(),
            )),
            Selector::Labels(expr) if expr.trim().is_empty() => Err(KubeError::ValidationError(
                "Label selector must not be empty".to_string(),
            )),
            _ => Ok(()),
        }
    }

    fn validate_params(request: &CommandRequest) -> Result<(), KubeError> {
        match (request.verb, &request.params) {
            (Verb::Scale, VerbParams::Scale { replicas }) => {
                if *replicas < 0 {
                    return Err(KubeError::ValidationError(format!(
                        "replicas must be >= 0, got {}",
                        replicas
                    )));
                }
                Ok(())
            }
            (Verb::Logs, VerbParams::Logs(options)) => {
                if matches!(options.tail_lines, Some(n) if n < 0) {
                    return Err(KubeError::ValidationError(
                        "--tail must be >= 0".to_string(),
                    ));
                }
                Ok(())
            }
            (Verb::Exec, VerbParams::Exec(options)) => {
                if options.command.is_empty() {
                    return Err(KubeError::ValidationError(
                        "exec requires a command".to_string(),
                    ));
                }
                Ok(())
            }
            (Verb::PortForward, VerbParams::PortForward(options)) => {
                if options.mappings.is_empty() {
                    return Err(KubeError::ValidationError(
                        "port-forward requires at least one port mapping".to_string(),
                    ));
                }
                let mut locals: Vec<u16> = options
                    .mappings
                    .iter()
                    .map(|m| m.local)
                    .filter(|p| *p != 0)
                    .collect();
                locals.sort_unstable();
                if locals.windows(2).any(|w| w[0] == w[1]) {
                    return Err(KubeError::ValidationError(
                        "port-forward local ports must be unique".to_string(),
                    ));
                }
                Ok(())
            }
            (Verb::Apply | Verb::Delete, VerbParams::Documents(documents)) => {
                if documents.is_empty() {
                    return Err(KubeError::ValidationError(format!(
                        "{} received no documents",
                        request.verb
                    )));
                }
                Ok(())
            }
            (Verb::Get | Verb::Describe | Verb::Delete | Verb::Restart | Verb::ClusterInfo, _) => {
                Ok(())
            }
            (verb, _) => Err(KubeError::ValidationError(format!(
                "Missing parameters for '{}'",
                verb
            ))),
        }
    }
}

/// RFC 1123 label check used for namespaces.
pub(crate) fn is_valid_k8s_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 63 {
        return false;
    }

    if !name.chars().next().unwrap_or(' ').is_ascii_alphanumeric() {
        return false;
    }
    if !name.chars().last().unwrap_or(' ').is_ascii_alphanumeric() {
        return false;
    }

    name.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}
