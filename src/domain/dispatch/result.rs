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

use crate::domain::apply::ApplyResult;
use crate::domain::command::Verb;
use crate::domain::resource::{ResourceKind, ResourceObject};
use crate::domain::session::SessionReport;
use crate::infrastructure::constants::EXIT_CODE_FAILURE;
use crate::shared::error::{KubeError, Result, TargetFailure};
use serde::Serialize;

/// Outcome for one target of a selector-based verb.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetOutcome {
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TargetOutcome {
    pub fn ok(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            error: None,
        }
    }

    pub fn failed(target: impl Into<String>, error: &KubeError) -> Self {
        Self {
            target: target.into(),
            error: Some(error.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// One outcome per matched target, in match order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetReport {
    pub verb: Verb,
    pub outcomes: Vec<TargetOutcome>,
}

impl TargetReport {
    pub fn new(verb: Verb) -> Self {
        Self {
            verb,
            outcomes: Vec::new(),
        }
    }

    pub fn push(&mut self, outcome: TargetOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    pub fn failures(&self) -> Vec<TargetFailure> {
        self.outcomes
            .iter()
            .filter_map(|o| {
                o.error.as_ref().map(|reason| TargetFailure {
                    target: o.target.clone(),
                    reason: reason.clone(),
                })
            })
            .collect()
    }

    /// Fails only when there was at least one target and every one failed.
    /// Mixed results, and an empty match, are successes.
    pub fn into_result(self) -> Result<Self> {
        if self.total() > 0 && self.succeeded() == 0 {
            return Err(KubeError::PartialFailure {
                verb: self.verb.to_string(),
                total: self.total(),
                failures: self.failures(),
            });
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSummary {
    pub context: String,
    pub server: String,
    pub server_version: String,
    pub namespace: String,
    pub nodes: usize,
    pub ready_nodes: usize,
    pub namespaces: usize,
    pub pods: usize,
    pub running_pods: usize,
    pub deployments: usize,
    pub services: usize,
}

/// Raw result of one dispatched command, handed to the renderer.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchResult {
    Resources {
        kind: ResourceKind,
        items: Vec<ResourceObject>,
    },
    Described(ResourceObject),
    Targets(TargetReport),
    Applied(Vec<ApplyResult>),
    Session(SessionReport),
    ClusterInfo(ClusterSummary),
}

impl DispatchResult {
    /// Process exit status for a command that returned this result.
    pub fn exit_code(&self) -> i32 {
        match self {
            DispatchResult::Applied(results) if results.iter().any(ApplyResult::is_failed) => {
                EXIT_CODE_FAILURE
            }
            DispatchResult::Session(report) => report.exit.exit_code(),
            _ => 0,
        }
    }
}
