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

use super::document::{DocumentId, ManifestDocument};
use crate::infrastructure::kubernetes::ResourceClient;
use crate::shared::error::KubeError;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// What the API server did with a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyOperation {
    Created,
    Updated,
    Unchanged,
}

impl fmt::Display for ApplyOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ApplyOperation::Created => "created",
            ApplyOperation::Updated => "configured",
            ApplyOperation::Unchanged => "unchanged",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ApplyOutcome {
    Applied { operation: ApplyOperation },
    Failed { reason: String },
}

/// Result for one input document, at the same index as the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyResult {
    pub index: usize,
    pub source: String,
    /// `None` when the document could not be identified
    pub id: Option<DocumentId>,
    #[serde(flatten)]
    pub outcome: ApplyOutcome,
}

impl ApplyResult {
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, ApplyOutcome::Failed { .. })
    }

    /// `Kind/name` when identified, else the document source.
    pub fn label(&self) -> String {
        match &self.id {
            Some(id) => format!("{}/{}", id.kind.to_lowercase(), id.name),
            None => self.source.clone(),
        }
    }
}

/// Applies decoded manifests one by one as create-or-merge-patch.
#[derive(Debug, Clone)]
pub struct ApplyEngine {
    timeout: Duration,
    default_namespace: String,
    cancel: CancellationToken,
}

impl ApplyEngine {
    pub fn new(timeout: Duration, default_namespace: impl Into<String>) -> Self {
        Self {
            timeout,
            default_namespace: default_namespace.into(),
            cancel: CancellationToken::new(),
        }
    }

    /// Once `cancel` fires, the call in flight is abandoned and the
    /// remaining documents are reported as not applied.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Always returns one result per document, in input order. A failing
    /// document never stops the ones after it.
    #[instrument(skip_all, fields(documents = documents.len(), namespace = %self.default_namespace))]
    pub async fn apply(
        &self,
        documents: &[ManifestDocument],
        client: &dyn ResourceClient,
    ) -> Vec<ApplyResult> {
        let mut results = Vec::with_capacity(documents.len());

        for (index, document) in documents.iter().enumerate() {
            let result = match document.resolve(&self.default_namespace) {
                Ok(resolved) if self.cancel.is_cancelled() => ApplyResult {
                    index,
                    source: document.source.clone(),
                    id: Some(resolved.id),
                    outcome: failed(document, KubeError::Cancelled("not attempted".to_string())),
                },
                Ok(resolved) => {
                    let call = tokio::time::timeout(self.timeout, client.apply_document(&resolved));
                    let outcome = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => failed(
                            document,
                            KubeError::Cancelled("abandoned in flight".to_string()),
                        ),
                        result = call => match result {
                            Ok(Ok(operation)) => {
                                info!("{} {}", resolved.id, operation);
                                ApplyOutcome::Applied { operation }
                            }
                            Ok(Err(e)) => failed(document, e),
                            Err(_) => failed(
                                document,
                                KubeError::Timeout(format!("no response within {:?}", self.timeout)),
                            ),
                        },
                    };
                    ApplyResult {
                        index,
                        source: document.source.clone(),
                        id: Some(resolved.id),
                        outcome,
                    }
                }
                Err(e) => ApplyResult {
                    index,
                    source: document.source.clone(),
                    id: None,
                    outcome: failed(document, e),
                },
            };
            results.push(result);
        }

        results
    }
}

fn failed(document: &ManifestDocument, err: KubeError) -> ApplyOutcome {
    warn!("Failed to apply {}: {}", document.source, err);
    let err = match err {
        KubeError::ApplyDocumentError { .. } => err,
        other => KubeError::ApplyDocumentError {
            document: document.label(),
            reason: other.to_string(),
        },
    };
    ApplyOutcome::Failed {
        reason: err.to_string(),
    }
}
