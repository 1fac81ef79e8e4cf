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

use crate::shared::error::{KubeError, Result};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// A decoded manifest document, kept as raw JSON until it is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestDocument {
    /// Where the document came from, e.g. `deploy.yaml#2`
    pub source: String,
    pub body: Value,
}

/// Identity of a document: what the API server keys it by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentId {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    /// Explicit or defaulted namespace. Ignored for cluster-scoped kinds.
    pub namespace: String,
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.kind, self.name, self.namespace)
    }
}

/// A document whose identity has been validated and whose namespace is known.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDocument {
    pub id: DocumentId,
    pub body: Value,
}

impl ManifestDocument {
    pub fn new(source: impl Into<String>, body: Value) -> Self {
        Self {
            source: source.into(),
            body,
        }
    }

    pub fn api_version(&self) -> Option<&str> {
        self.body.get("apiVersion").and_then(Value::as_str)
    }

    pub fn kind(&self) -> Option<&str> {
        self.body.get("kind").and_then(Value::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.body
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
    }

    pub fn namespace(&self) -> Option<&str> {
        self.body
            .pointer("/metadata/namespace")
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
    }

    /// Best-effort label for reports, usable before validation.
    pub fn label(&self) -> String {
        match (self.kind(), self.name()) {
            (Some(kind), Some(name)) => format!("{}/{}", kind, name),
            _ => self.source.clone(),
        }
    }

    /// Validate identity fields, defaulting the namespace.
    pub fn resolve(&self, default_namespace: &str) -> Result<ResolvedDocument> {
        let missing = |field: &str| KubeError::ApplyDocumentError {
            document: self.label(),
            reason: format!("missing {}", field),
        };

        let api_version = self.api_version().ok_or_else(|| missing("apiVersion"))?;
        let kind = self.kind().ok_or_else(|| missing("kind"))?;
        let name = self.name().ok_or_else(|| missing("metadata.name"))?;
        let namespace = self.namespace().unwrap_or(default_namespace);

        Ok(ResolvedDocument {
            id: DocumentId {
                api_version: api_version.to_string(),
                kind: kind.to_string(),
                name: name.to_string(),
                namespace: namespace.to_string(),
            },
            body: self.body.clone(),
        })
    }
}

impl DocumentId {
    /// Split `apiVersion` into (group, version); core resources have an empty group.
    pub fn group_version(&self) -> (&str, &str) {
        match self.api_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", self.api_version.as_str()),
        }
    }
}
