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

//! Decodes manifest files into ordered documents.

use crate::domain::apply::ManifestDocument;
use crate::infrastructure::constants::MANIFEST_EXTENSIONS;
use crate::shared::error::{KubeError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// `-` reads standard input.
pub const STDIN_SOURCE: &str = "-";

/// Read every source in order. Directories contribute their manifest files
/// sorted by name; `-` reads stdin.
pub fn read_sources(sources: &[String]) -> Result<Vec<ManifestDocument>> {
    let mut documents = Vec::new();
    for source in sources {
        if source == STDIN_SOURCE {
            let mut content = String::new();
            std::io::stdin().read_to_string(&mut content)?;
            documents.extend(decode_str(&content, "stdin")?);
        } else {
            documents.extend(read_path(Path::new(source))?);
        }
    }
    Ok(documents)
}

pub fn read_path(path: &Path) -> Result<Vec<ManifestDocument>> {
    if path.is_dir() {
        let mut files: Vec<_> = std::fs::read_dir(path)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && has_manifest_extension(p))
            .collect();
        files.sort();

        let mut documents = Vec::new();
        for file in files {
            documents.extend(read_path(&file)?);
        }
        return Ok(documents);
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        KubeError::ConfigError(format!("Failed to read manifest {}: {}", path.display(), e))
    })?;
    decode_str(&content, &path.display().to_string())
}

/// Split a multi-document YAML (or JSON) stream. Empty documents are
/// skipped and `kind: *List` documents are replaced by their items.
pub fn decode_str(content: &str, source: &str) -> Result<Vec<ManifestDocument>> {
    let mut documents = Vec::new();

    for (index, de) in serde_yaml::Deserializer::from_str(content).enumerate() {
        let body = Value::deserialize(de).map_err(|e| KubeError::ApplyDocumentError {
            document: format!("{}#{}", source, index),
            reason: e.to_string(),
        })?;

        match body {
            Value::Null => continue,
            Value::Object(_) => {}
            _ => {
                return Err(KubeError::ApplyDocumentError {
                    document: format!("{}#{}", source, index),
                    reason: "document is not a mapping".to_string(),
                })
            }
        }

        if is_list(&body) {
            let items = match body.get("items") {
                Some(Value::Array(items)) => items.clone(),
                _ => Vec::new(),
            };
            for (item_index, item) in items.into_iter().enumerate() {
                documents.push(ManifestDocument::new(
                    format!("{}#{}.{}", source, index, item_index),
                    item,
                ));
            }
        } else {
            documents.push(ManifestDocument::new(format!("{}#{}", source, index), body));
        }
    }

    debug!("Decoded {} document(s) from {}", documents.len(), source);
    Ok(documents)
}

fn is_list(body: &Value) -> bool {
    body.get("kind")
        .and_then(Value::as_str)
        .is_some_and(|kind| kind.ends_with("List"))
        && body.get("items").is_some()
}

fn has_manifest_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| MANIFEST_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}
