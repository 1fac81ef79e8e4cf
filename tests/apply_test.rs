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

mod common;

use common::{handle, Call, FakeResourceClient};
use k8s_cli::domain::dispatch::{CommandDispatcher, DispatchResult};
use k8s_cli::domain::session::{LocalIo, SessionIo, SessionTimeouts, StreamSessionManager};
use k8s_cli::infrastructure::manifest;
use k8s_cli::{
    ApplyEngine, ApplyOperation, ApplyOutcome, CommandRequest, KubeError, ManifestDocument, Verb,
    VerbParams,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn config_map(name: &str, value: &str) -> ManifestDocument {
    ManifestDocument::new(
        format!("{}.yaml#0", name),
        json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": name},
            "data": {"value": value}
        }),
    )
}

fn engine() -> ApplyEngine {
    ApplyEngine::new(Duration::from_secs(5), "default")
}

#[tokio::test]
async fn test_results_follow_input_order_with_failure_in_the_middle() {
    let client = FakeResourceClient::new();
    let documents = vec![
        config_map("first", "1"),
        ManifestDocument::new(
            "broken.yaml#0",
            json!({"apiVersion": "v1", "kind": "Service", "metadata": {}}),
        ),
        config_map("third", "3"),
    ];

    let results = engine().apply(&documents, &client).await;

    assert_eq!(results.len(), 3);
    for (i, result) in results.iter().enumerate() {
        assert_eq!(result.index, i);
        assert_eq!(result.source, documents[i].source);
    }
    assert!(!results[0].is_failed());
    assert!(results[1].is_failed());
    assert!(!results[2].is_failed());
    match &results[1].outcome {
        ApplyOutcome::Failed { reason } => assert!(reason.contains("missing metadata.name")),
        other => panic!("unexpected outcome: {:?}", other),
    }

    // The later document was still applied.
    assert!(client
        .mutations()
        .contains(&Call::CreateDocument("ConfigMap/third (default)".to_string())));
}

#[tokio::test]
async fn test_server_rejection_is_reported_per_document() {
    let client = FakeResourceClient::new();
    client.fail("create", "second", "admission denied");
    let documents = vec![
        config_map("first", "1"),
        config_map("second", "2"),
        config_map("third", "3"),
    ];

    let results = engine().apply(&documents, &client).await;

    let failed: Vec<_> = results.iter().filter(|r| r.is_failed()).map(|r| r.index).collect();
    assert_eq!(failed, vec![1]);
    match &results[1].outcome {
        ApplyOutcome::Failed { reason } => {
            assert!(reason.contains("configmap/second") || reason.contains("ConfigMap/second"));
            assert!(reason.contains("admission denied"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_created_then_updated_then_unchanged() {
    let client = FakeResourceClient::new();
    let engine = engine();
    let operation = |results: Vec<k8s_cli::ApplyResult>| match &results[0].outcome {
        ApplyOutcome::Applied { operation } => *operation,
        other => panic!("unexpected outcome: {:?}", other),
    };

    let first = engine.apply(&[config_map("settings", "a")], &client).await;
    assert_eq!(operation(first), ApplyOperation::Created);

    let second = engine.apply(&[config_map("settings", "b")], &client).await;
    assert_eq!(operation(second), ApplyOperation::Updated);

    let third = engine.apply(&[config_map("settings", "b")], &client).await;
    assert_eq!(operation(third), ApplyOperation::Unchanged);

    assert_eq!(client.document_version("default/ConfigMap/settings"), Some(2));
}

#[tokio::test]
async fn test_explicit_namespace_wins() {
    let client = FakeResourceClient::new();
    let document = ManifestDocument::new(
        "web.yaml#0",
        json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "web", "namespace": "production"}
        }),
    );

    let results = engine().apply(&[document], &client).await;
    assert_eq!(
        results[0].id.as_ref().map(|id| id.namespace.as_str()),
        Some("production")
    );
    assert!(client.document_version("production/Deployment/web").is_some());
}

#[tokio::test]
async fn test_slow_document_times_out() {
    let client = FakeResourceClient::new();
    client.set_delay(Duration::from_millis(500));
    let engine = ApplyEngine::new(Duration::from_millis(50), "default");

    let results = engine.apply(&[config_map("slow", "1")], &client).await;
    match &results[0].outcome {
        ApplyOutcome::Failed { reason } => assert!(reason.contains("Timeout")),
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_interrupt_abandons_remaining_documents() {
    let client = FakeResourceClient::new();
    client.set_delay(Duration::from_millis(300));
    let cancel = CancellationToken::new();
    let engine = engine().with_cancel(cancel.clone());
    let documents = vec![config_map("a", "1"), config_map("b", "2"), config_map("c", "3")];

    let interrupt = async {
        while client.calls().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();
    };
    let (results, ()) = tokio::join!(engine.apply(&documents, &client), interrupt);

    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.is_failed()));
    match &results[2].outcome {
        ApplyOutcome::Failed { reason } => assert!(reason.contains("not attempted")),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(client.calls(), vec![Call::FindDocument("ConfigMap/a (default)".to_string())]);
}

#[tokio::test]
async fn test_interrupted_apply_through_dispatcher() {
    let client = Arc::new(FakeResourceClient::new());
    let handle = handle("prod", client.clone());
    let dispatcher = CommandDispatcher::new(
        Duration::from_secs(5),
        StreamSessionManager::new(SessionTimeouts::default()),
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    let request = CommandRequest::new(Verb::Apply)
        .with_params(VerbParams::Documents(vec![config_map("settings", "1")]));
    let result = dispatcher
        .execute(&request, &handle, SessionIo::new(LocalIo::sink(), cancel))
        .await;

    assert!(matches!(result, Err(KubeError::Cancelled(_))));
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn test_apply_from_files_through_dispatcher() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("01-config.yaml"),
        "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: settings\ndata:\n  mode: fast\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("02-broken.yaml"),
        "apiVersion: v1\nkind: Secret\nmetadata:\n  labels: {}\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("README.md"), "not a manifest").unwrap();

    let documents = manifest::read_path(dir.path()).unwrap();
    assert_eq!(documents.len(), 2);

    let client = Arc::new(FakeResourceClient::new());
    let handle = handle("prod", client.clone());
    let dispatcher = CommandDispatcher::new(
        Duration::from_secs(5),
        StreamSessionManager::new(SessionTimeouts::default()),
    );
    let request = CommandRequest::new(Verb::Apply).with_params(VerbParams::Documents(documents));
    let result = dispatcher
        .execute(&request, &handle, SessionIo::detached())
        .await
        .unwrap();

    match &result {
        DispatchResult::Applied(results) => {
            assert_eq!(results.len(), 2);
            assert!(!results[0].is_failed());
            assert!(results[1].is_failed());
        }
        other => panic!("unexpected result: {:?}", other),
    }
    // Any failed document fails the command.
    assert_eq!(result.exit_code(), 1);
    // Documents without a namespace land in the context default.
    assert!(client
        .document_version("production/ConfigMap/settings")
        .is_some());
}
