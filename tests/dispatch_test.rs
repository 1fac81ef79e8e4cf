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

use common::{deployment, handle, pod, registry, Call, FakeFactory, FakeResourceClient};
use k8s_cli::domain::apply::ManifestDocument;
use k8s_cli::domain::command::{ExecOptions, LogOptions, PortForwardOptions};
use k8s_cli::domain::dispatch::{CommandDispatcher, DispatchResult};
use k8s_cli::domain::session::{LocalIo, SessionIo, SessionTimeouts, StreamSessionManager};
use k8s_cli::infrastructure::kubernetes::ResourceClientFactory;
use k8s_cli::{CommandRequest, KubeError, ResourceKind, Selector, Verb, VerbParams};
use k8s_openapi::api::core::v1::{Node, NodeCondition, NodeStatus, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn dispatcher() -> CommandDispatcher {
    CommandDispatcher::new(
        Duration::from_secs(5),
        StreamSessionManager::new(SessionTimeouts::default()),
    )
}

fn params_for(verb: Verb) -> VerbParams {
    match verb {
        Verb::Scale => VerbParams::Scale { replicas: 2 },
        Verb::Logs => VerbParams::Logs(LogOptions::default()),
        Verb::Exec => VerbParams::Exec(ExecOptions {
            container: None,
            command: vec!["true".to_string()],
            tty: false,
            stdin: false,
        }),
        Verb::PortForward => VerbParams::PortForward(PortForwardOptions {
            address: "127.0.0.1".parse().unwrap(),
            mappings: vec![":80".parse().unwrap()],
        }),
        _ => VerbParams::None,
    }
}

#[tokio::test]
async fn test_incompatible_pairs_rejected_before_any_call() {
    let client = Arc::new(FakeResourceClient::new());
    let handle = handle("dev", client.clone());
    let dispatcher = dispatcher();

    for verb in Verb::ALL.into_iter().filter(|v| v.requires_kind()) {
        for kind in ResourceKind::ALL.into_iter().filter(|k| !k.supports(verb)) {
            let request = CommandRequest::new(verb)
                .with_kind(kind)
                .with_selector(Selector::name("target"))
                .with_params(params_for(verb));
            let result = dispatcher
                .execute(&request, &handle, SessionIo::detached())
                .await;
            assert!(
                matches!(result, Err(KubeError::InvalidVerbForResource { .. })),
                "{} {} was not rejected",
                verb,
                kind
            );
        }
    }

    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn test_compatible_bounded_pairs_never_rejected() {
    let client = Arc::new(FakeResourceClient::new());
    let handle = handle("dev", client.clone());
    let dispatcher = dispatcher();

    for verb in [Verb::Get, Verb::Describe, Verb::Delete, Verb::Scale, Verb::Restart] {
        for kind in ResourceKind::ALL.into_iter().filter(|k| k.supports(verb)) {
            let request = CommandRequest::new(verb)
                .with_kind(kind)
                .with_selector(Selector::All)
                .with_params(params_for(verb));
            let result = dispatcher
                .execute(&request, &handle, SessionIo::detached())
                .await;
            assert!(result.is_ok(), "{} {} failed: {:?}", verb, kind, result);
        }
    }
}

#[tokio::test]
async fn test_get_pods_in_empty_namespace() {
    let client = Arc::new(FakeResourceClient::new());
    let handle = handle("dev", client.clone());

    let request = CommandRequest::new(Verb::Get)
        .with_kind(ResourceKind::Pod)
        .with_namespace(Some("default".to_string()));
    let result = dispatcher()
        .execute(&request, &handle, SessionIo::detached())
        .await
        .unwrap();

    match &result {
        DispatchResult::Resources { kind, items } => {
            assert_eq!(*kind, ResourceKind::Pod);
            assert!(items.is_empty());
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(result.exit_code(), 0);
}

#[tokio::test]
async fn test_get_by_label_selector() {
    let client = Arc::new(FakeResourceClient::with_objects(vec![
        pod("web-0", "default", "Running", "web").into(),
        pod("db-0", "default", "Running", "db").into(),
        pod("web-1", "staging", "Running", "web").into(),
    ]));
    let handle = handle("dev", client.clone());

    let request = CommandRequest::new(Verb::Get)
        .with_kind(ResourceKind::Pod)
        .with_selector(Selector::labels("app=web"));
    let result = dispatcher()
        .execute(&request, &handle, SessionIo::detached())
        .await
        .unwrap();

    match result {
        DispatchResult::Resources { items, .. } => {
            let names: Vec<_> = items.iter().map(|o| o.name().to_string()).collect();
            assert_eq!(names, vec!["web-0"]);
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(
        client.calls(),
        vec![Call::List {
            kind: ResourceKind::Pod,
            namespace: "default".to_string(),
            selector: Some("app=web".to_string()),
        }]
    );
}

#[tokio::test]
async fn test_describe_by_name_and_missing() {
    let client = Arc::new(FakeResourceClient::with_objects(vec![pod(
        "web-0", "default", "Running", "web",
    )
    .into()]));
    let handle = handle("dev", client.clone());
    let dispatcher = dispatcher();

    let request = CommandRequest::new(Verb::Describe)
        .with_kind(ResourceKind::Pod)
        .with_selector(Selector::name("web-0"));
    let result = dispatcher
        .execute(&request, &handle, SessionIo::detached())
        .await
        .unwrap();
    assert!(matches!(result, DispatchResult::Described(ref o) if o.name() == "web-0"));

    let request = request.with_selector(Selector::name("web-9"));
    let result = dispatcher
        .execute(&request, &handle, SessionIo::detached())
        .await;
    assert!(matches!(result, Err(KubeError::NotFound { .. })));
}

async fn delete_with_failures(total: usize, failing: usize) -> Result<DispatchResult, KubeError> {
    let client = Arc::new(FakeResourceClient::new());
    for i in 0..total {
        client.add(pod(&format!("web-{}", i), "default", "Running", "web"));
        if i < failing {
            client.fail("delete", &format!("web-{}", i), "forbidden");
        }
    }
    let handle = handle("dev", client.clone());

    let request = CommandRequest::new(Verb::Delete)
        .with_kind(ResourceKind::Pod)
        .with_selector(Selector::labels("app=web"));
    let result = dispatcher()
        .execute(&request, &handle, SessionIo::detached())
        .await;

    let deletes = client
        .mutations()
        .into_iter()
        .filter(|c| matches!(c, Call::Delete { .. }))
        .count();
    assert_eq!(deletes, total, "every matched target is attempted");
    result
}

#[tokio::test]
async fn test_selector_delete_partial_failure() {
    let result = delete_with_failures(4, 2).await.unwrap();
    match &result {
        DispatchResult::Targets(report) => {
            assert_eq!(report.total(), 4);
            assert_eq!(report.succeeded(), 2);
            assert_eq!(report.failures().len(), 2);
            assert!(report.failures()[0].reason.contains("forbidden"));
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(result.exit_code(), 0);
}

#[tokio::test]
async fn test_selector_delete_all_failed() {
    match delete_with_failures(3, 3).await {
        Err(KubeError::PartialFailure {
            verb,
            total,
            failures,
        }) => {
            assert_eq!(verb, "delete");
            assert_eq!(total, 3);
            let targets: Vec<_> = failures.iter().map(|f| f.target.as_str()).collect();
            assert_eq!(targets, vec!["pod/web-0", "pod/web-1", "pod/web-2"]);
        }
        other => panic!("expected aggregate failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_selector_delete_without_matches_succeeds() {
    let result = delete_with_failures(0, 0).await.unwrap();
    assert!(matches!(result, DispatchResult::Targets(ref r) if r.total() == 0));
}

#[tokio::test]
async fn test_scale_issues_exactly_one_patch() {
    let client = Arc::new(FakeResourceClient::with_objects(vec![deployment(
        "my-app",
        "production",
        1,
    )
    .into()]));
    let handle = handle("dev", client.clone());

    let request = CommandRequest::new(Verb::Scale)
        .with_kind(ResourceKind::Deployment)
        .with_selector(Selector::name("my-app"))
        .with_namespace(Some("production".to_string()))
        .with_params(VerbParams::Scale { replicas: 3 });
    let result = dispatcher()
        .execute(&request, &handle, SessionIo::detached())
        .await
        .unwrap();

    assert!(matches!(result, DispatchResult::Targets(ref r) if r.succeeded() == 1));
    assert_eq!(
        client.calls(),
        vec![Call::Scale {
            kind: ResourceKind::Deployment,
            namespace: "production".to_string(),
            name: "my-app".to_string(),
            replicas: 3,
        }]
    );
}

#[tokio::test]
async fn test_scale_rejected_by_server_fails() {
    let client = Arc::new(FakeResourceClient::with_objects(vec![deployment(
        "my-app",
        "production",
        1,
    )
    .into()]));
    client.fail("scale", "my-app", "admission webhook denied the request");
    let handle = handle("prod", client.clone());

    let request = CommandRequest::new(Verb::Scale)
        .with_kind(ResourceKind::Deployment)
        .with_selector(Selector::name("my-app"))
        .with_params(VerbParams::Scale { replicas: 3 });
    let result = dispatcher()
        .execute(&request, &handle, SessionIo::detached())
        .await;

    match result {
        Err(KubeError::KubeError(message)) => assert!(message.contains("admission webhook")),
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(client.mutations().len(), 1);
}

#[tokio::test]
async fn test_restart_by_selector() {
    let client = Arc::new(FakeResourceClient::new());
    client.add(deployment("api", "default", 2));
    client.add(deployment("worker", "default", 2));
    let handle = handle("dev", client.clone());

    let request = CommandRequest::new(Verb::Restart)
        .with_kind(ResourceKind::Deployment)
        .with_selector(Selector::All);
    let result = dispatcher()
        .execute(&request, &handle, SessionIo::detached())
        .await
        .unwrap();

    assert!(matches!(result, DispatchResult::Targets(ref r) if r.succeeded() == 2));
    let restarted: Vec<_> = client
        .mutations()
        .into_iter()
        .filter_map(|c| match c {
            Call::Restart { name, .. } => Some(name),
            _ => None,
        })
        .collect();
    assert_eq!(restarted, vec!["api", "worker"]);
}

#[tokio::test]
async fn test_request_timeout() {
    let client = Arc::new(FakeResourceClient::new());
    client.set_delay(Duration::from_secs(5));
    let handle = handle("dev", client.clone());

    let dispatcher = CommandDispatcher::new(
        Duration::from_millis(50),
        StreamSessionManager::new(SessionTimeouts::default()),
    );
    let request = CommandRequest::new(Verb::Get).with_kind(ResourceKind::Pod);
    let result = dispatcher
        .execute(&request, &handle, SessionIo::detached())
        .await;
    assert!(matches!(result, Err(KubeError::Timeout(_))));
}

#[tokio::test]
async fn test_context_switch_builds_fresh_handle() {
    let dev = Arc::new(FakeResourceClient::new());
    let prod = Arc::new(FakeResourceClient::new());
    let factory = FakeFactory::default()
        .with("dev", dev.clone())
        .with("prod", prod.clone());
    let registry = registry();

    let current = registry.resolve(None).unwrap();
    let switched = registry.resolve(Some("prod")).unwrap();
    assert_eq!(current.name, "dev");
    assert_eq!(switched.name, "prod");
    assert_ne!(current.server, switched.server);

    let dev_handle = factory.create(&current).await.unwrap();
    let prod_handle = factory.create(&switched).await.unwrap();
    assert_eq!(factory.created(), vec!["dev", "prod"]);

    let request = CommandRequest::new(Verb::Get).with_kind(ResourceKind::Pod);
    let dispatcher = dispatcher();
    dispatcher
        .execute(&request, &dev_handle, SessionIo::detached())
        .await
        .unwrap();
    dispatcher
        .execute(&request, &prod_handle, SessionIo::detached())
        .await
        .unwrap();

    // Each handle talks to its own cluster, in its own default namespace.
    assert!(matches!(
        dev.calls().as_slice(),
        [Call::List { namespace, .. }] if namespace == "default"
    ));
    assert!(matches!(
        prod.calls().as_slice(),
        [Call::List { namespace, .. }] if namespace == "production"
    ));
}

#[tokio::test]
async fn test_unknown_context_and_unreachable_cluster() {
    let registry = registry();
    assert!(matches!(
        registry.resolve(Some("staging")),
        Err(KubeError::UnknownContext(name)) if name == "staging"
    ));

    let factory = FakeFactory::default();
    let context = registry.resolve(Some("prod")).unwrap();
    assert!(matches!(
        factory.create(&context).await,
        Err(KubeError::ConnectionError { .. })
    ));
}

#[tokio::test]
async fn test_cluster_info_summary() {
    let ready_node = Node {
        metadata: ObjectMeta {
            name: Some("node-1".to_string()),
            ..Default::default()
        },
        status: Some(NodeStatus {
            conditions: Some(vec![NodeCondition {
                type_: "Ready".to_string(),
                status: "True".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    };
    let service = Service {
        metadata: ObjectMeta {
            name: Some("web".to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    let client = Arc::new(FakeResourceClient::with_objects(vec![
        ready_node.into(),
        pod("web-0", "default", "Running", "web").into(),
        pod("web-1", "default", "Pending", "web").into(),
        deployment("web", "default", 2).into(),
        service.into(),
    ]));
    let handle = handle("dev", client.clone());

    let request = CommandRequest::new(Verb::ClusterInfo);
    let result = dispatcher()
        .execute(&request, &handle, SessionIo::detached())
        .await
        .unwrap();

    match result {
        DispatchResult::ClusterInfo(summary) => {
            assert_eq!(summary.context, "dev");
            assert_eq!(summary.server, "https://dev.example.com:6443");
            assert_eq!(summary.server_version, "v1.30.2");
            assert_eq!((summary.nodes, summary.ready_nodes), (1, 1));
            assert_eq!((summary.pods, summary.running_pods), (2, 1));
            assert_eq!(summary.deployments, 1);
            assert_eq!(summary.services, 1);
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_delete_from_documents() {
    let client = Arc::new(FakeResourceClient::new());
    let handle = handle("dev", client.clone());
    let documents = vec![
        ManifestDocument::new(
            "app.yaml#0",
            json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "settings"}}),
        ),
        ManifestDocument::new(
            "app.yaml#1",
            json!({"apiVersion": "apps/v1", "kind": "Deployment", "metadata": {"name": "web"}}),
        ),
    ];

    // Nothing exists yet: every delete fails, so the command fails.
    let request =
        CommandRequest::new(Verb::Delete).with_params(VerbParams::Documents(documents.clone()));
    let result = dispatcher()
        .execute(&request, &handle, SessionIo::detached())
        .await;
    assert!(matches!(result, Err(KubeError::PartialFailure { total: 2, .. })));

    let engine = k8s_cli::ApplyEngine::new(Duration::from_secs(5), "default");
    engine.apply(&documents[..1], client.as_ref()).await;

    let result = dispatcher()
        .execute(&request, &handle, SessionIo::detached())
        .await
        .unwrap();
    match result {
        DispatchResult::Targets(report) => {
            assert_eq!(report.succeeded(), 1);
            assert_eq!(report.outcomes[0].target, "configmap/settings");
            assert!(report.outcomes[1].error.is_some());
        }
        other => panic!("unexpected result: {:?}", other),
    }

    engine.apply(&documents[..1], client.as_ref()).await;
    let forced = request.with_force(true);
    let _ = dispatcher()
        .execute(&forced, &handle, SessionIo::detached())
        .await;
    assert!(matches!(
        client.mutations().last(),
        Some(Call::DeleteDocument { force: true, .. })
    ));
}

#[tokio::test]
async fn test_force_delete_reaches_the_client() {
    let client = Arc::new(FakeResourceClient::new());
    client.add(pod("web-0", "default", "Running", "web"));
    let handle = handle("dev", client.clone());

    let request = CommandRequest::new(Verb::Delete)
        .with_kind(ResourceKind::Pod)
        .with_selector(Selector::name("web-0"))
        .with_force(true);
    dispatcher()
        .execute(&request, &handle, SessionIo::detached())
        .await
        .unwrap();

    assert_eq!(
        client.mutations(),
        vec![Call::Delete {
            kind: ResourceKind::Pod,
            namespace: "default".to_string(),
            name: "web-0".to_string(),
            force: true,
        }]
    );
}

#[tokio::test]
async fn test_interrupted_selector_delete_stops_issuing_calls() {
    let client = Arc::new(FakeResourceClient::new());
    for i in 0..4 {
        client.add(pod(&format!("web-{}", i), "default", "Running", "web"));
    }
    client.set_delay(Duration::from_millis(300));
    let handle = handle("dev", client.clone());

    let cancel = CancellationToken::new();
    let io = SessionIo::new(LocalIo::sink(), cancel.clone());
    let request = CommandRequest::new(Verb::Delete)
        .with_kind(ResourceKind::Pod)
        .with_selector(Selector::labels("app=web"));
    let task = tokio::spawn(async move { dispatcher().execute(&request, &handle, io).await });

    // Interrupt while the first delete is in flight.
    tokio::time::timeout(Duration::from_secs(5), async {
        while client.mutations().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    cancel.cancel();

    let result = task.await.unwrap();
    match result {
        Err(KubeError::Cancelled(message)) => assert!(message.contains("0 of 4")),
        other => panic!("unexpected result: {:?}", other),
    }

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(client.mutations().len(), 1);
}

#[tokio::test]
async fn test_interrupted_before_start_issues_no_call() {
    let client = Arc::new(FakeResourceClient::new());
    client.add(deployment("api", "default", 2));
    let handle = handle("dev", client.clone());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let request = CommandRequest::new(Verb::Restart)
        .with_kind(ResourceKind::Deployment)
        .with_selector(Selector::All);
    let result = dispatcher()
        .execute(&request, &handle, SessionIo::new(LocalIo::sink(), cancel))
        .await;

    assert!(matches!(result, Err(KubeError::Cancelled(_))));
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn test_interrupted_document_delete() {
    let client = Arc::new(FakeResourceClient::new());
    let handle = handle("dev", client.clone());
    let documents = vec![ManifestDocument::new(
        "app.yaml#0",
        json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "settings"}}),
    )];

    let cancel = CancellationToken::new();
    cancel.cancel();
    let request = CommandRequest::new(Verb::Delete)
        .with_params(VerbParams::Documents(documents))
        .with_force(true);
    let result = dispatcher()
        .execute(&request, &handle, SessionIo::new(LocalIo::sink(), cancel))
        .await;

    assert!(matches!(result, Err(KubeError::Cancelled(_))));
    assert!(client.mutations().is_empty());
}
