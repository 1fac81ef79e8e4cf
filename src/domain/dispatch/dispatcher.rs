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

use super::result::{ClusterSummary, DispatchResult, TargetOutcome, TargetReport};
use crate::domain::apply::{ApplyEngine, ManifestDocument};
use crate::domain::command::{CommandRequest, RequestValidator, Verb, VerbParams};
use crate::domain::resource::{ResourceKind, ResourceObject, Selector};
use crate::domain::session::{SessionIo, SessionSpec, StreamSessionManager};
use crate::infrastructure::kubernetes::{ResourceClient, ResourceHandle};
use crate::shared::error::{KubeError, Result};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Maps a validated request onto resource client calls.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    timeout: Duration,
    sessions: StreamSessionManager,
}

impl CommandDispatcher {
    /// `timeout` bounds every non-streaming call.
    pub fn new(timeout: Duration, sessions: StreamSessionManager) -> Self {
        Self { timeout, sessions }
    }

    pub fn sessions(&self) -> &StreamSessionManager {
        &self.sessions
    }

    /// Runs one command to completion. Streaming verbs return once their
    /// session has terminated. Bounded verbs only take the cancel token
    /// from `io`: once it fires no further call is issued.
    #[instrument(skip_all, fields(verb = %request.verb, context = %handle.context().name))]
    pub async fn execute(
        &self,
        request: &CommandRequest,
        handle: &ResourceHandle,
        io: SessionIo,
    ) -> Result<DispatchResult> {
        RequestValidator::validate(request)?;

        let namespace = request.effective_namespace(handle.context());
        let client = handle.client();
        let cancel = io.cancel.clone();
        debug!(namespace = %namespace, selector = %request.selector, "Dispatching");

        match (request.verb, &request.params) {
            (Verb::Get, _) => self.get(request, &namespace, client.as_ref(), &cancel).await,
            (Verb::Describe, _) => {
                self.describe(request, &namespace, client.as_ref(), &cancel)
                    .await
            }
            (Verb::Delete, VerbParams::Documents(documents)) => {
                let force = request.force;
                self.delete_documents(documents, &namespace, force, client.as_ref(), &cancel)
                    .await
            }
            (Verb::Delete, _) | (Verb::Restart, _) | (Verb::Scale, _) => {
                self.for_each_target(request, &namespace, client.as_ref(), &cancel)
                    .await
            }
            (Verb::Apply, VerbParams::Documents(documents)) => {
                let engine = ApplyEngine::new(self.timeout, namespace).with_cancel(cancel.clone());
                let results = engine.apply(documents, client.as_ref()).await;
                if cancel.is_cancelled() {
                    let applied = results.iter().filter(|r| !r.is_failed()).count();
                    return Err(stopped(Verb::Apply, applied, results.len()));
                }
                Ok(DispatchResult::Applied(results))
            }
            (Verb::ClusterInfo, _) => self.cluster_info(handle, &namespace, &cancel).await,
            (Verb::Logs | Verb::Exec | Verb::PortForward, params) => {
                let pod = request.selector.as_name().unwrap_or_default().to_string();
                let spec = match params.clone() {
                    VerbParams::Logs(options) => SessionSpec::Logs {
                        namespace,
                        pod,
                        options,
                    },
                    VerbParams::Exec(options) => SessionSpec::Exec {
                        namespace,
                        pod,
                        options,
                    },
                    VerbParams::PortForward(options) => SessionSpec::PortForward {
                        namespace,
                        pod,
                        options,
                    },
                    _ => return Err(missing_params(request.verb)),
                };
                let report = self.sessions.run(spec, client.clone(), io).await?;
                Ok(DispatchResult::Session(report))
            }
            (verb, _) => Err(missing_params(verb)),
        }
    }

    /// One API call under the request timeout, abandoned on cancel.
    async fn bounded<T>(
        &self,
        cancel: &CancellationToken,
        what: impl Display,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(KubeError::Cancelled(format!("{} abandoned", what))),
            result = tokio::time::timeout(self.timeout, call) => result.map_err(|_| {
                KubeError::Timeout(format!("{} did not complete within {:?}", what, self.timeout))
            })?,
        }
    }

    async fn get(
        &self,
        request: &CommandRequest,
        namespace: &str,
        client: &dyn ResourceClient,
        cancel: &CancellationToken,
    ) -> Result<DispatchResult> {
        let kind = kind_of(request)?;
        let items = match &request.selector {
            Selector::Name(name) => {
                let what = format!("get {}/{}", kind, name);
                let object = self
                    .bounded(cancel, what, client.get(kind, namespace, name))
                    .await?;
                vec![object]
            }
            selector => {
                self.bounded(
                    cancel,
                    format!("list {}", kind),
                    client.list(kind, namespace, selector.label_expr()),
                )
                .await?
            }
        };
        Ok(DispatchResult::Resources { kind, items })
    }

    async fn describe(
        &self,
        request: &CommandRequest,
        namespace: &str,
        client: &dyn ResourceClient,
        cancel: &CancellationToken,
    ) -> Result<DispatchResult> {
        match self.get(request, namespace, client, cancel).await? {
            DispatchResult::Resources { mut items, .. }
                if request.selector.as_name().is_some() && items.len() == 1 =>
            {
                Ok(DispatchResult::Described(items.remove(0)))
            }
            other => Ok(other),
        }
    }

    /// Delete, scale and restart. A name targets one resource and its error
    /// is returned as is; a selector fans out and aggregates until cancelled.
    async fn for_each_target(
        &self,
        request: &CommandRequest,
        namespace: &str,
        client: &dyn ResourceClient,
        cancel: &CancellationToken,
    ) -> Result<DispatchResult> {
        let kind = kind_of(request)?;

        if let Selector::Name(name) = &request.selector {
            self.apply_verb(request, kind, namespace, name, client, cancel)
                .await?;
            let mut report = TargetReport::new(request.verb);
            report.push(TargetOutcome::ok(format!("{}/{}", kind, name)));
            return Ok(DispatchResult::Targets(report));
        }

        let matched = self
            .bounded(
                cancel,
                format!("list {}", kind),
                client.list(kind, namespace, request.selector.label_expr()),
            )
            .await?;
        info!("{} matched {} {}(s)", request.selector, matched.len(), kind);

        let mut report = TargetReport::new(request.verb);
        for (done, object) in matched.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(stopped(request.verb, done, matched.len()));
            }
            let outcome = match self
                .apply_verb(request, kind, namespace, object.name(), client, cancel)
                .await
            {
                Ok(()) => TargetOutcome::ok(object.reference()),
                Err(KubeError::Cancelled(_)) => {
                    return Err(stopped(request.verb, done, matched.len()));
                }
                Err(e) => {
                    warn!("{} {} failed: {}", request.verb, object.reference(), e);
                    TargetOutcome::failed(object.reference(), &e)
                }
            };
            report.push(outcome);
        }

        report.into_result().map(DispatchResult::Targets)
    }

    async fn apply_verb(
        &self,
        request: &CommandRequest,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        client: &dyn ResourceClient,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let what = format!("{} {}/{}", request.verb, kind, name);
        match (request.verb, &request.params) {
            (Verb::Delete, _) => {
                self.bounded(cancel, what, client.delete(kind, namespace, name, request.force))
                    .await
            }
            (Verb::Restart, _) => {
                self.bounded(cancel, what, client.trigger_restart(kind, namespace, name))
                    .await
            }
            (Verb::Scale, VerbParams::Scale { replicas }) => {
                self.bounded(cancel, what, client.patch_scale(kind, namespace, name, *replicas))
                    .await
            }
            (verb, _) => Err(missing_params(verb)),
        }
    }

    async fn delete_documents(
        &self,
        documents: &[ManifestDocument],
        namespace: &str,
        force: bool,
        client: &dyn ResourceClient,
        cancel: &CancellationToken,
    ) -> Result<DispatchResult> {
        let mut report = TargetReport::new(Verb::Delete);
        for (done, document) in documents.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(stopped(Verb::Delete, done, documents.len()));
            }
            let outcome = match document.resolve(namespace) {
                Ok(resolved) => {
                    let target = format!("{}/{}", resolved.id.kind.to_lowercase(), resolved.id.name);
                    let what = format!("delete {}", resolved.id);
                    match self
                        .bounded(cancel, what, client.delete_document(&resolved.id, force))
                        .await
                    {
                        Ok(()) => TargetOutcome::ok(target),
                        Err(KubeError::Cancelled(_)) => {
                            return Err(stopped(Verb::Delete, done, documents.len()));
                        }
                        Err(e) => TargetOutcome::failed(target, &e),
                    }
                }
                Err(e) => TargetOutcome::failed(document.label(), &e),
            };
            report.push(outcome);
        }
        report.into_result().map(DispatchResult::Targets)
    }

    async fn cluster_info(
        &self,
        handle: &ResourceHandle,
        namespace: &str,
        cancel: &CancellationToken,
    ) -> Result<DispatchResult> {
        let client = handle.client().as_ref();
        let context = handle.context();

        let (server_version, nodes, namespaces, pods, deployments, services) = tokio::try_join!(
            self.bounded(cancel, "server version", client.server_version()),
            self.bounded(cancel, "list nodes", client.list(ResourceKind::Node, namespace, None)),
            self.bounded(
                cancel,
                "list namespaces",
                client.list(ResourceKind::Namespace, namespace, None)
            ),
            self.bounded(cancel, "list pods", client.list(ResourceKind::Pod, namespace, None)),
            self.bounded(
                cancel,
                "list deployments",
                client.list(ResourceKind::Deployment, namespace, None)
            ),
            self.bounded(
                cancel,
                "list services",
                client.list(ResourceKind::Service, namespace, None)
            ),
        )?;

        Ok(DispatchResult::ClusterInfo(ClusterSummary {
            context: context.name.clone(),
            server: context.server.clone(),
            server_version,
            namespace: namespace.to_string(),
            nodes: nodes.len(),
            ready_nodes: nodes.iter().filter(|n| is_node_ready(n)).count(),
            namespaces: namespaces.len(),
            pods: pods.len(),
            running_pods: pods.iter().filter(|p| is_pod_running(p)).count(),
            deployments: deployments.len(),
            services: services.len(),
        }))
    }
}

fn kind_of(request: &CommandRequest) -> Result<ResourceKind> {
    request.kind.ok_or_else(|| {
        KubeError::ValidationError(format!("'{}' requires a resource kind", request.verb))
    })
}

fn stopped(verb: Verb, done: usize, total: usize) -> KubeError {
    warn!("{} interrupted after {} of {} targets", verb, done, total);
    KubeError::Cancelled(format!("{} stopped after {} of {} targets", verb, done, total))
}

fn missing_params(verb: Verb) -> KubeError {
    KubeError::ValidationError(format!("Missing parameters for '{}'", verb))
}

fn is_node_ready(object: &ResourceObject) -> bool {
    match object {
        ResourceObject::Node(node) => node
            .status
            .as_ref()
            .and_then(|s| s.conditions.as_ref())
            .is_some_and(|conditions| {
                conditions
                    .iter()
                    .any(|c| c.type_ == "Ready" && c.status == "True")
            }),
        _ => false,
    }
}

fn is_pod_running(object: &ResourceObject) -> bool {
    match object {
        ResourceObject::Pod(pod) => {
            pod.status.as_ref().and_then(|s| s.phase.as_deref()) == Some("Running")
        }
        _ => false,
    }
}
