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

use super::streams;
use crate::domain::apply::{ApplyOperation, DocumentId, ResolvedDocument};
use crate::domain::command::{ExecOptions, LogOptions, Verb};
use crate::domain::resource::{ResourceKind, ResourceObject};
use crate::domain::session::{BoxedReader, ExecChannel, Tunnel};
use crate::infrastructure::constants::ANNOTATION_RESTARTED_AT;
use crate::shared::error::{KubeError, Result};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Node, Pod, Service};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{
    AttachParams, DeleteParams, DynamicObject, ListParams, LogParams, Patch, PatchParams,
    PostParams,
};
use kube::core::GroupVersionKind;
use kube::discovery::{pinned_kind, Scope};
use kube::{Api, Client, Resource};
use serde_json::json;

/// Operations a command needs from one cluster.
///
/// Names are exact; label selectors use Kubernetes syntax. For
/// cluster-scoped kinds the namespace argument is ignored.
#[async_trait::async_trait]
pub trait ResourceClient: Send + Sync {
    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<ResourceObject>>;

    async fn get(&self, kind: ResourceKind, namespace: &str, name: &str)
        -> Result<ResourceObject>;

    /// `force` deletes with a zero grace period.
    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str, force: bool)
        -> Result<()>;

    async fn patch_scale(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        replicas: i32,
    ) -> Result<()>;

    async fn trigger_restart(&self, kind: ResourceKind, namespace: &str, name: &str)
        -> Result<()>;

    async fn open_logs(&self, namespace: &str, pod: &str, options: &LogOptions)
        -> Result<BoxedReader>;

    async fn open_exec(&self, namespace: &str, pod: &str, options: &ExecOptions)
        -> Result<ExecChannel>;

    /// One tunnel per forwarded connection.
    async fn open_port_forward(&self, namespace: &str, pod: &str, port: u16) -> Result<Tunnel>;

    /// `resourceVersion` of the live object, `None` when it does not exist.
    async fn find_document(&self, id: &DocumentId) -> Result<Option<String>>;

    async fn create_document(&self, document: &ResolvedDocument) -> Result<()>;

    /// Merge-patches the live object; returns the resulting `resourceVersion`.
    async fn patch_document(&self, document: &ResolvedDocument) -> Result<String>;

    async fn delete_document(&self, id: &DocumentId, force: bool) -> Result<()>;

    async fn server_version(&self) -> Result<String>;

    /// Create when absent, merge-patch when present. A patch that leaves
    /// `resourceVersion` as it was changed nothing.
    async fn apply_document(&self, document: &ResolvedDocument) -> Result<ApplyOperation> {
        match self.find_document(&document.id).await? {
            None => {
                self.create_document(document).await?;
                Ok(ApplyOperation::Created)
            }
            Some(before) => {
                let after = self.patch_document(document).await?;
                if !before.is_empty() && before == after {
                    Ok(ApplyOperation::Unchanged)
                } else {
                    Ok(ApplyOperation::Updated)
                }
            }
        }
    }
}

/// Binds `$api` to a typed `Api` for `$kind` and evaluates `$body` with it.
macro_rules! with_api {
    ($client:expr, $kind:expr, $namespace:expr, |$api:ident| $body:expr) => {
        match $kind {
            ResourceKind::Pod => {
                let $api: Api<Pod> = Api::namespaced($client, $namespace);
                $body
            }
            ResourceKind::Deployment => {
                let $api: Api<Deployment> = Api::namespaced($client, $namespace);
                $body
            }
            ResourceKind::StatefulSet => {
                let $api: Api<StatefulSet> = Api::namespaced($client, $namespace);
                $body
            }
            ResourceKind::DaemonSet => {
                let $api: Api<DaemonSet> = Api::namespaced($client, $namespace);
                $body
            }
            ResourceKind::Service => {
                let $api: Api<Service> = Api::namespaced($client, $namespace);
                $body
            }
            ResourceKind::ConfigMap => {
                let $api: Api<ConfigMap> = Api::namespaced($client, $namespace);
                $body
            }
            ResourceKind::Node => {
                let $api: Api<Node> = Api::all($client);
                $body
            }
            ResourceKind::Namespace => {
                let $api: Api<Namespace> = Api::all($client);
                $body
            }
        }
    };
}

/// [`ResourceClient`] over a kube `Client` bound to one context.
pub struct KubeResourceClient {
    client: Client,
}

impl KubeResourceClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn namespaced<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn dynamic_api(&self, id: &DocumentId) -> Result<Api<DynamicObject>> {
        let (group, version) = id.group_version();
        let gvk = GroupVersionKind::gvk(group, version, &id.kind);
        let (resource, capabilities) =
            pinned_kind(&self.client, &gvk)
                .await
                .map_err(|e| KubeError::ApplyDocumentError {
                    document: id.to_string(),
                    reason: format!("unknown resource type {}: {}", id.api_version, e),
                })?;

        Ok(match capabilities.scope {
            Scope::Namespaced => {
                Api::namespaced_with(self.client.clone(), &id.namespace, &resource)
            }
            Scope::Cluster => Api::all_with(self.client.clone(), &resource),
        })
    }
}

#[async_trait::async_trait]
impl ResourceClient for KubeResourceClient {
    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<ResourceObject>> {
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }

        with_api!(self.client.clone(), kind, namespace, |api| {
            let list = api
                .list(&params)
                .await
                .map_err(|e| api_error(e, kind.api_kind(), "", namespace))?;
            Ok(list.items.into_iter().map(ResourceObject::from).collect())
        })
    }

    async fn get(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<ResourceObject> {
        with_api!(self.client.clone(), kind, namespace, |api| {
            api.get_opt(name)
                .await
                .map_err(|e| api_error(e, kind.api_kind(), name, namespace))?
                .map(ResourceObject::from)
                .ok_or_else(|| KubeError::not_found(kind.api_kind(), name, namespace))
        })
    }

    async fn delete(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        force: bool,
    ) -> Result<()> {
        let dp = delete_params(force);
        with_api!(self.client.clone(), kind, namespace, |api| {
            api.delete(name, &dp)
                .await
                .map_err(|e| api_error(e, kind.api_kind(), name, namespace))?;
            Ok(())
        })
    }

    async fn patch_scale(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        replicas: i32,
    ) -> Result<()> {
        let pp = PatchParams::default();
        let patch = Patch::Merge(json!({ "spec": { "replicas": replicas } }));

        let scaled = match kind {
            ResourceKind::Deployment => {
                self.namespaced::<Deployment>(namespace)
                    .patch_scale(name, &pp, &patch)
                    .await
            }
            ResourceKind::StatefulSet => {
                self.namespaced::<StatefulSet>(namespace)
                    .patch_scale(name, &pp, &patch)
                    .await
            }
            other => return Err(KubeError::invalid_verb(Verb::Scale, other)),
        };

        scaled.map_err(|e| api_error(e, kind.api_kind(), name, namespace))?;
        Ok(())
    }

    async fn trigger_restart(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<()> {
        let pp = PatchParams::default();
        let restarted_at = chrono::Utc::now().to_rfc3339();
        let patch = Patch::Merge(json!({
            "spec": {
                "template": {
                    "metadata": {
                        "annotations": { ANNOTATION_RESTARTED_AT: restarted_at }
                    }
                }
            }
        }));

        let patched = match kind {
            ResourceKind::Deployment => self
                .namespaced::<Deployment>(namespace)
                .patch(name, &pp, &patch)
                .await
                .map(|_| ()),
            ResourceKind::StatefulSet => self
                .namespaced::<StatefulSet>(namespace)
                .patch(name, &pp, &patch)
                .await
                .map(|_| ()),
            ResourceKind::DaemonSet => self
                .namespaced::<DaemonSet>(namespace)
                .patch(name, &pp, &patch)
                .await
                .map(|_| ()),
            other => return Err(KubeError::invalid_verb(Verb::Restart, other)),
        };

        patched.map_err(|e| api_error(e, kind.api_kind(), name, namespace))
    }

    async fn open_logs(
        &self,
        namespace: &str,
        pod: &str,
        options: &LogOptions,
    ) -> Result<BoxedReader> {
        let params = LogParams {
            container: options.container.clone(),
            follow: options.follow,
            previous: options.previous,
            tail_lines: options.tail_lines,
            ..LogParams::default()
        };
        streams::log_reader(self.namespaced::<Pod>(namespace), namespace, pod, params).await
    }

    async fn open_exec(
        &self,
        namespace: &str,
        pod: &str,
        options: &ExecOptions,
    ) -> Result<ExecChannel> {
        let mut params = AttachParams::default()
            .stdin(options.stdin)
            .stdout(true)
            .stderr(!options.tty)
            .tty(options.tty);
        if let Some(container) = &options.container {
            params = params.container(container.clone());
        }

        let process = self
            .namespaced::<Pod>(namespace)
            .exec(pod, options.command.clone(), &params)
            .await
            .map_err(|e| api_error(e, "Pod", pod, namespace))?;
        Ok(streams::exec_channel(process))
    }

    async fn open_port_forward(&self, namespace: &str, pod: &str, port: u16) -> Result<Tunnel> {
        let forwarder = self
            .namespaced::<Pod>(namespace)
            .portforward(pod, &[port])
            .await
            .map_err(|e| api_error(e, "Pod", pod, namespace))?;
        streams::tunnel(forwarder, port)
    }

    async fn find_document(&self, id: &DocumentId) -> Result<Option<String>> {
        let api = self.dynamic_api(id).await?;
        let existing = api
            .get_opt(&id.name)
            .await
            .map_err(|e| api_error(e, &id.kind, &id.name, &id.namespace))?;
        Ok(existing.map(|obj| obj.metadata.resource_version.unwrap_or_default()))
    }

    async fn create_document(&self, document: &ResolvedDocument) -> Result<()> {
        let id = &document.id;
        let api = self.dynamic_api(id).await?;
        let object: DynamicObject = serde_json::from_value(document.body.clone())?;
        api.create(&PostParams::default(), &object)
            .await
            .map_err(|e| api_error(e, &id.kind, &id.name, &id.namespace))?;
        Ok(())
    }

    async fn patch_document(&self, document: &ResolvedDocument) -> Result<String> {
        let id = &document.id;
        let api = self.dynamic_api(id).await?;
        let patched = api
            .patch(&id.name, &PatchParams::default(), &Patch::Merge(&document.body))
            .await
            .map_err(|e| api_error(e, &id.kind, &id.name, &id.namespace))?;
        Ok(patched.metadata.resource_version.unwrap_or_default())
    }

    async fn delete_document(&self, id: &DocumentId, force: bool) -> Result<()> {
        let api = self.dynamic_api(id).await?;
        api.delete(&id.name, &delete_params(force))
            .await
            .map_err(|e| api_error(e, &id.kind, &id.name, &id.namespace))?;
        Ok(())
    }

    async fn server_version(&self) -> Result<String> {
        let info = self.client.apiserver_version().await?;
        Ok(info.git_version)
    }
}

/// Maps API status codes onto the error taxonomy.
pub(crate) fn api_error(err: kube::Error, kind: &str, name: &str, namespace: &str) -> KubeError {
    match err {
        kube::Error::Api(ae) if ae.code == 404 => KubeError::not_found(kind, name, namespace),
        kube::Error::Api(ae) if ae.code == 409 => {
            KubeError::already_exists(kind, name, namespace)
        }
        kube::Error::Api(ae) => KubeError::KubeError(ae.message),
        other => other.into(),
    }
}

fn delete_params(force: bool) -> DeleteParams {
    if force {
        DeleteParams {
            grace_period_seconds: Some(0),
            ..DeleteParams::default()
        }
    } else {
        DeleteParams::default()
    }
}
