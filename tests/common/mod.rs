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

//! In-memory cluster used by the integration tests.

#![allow(dead_code)]

use futures::FutureExt;
use k8s_cli::domain::apply::{DocumentId, ResolvedDocument};
use k8s_cli::domain::command::{ExecOptions, LogOptions};
use k8s_cli::domain::context::{ClusterContext, ContextRegistry};
use k8s_cli::domain::session::{BoxedReader, BoxedWriter, ExecChannel, RemoteGuard, Tunnel};
use k8s_cli::infrastructure::kubernetes::{
    ResourceClient, ResourceClientFactory, ResourceHandle,
};
use k8s_cli::{KubeError, ResourceKind, ResourceObject, Result};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Pod, PodStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, ReadBuf};

/// Every call the fake receives, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List {
        kind: ResourceKind,
        namespace: String,
        selector: Option<String>,
    },
    Get {
        kind: ResourceKind,
        namespace: String,
        name: String,
    },
    Delete {
        kind: ResourceKind,
        namespace: String,
        name: String,
        force: bool,
    },
    Scale {
        kind: ResourceKind,
        namespace: String,
        name: String,
        replicas: i32,
    },
    Restart {
        kind: ResourceKind,
        namespace: String,
        name: String,
    },
    OpenLogs {
        pod: String,
    },
    OpenExec {
        pod: String,
        command: Vec<String>,
    },
    OpenPortForward {
        pod: String,
        port: u16,
    },
    FindDocument(String),
    CreateDocument(String),
    PatchDocument(String),
    DeleteDocument { id: String, force: bool },
    ServerVersion,
}

impl Call {
    fn is_mutation(&self) -> bool {
        matches!(
            self,
            Call::Delete { .. }
                | Call::Scale { .. }
                | Call::Restart { .. }
                | Call::CreateDocument(_)
                | Call::PatchDocument(_)
                | Call::DeleteDocument { .. }
        )
    }
}

/// What an exec channel does once opened.
#[derive(Debug, Clone, Default)]
pub struct ExecScript {
    /// Written to stdout before exiting
    pub stdout: Vec<u8>,
    /// Read stdin to EOF and echo it to stdout first
    pub echo_stdin: bool,
    /// Never exit; the session must be cancelled
    pub hold: bool,
    /// Reset the stdout stream after `stdout` has been read
    pub reset_stdout: bool,
    pub exit_code: i32,
}

/// A remote stream that always fails with a connection reset.
struct ResetStream;

impl AsyncRead for ResetStream {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Poll::Ready(Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset by peer",
        )))
    }
}

#[derive(Default)]
pub struct FakeResourceClient {
    objects: Mutex<Vec<ResourceObject>>,
    calls: Mutex<Vec<Call>>,
    /// `"verb:name"` -> error message
    failures: Mutex<HashMap<String, String>>,
    /// Document key -> (resourceVersion, body)
    documents: Mutex<HashMap<String, (u64, serde_json::Value)>>,
    log_chunks: Mutex<Vec<Vec<u8>>>,
    /// Keep the log stream open after the chunks
    follow_logs: Mutex<bool>,
    exec: Mutex<ExecScript>,
    /// Applied before every call
    delay: Mutex<Option<Duration>>,
    /// Writers of open log streams, aborted on drop
    tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
    released: Arc<AtomicUsize>,
    version: String,
}

impl FakeResourceClient {
    pub fn new() -> Self {
        let mut client = Self::default();
        client.version = "v1.30.2".to_string();
        client
    }

    pub fn with_objects(objects: Vec<ResourceObject>) -> Self {
        let client = Self::new();
        *client.objects.lock().unwrap() = objects;
        client
    }

    pub fn add(&self, object: impl Into<ResourceObject>) {
        self.objects.lock().unwrap().push(object.into());
    }

    /// Make `verb` on `name` fail, e.g. `fail("delete", "web-1", "forbidden")`.
    pub fn fail(&self, verb: &str, name: &str, reason: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(format!("{}:{}", verb, name), reason.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn set_log_chunks(&self, chunks: Vec<Vec<u8>>, follow: bool) {
        *self.log_chunks.lock().unwrap() = chunks;
        *self.follow_logs.lock().unwrap() = follow;
    }

    pub fn set_exec(&self, script: ExecScript) {
        *self.exec.lock().unwrap() = script;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    /// Remote channels whose guard has run.
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn document_version(&self, key: &str) -> Option<u64> {
        self.documents.lock().unwrap().get(key).map(|(v, _)| *v)
    }

    async fn enter(&self, call: Call, verb: &str, name: &str) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.failures.lock().unwrap().get(&format!("{}:{}", verb, name)) {
            Some(reason) => Err(KubeError::KubeError(reason.clone())),
            None => Ok(()),
        }
    }

    fn find(&self, kind: ResourceKind, namespace: &str, name: &str) -> Option<ResourceObject> {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .find(|o| {
                o.kind() == kind
                    && o.name() == name
                    && (!kind.is_namespaced() || o.namespace() == Some(namespace))
            })
            .cloned()
    }

    fn require(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<ResourceObject> {
        self.find(kind, namespace, name)
            .ok_or_else(|| KubeError::not_found(kind.api_kind(), name, namespace))
    }

    fn guard(&self, task: tokio::task::JoinHandle<()>) -> RemoteGuard {
        let released = self.released.clone();
        RemoteGuard::new(move || {
            task.abort();
            released.fetch_add(1, Ordering::SeqCst);
        })
    }
}

impl Drop for FakeResourceClient {
    fn drop(&mut self) {
        if let Ok(tasks) = self.tasks.get_mut() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }
}

fn document_key(id: &DocumentId) -> String {
    format!("{}/{}/{}", id.namespace, id.kind, id.name)
}

fn matches_labels(object: &ResourceObject, selector: Option<&str>) -> bool {
    let Some(selector) = selector else {
        return true;
    };
    let labels = object.metadata().labels.clone().unwrap_or_default();
    selector.split(',').all(|term| match term.split_once('=') {
        Some((key, value)) => labels.get(key.trim()).map(String::as_str) == Some(value.trim()),
        None => labels.contains_key(term.trim()),
    })
}

#[async_trait::async_trait]
impl ResourceClient for FakeResourceClient {
    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<ResourceObject>> {
        let call = Call::List {
            kind,
            namespace: namespace.to_string(),
            selector: label_selector.map(str::to_string),
        };
        self.enter(call, "list", kind.as_str()).await?;
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.kind() == kind)
            .filter(|o| !kind.is_namespaced() || o.namespace() == Some(namespace))
            .filter(|o| matches_labels(o, label_selector))
            .cloned()
            .collect())
    }

    async fn get(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<ResourceObject> {
        let call = Call::Get {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        };
        self.enter(call, "get", name).await?;
        self.require(kind, namespace, name)
    }

    async fn delete(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        force: bool,
    ) -> Result<()> {
        let call = Call::Delete {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
            force,
        };
        self.enter(call, "delete", name).await?;
        self.require(kind, namespace, name)?;
        self.objects
            .lock()
            .unwrap()
            .retain(|o| !(o.kind() == kind && o.name() == name));
        Ok(())
    }

    async fn patch_scale(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        replicas: i32,
    ) -> Result<()> {
        let call = Call::Scale {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
            replicas,
        };
        self.enter(call, "scale", name).await?;
        self.require(kind, namespace, name).map(|_| ())
    }

    async fn trigger_restart(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<()> {
        let call = Call::Restart {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        };
        self.enter(call, "restart", name).await?;
        self.require(kind, namespace, name).map(|_| ())
    }

    async fn open_logs(
        &self,
        namespace: &str,
        pod: &str,
        _options: &LogOptions,
    ) -> Result<BoxedReader> {
        let call = Call::OpenLogs {
            pod: pod.to_string(),
        };
        self.enter(call, "logs", pod).await?;
        self.require(ResourceKind::Pod, namespace, pod)?;

        let (mut remote, local) = tokio::io::duplex(1024);
        let chunks = self.log_chunks.lock().unwrap().clone();
        let follow = *self.follow_logs.lock().unwrap();
        let task = tokio::spawn(async move {
            for chunk in chunks {
                if remote.write_all(&chunk).await.is_err() {
                    return;
                }
            }
            if follow {
                std::future::pending::<()>().await;
            }
        });
        self.tasks.lock().unwrap().push(task);
        Ok(Box::pin(local))
    }

    async fn open_exec(&self, namespace: &str, pod: &str, options: &ExecOptions) -> Result<ExecChannel> {
        let call = Call::OpenExec {
            pod: pod.to_string(),
            command: options.command.clone(),
        };
        self.enter(call, "exec", pod).await?;
        self.require(ResourceKind::Pod, namespace, pod)?;

        let script = self.exec.lock().unwrap().clone();
        let reset_stdout = script.reset_stdout;
        let partial = script.stdout.clone();
        let (stdin_local, mut stdin_remote) = tokio::io::duplex(64 * 1024);
        let (mut stdout_remote, stdout_local) = tokio::io::duplex(64 * 1024);
        let (exit_tx, exit_rx) = tokio::sync::oneshot::channel();

        let task = tokio::spawn(async move {
            if script.echo_stdin {
                let mut input = Vec::new();
                if stdin_remote.read_to_end(&mut input).await.is_ok() {
                    let _ = stdout_remote.write_all(&input).await;
                }
            }
            let _ = stdout_remote.write_all(&script.stdout).await;
            drop(stdout_remote);
            if script.hold {
                std::future::pending::<()>().await;
            }
            let _ = exit_tx.send(script.exit_code);
        });

        Ok(ExecChannel {
            stdin: options
                .stdin
                .then(|| Box::pin(stdin_local) as BoxedWriter),
            stdout: Some(if reset_stdout {
                Box::pin(std::io::Cursor::new(partial).chain(ResetStream)) as BoxedReader
            } else {
                Box::pin(stdout_local)
            }),
            stderr: None,
            exit: exit_rx
                .map(|code| {
                    code.map_err(|_| {
                        KubeError::StreamClosedAbnormally("exec channel dropped".to_string())
                    })
                })
                .boxed(),
            guard: self.guard(task),
        })
    }

    async fn open_port_forward(&self, namespace: &str, pod: &str, port: u16) -> Result<Tunnel> {
        let call = Call::OpenPortForward {
            pod: pod.to_string(),
            port,
        };
        self.enter(call, "port-forward", pod).await?;
        self.require(ResourceKind::Pod, namespace, pod)?;

        // The pod side echoes everything back.
        let (local, remote) = tokio::io::duplex(64 * 1024);
        let task = tokio::spawn(async move {
            let (mut reader, mut writer) = tokio::io::split(remote);
            let _ = tokio::io::copy(&mut reader, &mut writer).await;
            let _ = writer.shutdown().await;
        });

        Ok(Tunnel {
            stream: Box::pin(local),
            guard: self.guard(task),
        })
    }

    async fn find_document(&self, id: &DocumentId) -> Result<Option<String>> {
        self.enter(Call::FindDocument(id.to_string()), "find", &id.name)
            .await?;
        Ok(self
            .documents
            .lock()
            .unwrap()
            .get(&document_key(id))
            .map(|(version, _)| version.to_string()))
    }

    async fn create_document(&self, document: &ResolvedDocument) -> Result<()> {
        let id = &document.id;
        self.enter(Call::CreateDocument(id.to_string()), "create", &id.name)
            .await?;
        let mut documents = self.documents.lock().unwrap();
        if documents.contains_key(&document_key(id)) {
            return Err(KubeError::already_exists(&id.kind, &id.name, &id.namespace));
        }
        documents.insert(document_key(id), (1, document.body.clone()));
        Ok(())
    }

    async fn patch_document(&self, document: &ResolvedDocument) -> Result<String> {
        let id = &document.id;
        self.enter(Call::PatchDocument(id.to_string()), "patch", &id.name)
            .await?;
        let mut documents = self.documents.lock().unwrap();
        let entry = documents
            .get_mut(&document_key(id))
            .ok_or_else(|| KubeError::not_found(&id.kind, &id.name, &id.namespace))?;
        if entry.1 != document.body {
            entry.0 += 1;
            entry.1 = document.body.clone();
        }
        Ok(entry.0.to_string())
    }

    async fn delete_document(&self, id: &DocumentId, force: bool) -> Result<()> {
        let call = Call::DeleteDocument {
            id: id.to_string(),
            force,
        };
        self.enter(call, "delete", &id.name).await?;
        self.documents
            .lock()
            .unwrap()
            .remove(&document_key(id))
            .map(|_| ())
            .ok_or_else(|| KubeError::not_found(&id.kind, &id.name, &id.namespace))
    }

    async fn server_version(&self) -> Result<String> {
        self.enter(Call::ServerVersion, "version", "").await?;
        Ok(self.version.clone())
    }
}

/// Hands out a preconfigured fake per context name.
#[derive(Default)]
pub struct FakeFactory {
    clients: HashMap<String, Arc<FakeResourceClient>>,
    created: Mutex<Vec<String>>,
}

impl FakeFactory {
    pub fn with(mut self, context: &str, client: Arc<FakeResourceClient>) -> Self {
        self.clients.insert(context.to_string(), client);
        self
    }

    pub fn created(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ResourceClientFactory for FakeFactory {
    async fn create(&self, context: &ClusterContext) -> Result<ResourceHandle> {
        self.created.lock().unwrap().push(context.name.clone());
        let client = self.clients.get(&context.name).cloned().ok_or_else(|| {
            KubeError::connection(format!("context '{}'", context.name), "connection refused")
        })?;
        Ok(ResourceHandle::new(context.clone(), client))
    }
}

pub const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
current-context: dev
clusters:
  - name: dev-cluster
    cluster:
      server: https://dev.example.com:6443
  - name: prod-cluster
    cluster:
      server: https://prod.example.com:6443
users:
  - name: dev-admin
    user:
      token: dev-token
  - name: prod-admin
    user:
      token: prod-token
contexts:
  - name: dev
    context:
      cluster: dev-cluster
      user: dev-admin
  - name: prod
    context:
      cluster: prod-cluster
      user: prod-admin
      namespace: production
"#;

pub fn registry() -> ContextRegistry {
    ContextRegistry::from_yaml(KUBECONFIG).unwrap()
}

/// Handle on `context` from the test kubeconfig, backed by `client`.
pub fn handle(context: &str, client: Arc<FakeResourceClient>) -> ResourceHandle {
    let context = registry().resolve(Some(context)).unwrap();
    ResourceHandle::new(context, client)
}

pub fn labels(pairs: &[(&str, &str)]) -> Option<BTreeMap<String, String>> {
    Some(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    )
}

pub fn pod(name: &str, namespace: &str, phase: &str, app: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: labels(&[("app", app)]),
            ..Default::default()
        },
        status: Some(PodStatus {
            phase: Some(phase.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn deployment(name: &str, namespace: &str, replicas: i32) -> Deployment {
    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: labels(&[("app", name)]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            ..Default::default()
        }),
        ..Default::default()
    }
}
