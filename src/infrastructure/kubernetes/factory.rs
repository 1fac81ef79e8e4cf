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

use super::client::{KubeResourceClient, ResourceClient};
use crate::domain::context::{ClusterContext, CredentialSource};
use crate::shared::error::{KubeError, Result};
use kube::config::KubeConfigOptions;
use kube::Client;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// A cluster client bound to exactly one context for its whole lifetime.
#[derive(Clone)]
pub struct ResourceHandle {
    context: ClusterContext,
    client: Arc<dyn ResourceClient>,
}

impl ResourceHandle {
    pub fn new(context: ClusterContext, client: Arc<dyn ResourceClient>) -> Self {
        Self { context, client }
    }

    pub fn context(&self) -> &ClusterContext {
        &self.context
    }

    pub fn client(&self) -> &Arc<dyn ResourceClient> {
        &self.client
    }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("context", &self.context.name)
            .field("server", &self.context.server)
            .finish()
    }
}

#[async_trait::async_trait]
pub trait ResourceClientFactory: Send + Sync {
    /// Builds a handle for `context`, failing with `ConnectionError` when no
    /// usable client can be produced.
    async fn create(&self, context: &ClusterContext) -> Result<ResourceHandle>;
}

/// Builds kube clients from the kubeconfig entry behind a context and checks
/// the API server before handing them out.
#[derive(Debug, Clone)]
pub struct KubeClientFactory {
    timeout: Duration,
}

impl KubeClientFactory {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn build_client(&self, context: &ClusterContext) -> Result<Client> {
        let target = format!("context '{}'", context.name);

        let mut config = match &context.credentials.source {
            CredentialSource::Kubeconfig(kubeconfig) => {
                let options = KubeConfigOptions {
                    context: Some(context.name.clone()),
                    cluster: None,
                    user: None,
                };
                kube::Config::from_custom_kubeconfig(kubeconfig.as_ref().clone(), &options)
                    .await
                    .map_err(|e| {
                        KubeError::connection(&target, format!("invalid credentials: {}", e))
                    })?
            }
            CredentialSource::InCluster => kube::Config::incluster().map_err(|e| {
                KubeError::connection(&target, format!("service account unavailable: {}", e))
            })?,
        };
        // Streams may idle for a long time, so only connecting is bounded here.
        config.connect_timeout = Some(self.timeout);

        Client::try_from(config).map_err(|e| KubeError::connection(&target, e))
    }
}

#[async_trait::async_trait]
impl ResourceClientFactory for KubeClientFactory {
    #[instrument(skip_all, fields(context = %context.name))]
    async fn create(&self, context: &ClusterContext) -> Result<ResourceHandle> {
        let client = self.build_client(context).await?;
        let resource_client = KubeResourceClient::new(client);

        let target = format!("context '{}'", context.name);
        let version = tokio::time::timeout(self.timeout, resource_client.server_version())
            .await
            .map_err(|_| {
                KubeError::connection(
                    &target,
                    format!("API server {} did not answer within {:?}", context.server, self.timeout),
                )
            })?
            .map_err(|e| KubeError::connection(&target, e))?;

        info!("Connected to {} ({})", context.server, version);
        debug!(user = %context.credentials.user, namespace = %context.namespace, "Handle ready");
        Ok(ResourceHandle::new(
            context.clone(),
            Arc::new(resource_client),
        ))
    }
}
