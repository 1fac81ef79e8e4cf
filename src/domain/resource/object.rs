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

use super::ResourceKind;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Node, Pod, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Serialize;

/// A typed object returned by get/describe, one variant per [`ResourceKind`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResourceObject {
    Pod(Pod),
    Deployment(Deployment),
    StatefulSet(StatefulSet),
    DaemonSet(DaemonSet),
    Service(Service),
    Node(Node),
    ConfigMap(ConfigMap),
    Namespace(Namespace),
}

macro_rules! impl_from_object {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for ResourceObject {
                fn from(obj: $variant) -> Self {
                    ResourceObject::$variant(obj)
                }
            }
        )*
    };
}

impl_from_object!(Pod, Deployment, StatefulSet, DaemonSet, Service, Node, ConfigMap, Namespace);

impl ResourceObject {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceObject::Pod(_) => ResourceKind::Pod,
            ResourceObject::Deployment(_) => ResourceKind::Deployment,
            ResourceObject::StatefulSet(_) => ResourceKind::StatefulSet,
            ResourceObject::DaemonSet(_) => ResourceKind::DaemonSet,
            ResourceObject::Service(_) => ResourceKind::Service,
            ResourceObject::Node(_) => ResourceKind::Node,
            ResourceObject::ConfigMap(_) => ResourceKind::ConfigMap,
            ResourceObject::Namespace(_) => ResourceKind::Namespace,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            ResourceObject::Pod(o) => &o.metadata,
            ResourceObject::Deployment(o) => &o.metadata,
            ResourceObject::StatefulSet(o) => &o.metadata,
            ResourceObject::DaemonSet(o) => &o.metadata,
            ResourceObject::Service(o) => &o.metadata,
            ResourceObject::Node(o) => &o.metadata,
            ResourceObject::ConfigMap(o) => &o.metadata,
            ResourceObject::Namespace(o) => &o.metadata,
        }
    }

    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.metadata().namespace.as_deref()
    }

    /// `kind/name`, the form used in aggregate reports.
    pub fn reference(&self) -> String {
        format!("{}/{}", self.kind(), self.name())
    }
}
