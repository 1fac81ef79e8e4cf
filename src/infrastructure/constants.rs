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

/// Namespace used when neither the command nor the context names one
pub const DEFAULT_NAMESPACE: &str = "default";

/// Environment
pub const KUBECONFIG_ENV: &str = "KUBECONFIG";
pub const CONFIG_FILE_ENV: &str = "K8S_CLI_CONFIG";
pub const CONFIG_DIR_NAME: &str = "k8s-cli";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const SERVICE_HOST_ENV: &str = "KUBERNETES_SERVICE_HOST";
pub const SERVICE_PORT_ENV: &str = "KUBERNETES_SERVICE_PORT";

/// In-cluster access through the pod service account
pub const IN_CLUSTER_CONTEXT: &str = "in-cluster";
pub const SERVICE_ACCOUNT_NAMESPACE_FILE: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

/// Timeouts (seconds unless noted)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_DRAIN_GRACE_MS: u64 = 2000;

/// Logs
pub const DEFAULT_TAIL_LINES: i64 = 100;

/// Port-forward
pub const DEFAULT_FORWARD_ADDRESS: &str = "127.0.0.1";

/// Pump buffer size for streamed bytes
pub const STREAM_BUFFER_SIZE: usize = 8 * 1024;

/// Annotation written on the pod template to trigger a rolling restart
pub const ANNOTATION_RESTARTED_AT: &str = "kubectl.kubernetes.io/restartedAt";

/// Node role label prefix
pub const LABEL_NODE_ROLE_PREFIX: &str = "node-role.kubernetes.io/";

/// Exit status reported for user-cancelled sessions
pub const EXIT_CODE_CANCELLED: i32 = 130;

/// Exit status for any unrecovered failure
pub const EXIT_CODE_FAILURE: i32 = 1;

/// Default shell used by `exec` when no command is given
pub const DEFAULT_EXEC_COMMAND: &str = "/bin/sh";

/// Manifest file extensions picked up from directories
pub const MANIFEST_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];
