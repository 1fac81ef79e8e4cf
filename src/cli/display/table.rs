//! Table rendering for CLI output

use super::{ColorTheme, StatusIcon};
use crate::domain::apply::{ApplyOutcome, ApplyResult};
use crate::domain::context::ClusterContext;
use crate::domain::dispatch::{ClusterSummary, TargetReport};
use crate::domain::resource::{ResourceKind, ResourceObject};
use crate::domain::session::{SessionExit, SessionReport};
use crate::infrastructure::constants::LABEL_NODE_ROLE_PREFIX;
use chrono::Utc;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, CellAlignment, Color, ContentArrangement, Table};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

/// Table renderer for formatted output
pub struct TableRenderer {
    theme: ColorTheme,
}

impl Default for TableRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TableRenderer {
    /// Create a new table renderer with default theme
    pub fn new() -> Self {
        Self {
            theme: ColorTheme::default(),
        }
    }

    fn table(headers: &[&str]) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(
                headers
                    .iter()
                    .map(|h| Cell::new(h).set_alignment(CellAlignment::Left))
                    .collect::<Vec<_>>(),
            );
        table
    }

    /// Render a get/list result with the columns of its kind
    pub fn render_resources(
        &self,
        kind: ResourceKind,
        items: &[ResourceObject],
        namespace: &str,
    ) -> String {
        if items.is_empty() {
            return if kind.is_namespaced() {
                format!("No {} found in namespace '{}'", kind.plural(), namespace)
            } else {
                format!("No {} found", kind.plural())
            };
        }

        let mut table = Self::table(columns(kind));
        for item in items {
            table.add_row(self.row(item));
        }

        let mut output = table.to_string();
        output.push('\n');
        if matches!(
            kind,
            ResourceKind::Pod | ResourceKind::Deployment | ResourceKind::StatefulSet
        ) {
            output.push_str(&format!(
                "Legend: {} Ready  {} Partial  {} Not ready\n",
                StatusIcon::SUCCESS.green(),
                StatusIcon::WARNING.yellow(),
                StatusIcon::ERROR.red()
            ));
        }
        output
    }

    fn replica_cell(&self, ready: u32, total: u32) -> Cell {
        Cell::new(format!(
            "{} {}/{}",
            StatusIcon::get_replica_icon(ready, total),
            ready,
            total
        ))
        .fg(self.theme.get_replica_color(ready, total))
    }

    fn phase_cell(&self, phase: &str) -> Cell {
        Cell::new(format!("{} {}", StatusIcon::get_phase_icon(phase), phase))
            .fg(self.theme.get_phase_color(phase))
    }

    fn row(&self, item: &ResourceObject) -> Vec<Cell> {
        let name = Cell::new(item.name());
        let age = Cell::new(age(item.metadata().creation_timestamp.as_ref()));

        match item {
            ResourceObject::Pod(pod) => {
                let total = pod
                    .spec
                    .as_ref()
                    .map(|s| s.containers.len())
                    .unwrap_or_default() as u32;
                let statuses = pod
                    .status
                    .as_ref()
                    .and_then(|s| s.container_statuses.as_deref())
                    .unwrap_or_default();
                let ready = statuses.iter().filter(|c| c.ready).count() as u32;
                let restarts: i32 = statuses.iter().map(|c| c.restart_count).sum();
                let phase = pod
                    .status
                    .as_ref()
                    .and_then(|s| s.phase.as_deref())
                    .unwrap_or("Unknown");
                vec![
                    name,
                    self.replica_cell(ready, total),
                    self.phase_cell(phase),
                    Cell::new(restarts),
                    Cell::new(item.namespace().unwrap_or_default()),
                    age,
                ]
            }
            ResourceObject::Deployment(deploy) => {
                let desired = deploy.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
                let status = deploy.status.clone().unwrap_or_default();
                let ready = status.ready_replicas.unwrap_or(0);
                vec![
                    name,
                    self.replica_cell(count(ready), count(desired)),
                    Cell::new(desired),
                    Cell::new(status.updated_replicas.unwrap_or(0)),
                    Cell::new(status.available_replicas.unwrap_or(0)),
                    age,
                ]
            }
            ResourceObject::StatefulSet(sts) => {
                let desired = sts.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
                let ready = sts
                    .status
                    .as_ref()
                    .and_then(|s| s.ready_replicas)
                    .unwrap_or(0);
                vec![name, self.replica_cell(count(ready), count(desired)), age]
            }
            ResourceObject::DaemonSet(ds) => {
                let status = ds.status.clone().unwrap_or_default();
                vec![
                    name,
                    Cell::new(status.desired_number_scheduled),
                    Cell::new(status.current_number_scheduled),
                    self.replica_cell(
                        count(status.number_ready),
                        count(status.desired_number_scheduled),
                    ),
                    age,
                ]
            }
            ResourceObject::Service(svc) => {
                let spec = svc.spec.clone().unwrap_or_default();
                vec![
                    name,
                    Cell::new(spec.type_.unwrap_or_else(|| "ClusterIP".to_string())),
                    Cell::new(spec.cluster_ip.unwrap_or_else(|| "<none>".to_string())),
                    Cell::new(service_ports(&spec.ports.unwrap_or_default())),
                    age,
                ]
            }
            ResourceObject::Node(node) => {
                let ready = node_ready(node);
                let version = node
                    .status
                    .as_ref()
                    .and_then(|s| s.node_info.as_ref())
                    .map(|i| i.kubelet_version.clone())
                    .unwrap_or_default();
                let (status, color) = if ready {
                    ("Ready", self.theme.success)
                } else {
                    ("NotReady", self.theme.error)
                };
                vec![
                    name,
                    Cell::new(status).fg(color),
                    Cell::new(node_roles(item)),
                    Cell::new(version),
                    age,
                ]
            }
            ResourceObject::ConfigMap(cm) => {
                let data = cm.data.as_ref().map(|d| d.len()).unwrap_or_default()
                    + cm.binary_data.as_ref().map(|d| d.len()).unwrap_or_default();
                let created = cm
                    .metadata
                    .creation_timestamp
                    .as_ref()
                    .map(|t| t.0.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default();
                vec![name, Cell::new(data), Cell::new(created)]
            }
            ResourceObject::Namespace(ns) => {
                let phase = ns
                    .status
                    .as_ref()
                    .and_then(|s| s.phase.as_deref())
                    .unwrap_or("Unknown");
                vec![name, self.phase_cell(phase), age]
            }
        }
    }

    /// Render one object as a field table, plus containers for pods
    pub fn render_describe(&self, object: &ResourceObject) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        table.add_row(vec![
            Cell::new(format!("{} {}", object.kind().api_kind(), object.name()))
                .fg(self.theme.info),
        ]);

        let mut output = String::new();
        let mut fields = Self::table(&["FIELD", "VALUE"]);
        for (field, value) in describe_fields(object) {
            fields.add_row(vec![Cell::new(field).fg(self.theme.muted), Cell::new(value)]);
        }
        output.push_str(&table.to_string());
        output.push('\n');
        output.push_str(&fields.to_string());
        output.push('\n');

        if let ResourceObject::Pod(pod) = object {
            let statuses = pod
                .status
                .as_ref()
                .and_then(|s| s.container_statuses.clone())
                .unwrap_or_default();
            let mut containers = Self::table(&["CONTAINER", "IMAGE", "READY", "RESTARTS", "STATE"]);
            for container in pod.spec.as_ref().map(|s| s.containers.as_slice()).unwrap_or_default() {
                let status = statuses.iter().find(|s| s.name == container.name);
                let ready = status.map(|s| s.ready).unwrap_or(false);
                containers.add_row(vec![
                    Cell::new(&container.name),
                    Cell::new(container.image.as_deref().unwrap_or_default()),
                    Cell::new(if ready {
                        StatusIcon::SUCCESS
                    } else {
                        StatusIcon::ERROR
                    })
                    .fg(if ready { self.theme.success } else { self.theme.error }),
                    Cell::new(status.map(|s| s.restart_count).unwrap_or(0)),
                    Cell::new(status.map(container_state).unwrap_or_else(|| "Unknown".to_string())),
                ]);
            }
            output.push_str(&containers.to_string());
            output.push('\n');
        }

        output
    }

    /// Render per-target outcomes of delete/scale/restart
    pub fn render_targets(&self, report: &TargetReport) -> String {
        if report.total() == 0 {
            return "No resources matched".to_string();
        }

        let mut table = Self::table(&["TARGET", "RESULT"]);
        for outcome in &report.outcomes {
            let result = match &outcome.error {
                None => Cell::new(format!("{} {}", StatusIcon::SUCCESS, past_tense(&report.verb.to_string())))
                    .fg(self.theme.success),
                Some(reason) => {
                    Cell::new(format!("{} {}", StatusIcon::ERROR, reason)).fg(self.theme.error)
                }
            };
            table.add_row(vec![Cell::new(&outcome.target), result]);
        }

        let summary = format!(
            "{}/{} targets {}",
            report.succeeded(),
            report.total(),
            past_tense(&report.verb.to_string())
        );
        let summary = if report.succeeded() == report.total() {
            summary.green()
        } else {
            summary.yellow()
        };
        format!("{}\n{}\n", table, summary)
    }

    /// Render apply results in input order
    pub fn render_apply(&self, results: &[ApplyResult]) -> String {
        let mut table = Self::table(&["#", "RESOURCE", "RESULT"]);
        for result in results {
            let outcome = match &result.outcome {
                ApplyOutcome::Applied { operation } => {
                    Cell::new(format!("{} {}", StatusIcon::SUCCESS, operation)).fg(self.theme.success)
                }
                ApplyOutcome::Failed { reason } => {
                    Cell::new(format!("{} {}", StatusIcon::ERROR, reason)).fg(self.theme.error)
                }
            };
            table.add_row(vec![
                Cell::new(result.index).fg(self.theme.muted),
                Cell::new(result.label()),
                outcome,
            ]);
        }

        let failed = results.iter().filter(|r| r.is_failed()).count();
        let summary = format!("{} applied, {} failed", results.len() - failed, failed);
        let summary = if failed == 0 {
            summary.green()
        } else {
            summary.red()
        };
        format!("{}\n{}\n", table, summary)
    }

    /// Render the cluster overview
    pub fn render_cluster_info(&self, summary: &ClusterSummary) -> String {
        let mut output = String::new();
        output.push_str(&format!(
            "{} {} {}\n",
            "Kubernetes control plane is running at".bold(),
            summary.server.cyan(),
            format!("({})", summary.server_version).bright_black()
        ));
        output.push_str(&format!(
            "Context: {} | Namespace: {}\n",
            summary.context, summary.namespace
        ));

        let mut table = Self::table(&["RESOURCE", "COUNT"]);
        table.add_row(vec![
            Cell::new("Nodes"),
            self.replica_cell(summary.ready_nodes as u32, summary.nodes as u32),
        ]);
        table.add_row(vec![Cell::new("Namespaces"), Cell::new(summary.namespaces)]);
        table.add_row(vec![
            Cell::new("Pods"),
            self.replica_cell(summary.running_pods as u32, summary.pods as u32),
        ]);
        table.add_row(vec![Cell::new("Deployments"), Cell::new(summary.deployments)]);
        table.add_row(vec![Cell::new("Services"), Cell::new(summary.services)]);
        output.push_str(&table.to_string());
        output.push('\n');
        output
    }

    /// Render every known context, marking the current one
    pub fn render_contexts(&self, contexts: &[ClusterContext], current: Option<&str>) -> String {
        if contexts.is_empty() {
            return "No contexts found in kubeconfig".to_string();
        }

        let mut table = Self::table(&["CURRENT", "NAME", "CLUSTER", "USER", "NAMESPACE"]);
        for context in contexts {
            let is_current = current == Some(context.name.as_str());
            let color = if is_current {
                self.theme.success
            } else {
                Color::Reset
            };
            table.add_row(vec![
                Cell::new(if is_current { StatusIcon::CURRENT } else { "" }).fg(color),
                Cell::new(&context.name).fg(color),
                Cell::new(&context.cluster),
                Cell::new(&context.credentials.user),
                Cell::new(&context.namespace),
            ]);
        }
        table.to_string()
    }

    /// One-line summary of a finished streaming session
    pub fn render_session(&self, report: &SessionReport) -> String {
        let status = match report.exit {
            SessionExit::Completed => format!("{} completed", StatusIcon::SUCCESS).green(),
            SessionExit::Cancelled => format!("{} cancelled", StatusIcon::WARNING).yellow(),
            SessionExit::Exited(0) => format!("{} exited 0", StatusIcon::SUCCESS).green(),
            SessionExit::Exited(code) => format!("{} exited {}", StatusIcon::ERROR, code).red(),
        };
        let mut line = format!(
            "{} session {}: {} received, {} sent",
            report.kind, status, report.bytes_received, report.bytes_sent
        );
        if report.connections > 0 {
            line.push_str(&format!(", {} connections", report.connections));
        }
        line
    }
}

fn columns(kind: ResourceKind) -> &'static [&'static str] {
    match kind {
        ResourceKind::Pod => &["NAME", "READY", "STATUS", "RESTARTS", "NAMESPACE", "AGE"],
        ResourceKind::Deployment => &["NAME", "READY", "DESIRED", "UPDATED", "AVAILABLE", "AGE"],
        ResourceKind::StatefulSet => &["NAME", "READY", "AGE"],
        ResourceKind::DaemonSet => &["NAME", "DESIRED", "CURRENT", "READY", "AGE"],
        ResourceKind::Service => &["NAME", "TYPE", "CLUSTER-IP", "PORTS", "AGE"],
        ResourceKind::Node => &["NAME", "READY", "ROLES", "VERSION", "AGE"],
        ResourceKind::ConfigMap => &["NAME", "DATA", "CREATED"],
        ResourceKind::Namespace => &["NAME", "STATUS", "AGE"],
    }
}

fn count(n: i32) -> u32 {
    n.max(0) as u32
}

fn past_tense(verb: &str) -> String {
    match verb {
        "scale" => "scaled".to_string(),
        "restart" => "restarted".to_string(),
        "delete" => "deleted".to_string(),
        other => format!("{}d", other),
    }
}

/// Coarse age of an object, e.g. `3d`, `5h`, `12m`.
fn age(created: Option<&Time>) -> String {
    let Some(created) = created else {
        return "<unknown>".to_string();
    };
    let elapsed = Utc::now().signed_duration_since(created.0);
    if elapsed.num_days() > 0 {
        format!("{}d", elapsed.num_days())
    } else if elapsed.num_hours() > 0 {
        format!("{}h", elapsed.num_hours())
    } else if elapsed.num_minutes() > 0 {
        format!("{}m", elapsed.num_minutes())
    } else {
        format!("{}s", elapsed.num_seconds().max(0))
    }
}

fn service_ports(ports: &[k8s_openapi::api::core::v1::ServicePort]) -> String {
    if ports.is_empty() {
        return "<none>".to_string();
    }
    ports
        .iter()
        .map(|p| {
            let node_port = p
                .node_port
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".to_string());
            format!(
                "{}:{}/{}",
                p.port,
                node_port,
                p.protocol.as_deref().unwrap_or("TCP")
            )
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn node_ready(node: &k8s_openapi::api::core::v1::Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false)
}

fn node_roles(node: &ResourceObject) -> String {
    let roles: Vec<&str> = node
        .metadata()
        .labels
        .as_ref()
        .map(|labels| {
            labels
                .keys()
                .filter_map(|k| k.strip_prefix(LABEL_NODE_ROLE_PREFIX))
                .filter(|r| !r.is_empty())
                .collect()
        })
        .unwrap_or_default();
    if roles.is_empty() {
        "<none>".to_string()
    } else {
        roles.join(",")
    }
}

fn container_state(status: &k8s_openapi::api::core::v1::ContainerStatus) -> String {
    let Some(state) = status.state.as_ref() else {
        return "Unknown".to_string();
    };
    if state.running.is_some() {
        "Running".to_string()
    } else if let Some(waiting) = &state.waiting {
        format!("Waiting ({})", waiting.reason.as_deref().unwrap_or("unknown"))
    } else if let Some(terminated) = &state.terminated {
        format!(
            "Terminated ({}, exit {})",
            terminated.reason.as_deref().unwrap_or("unknown"),
            terminated.exit_code
        )
    } else {
        "Unknown".to_string()
    }
}

fn describe_fields(object: &ResourceObject) -> Vec<(String, String)> {
    let meta = object.metadata();
    let mut fields = vec![("Name".to_string(), object.name().to_string())];
    if let Some(namespace) = object.namespace() {
        fields.push(("Namespace".to_string(), namespace.to_string()));
    }
    if let Some(created) = &meta.creation_timestamp {
        fields.push(("Created".to_string(), created.0.to_rfc3339()));
    }
    let labels = meta
        .labels
        .as_ref()
        .map(|l| {
            l.iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| "<none>".to_string());
    fields.push(("Labels".to_string(), labels));

    let mut push = |field: &str, value: Option<String>| {
        if let Some(value) = value {
            fields.push((field.to_string(), value));
        }
    };

    match object {
        ResourceObject::Pod(pod) => {
            push("Node", pod.spec.as_ref().and_then(|s| s.node_name.clone()));
            push("Phase", pod.status.as_ref().and_then(|s| s.phase.clone()));
            push("IP", pod.status.as_ref().and_then(|s| s.pod_ip.clone()));
        }
        ResourceObject::Deployment(deploy) => {
            let status = deploy.status.clone().unwrap_or_default();
            push(
                "Replicas",
                Some(format!(
                    "{} desired | {} updated | {} ready | {} available",
                    deploy.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1),
                    status.updated_replicas.unwrap_or(0),
                    status.ready_replicas.unwrap_or(0),
                    status.available_replicas.unwrap_or(0)
                )),
            );
            push(
                "Strategy",
                deploy
                    .spec
                    .as_ref()
                    .and_then(|s| s.strategy.as_ref())
                    .and_then(|s| s.type_.clone()),
            );
        }
        ResourceObject::StatefulSet(sts) => {
            push(
                "Replicas",
                Some(format!(
                    "{} desired | {} ready",
                    sts.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1),
                    sts.status.as_ref().and_then(|s| s.ready_replicas).unwrap_or(0)
                )),
            );
            push("Service", sts.spec.as_ref().map(|s| s.service_name.clone()));
        }
        ResourceObject::DaemonSet(ds) => {
            let status = ds.status.clone().unwrap_or_default();
            push(
                "Scheduled",
                Some(format!(
                    "{} desired | {} current | {} ready",
                    status.desired_number_scheduled,
                    status.current_number_scheduled,
                    status.number_ready
                )),
            );
        }
        ResourceObject::Service(svc) => {
            let spec = svc.spec.clone().unwrap_or_default();
            push("Type", spec.type_.clone());
            push("Cluster IP", spec.cluster_ip.clone());
            push("Ports", Some(service_ports(&spec.ports.unwrap_or_default())));
            push(
                "Selector",
                spec.selector.map(|s| {
                    s.iter()
                        .map(|(k, v)| format!("{}={}", k, v))
                        .collect::<Vec<_>>()
                        .join(",")
                }),
            );
        }
        ResourceObject::Node(node) => {
            let ready = if node_ready(node) { "True" } else { "False" };
            push("Ready", Some(ready.to_string()));
            push("Roles", Some(node_roles(object)));
            if let Some(info) = node.status.as_ref().and_then(|s| s.node_info.as_ref()) {
                push("Kubelet", Some(info.kubelet_version.clone()));
                push("OS Image", Some(info.os_image.clone()));
                push("Runtime", Some(info.container_runtime_version.clone()));
            }
        }
        ResourceObject::ConfigMap(cm) => {
            push(
                "Data",
                cm.data
                    .as_ref()
                    .map(|d| d.keys().cloned().collect::<Vec<_>>().join("\n")),
            );
        }
        ResourceObject::Namespace(ns) => {
            push("Status", ns.status.as_ref().and_then(|s| s.phase.clone()));
        }
    }

    fields
}
