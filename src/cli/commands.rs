// CLI command definitions

use super::k8s::{
    ApplyCommand, ClusterInfoCommand, ContextsCommand, DeleteCommand, DescribeCommand, ExecCommand,
    GetCommand, LogsCommand, PortForwardCommand, RestartCommand, ScaleCommand, UseContextCommand,
};
use crate::domain::config::OutputFormat;
use clap::{ArgAction, Args, Parser};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "k8s-cli",
    version,
    about = "Everyday Kubernetes operations from the command line",
    long_about = "Query, modify, stream from and apply manifests to Kubernetes clusters \
                  selected by kubeconfig context"
)]
pub struct CliArgs {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options accepted by every command
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Kubeconfig context to use (defaults to current-context)
    #[arg(long, global = true)]
    pub context: Option<String>,

    /// Path to kubeconfig file
    /// If not specified, uses KUBECONFIG or ~/.kube/config
    #[arg(long, global = true, value_name = "PATH")]
    pub kubeconfig: Option<PathBuf>,

    /// Use the pod service account instead of a kubeconfig
    #[arg(long, global = true, conflicts_with = "kubeconfig")]
    pub in_cluster: bool,

    /// Namespace (defaults to the context namespace)
    #[arg(long, short = 'n', global = true)]
    pub namespace: Option<String>,

    /// Output format: table, json or yaml
    #[arg(long, short = 'o', global = true)]
    pub output: Option<OutputFormat>,

    /// Request timeout in seconds for non-streaming calls
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Path to k8s-cli configuration file (TOML)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Dynamic configuration properties (-D key=value)
    ///
    /// Timeouts: timeout.request, timeout.handshake, timeout.stream-idle (seconds),
    /// timeout.drain-grace (milliseconds)
    /// Logs: logs.tail
    /// Port-forward: port-forward.address
    /// Output: output.format
    ///
    /// Example: -Dtimeout.request=60 -Dlogs.tail=20
    #[arg(short = 'D', global = true, value_name = "KEY=VALUE")]
    pub properties: Vec<String>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// List resources, or show one by name
    Get(GetCommand),

    /// Show details of a resource
    Describe(DescribeCommand),

    /// Print the logs of a pod container
    Logs(LogsCommand),

    /// Delete resources by name, label selector, --all or manifest file
    Delete(DeleteCommand),

    /// Set the replica count of a deployment or statefulset
    Scale(ScaleCommand),

    /// Trigger a rolling restart of a workload
    Restart(RestartCommand),

    /// Forward local ports to a pod
    PortForward(PortForwardCommand),

    /// Run a command in a pod container
    Exec(ExecCommand),

    /// Create or update resources from manifest files
    Apply(ApplyCommand),

    /// Show a summary of the cluster behind the context
    ClusterInfo(ClusterInfoCommand),

    /// List kubeconfig contexts
    #[command(alias = "get-contexts")]
    Contexts(ContextsCommand),

    /// Check that a context resolves and its cluster is reachable
    UseContext(UseContextCommand),
}
