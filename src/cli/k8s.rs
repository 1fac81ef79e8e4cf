//! Kubernetes commands: argument structs, request building and the runner

use super::commands::{Commands, GlobalArgs};
use super::display::{structured, TableRenderer};
use crate::domain::command::{
    CommandRequest, ExecOptions, LogOptions, PortForwardOptions, PortMapping, Verb, VerbParams,
};
use crate::domain::config::{apply_overrides, parse_dynamic_configs, CliConfig, OutputFormat};
use crate::domain::context::ContextRegistry;
use crate::domain::dispatch::{CommandDispatcher, DispatchResult};
use crate::domain::resource::{ResourceKind, Selector};
use crate::domain::session::{
    LocalIo, SessionEvent, SessionExit, SessionIo, SessionTimeouts, StreamSessionManager,
};
use crate::infrastructure::constants::{
    DEFAULT_EXEC_COMMAND, EXIT_CODE_CANCELLED, EXIT_CODE_FAILURE,
};
use crate::infrastructure::kubernetes::{KubeClientFactory, ResourceClientFactory};
use crate::infrastructure::manifest;
use crate::shared::error::KubeError;
use anyhow::{anyhow, bail, Context};
use clap::Parser;
use colored::Colorize;
use serde_json::json;
use std::net::IpAddr;
use std::str::FromStr;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// What `get` lists: a resource kind, or the kubeconfig contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetTarget {
    Contexts,
    Kind(ResourceKind),
}

impl FromStr for GetTarget {
    type Err = KubeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "context" | "contexts" => Ok(GetTarget::Contexts),
            other => other.parse().map(GetTarget::Kind),
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct GetCommand {
    /// Resource kind (pods, deployments, statefulsets, daemonsets, services,
    /// nodes, configmaps, namespaces) or contexts
    pub kind: GetTarget,

    /// Resource name; lists all matching resources when omitted
    pub name: Option<String>,

    /// Label selector (e.g. app=web,tier!=cache)
    #[arg(long, short = 'l', conflicts_with = "name")]
    pub selector: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct DescribeCommand {
    pub kind: ResourceKind,

    pub name: Option<String>,

    #[arg(long, short = 'l', conflicts_with = "name")]
    pub selector: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct LogsCommand {
    /// Pod name
    pub pod: String,

    /// Container name (defaults to the only container)
    #[arg(long, short = 'c')]
    pub container: Option<String>,

    /// Number of recent lines to show; negative shows all
    /// If not specified, uses logs.tail from config (100)
    #[arg(long, allow_negative_numbers = true)]
    pub tail: Option<i64>,

    /// Stream new lines until interrupted
    #[arg(long, short = 'f')]
    pub follow: bool,

    /// Show logs of the previous container instance
    #[arg(long, short = 'p')]
    pub previous: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct DeleteCommand {
    /// Resource kind (omit with -f)
    #[arg(required_unless_present = "filename", conflicts_with = "filename")]
    pub kind: Option<ResourceKind>,

    pub name: Option<String>,

    #[arg(long, short = 'l', conflicts_with_all = ["name", "all"])]
    pub selector: Option<String>,

    /// Delete every resource of the kind in the namespace
    #[arg(long, conflicts_with = "name")]
    pub all: bool,

    /// Manifest files or directories naming the resources to delete ('-' for stdin)
    #[arg(long = "filename", short = 'f', value_name = "PATH")]
    pub filename: Vec<String>,

    /// Delete immediately, without a grace period
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct ScaleCommand {
    /// deployment or statefulset
    pub kind: ResourceKind,

    pub name: Option<String>,

    #[arg(long, short = 'l', conflicts_with_all = ["name", "all"])]
    pub selector: Option<String>,

    #[arg(long, conflicts_with = "name")]
    pub all: bool,

    /// Desired replica count
    #[arg(long)]
    pub replicas: i32,
}

#[derive(Parser, Debug, Clone)]
pub struct RestartCommand {
    /// deployment, statefulset or daemonset
    pub kind: ResourceKind,

    pub name: Option<String>,

    #[arg(long, short = 'l', conflicts_with_all = ["name", "all"])]
    pub selector: Option<String>,

    #[arg(long, conflicts_with = "name")]
    pub all: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct PortForwardCommand {
    /// Pod name, optionally as pod/NAME
    pub target: String,

    /// Port mappings as [LOCAL:]REMOTE; an empty LOCAL picks a free port
    #[arg(required = true, value_name = "[LOCAL:]REMOTE")]
    pub ports: Vec<PortMapping>,

    /// Local address to listen on
    /// If not specified, uses port-forward.address from config (127.0.0.1)
    #[arg(long)]
    pub address: Option<IpAddr>,
}

#[derive(Parser, Debug, Clone)]
pub struct ExecCommand {
    /// Pod name
    pub pod: String,

    #[arg(long, short = 'c')]
    pub container: Option<String>,

    /// Pass local stdin to the remote process
    #[arg(long, short = 'i')]
    pub stdin: bool,

    /// Allocate a TTY; stderr is merged into stdout
    #[arg(long, short = 't')]
    pub tty: bool,

    /// Command and arguments, after `--` (defaults to /bin/sh)
    #[arg(last = true)]
    pub command: Vec<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct ApplyCommand {
    /// Manifest files or directories ('-' for stdin)
    #[arg(long = "filename", short = 'f', required = true, value_name = "PATH")]
    pub filename: Vec<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct ClusterInfoCommand {}

#[derive(Parser, Debug, Clone)]
pub struct ContextsCommand {}

#[derive(Parser, Debug, Clone)]
pub struct UseContextCommand {
    /// Context name
    pub name: String,
}

/// Name, label selector or `--all`. Mutating verbs must say which.
fn selector(
    verb: Verb,
    name: Option<&String>,
    labels: Option<&String>,
    all: bool,
) -> anyhow::Result<Selector> {
    match (name, labels) {
        (Some(name), _) => Ok(Selector::name(name)),
        (None, Some(expr)) => Ok(Selector::labels(expr)),
        (None, None) if all || matches!(verb, Verb::Get | Verb::Describe) => Ok(Selector::All),
        (None, None) => bail!("{} requires a NAME, -l SELECTOR or --all", verb),
    }
}

/// Accepts `NAME` and `pod/NAME`.
fn pod_name(target: &str) -> anyhow::Result<String> {
    match target.split_once('/') {
        None => Ok(target.to_string()),
        Some((kind, name)) => match kind.parse::<ResourceKind>() {
            Ok(ResourceKind::Pod) if !name.is_empty() => Ok(name.to_string()),
            _ => bail!("port-forward target must be a pod, got '{}'", target),
        },
    }
}

impl GetCommand {
    /// `None` for `get contexts`, which never reaches a cluster.
    fn to_request(&self) -> anyhow::Result<Option<CommandRequest>> {
        let kind = match self.kind {
            GetTarget::Contexts if self.name.is_some() || self.selector.is_some() => {
                bail!("get contexts takes no NAME or selector")
            }
            GetTarget::Contexts => return Ok(None),
            GetTarget::Kind(kind) => kind,
        };
        Ok(Some(CommandRequest::new(Verb::Get).with_kind(kind).with_selector(selector(
                Verb::Get,
                self.name.as_ref(),
                self.selector.as_ref(),
                false,
            )?)))
    }
}

impl DescribeCommand {
    fn to_request(&self) -> anyhow::Result<CommandRequest> {
        Ok(CommandRequest::new(Verb::Describe)
            .with_kind(self.kind)
            .with_selector(selector(
                Verb::Describe,
                self.name.as_ref(),
                self.selector.as_ref(),
                false,
            )?))
    }
}

impl LogsCommand {
    fn to_request(&self, config: &CliConfig) -> CommandRequest {
        let tail = self.tail.unwrap_or(config.logs.tail);
        CommandRequest::new(Verb::Logs)
            .with_kind(ResourceKind::Pod)
            .with_selector(Selector::name(&self.pod))
            .with_params(VerbParams::Logs(LogOptions {
                container: self.container.clone(),
                tail_lines: (tail >= 0).then_some(tail),
                follow: self.follow,
                previous: self.previous,
            }))
    }
}

impl DeleteCommand {
    fn to_request(&self) -> anyhow::Result<CommandRequest> {
        if !self.filename.is_empty() {
            let documents = manifest::read_sources(&self.filename)
                .with_context(|| format!("Failed to read {}", self.filename.join(", ")))?;
            return Ok(CommandRequest::new(Verb::Delete)
                .with_params(VerbParams::Documents(documents))
                .with_force(self.force));
        }

        let kind = self
            .kind
            .ok_or_else(|| anyhow!("delete requires a resource kind or -f"))?;
        Ok(CommandRequest::new(Verb::Delete)
            .with_kind(kind)
            .with_selector(selector(
                Verb::Delete,
                self.name.as_ref(),
                self.selector.as_ref(),
                self.all,
            )?)
            .with_force(self.force))
    }
}

impl ScaleCommand {
    fn to_request(&self) -> anyhow::Result<CommandRequest> {
        Ok(CommandRequest::new(Verb::Scale)
            .with_kind(self.kind)
            .with_selector(selector(
                Verb::Scale,
                self.name.as_ref(),
                self.selector.as_ref(),
                self.all,
            )?)
            .with_params(VerbParams::Scale {
                replicas: self.replicas,
            }))
    }
}

impl RestartCommand {
    fn to_request(&self) -> anyhow::Result<CommandRequest> {
        Ok(CommandRequest::new(Verb::Restart)
            .with_kind(self.kind)
            .with_selector(selector(
                Verb::Restart,
                self.name.as_ref(),
                self.selector.as_ref(),
                self.all,
            )?))
    }
}

impl PortForwardCommand {
    fn to_request(&self, config: &CliConfig) -> anyhow::Result<CommandRequest> {
        let address = match self.address {
            Some(address) => address,
            None => config.port_forward.address()?,
        };
        Ok(CommandRequest::new(Verb::PortForward)
            .with_kind(ResourceKind::Pod)
            .with_selector(Selector::name(pod_name(&self.target)?))
            .with_params(VerbParams::PortForward(PortForwardOptions {
                address,
                mappings: self.ports.clone(),
            })))
    }
}

impl ExecCommand {
    fn to_request(&self) -> CommandRequest {
        let command = if self.command.is_empty() {
            vec![DEFAULT_EXEC_COMMAND.to_string()]
        } else {
            self.command.clone()
        };
        CommandRequest::new(Verb::Exec)
            .with_kind(ResourceKind::Pod)
            .with_selector(Selector::name(&self.pod))
            .with_params(VerbParams::Exec(ExecOptions {
                container: self.container.clone(),
                command,
                tty: self.tty,
                stdin: self.stdin,
            }))
    }
}

impl ApplyCommand {
    fn to_request(&self) -> anyhow::Result<CommandRequest> {
        let documents = manifest::read_sources(&self.filename)
            .with_context(|| format!("Failed to read {}", self.filename.join(", ")))?;
        info!("Decoded {} manifest documents", documents.len());
        Ok(CommandRequest::new(Verb::Apply).with_params(VerbParams::Documents(documents)))
    }
}

impl ContextsCommand {
    fn execute(&self, global: &GlobalArgs, format: OutputFormat) -> anyhow::Result<i32> {
        let registry = load_registry(global)?;

        if format == OutputFormat::Table {
            let renderer = TableRenderer::new();
            println!("{}", renderer.render_contexts(registry.list(), registry.current()));
            return Ok(0);
        }

        let contexts: Vec<_> = registry
            .list()
            .iter()
            .map(|c| {
                json!({
                    "name": c.name,
                    "cluster": c.cluster,
                    "server": c.server,
                    "user": c.credentials.user,
                    "namespace": c.namespace,
                    "current": registry.current() == Some(c.name.as_str()),
                })
            })
            .collect();
        println!(
            "{}",
            structured::render(&json!({ "contexts": contexts }), format)?
        );
        Ok(0)
    }
}

impl UseContextCommand {
    async fn execute(&self, global: &GlobalArgs, config: &CliConfig) -> anyhow::Result<i32> {
        let registry = load_registry(global)?;
        let context = registry.resolve(Some(&self.name))?;
        let factory = KubeClientFactory::new(config.timeouts.request());
        let handle = factory.create(&context).await?;
        let version = handle.client().server_version().await?;

        println!(
            "{} Context '{}' is reachable: {} ({})",
            "✔".green(),
            context.name,
            context.server,
            version
        );
        if registry.current() != Some(context.name.as_str()) {
            println!(
                "{} Pass --context {} to use it; the kubeconfig is not modified",
                "ℹ".cyan(),
                context.name
            );
        }
        Ok(0)
    }
}

impl Commands {
    /// Builds the request for a dispatched command. Context commands are
    /// handled by [`Commands::execute`] directly.
    pub fn to_request(&self, config: &CliConfig) -> anyhow::Result<Option<CommandRequest>> {
        let request = match self {
            Commands::Get(cmd) => match cmd.to_request()? {
                Some(request) => request,
                None => return Ok(None),
            },
            Commands::Describe(cmd) => cmd.to_request()?,
            Commands::Logs(cmd) => cmd.to_request(config),
            Commands::Delete(cmd) => cmd.to_request()?,
            Commands::Scale(cmd) => cmd.to_request()?,
            Commands::Restart(cmd) => cmd.to_request()?,
            Commands::PortForward(cmd) => cmd.to_request(config)?,
            Commands::Exec(cmd) => cmd.to_request(),
            Commands::Apply(cmd) => cmd.to_request()?,
            Commands::ClusterInfo(_) => CommandRequest::new(Verb::ClusterInfo),
            Commands::Contexts(_) | Commands::UseContext(_) => return Ok(None),
        };
        Ok(Some(request))
    }

    /// Runs the command and returns the process exit code.
    pub async fn execute(&self, global: &GlobalArgs) -> anyhow::Result<i32> {
        let config = load_config(global)?;
        let format = global.output.unwrap_or(config.output.format);

        match self {
            Commands::Contexts(cmd) => return cmd.execute(global, format),
            Commands::Get(cmd) if cmd.kind == GetTarget::Contexts => {
                cmd.to_request()?;
                return ContextsCommand {}.execute(global, format);
            }
            Commands::UseContext(cmd) => return cmd.execute(global, &config).await,
            _ => {}
        }

        let request = self
            .to_request(&config)?
            .ok_or_else(|| anyhow!("command does not dispatch"))?
            .with_namespace(global.namespace.clone())
            .with_context(global.context.clone());

        run_request(&request, global, &config, format).await
    }
}

/// TOML file, then `-D` overrides, then `--timeout`.
pub fn load_config(global: &GlobalArgs) -> anyhow::Result<CliConfig> {
    let mut config = CliConfig::load(global.config.as_deref())?;

    if !global.properties.is_empty() {
        let overrides = parse_dynamic_configs(&global.properties)
            .map_err(|e| anyhow!("Failed to parse dynamic configs: {}", e))?;
        apply_overrides(&overrides, &mut config)?;
    }

    if let Some(secs) = global.timeout {
        config.timeouts.request_secs = secs;
    }

    debug!(?config, "Effective configuration");
    Ok(config)
}

/// Exit code for a command that returned an error. Interrupts exit like a
/// cancelled session.
pub fn error_exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<KubeError>() {
        Some(KubeError::Cancelled(_)) => EXIT_CODE_CANCELLED,
        _ => EXIT_CODE_FAILURE,
    }
}

/// Service account credentials with `--in-cluster`, kubeconfig otherwise.
pub fn load_registry(global: &GlobalArgs) -> anyhow::Result<ContextRegistry> {
    let registry = if global.in_cluster {
        ContextRegistry::in_cluster()?
    } else {
        ContextRegistry::load(global.kubeconfig.as_deref())?
    };
    Ok(registry)
}

async fn run_request(
    request: &CommandRequest,
    global: &GlobalArgs,
    config: &CliConfig,
    format: OutputFormat,
) -> anyhow::Result<i32> {
    let registry = load_registry(global)?;
    let context = registry.resolve(request.context.as_deref())?;
    let namespace = request.effective_namespace(&context);

    let factory = KubeClientFactory::new(config.timeouts.request());
    let handle = factory.create(&context).await?;

    let sessions = StreamSessionManager::new(SessionTimeouts {
        handshake: config.timeouts.handshake(),
        idle: config.timeouts.stream_idle(),
        drain_grace: config.timeouts.drain_grace(),
    });
    let dispatcher = CommandDispatcher::new(config.timeouts.request(), sessions);

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, cancelling");
                cancel.cancel();
            }
        }
    });

    let mut printer = None;
    let io = match &request.params {
        VerbParams::Logs(_) => SessionIo::new(LocalIo::stdio(false), cancel.clone()),
        VerbParams::Exec(options) => SessionIo::new(LocalIo::stdio(options.stdin), cancel.clone()),
        VerbParams::PortForward(_) => {
            let (tx, rx) = mpsc::unbounded_channel();
            printer = Some(tokio::spawn(print_forward_events(rx)));
            SessionIo::new(LocalIo::sink(), cancel.clone()).with_events(tx)
        }
        _ => SessionIo::new(LocalIo::sink(), cancel.clone()),
    };

    let result = dispatcher.execute(request, &handle, io).await;
    interrupt.abort();
    if let Some(printer) = printer {
        let _ = printer.await;
    }
    let result = result?;

    let single = request.selector.as_name().is_some();
    render(&result, format, &namespace, single)?;
    Ok(result.exit_code())
}

async fn print_forward_events(mut events: mpsc::UnboundedReceiver<SessionEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Listening { local, remote_port } => {
                println!("Forwarding from {} -> {}", local, remote_port);
            }
            SessionEvent::ConnectionOpened { remote_port, .. } => {
                println!("Handling connection for {}", remote_port);
            }
            SessionEvent::ConnectionFailed {
                peer,
                remote_port,
                reason,
            } => {
                eprintln!(
                    "{} Connection from {} to port {} failed: {}",
                    "⚠".yellow(),
                    peer,
                    remote_port,
                    reason
                );
            }
            _ => {}
        }
    }
}

fn render(
    result: &DispatchResult,
    format: OutputFormat,
    namespace: &str,
    single: bool,
) -> anyhow::Result<()> {
    // Streamed bytes own stdout; session summaries go to stderr.
    if let DispatchResult::Session(report) = result {
        if format != OutputFormat::Table {
            let value = structured::to_value(result, single)?;
            eprintln!("{}", structured::render(&value, format)?);
        } else if report.connections > 0 || report.exit != SessionExit::Completed {
            eprintln!("{}", TableRenderer::new().render_session(report));
        }
        return Ok(());
    }

    if format != OutputFormat::Table {
        let value = structured::to_value(result, single)?;
        println!("{}", structured::render(&value, format)?);
        return Ok(());
    }

    let renderer = TableRenderer::new();
    let output = match result {
        DispatchResult::Resources { kind, items } => {
            renderer.render_resources(*kind, items, namespace)
        }
        DispatchResult::Described(object) => renderer.render_describe(object),
        DispatchResult::Targets(report) => renderer.render_targets(report),
        DispatchResult::Applied(results) => renderer.render_apply(results),
        DispatchResult::ClusterInfo(summary) => renderer.render_cluster_info(summary),
        DispatchResult::Session(_) => String::new(),
    };
    println!("{}", output.trim_end());
    Ok(())
}
