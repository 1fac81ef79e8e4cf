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

use super::io::{EventSink, ExecChannel, LocalIo, SessionIo, Tunnel};
use super::pump::{pump, Direction, PumpEnd, PumpSet};
use super::state::{SessionEvent, SessionExit, SessionState, StreamKind, StreamSession};
use crate::domain::command::{ExecOptions, LogOptions, PortForwardOptions};
use crate::domain::resource::{ResourceKind, ResourceObject};
use crate::infrastructure::constants::{
    DEFAULT_DRAIN_GRACE_MS, DEFAULT_HANDSHAKE_TIMEOUT_SECS,
};
use crate::infrastructure::kubernetes::ResourceClient;
use crate::shared::error::{KubeError, Result};
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimeouts {
    /// Bound on opening the remote channel
    pub handshake: Duration,
    /// Bound on any single read or write; `None` lets streams idle forever
    pub idle: Option<Duration>,
    /// How long closing waits for pumps to flush before aborting them
    pub drain_grace: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            handshake: Duration::from_secs(DEFAULT_HANDSHAKE_TIMEOUT_SECS),
            idle: None,
            drain_grace: Duration::from_millis(DEFAULT_DRAIN_GRACE_MS),
        }
    }
}

/// What to stream from which pod.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionSpec {
    Logs {
        namespace: String,
        pod: String,
        options: LogOptions,
    },
    Exec {
        namespace: String,
        pod: String,
        options: ExecOptions,
    },
    PortForward {
        namespace: String,
        pod: String,
        options: PortForwardOptions,
    },
}

impl SessionSpec {
    pub fn kind(&self) -> StreamKind {
        match self {
            SessionSpec::Logs { .. } => StreamKind::Logs,
            SessionSpec::Exec { .. } => StreamKind::Exec,
            SessionSpec::PortForward { .. } => StreamKind::PortForward,
        }
    }

    pub fn target(&self) -> String {
        let (namespace, pod) = match self {
            SessionSpec::Logs { namespace, pod, .. }
            | SessionSpec::Exec { namespace, pod, .. }
            | SessionSpec::PortForward { namespace, pod, .. } => (namespace, pod),
        };
        format!("pod/{} ({})", pod, namespace)
    }
}

/// Terminal status of a session that reached `Closed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub id: Uuid,
    pub kind: StreamKind,
    pub exit: SessionExit,
    pub transitions: Vec<SessionState>,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    /// Forwarded connections served (port-forward only)
    pub connections: u64,
}

#[derive(Debug, Default)]
struct Traffic {
    received: u64,
    sent: u64,
    connections: u64,
}

impl Traffic {
    fn add_pumps(&mut self, pumps: &PumpSet) {
        self.received += pumps.bytes_received();
        self.sent += pumps.bytes_sent();
    }

    fn add(&mut self, other: Traffic) {
        self.received += other.received;
        self.sent += other.sent;
        self.connections += other.connections;
    }
}

/// Runs logs, exec and port-forward sessions, one at a time per manager.
#[derive(Debug, Clone)]
pub struct StreamSessionManager {
    timeouts: SessionTimeouts,
    slot: Arc<Mutex<()>>,
}

impl Default for StreamSessionManager {
    fn default() -> Self {
        Self::new(SessionTimeouts::default())
    }
}

impl StreamSessionManager {
    pub fn new(timeouts: SessionTimeouts) -> Self {
        Self {
            timeouts,
            slot: Arc::new(Mutex::new(())),
        }
    }

    pub fn timeouts(&self) -> SessionTimeouts {
        self.timeouts
    }

    /// True when no session currently holds the slot.
    pub fn is_idle(&self) -> bool {
        self.slot.try_lock().is_ok()
    }

    /// Drives one session from handshake to a terminal state.
    ///
    /// Returns the report once the session is `Closed`; an `Err` means the
    /// session ended `Errored`. Every pump, listener and remote channel has
    /// been released by the time this returns.
    #[instrument(skip_all, fields(kind = %spec.kind(), target = %spec.target()))]
    pub async fn run(
        &self,
        spec: SessionSpec,
        client: Arc<dyn ResourceClient>,
        io: SessionIo,
    ) -> Result<SessionReport> {
        let _slot = self.slot.clone().try_lock_owned().map_err(|_| {
            KubeError::SessionBusy(format!("cannot start {}", spec.kind()))
        })?;

        let SessionIo {
            local,
            cancel,
            events,
        } = io;
        let mut session = StreamSession::new(spec.kind(), cancel.child_token(), events);
        info!(session = %session.id, "Opening {} session to {}", session.kind, spec.target());

        let outcome = match spec {
            SessionSpec::Logs {
                namespace,
                pod,
                options,
            } => {
                self.run_logs(&mut session, client.as_ref(), &namespace, &pod, &options, local)
                    .await
            }
            SessionSpec::Exec {
                namespace,
                pod,
                options,
            } => {
                self.run_exec(&mut session, client.as_ref(), &namespace, &pod, &options, local)
                    .await
            }
            SessionSpec::PortForward {
                namespace,
                pod,
                options,
            } => {
                self.run_port_forward(&mut session, client, namespace, pod, options)
                    .await
            }
        };

        // Nothing started by this session may outlive it.
        session.cancel.cancel();

        match outcome {
            Ok((exit, traffic)) => {
                session.transition(SessionState::Closing);
                session.transition(SessionState::Closed);
                info!(session = %session.id, "Session closed: {:?}", exit);
                Ok(SessionReport {
                    id: session.id,
                    kind: session.kind,
                    exit,
                    bytes_received: traffic.received,
                    bytes_sent: traffic.sent,
                    connections: traffic.connections,
                    transitions: session.into_history(),
                })
            }
            Err(e) => {
                session.transition(SessionState::Errored);
                warn!(session = %session.id, "Session errored: {}", e);
                Err(e)
            }
        }
    }

    /// Opens the remote channel under the handshake timeout. `None` means the
    /// session was cancelled first.
    async fn handshake<T>(
        &self,
        session: &StreamSession,
        what: &str,
        open: impl Future<Output = Result<T>>,
    ) -> Result<Option<T>> {
        let limit = self.timeouts.handshake;
        tokio::select! {
            biased;
            _ = session.cancel.cancelled() => {
                debug!(session = %session.id, "Cancelled during {} handshake", what);
                Ok(None)
            }
            opened = tokio::time::timeout(limit, open) => match opened {
                Ok(Ok(channel)) => Ok(Some(channel)),
                Ok(Err(e)) => Err(handshake_error(what, e)),
                Err(_) => Err(KubeError::Timeout(format!(
                    "{} handshake did not complete within {:?}",
                    what, limit
                ))),
            },
        }
    }

    async fn run_logs(
        &self,
        session: &mut StreamSession,
        client: &dyn ResourceClient,
        namespace: &str,
        pod: &str,
        options: &LogOptions,
        local: LocalIo,
    ) -> Result<(SessionExit, Traffic)> {
        let what = format!("log stream for pod/{}", pod);
        let Some(reader) = self
            .handshake(session, &what, client.open_logs(namespace, pod, options))
            .await?
        else {
            return Ok((SessionExit::Cancelled, Traffic::default()));
        };
        session.transition(SessionState::Established);

        let mut pumps = PumpSet::new();
        pumps.spawn(
            Direction::Inbound,
            reader,
            local.stdout,
            session.cancel.clone(),
            self.timeouts.idle,
            false,
        );
        session.transition(SessionState::Active);

        let outcome = tokio::select! {
            biased;
            _ = session.cancel.cancelled() => Ok(SessionExit::Cancelled),
            done = pumps.next() => match done {
                Some(Ok(pumped)) if pumped.end == PumpEnd::Cancelled => Ok(SessionExit::Cancelled),
                Some(Ok(_)) | None => Ok(SessionExit::Completed),
                Some(Err(e)) => Err(e),
            },
        };

        session.transition(SessionState::Closing);
        session.cancel.cancel();
        pumps.finish(self.timeouts.drain_grace).await;

        let mut traffic = Traffic::default();
        traffic.add_pumps(&pumps);
        outcome.map(|exit| (exit, traffic))
    }

    async fn run_exec(
        &self,
        session: &mut StreamSession,
        client: &dyn ResourceClient,
        namespace: &str,
        pod: &str,
        options: &ExecOptions,
        local: LocalIo,
    ) -> Result<(SessionExit, Traffic)> {
        let what = format!("exec channel for pod/{}", pod);
        let Some(channel) = self
            .handshake(session, &what, client.open_exec(namespace, pod, options))
            .await?
        else {
            return Ok((SessionExit::Cancelled, Traffic::default()));
        };
        session.transition(SessionState::Established);

        let ExecChannel {
            stdin: remote_stdin,
            stdout: remote_stdout,
            stderr: remote_stderr,
            mut exit,
            guard,
        } = channel;
        let LocalIo {
            stdin,
            stdout,
            stderr,
        } = local;

        let cancel = session.cancel.clone();
        let idle = self.timeouts.idle;
        let mut input = PumpSet::new();
        let mut output = PumpSet::new();

        // Without both ends the remote stdin is dropped here, which closes it.
        if let (Some(local_in), Some(remote_in)) = (stdin, remote_stdin) {
            input.spawn(Direction::Outbound, local_in, remote_in, cancel.clone(), idle, true);
        }
        if let Some(remote_out) = remote_stdout {
            output.spawn(Direction::Inbound, remote_out, stdout, cancel.clone(), idle, false);
        }
        if let Some(remote_err) = remote_stderr {
            output.spawn(Direction::Inbound, remote_err, stderr, cancel.clone(), idle, false);
        }
        session.transition(SessionState::Active);

        let outcome = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(SessionExit::Cancelled),
                code = &mut exit => break code.map(SessionExit::Exited),
                Some(done) = output.next() => {
                    if let Err(e) = done {
                        break Err(e);
                    }
                }
                Some(done) = input.next() => {
                    if let Err(e) = done {
                        break Err(e);
                    }
                }
            }
        };

        session.transition(SessionState::Closing);
        if matches!(outcome, Ok(SessionExit::Exited(_))) {
            // Let output already in flight reach the terminal.
            output.finish(self.timeouts.drain_grace).await;
        }
        cancel.cancel();
        output.finish(self.timeouts.drain_grace).await;
        input.finish(self.timeouts.drain_grace).await;
        drop(exit);
        drop(guard);

        let mut traffic = Traffic::default();
        traffic.add_pumps(&input);
        traffic.add_pumps(&output);
        outcome.map(|exit| (exit, traffic))
    }

    async fn run_port_forward(
        &self,
        session: &mut StreamSession,
        client: Arc<dyn ResourceClient>,
        namespace: String,
        pod: String,
        options: PortForwardOptions,
    ) -> Result<(SessionExit, Traffic)> {
        let what = format!("port-forward to pod/{}", pod);
        let pod_ready = async {
            let object = client.get(ResourceKind::Pod, &namespace, &pod).await?;
            ensure_running(&object)
        };
        if self.handshake(session, &what, pod_ready).await?.is_none() {
            return Ok((SessionExit::Cancelled, Traffic::default()));
        }
        session.transition(SessionState::Established);

        let mut bound = Vec::with_capacity(options.mappings.len());
        for mapping in &options.mappings {
            let listener = TcpListener::bind((options.address, mapping.local))
                .await
                .map_err(|e| {
                    KubeError::connection(format!("{}:{}", options.address, mapping.local), e)
                })?;
            let local = listener.local_addr()?;
            info!("Forwarding from {} -> {}", local, mapping.remote);
            session.events.emit(SessionEvent::Listening {
                local,
                remote_port: mapping.remote,
            });
            bound.push((listener, mapping.remote));
        }

        let forwarder = Arc::new(Forwarder {
            client,
            namespace,
            pod,
            timeouts: self.timeouts,
            cancel: session.cancel.clone(),
            events: session.events.clone(),
        });
        let mut listeners = JoinSet::new();
        for (listener, remote_port) in bound {
            listeners.spawn(forwarder.clone().serve(listener, remote_port));
        }
        session.transition(SessionState::Active);

        let mut traffic = Traffic::default();
        let outcome = loop {
            tokio::select! {
                biased;
                _ = session.cancel.cancelled() => break Ok(SessionExit::Cancelled),
                Some(joined) = listeners.join_next() => match joined {
                    Ok(Ok(served)) => {
                        traffic.add(served);
                        if listeners.is_empty() {
                            break Ok(SessionExit::Completed);
                        }
                    }
                    Ok(Err(e)) => break Err(e),
                    Err(e) => {
                        break Err(KubeError::StreamClosedAbnormally(format!(
                            "listener task failed: {}",
                            e
                        )))
                    }
                },
            }
        };

        session.transition(SessionState::Closing);
        session.cancel.cancel();
        let drained = tokio::time::timeout(self.timeouts.drain_grace, async {
            while let Some(joined) = listeners.join_next().await {
                if let Ok(Ok(served)) = joined {
                    traffic.add(served);
                }
            }
        })
        .await;
        if drained.is_err() {
            warn!("Aborting {} listener(s) after {:?}", listeners.len(), self.timeouts.drain_grace);
            listeners.shutdown().await;
        }

        outcome.map(|exit| (exit, traffic))
    }
}

/// Shared state for the accept loops of one port-forward session.
struct Forwarder {
    client: Arc<dyn ResourceClient>,
    namespace: String,
    pod: String,
    timeouts: SessionTimeouts,
    cancel: CancellationToken,
    events: EventSink,
}

impl Forwarder {
    /// Accepts connections until cancelled. Each connection gets its own
    /// tunnel; a failed tunnel is reported and the listener keeps serving.
    async fn serve(self: Arc<Self>, listener: TcpListener, remote_port: u16) -> Result<Traffic> {
        let mut connections = JoinSet::new();
        let mut traffic = Traffic::default();

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                accepted = listener.accept() => {
                    let (socket, peer) = accepted?;
                    debug!("Accepted {} for port {}", peer, remote_port);
                    traffic.connections += 1;
                    connections.spawn(self.clone().forward(socket, peer, remote_port));
                }
                Some(joined) = connections.join_next() => {
                    if let Ok((sent, received)) = joined {
                        traffic.sent += sent;
                        traffic.received += received;
                    }
                }
            }
        }

        drop(listener);
        let drained = tokio::time::timeout(self.timeouts.drain_grace, async {
            while let Some(joined) = connections.join_next().await {
                if let Ok((sent, received)) = joined {
                    traffic.sent += sent;
                    traffic.received += received;
                }
            }
        })
        .await;
        if drained.is_err() {
            connections.shutdown().await;
        }
        Ok(traffic)
    }

    async fn forward(self: Arc<Self>, socket: TcpStream, peer: SocketAddr, remote_port: u16) -> (u64, u64) {
        match self.tunnel(socket, peer, remote_port).await {
            Ok(counts) => counts,
            Err(e) => {
                warn!("Forwarding {} to port {} failed: {}", peer, remote_port, e);
                self.events.emit(SessionEvent::ConnectionFailed {
                    peer,
                    remote_port,
                    reason: e.to_string(),
                });
                (0, 0)
            }
        }
    }

    async fn tunnel(&self, socket: TcpStream, peer: SocketAddr, remote_port: u16) -> Result<(u64, u64)> {
        let open = tokio::time::timeout(
            self.timeouts.handshake,
            self.client
                .open_port_forward(&self.namespace, &self.pod, remote_port),
        );
        let Tunnel { stream, guard } = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok((0, 0)),
            opened = open => opened.map_err(|_| {
                KubeError::Timeout(format!("tunnel to port {} not opened within {:?}", remote_port, self.timeouts.handshake))
            })??,
        };
        self.events.emit(SessionEvent::ConnectionOpened { peer, remote_port });

        let (remote_read, remote_write) = tokio::io::split(stream);
        let (local_read, local_write) = socket.into_split();
        let idle = self.timeouts.idle;

        // Either direction failing drops the other.
        let (up, down) = tokio::try_join!(
            pump(Direction::Outbound, local_read, remote_write, self.cancel.clone(), idle, true),
            pump(Direction::Inbound, remote_read, local_write, self.cancel.clone(), idle, true),
        )?;
        drop(guard);

        self.events.emit(SessionEvent::ConnectionClosed {
            peer,
            remote_port,
            bytes_sent: up.bytes,
            bytes_received: down.bytes,
        });
        Ok((up.bytes, down.bytes))
    }
}

fn ensure_running(object: &ResourceObject) -> Result<()> {
    let phase = match object {
        ResourceObject::Pod(pod) => pod.status.as_ref().and_then(|s| s.phase.as_deref()),
        other => {
            return Err(KubeError::ValidationError(format!(
                "{} is not a pod",
                other.reference()
            )))
        }
    };
    match phase {
        Some("Running") => Ok(()),
        phase => Err(KubeError::connection(
            object.reference(),
            format!("pod is not running (phase {})", phase.unwrap_or("Unknown")),
        )),
    }
}

/// Handshake failures surface as connection errors, except for the kinds
/// that already say exactly what went wrong.
fn handshake_error(what: &str, err: KubeError) -> KubeError {
    match err {
        KubeError::NotFound { .. }
        | KubeError::Timeout(_)
        | KubeError::ConnectionError { .. }
        | KubeError::ValidationError(_) => err,
        other => KubeError::connection(what, other),
    }
}
