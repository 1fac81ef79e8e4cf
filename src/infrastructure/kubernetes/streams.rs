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

//! Adaptors from kube's streaming sub-resources to session channels.

use super::client::api_error;
use crate::domain::session::{BoxedReader, BoxedWriter, ExecChannel, RemoteGuard, Tunnel};
use crate::infrastructure::constants::{EXIT_CODE_FAILURE, STREAM_BUFFER_SIZE};
use crate::shared::error::{KubeError, Result};
use futures::FutureExt;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use kube::api::{AttachedProcess, LogParams, Portforwarder};
use kube::Api;
use std::io::Cursor;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio::sync::{mpsc, oneshot};
use tokio_util::compat::FuturesAsyncReadCompatExt;
use tokio_util::io::StreamReader;
use tracing::debug;

/// A reader that tears down its producer when dropped.
struct GuardedReader<R> {
    inner: R,
    _guard: RemoteGuard,
}

impl<R: AsyncRead + Unpin> AsyncRead for GuardedReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

/// Opens a pod log stream.
///
/// The kube stream borrows its `Api`, so a task owns both and forwards
/// chunks. The call returns once the API server accepted the request, so a
/// missing pod or container fails here rather than on first read.
pub(crate) async fn log_reader(
    api: Api<Pod>,
    namespace: &str,
    pod: &str,
    params: LogParams,
) -> Result<BoxedReader> {
    let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();
    let (chunk_tx, chunk_rx) = mpsc::channel::<std::io::Result<Cursor<Vec<u8>>>>(16);
    let (namespace, pod) = (namespace.to_string(), pod.to_string());

    let task = tokio::spawn(async move {
        let stream = match api.log_stream(&pod, &params).await {
            Ok(stream) => stream,
            Err(e) => {
                let _ = ready_tx.send(Err(api_error(e, "Pod", &pod, &namespace)));
                return;
            }
        };
        let _ = ready_tx.send(Ok(()));

        let mut reader = Box::pin(stream.compat());
        loop {
            let mut buf = vec![0u8; STREAM_BUFFER_SIZE];
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    buf.truncate(n);
                    if chunk_tx.send(Ok(Cursor::new(buf))).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!("Log stream for pod/{} failed: {}", pod, e);
                    let _ = chunk_tx.send(Err(e)).await;
                    break;
                }
            }
        }
    });

    let guard = RemoteGuard::new(move || task.abort());
    ready_rx.await.map_err(|_| {
        KubeError::StreamClosedAbnormally("log stream ended before it was opened".to_string())
    })??;

    let chunks = futures::stream::unfold(chunk_rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    });
    Ok(Box::pin(GuardedReader {
        inner: StreamReader::new(Box::pin(chunks)),
        _guard: guard,
    }))
}

/// Splits an attached process into session channels. The process is aborted
/// when the channel's guard drops.
pub(crate) fn exec_channel(mut process: AttachedProcess) -> ExecChannel {
    let stdin = process.stdin().map(|w| Box::pin(w) as BoxedWriter);
    let stdout = process.stdout().map(|r| Box::pin(r) as BoxedReader);
    let stderr = process.stderr().map(|r| Box::pin(r) as BoxedReader);
    let status = process.take_status();

    let exit = async move {
        let status = match status {
            Some(status) => status.await,
            None => None,
        };
        status.as_ref().map(exit_code).ok_or_else(|| {
            KubeError::StreamClosedAbnormally(
                "exec channel closed without an exit status".to_string(),
            )
        })
    }
    .boxed();

    ExecChannel {
        stdin,
        stdout,
        stderr,
        exit,
        guard: RemoteGuard::new(move || process.abort()),
    }
}

/// Exit code carried by the final exec status. Non-success without a
/// parseable `ExitCode` cause maps to a generic failure.
pub(crate) fn exit_code(status: &Status) -> i32 {
    if status.status.as_deref() == Some("Success") {
        return 0;
    }

    status
        .details
        .as_ref()
        .and_then(|details| details.causes.as_ref())
        .and_then(|causes| {
            causes
                .iter()
                .find(|cause| cause.reason.as_deref() == Some("ExitCode"))
        })
        .and_then(|cause| cause.message.as_deref())
        .and_then(|message| message.trim().parse().ok())
        .unwrap_or(EXIT_CODE_FAILURE)
}

pub(crate) fn tunnel(mut forwarder: Portforwarder, port: u16) -> Result<Tunnel> {
    let stream = forwarder.take_stream(port).ok_or_else(|| {
        KubeError::StreamClosedAbnormally(format!("no stream for port {}", port))
    })?;
    Ok(Tunnel {
        stream: Box::pin(stream),
        guard: RemoteGuard::new(move || forwarder.abort()),
    })
}
