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

use crate::infrastructure::constants::STREAM_BUFFER_SIZE;
use crate::shared::error::{KubeError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Which way bytes move relative to the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Remote to local (logs, exec output, forwarded responses)
    Inbound,
    /// Local to remote (exec stdin, forwarded requests)
    Outbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpEnd {
    Eof,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpOutcome {
    pub direction: Direction,
    pub bytes: u64,
    pub end: PumpEnd,
}

/// Copies `reader` into `writer` until EOF or cancellation.
///
/// Every chunk is flushed before the next read so interactive output is not
/// held back. With `half_close` the writer is shut down on EOF, which is how
/// the far side learns that input ended. `idle` bounds each read and write.
pub async fn pump<R, W>(
    direction: Direction,
    mut reader: R,
    mut writer: W,
    cancel: CancellationToken,
    idle: Option<Duration>,
    half_close: bool,
) -> Result<PumpOutcome>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; STREAM_BUFFER_SIZE];
    let mut bytes = 0u64;
    let cancelled = |bytes| PumpOutcome {
        direction,
        bytes,
        end: PumpEnd::Cancelled,
    };

    loop {
        let n = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(cancelled(bytes)),
            read = bounded(direction, "read", idle, reader.read(&mut buf)) => read?,
        };

        if n == 0 {
            bounded(direction, "flush", idle, writer.flush()).await?;
            if half_close {
                if let Err(e) = writer.shutdown().await {
                    debug!("{:?} half-close failed: {}", direction, e);
                }
            }
            return Ok(PumpOutcome {
                direction,
                bytes,
                end: PumpEnd::Eof,
            });
        }

        let chunk = &buf[..n];
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(cancelled(bytes)),
            written = bounded(direction, "write", idle, async {
                writer.write_all(chunk).await?;
                writer.flush().await
            }) => written?,
        }
        bytes += n as u64;
    }
}

async fn bounded<T>(
    direction: Direction,
    op: &str,
    idle: Option<Duration>,
    fut: impl Future<Output = std::io::Result<T>>,
) -> Result<T> {
    let result = match idle {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
            KubeError::Timeout(format!("{:?} stream idle for {:?} ({})", direction, limit, op))
        })?,
        None => fut.await,
    };
    result.map_err(|e| KubeError::StreamClosedAbnormally(format!("{:?} {}: {}", direction, op, e)))
}

/// A group of pump tasks sharing one cancellation scope, with per-direction
/// byte totals for the pumps that have finished.
#[derive(Default)]
pub struct PumpSet {
    tasks: JoinSet<Result<PumpOutcome>>,
    received: u64,
    sent: u64,
}

impl PumpSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<R, W>(
        &mut self,
        direction: Direction,
        reader: R,
        writer: W,
        cancel: CancellationToken,
        idle: Option<Duration>,
        half_close: bool,
    ) where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        self.tasks
            .spawn(pump(direction, reader, writer, cancel, idle, half_close));
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Next finished pump, or `None` when the set is empty.
    pub async fn next(&mut self) -> Option<Result<PumpOutcome>> {
        let joined = self.tasks.join_next().await?;
        Some(self.record(joined))
    }

    /// Waits up to `grace` for the remaining pumps, then aborts whatever is
    /// left and waits for the aborts to land. Errors from pumps finishing
    /// here are logged; the session outcome is already decided.
    pub async fn finish(&mut self, grace: Duration) {
        let drained = tokio::time::timeout(grace, async {
            while let Some(done) = self.next().await {
                if let Err(e) = done {
                    debug!("Pump ended with error during close: {}", e);
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                "Aborting {} pump(s) still running after {:?}",
                self.tasks.len(),
                grace
            );
            self.tasks.shutdown().await;
        }
    }

    pub fn bytes_received(&self) -> u64 {
        self.received
    }

    pub fn bytes_sent(&self) -> u64 {
        self.sent
    }

    fn record(
        &mut self,
        joined: std::result::Result<Result<PumpOutcome>, tokio::task::JoinError>,
    ) -> Result<PumpOutcome> {
        let outcome = joined
            .map_err(|e| KubeError::StreamClosedAbnormally(format!("pump task failed: {}", e)))??;
        match outcome.direction {
            Direction::Inbound => self.received += outcome.bytes,
            Direction::Outbound => self.sent += outcome.bytes,
        }
        Ok(outcome)
    }
}
