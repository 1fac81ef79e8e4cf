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

use super::state::SessionEvent;
use crate::shared::error::Result;
use futures::future::BoxFuture;
use std::fmt;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

pub type BoxedReader = Pin<Box<dyn AsyncRead + Send>>;
pub type BoxedWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// A bidirectional byte stream.
pub trait Duplex: AsyncRead + AsyncWrite + Send {}

impl<T: AsyncRead + AsyncWrite + Send> Duplex for T {}

pub type BoxedDuplex = Pin<Box<dyn Duplex>>;

/// Releases a remote channel when dropped.
///
/// Transport handles (an attached process, a port forwarder) are moved into
/// the release closure so every exit path frees them, including task abort.
pub struct RemoteGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl RemoteGuard {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    pub fn noop() -> Self {
        Self { release: None }
    }
}

impl Drop for RemoteGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for RemoteGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteGuard")
            .field("armed", &self.release.is_some())
            .finish()
    }
}

/// Remote side of an exec session.
pub struct ExecChannel {
    /// `None` when stdin was not requested
    pub stdin: Option<BoxedWriter>,
    pub stdout: Option<BoxedReader>,
    /// `None` for tty sessions, where stderr is merged into stdout
    pub stderr: Option<BoxedReader>,
    /// Resolves to the remote process exit code
    pub exit: BoxFuture<'static, Result<i32>>,
    pub guard: RemoteGuard,
}

/// One forwarded connection to a pod port.
pub struct Tunnel {
    pub stream: BoxedDuplex,
    pub guard: RemoteGuard,
}

/// Local endpoints a session is wired to.
pub struct LocalIo {
    pub stdin: Option<BoxedReader>,
    pub stdout: BoxedWriter,
    pub stderr: BoxedWriter,
}

impl LocalIo {
    /// Process stdio. Stdin is only attached when asked for.
    pub fn stdio(attach_stdin: bool) -> Self {
        Self {
            stdin: attach_stdin.then(|| Box::pin(tokio::io::stdin()) as BoxedReader),
            stdout: Box::pin(tokio::io::stdout()),
            stderr: Box::pin(tokio::io::stderr()),
        }
    }

    /// Discards all output and provides no input.
    pub fn sink() -> Self {
        Self {
            stdin: None,
            stdout: Box::pin(tokio::io::sink()),
            stderr: Box::pin(tokio::io::sink()),
        }
    }
}

/// Observer for session progress. Sends never block and a dropped receiver
/// is ignored.
#[derive(Debug, Clone, Default)]
pub struct EventSink(Option<UnboundedSender<SessionEvent>>);

impl EventSink {
    pub fn new(sender: UnboundedSender<SessionEvent>) -> Self {
        Self(Some(sender))
    }

    pub fn emit(&self, event: SessionEvent) {
        if let Some(sender) = &self.0 {
            let _ = sender.send(event);
        }
    }
}

/// Everything a streaming verb needs from the caller.
pub struct SessionIo {
    pub local: LocalIo,
    pub cancel: CancellationToken,
    pub events: EventSink,
}

impl SessionIo {
    pub fn new(local: LocalIo, cancel: CancellationToken) -> Self {
        Self {
            local,
            cancel,
            events: EventSink::default(),
        }
    }

    pub fn with_events(mut self, sender: UnboundedSender<SessionEvent>) -> Self {
        self.events = EventSink::new(sender);
        self
    }

    /// For bounded verbs, which never touch local streams.
    pub fn detached() -> Self {
        Self::new(LocalIo::sink(), CancellationToken::new())
    }
}
