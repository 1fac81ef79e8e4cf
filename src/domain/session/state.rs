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

use super::io::EventSink;
use crate::infrastructure::constants::EXIT_CODE_CANCELLED;
use serde::Serialize;
use std::fmt;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SessionState {
    Initializing,
    Established,
    Active,
    Closing,
    Closed,
    /// Absorbing failure state; the triggering error is returned to the caller
    Errored,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Errored)
    }

    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Initializing, Established | Closing | Errored)
                | (Established, Active | Closing | Errored)
                | (Active, Closing | Errored)
                | (Closing, Closed | Errored)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StreamKind {
    Logs,
    Exec,
    PortForward,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StreamKind::Logs => "logs",
            StreamKind::Exec => "exec",
            StreamKind::PortForward => "port-forward",
        })
    }
}

/// How a session that reached `Closed` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionExit {
    /// The remote side finished (log EOF, all forwarders done)
    Completed,
    Cancelled,
    /// Remote process exit status (exec)
    Exited(i32),
}

impl SessionExit {
    pub fn exit_code(&self) -> i32 {
        match self {
            SessionExit::Completed => 0,
            SessionExit::Cancelled => EXIT_CODE_CANCELLED,
            SessionExit::Exited(code) => *code,
        }
    }
}

/// Progress notifications for an observer of a live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged {
        session: Uuid,
        state: SessionState,
    },
    Listening {
        local: SocketAddr,
        remote_port: u16,
    },
    ConnectionOpened {
        peer: SocketAddr,
        remote_port: u16,
    },
    ConnectionClosed {
        peer: SocketAddr,
        remote_port: u16,
        bytes_sent: u64,
        bytes_received: u64,
    },
    ConnectionFailed {
        peer: SocketAddr,
        remote_port: u16,
        reason: String,
    },
}

/// A live session: identity, state machine and cancellation scope.
#[derive(Debug)]
pub struct StreamSession {
    pub id: Uuid,
    pub kind: StreamKind,
    pub(crate) cancel: CancellationToken,
    pub(crate) events: EventSink,
    state: SessionState,
    history: Vec<SessionState>,
}

impl StreamSession {
    /// `cancel` should be a child of the caller's token so releasing this
    /// session never cancels the caller.
    pub fn new(kind: StreamKind, cancel: CancellationToken, events: EventSink) -> Self {
        let session = Self {
            id: Uuid::new_v4(),
            kind,
            cancel,
            events,
            state: SessionState::Initializing,
            history: vec![SessionState::Initializing],
        };
        session.events.emit(SessionEvent::StateChanged {
            session: session.id,
            state: session.state,
        });
        session
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    /// Moves to `next` if the state machine allows it. Returns whether the
    /// transition happened.
    pub fn transition(&mut self, next: SessionState) -> bool {
        if !self.state.can_transition_to(next) {
            if self.state != next {
                warn!(
                    session = %self.id,
                    "Ignoring transition {} -> {}", self.state, next
                );
            }
            return false;
        }

        debug!(session = %self.id, kind = %self.kind, "{} -> {}", self.state, next);
        self.state = next;
        self.history.push(next);
        self.events.emit(SessionEvent::StateChanged {
            session: self.id,
            state: next,
        });
        true
    }

    pub fn into_history(self) -> Vec<SessionState> {
        self.history
    }
}
