//! Session state owned by the runner.

use serde::{Deserialize, Serialize};

use crate::logs::{LogEvent, LogStream, TerminalReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Succeeded,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        self != SessionStatus::Running
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub stream: LogStream,
    pub line: String,
}

/// One run of generated code: its ordered log and its outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationSession {
    pub session_id: String,
    pub pipeline_id: String,
    pub status: SessionStatus,
    pub logs: Vec<LogLine>,
    pub exit_code: Option<i32>,
    pub reason: Option<TerminalReason>,
    #[serde(skip)]
    output_bytes: usize,
    #[serde(skip)]
    truncated: bool,
}

pub(crate) const TRUNCATION_MARKER: &str = "[output truncated: limit reached]";

impl SimulationSession {
    pub fn new(session_id: impl Into<String>, pipeline_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            pipeline_id: pipeline_id.into(),
            status: SessionStatus::Running,
            logs: Vec::new(),
            exit_code: None,
            reason: None,
            output_bytes: 0,
            truncated: false,
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Record a line and return the event to publish for it.
    ///
    /// Program output beyond `max_bytes` is dropped; the first dropped line
    /// is replaced by a single system marker. System lines are never dropped.
    pub(crate) fn append(
        &mut self,
        stream: LogStream,
        line: String,
        max_bytes: usize,
    ) -> Option<LogEvent> {
        if self.status.is_terminal() {
            return None;
        }
        if stream != LogStream::System {
            if self.truncated {
                return None;
            }
            if self.output_bytes + line.len() > max_bytes {
                self.truncated = true;
                return Some(self.push(LogStream::System, TRUNCATION_MARKER.to_string()));
            }
            self.output_bytes += line.len();
        }
        Some(self.push(stream, line))
    }

    fn push(&mut self, stream: LogStream, line: String) -> LogEvent {
        self.logs.push(LogLine {
            stream,
            line: line.clone(),
        });
        LogEvent::Log { stream, line }
    }

    /// Transition to a terminal state. Only the first call has an effect.
    pub(crate) fn finish(
        &mut self,
        exit_code: Option<i32>,
        reason: TerminalReason,
    ) -> Option<LogEvent> {
        if self.status.is_terminal() {
            return None;
        }
        let success = reason == TerminalReason::Exited && exit_code == Some(0);
        self.status = if success {
            SessionStatus::Succeeded
        } else {
            SessionStatus::Failed
        };
        self.exit_code = exit_code;
        self.reason = Some(reason);
        Some(LogEvent::Complete {
            success,
            exit_code,
            reason,
        })
    }
}
