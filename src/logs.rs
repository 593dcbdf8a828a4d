//! Per-session log fan-out.
//!
//! Each simulation session owns a topic backed by a bounded
//! `tokio::sync::broadcast` ring. Publishing never blocks: a subscriber that
//! falls behind receives a [`LogEvent::Gap`] marker and resumes at the oldest
//! retained event. The terminal event is retained per topic so late
//! subscribers still learn the outcome.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
    /// Lines written by the runner itself (launch errors, truncation, timeout).
    System,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminalReason {
    Exited,
    TimedOut,
    Cancelled,
    LaunchFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LogEvent {
    Log {
        stream: LogStream,
        line: String,
    },
    /// This subscriber fell behind and `missed` events were dropped for it.
    Gap {
        missed: u64,
    },
    #[serde(rename_all = "camelCase")]
    Complete {
        success: bool,
        exit_code: Option<i32>,
        reason: TerminalReason,
    },
}

impl LogEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LogEvent::Complete { .. })
    }
}

struct Topic {
    sender: broadcast::Sender<LogEvent>,
    terminal: Option<LogEvent>,
}

/// Pub/sub keyed by session id.
#[derive(Clone)]
pub struct LogChannel {
    topics: Arc<Mutex<HashMap<String, Topic>>>,
    buffer: usize,
}

impl LogChannel {
    /// `buffer` bounds how many events each subscriber may lag behind.
    pub fn new(buffer: usize) -> Self {
        Self {
            topics: Arc::new(Mutex::new(HashMap::new())),
            buffer: buffer.max(1),
        }
    }

    fn topics(&self) -> MutexGuard<'_, HashMap<String, Topic>> {
        self.topics.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create the topic for `session_id`. No-op if it already exists.
    pub fn open(&self, session_id: &str) {
        let mut topics = self.topics();
        if !topics.contains_key(session_id) {
            let (sender, _) = broadcast::channel(self.buffer);
            topics.insert(
                session_id.to_string(),
                Topic {
                    sender,
                    terminal: None,
                },
            );
            tracing::debug!(session_id, "log topic opened");
        }
    }

    /// Publish `event` to every current subscriber.
    ///
    /// Returns `false` when the topic does not exist or has already
    /// completed; nothing is published after the terminal event.
    pub fn publish(&self, session_id: &str, event: LogEvent) -> bool {
        let mut topics = self.topics();
        let Some(topic) = topics.get_mut(session_id) else {
            return false;
        };
        if topic.terminal.is_some() {
            return false;
        }
        if event.is_terminal() {
            topic.terminal = Some(event.clone());
        }
        // No receivers is fine; late subscribers get the retained terminal.
        let _ = topic.sender.send(event);
        true
    }

    /// Subscribe from now on. After completion, yields only the terminal event.
    pub fn subscribe(&self, session_id: &str) -> Option<Subscription> {
        let topics = self.topics();
        let topic = topics.get(session_id)?;
        let state = match &topic.terminal {
            Some(terminal) => State::Replay(Some(terminal.clone())),
            None => State::Live(topic.sender.subscribe()),
        };
        Some(Subscription { state })
    }

    pub fn is_open(&self, session_id: &str) -> bool {
        self.topics().contains_key(session_id)
    }

    /// Discard the topic. Live subscribers drain what they have buffered and end.
    pub fn close(&self, session_id: &str) {
        if self.topics().remove(session_id).is_some() {
            tracing::debug!(session_id, "log topic closed");
        }
    }

    /// Discard the topic once `retention` has elapsed.
    pub fn close_after(&self, session_id: &str, retention: Duration) -> JoinHandle<()> {
        let channel = self.clone();
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(retention).await;
            channel.close(&session_id);
        })
    }
}

enum State {
    Live(broadcast::Receiver<LogEvent>),
    Replay(Option<LogEvent>),
    Done,
}

/// One subscriber's ordered view of a session's events.
pub struct Subscription {
    state: State,
}

impl Subscription {
    /// Next event, or `None` once the terminal event has been delivered or
    /// the topic was closed.
    pub async fn recv(&mut self) -> Option<LogEvent> {
        match &mut self.state {
            State::Live(receiver) => match receiver.recv().await {
                Ok(event) => {
                    if event.is_terminal() {
                        self.state = State::Done;
                    }
                    Some(event)
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::trace!(missed, "log subscriber lagged");
                    Some(LogEvent::Gap { missed })
                }
                Err(RecvError::Closed) => {
                    self.state = State::Done;
                    None
                }
            },
            State::Replay(terminal) => {
                let event = terminal.take();
                self.state = State::Done;
                event
            }
            State::Done => None,
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = LogEvent> + Send {
        futures::stream::unfold(self, |mut sub| async move {
            sub.recv().await.map(|event| (event, sub))
        })
    }
}
