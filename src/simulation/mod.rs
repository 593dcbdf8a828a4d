//! Simulation runner: one isolated run per pipeline, streamed to a [`LogChannel`].
//!
//! [`SimulationRunner::start`] returns as soon as the session exists; the run
//! proceeds on a tokio task and must therefore be called from within a tokio
//! runtime. Each run holds its pipeline's lock until the session turns
//! terminal, so a second `start` for the same pipeline fails fast.

pub mod config;
mod sandbox;
pub mod session;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

pub use config::SimulationConfig;
pub use sandbox::Outcome;
pub use session::{LogLine, SessionStatus, SimulationSession};

use crate::error::SimulationError;
use crate::logs::{LogChannel, Subscription};

/// Per-run settings on top of [`SimulationConfig`].
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    /// Extra environment variables, e.g. resolved secrets.
    pub env: BTreeMap<String, String>,
}

struct SessionEntry {
    session: Arc<Mutex<SimulationSession>>,
    cancel: CancellationToken,
}

struct RunnerInner {
    config: SimulationConfig,
    channel: LogChannel,
    /// pipeline id → running session id.
    locks: Mutex<HashMap<String, String>>,
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Releases a pipeline's run lock, unless it has since been taken by another session.
struct PipelineLockGuard {
    inner: Arc<RunnerInner>,
    pipeline_id: String,
    session_id: String,
}

impl Drop for PipelineLockGuard {
    fn drop(&mut self) {
        let mut locks = lock(&self.inner.locks);
        if locks.get(&self.pipeline_id) == Some(&self.session_id) {
            locks.remove(&self.pipeline_id);
        }
    }
}

#[derive(Clone)]
pub struct SimulationRunner {
    inner: Arc<RunnerInner>,
}

impl Default for SimulationRunner {
    fn default() -> Self {
        Self::new(SimulationConfig::default())
    }
}

impl SimulationRunner {
    pub fn new(config: SimulationConfig) -> Self {
        let channel = LogChannel::new(config.subscriber_buffer);
        Self {
            inner: Arc::new(RunnerInner {
                config,
                channel,
                locks: Mutex::new(HashMap::new()),
                sessions: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.inner.config
    }

    pub fn channel(&self) -> &LogChannel {
        &self.inner.channel
    }

    pub fn start(
        &self,
        pipeline_id: &str,
        code: impl Into<String>,
    ) -> Result<String, SimulationError> {
        self.start_with(pipeline_id, code, LaunchOptions::default())
    }

    /// Start a run of `code` for `pipeline_id` and return its session id.
    pub fn start_with(
        &self,
        pipeline_id: &str,
        code: impl Into<String>,
        options: LaunchOptions,
    ) -> Result<String, SimulationError> {
        let session_id = Uuid::new_v4().to_string();
        {
            let mut locks = lock(&self.inner.locks);
            if let Some(running) = locks.get(pipeline_id) {
                tracing::info!(
                    pipeline_id,
                    running = %running,
                    "simulation rejected: already running"
                );
                return Err(SimulationError::Conflict {
                    pipeline_id: pipeline_id.to_string(),
                    session_id: running.clone(),
                });
            }
            locks.insert(pipeline_id.to_string(), session_id.clone());
        }
        let guard = PipelineLockGuard {
            inner: Arc::clone(&self.inner),
            pipeline_id: pipeline_id.to_string(),
            session_id: session_id.clone(),
        };

        let session = Arc::new(Mutex::new(SimulationSession::new(&session_id, pipeline_id)));
        let cancel = CancellationToken::new();
        self.inner.channel.open(&session_id);
        lock(&self.inner.sessions).insert(
            session_id.clone(),
            SessionEntry {
                session: Arc::clone(&session),
                cancel: cancel.clone(),
            },
        );

        let span = tracing::info_span!("simulation", pipeline_id, session_id = %session_id);
        let run = Run {
            inner: Arc::clone(&self.inner),
            session_id: session_id.clone(),
            session,
            cancel,
            code: code.into(),
            env: options.env,
        };
        tokio::spawn(run.execute(guard).instrument(span));

        Ok(session_id)
    }

    /// Cancel a run. Stopping a finished session is a no-op.
    pub fn stop(&self, session_id: &str) -> Result<(), SimulationError> {
        let sessions = lock(&self.inner.sessions);
        let entry = sessions
            .get(session_id)
            .ok_or_else(|| SimulationError::SessionNotFound(session_id.to_string()))?;
        if !entry.cancel.is_cancelled() {
            tracing::info!(session_id, "stopping simulation");
            entry.cancel.cancel();
        }
        Ok(())
    }

    /// Snapshot of a session, while it is running or retained.
    pub fn session(&self, session_id: &str) -> Option<SimulationSession> {
        lock(&self.inner.sessions)
            .get(session_id)
            .map(|entry| lock(&entry.session).clone())
    }

    /// Session currently holding `pipeline_id`'s run lock.
    pub fn active_session(&self, pipeline_id: &str) -> Option<String> {
        lock(&self.inner.locks).get(pipeline_id).cloned()
    }

    pub fn subscribe(&self, session_id: &str) -> Option<Subscription> {
        self.inner.channel.subscribe(session_id)
    }
}

struct Run {
    inner: Arc<RunnerInner>,
    session_id: String,
    session: Arc<Mutex<SimulationSession>>,
    cancel: CancellationToken,
    code: String,
    env: BTreeMap<String, String>,
}

impl Run {
    async fn execute(self, guard: PipelineLockGuard) {
        tracing::info!("simulation started");
        let config = &self.inner.config;
        let channel = &self.inner.channel;

        let outcome = sandbox::execute(config, &self.code, &self.env, &self.cancel, |stream, line| {
            let event = lock(&self.session).append(stream, line, config.max_output_bytes);
            if let Some(event) = event {
                channel.publish(&self.session_id, event);
            }
        })
        .await;

        let terminal = lock(&self.session).finish(outcome.exit_code, outcome.reason);
        // Free the pipeline before announcing completion so a subscriber
        // reacting to the terminal event can start the next run.
        drop(guard);
        if let Some(event) = terminal {
            channel.publish(&self.session_id, event);
        }
        tracing::info!(
            exit_code = ?outcome.exit_code,
            reason = ?outcome.reason,
            "simulation finished"
        );

        let retention = config.retention();
        if channel.close_after(&self.session_id, retention).await.is_err() {
            channel.close(&self.session_id);
        }
        lock(&self.inner.sessions).remove(&self.session_id);
    }
}
