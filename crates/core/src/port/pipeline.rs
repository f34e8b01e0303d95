// Pipeline Routine Port
// Abstraction over the routine that fetches and converts one playlist

use crate::domain::{ImportPayload, ImportResult, JobId, ProgressUpdate};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Pipeline errors. `Display` is what ends up in the job's `error` field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("{0}")]
    Failed(String),

    #[error("Importer could not be started: {0}")]
    Spawn(String),

    #[error("Importer IO error: {0}")]
    Io(String),

    #[error("Importer produced invalid output: {0}")]
    InvalidOutput(String),
}

/// Receives progress for a given job (implemented by the job registry)
pub trait ProgressSink: Send + Sync {
    fn publish(&self, job_id: &JobId, update: ProgressUpdate);
}

/// One-directional, non-blocking progress channel bound to one job
#[derive(Clone)]
pub struct ProgressReporter {
    job_id: JobId,
    sink: Arc<dyn ProgressSink>,
}

impl ProgressReporter {
    pub fn new(job_id: impl Into<String>, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            job_id: job_id.into(),
            sink,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Fire-and-forget; updates are applied in the order they are reported
    pub fn report(&self, update: ProgressUpdate) {
        self.sink.publish(&self.job_id, update);
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("job_id", &self.job_id)
            .finish()
    }
}

/// Pipeline routine: imports one playlist, reporting progress as it goes
///
/// Must be safe to call again with a payload it has already seen.
#[async_trait]
pub trait PlaylistImporter: Send + Sync {
    async fn run(
        &self,
        payload: &ImportPayload,
        progress: ProgressReporter,
    ) -> Result<ImportResult, PipelineError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::{Notify, Semaphore};

    /// How a scripted run ends
    #[derive(Debug, Clone)]
    pub enum ScriptedOutcome {
        Succeed(serde_json::Value),
        Fail(String),
        Panic(String),
    }

    /// Progress to emit, then an outcome
    #[derive(Debug, Clone)]
    pub struct Script {
        pub steps: Vec<ProgressUpdate>,
        pub outcome: ScriptedOutcome,
    }

    impl Script {
        pub fn succeed(steps: Vec<ProgressUpdate>, result: serde_json::Value) -> Self {
            Self {
                steps,
                outcome: ScriptedOutcome::Succeed(result),
            }
        }

        pub fn fail(steps: Vec<ProgressUpdate>, message: impl Into<String>) -> Self {
            Self {
                steps,
                outcome: ScriptedOutcome::Fail(message.into()),
            }
        }

        pub fn panic(message: impl Into<String>) -> Self {
            Self {
                steps: Vec::new(),
                outcome: ScriptedOutcome::Panic(message.into()),
            }
        }
    }

    /// Mock importer replaying scripts, optionally held mid-flight by a gate
    pub struct ScriptedImporter {
        default_script: Script,
        by_playlist: Mutex<HashMap<String, Script>>,
        gate: Option<Arc<Notify>>,
        started: Semaphore,
        call_count: AtomicUsize,
    }

    impl ScriptedImporter {
        pub fn new(default_script: Script) -> Self {
            Self {
                default_script,
                by_playlist: Mutex::new(HashMap::new()),
                gate: None,
                started: Semaphore::new(0),
                call_count: AtomicUsize::new(0),
            }
        }

        pub fn new_success() -> Self {
            Self::new(Script::succeed(Vec::new(), serde_json::json!({"imported": 0})))
        }

        /// Use `script` for runs whose playlist URL equals `playlist_url`
        pub fn with_script_for(self, playlist_url: impl Into<String>, script: Script) -> Self {
            self.by_playlist
                .lock()
                .unwrap()
                .insert(playlist_url.into(), script);
            self
        }

        /// After emitting its steps, each run waits for `gate` before finishing
        pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
            self.gate = Some(gate);
            self
        }

        /// Wait until one more run has reported its steps
        pub async fn wait_started(&self) {
            if let Ok(permit) = self.started.acquire().await {
                permit.forget();
            }
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PlaylistImporter for ScriptedImporter {
        async fn run(
            &self,
            payload: &ImportPayload,
            progress: ProgressReporter,
        ) -> Result<ImportResult, PipelineError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);

            let script = self
                .by_playlist
                .lock()
                .unwrap()
                .get(&payload.playlist_url)
                .cloned()
                .unwrap_or_else(|| self.default_script.clone());

            for step in &script.steps {
                progress.report(*step);
            }

            self.started.add_permits(1);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }

            match script.outcome {
                ScriptedOutcome::Succeed(value) => Ok(ImportResult::new(value)),
                ScriptedOutcome::Fail(msg) => Err(PipelineError::Failed(msg)),
                ScriptedOutcome::Panic(msg) => {
                    panic!("{}", msg); // Actually panic for panic isolation testing
                }
            }
        }
    }

    /// Sink that records every update it receives
    #[derive(Default)]
    pub struct RecordingSink {
        updates: Mutex<Vec<(JobId, ProgressUpdate)>>,
    }

    impl RecordingSink {
        pub fn updates(&self) -> Vec<(JobId, ProgressUpdate)> {
            self.updates.lock().unwrap().clone()
        }
    }

    impl ProgressSink for RecordingSink {
        fn publish(&self, job_id: &JobId, update: ProgressUpdate) {
            self.updates.lock().unwrap().push((job_id.clone(), update));
        }
    }
}
