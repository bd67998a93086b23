//! Process-wide ingestion status.
//!
//! `IngestController` is the single owner of the batch state machine
//! (`IDLE -> RUNNING -> COMPLETE | ERROR`) and its bounded log. It is cheap to
//! clone and shared between the CLI, the HTTP handlers and the running batch.
//! Only one batch may be `RUNNING` at a time; a second start is rejected.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::pipeline::{BatchSummary, IngestError, IngestRequest, Pipeline};

pub const MAX_LOG_ENTRIES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchState {
    Idle,
    Running,
    Complete,
    Error,
}

/// Snapshot returned to pollers.
#[derive(Debug, Clone, Serialize)]
pub struct IngestStatus {
    pub status: BatchState,
    pub logs: Vec<String>,
}

#[derive(Debug)]
struct StatusInner {
    state: BatchState,
    logs: VecDeque<String>,
}

impl StatusInner {
    fn push(&mut self, message: &str) {
        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        self.logs.push_back(format!("[{}] {}", stamp, message));
        while self.logs.len() > MAX_LOG_ENTRIES {
            self.logs.pop_front();
        }
    }

    fn fail(&mut self, message: &str) {
        self.state = BatchState::Error;
        self.push(message);
    }
}

/// Armed while a batch runs. Dropping it before `disarm` (the batch future
/// panicked or was cancelled) moves the controller to ERROR so it never
/// stays RUNNING.
struct BatchGuard {
    controller: Option<IngestController>,
}

impl BatchGuard {
    fn arm(controller: &IngestController) -> Self {
        Self {
            controller: Some(controller.clone()),
        }
    }

    fn disarm(mut self) {
        self.controller = None;
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let Some(controller) = self.controller.take() else {
            return;
        };
        let message = if std::thread::panicking() {
            "Error: batch panicked"
        } else {
            "Error: batch stopped before completing"
        };
        tracing::error!("{}", message);

        // Drop cannot await; fall back to a task if a snapshot holds the lock
        match controller.inner.try_write() {
            Ok(mut inner) => inner.fail(message),
            Err(_) => match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let controller = controller.clone();
                    handle.spawn(async move {
                        controller.inner.write().await.fail(message);
                    });
                }
                Err(_) => tracing::error!("no runtime to record batch failure"),
            },
        }
    }
}

pub enum StartOutcome {
    Started(JoinHandle<()>),
    /// A batch is already running; nothing was changed.
    Rejected,
}

#[derive(Clone)]
pub struct IngestController {
    inner: Arc<RwLock<StatusInner>>,
}

impl Default for IngestController {
    fn default() -> Self {
        Self::new()
    }
}

impl IngestController {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(StatusInner {
                state: BatchState::Idle,
                logs: VecDeque::new(),
            })),
        }
    }

    pub async fn snapshot(&self) -> IngestStatus {
        let inner = self.inner.read().await;
        IngestStatus {
            status: inner.state,
            logs: inner.logs.iter().cloned().collect(),
        }
    }

    /// Append to the batch log (and the tracing output).
    pub async fn log(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::info!(target: "jobsweep::batch", "{}", message);
        self.inner.write().await.push(message);
    }

    /// Move to RUNNING unless a batch already is. The log is reset.
    async fn try_begin(&self, request: &IngestRequest) -> bool {
        let mut inner = self.inner.write().await;
        if inner.state == BatchState::Running {
            return false;
        }
        inner.state = BatchState::Running;
        inner.logs.clear();
        inner.push(&format!("Starting ingestion for {}...", request.source));
        true
    }

    async fn finish(&self, result: &Result<BatchSummary, IngestError>) {
        let mut inner = self.inner.write().await;
        match result {
            Ok(summary) => {
                inner.state = BatchState::Complete;
                inner.push(&format!("Ingestion completed successfully. {}", summary));
            }
            Err(e) => {
                tracing::error!(error = %e, "ingestion batch failed");
                inner.fail(&format!("Error: {}", e));
            }
        }
    }

    /// Run a batch on the current task. `None` if one is already running.
    pub async fn run(
        &self,
        pipeline: &Pipeline,
        request: IngestRequest,
    ) -> Option<Result<BatchSummary, IngestError>> {
        if !self.try_begin(&request).await {
            return None;
        }
        let guard = BatchGuard::arm(self);
        let result = pipeline.run_batch(&request, self).await;
        self.finish(&result).await;
        guard.disarm();
        Some(result)
    }

    /// Start a batch in the background and return immediately.
    pub async fn start(&self, pipeline: Arc<Pipeline>, request: IngestRequest) -> StartOutcome {
        if !self.try_begin(&request).await {
            tracing::info!(source = %request.source, "ingestion already running; start rejected");
            return StartOutcome::Rejected;
        }
        let controller = self.clone();
        let handle = tokio::spawn(async move {
            let guard = BatchGuard::arm(&controller);
            let result = pipeline.run_batch(&request, &controller).await;
            controller.finish(&result).await;
            guard.disarm();
        });
        StartOutcome::Started(handle)
    }
}
