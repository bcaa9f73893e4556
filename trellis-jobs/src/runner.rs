//! Synchronization jobs: a queue, one processor, one workspace lock.
//!
//! Jobs run strictly one after another on a single processor task. Each job
//! takes the workspace mutex before touching anything and keeps it until its
//! terminal status has been reported, so neither another job nor a structural
//! operation submitted through [`JobRunner::with_workspace`] can interleave.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch, Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use trellis_core::{ProjectName, WorkspaceError, WorkspaceSession};
use trellis_sync::{pipeline, ModelFetcher, PipelineOutcome, SyncError, SyncScope};

use crate::error::JobError;

const QUEUE_CAPACITY: usize = 64;

/// Terminal status of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Succeeded(JobSummary),
    Failed(String),
    /// Not an error; callers should not present it as one.
    Cancelled,
}

/// Lifecycle of a job as observed through its [`JobHandle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Finished(JobStatus),
}

impl JobState {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobState::Finished(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSummary {
    pub label: String,
    pub mutations: usize,
    pub imported: Vec<ProjectName>,
    pub uncoupled: Vec<ProjectName>,
    /// Set when the run was skipped, e.g. no known builds.
    pub skipped: Option<String>,
    pub duration_ms: u128,
}

impl fmt::Display for JobSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(reason) = &self.skipped {
            return write!(f, "{}: skipped ({reason})", self.label);
        }
        write!(
            f,
            "{}: {} change(s), {} imported, {} uncoupled",
            self.label,
            self.mutations,
            self.imported.len(),
            self.uncoupled.len()
        )
    }
}

/// Invoked exactly once with the terminal status of a job.
pub type StatusCallback = Box<dyn FnOnce(&JobStatus) + Send + 'static>;

struct SyncJob {
    id: u64,
    scope: SyncScope,
    cancel: CancellationToken,
    state: watch::Sender<JobState>,
    callback: Option<StatusCallback>,
}

/// Handle to a scheduled job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: u64,
    label: String,
    cancel: CancellationToken,
    state: watch::Receiver<JobState>,
}

impl JobHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Request cancellation. A pending job ends `Cancelled` without touching
    /// the workspace; a running one stops at the next module boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> JobState {
        self.state.borrow().clone()
    }

    /// Wait for the terminal status.
    pub async fn wait(mut self) -> JobStatus {
        loop {
            let current = self.state.borrow_and_update().clone();
            if let JobState::Finished(status) = current {
                return status;
            }
            if self.state.changed().await.is_err() {
                return match self.state.borrow().clone() {
                    JobState::Finished(status) => status,
                    _ => JobStatus::Failed("job runner stopped before the job finished".into()),
                };
            }
        }
    }
}

/// Schedules synchronization jobs against one workspace.
pub struct JobRunner<W: WorkspaceSession> {
    workspace: Arc<Mutex<W>>,
    queue: mpsc::Sender<SyncJob>,
    shutdown: broadcast::Sender<()>,
    root_token: CancellationToken,
    processor: std::sync::Mutex<Option<JoinHandle<Result<(), JobError>>>>,
    next_id: AtomicU64,
}

impl<W: WorkspaceSession> JobRunner<W> {
    /// Spawn the processor task. Must be called inside a tokio runtime.
    pub fn start(workspace: W, fetcher: Arc<dyn ModelFetcher>) -> Self {
        let workspace = Arc::new(Mutex::new(workspace));
        let (queue, queue_rx) = mpsc::channel::<SyncJob>(QUEUE_CAPACITY);
        let (shutdown, _) = broadcast::channel::<()>(16);

        let processor = {
            let workspace = workspace.clone();
            let shutdown_rx = shutdown.subscribe();
            tokio::spawn(processor_task(workspace, fetcher, queue_rx, shutdown_rx))
        };

        Self {
            workspace,
            queue,
            shutdown,
            root_token: CancellationToken::new(),
            processor: std::sync::Mutex::new(Some(processor)),
            next_id: AtomicU64::new(1),
        }
    }

    /// Queue a run of `scope`. `callback` receives its terminal status.
    pub async fn schedule(
        &self,
        scope: SyncScope,
        callback: Option<StatusCallback>,
    ) -> Result<JobHandle, JobError> {
        if self.root_token.is_cancelled() {
            return Err(JobError::ShutDown);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = self.root_token.child_token();
        let (state_tx, state_rx) = watch::channel(JobState::Pending);
        let handle = JobHandle {
            id,
            label: scope.label(),
            cancel: cancel.clone(),
            state: state_rx,
        };
        tracing::debug!(job = id, scope = %handle.label, "job scheduled");
        self.queue
            .send(SyncJob {
                id,
                scope,
                cancel,
                state: state_tx,
                callback,
            })
            .await
            .map_err(|_| JobError::ChannelClosed("job queue"))?;
        Ok(handle)
    }

    /// Run a structural workspace operation under the workspace lock.
    pub async fn with_workspace<F, R>(&self, f: F) -> Result<R, JobError>
    where
        F: FnOnce(&mut W) -> R + Send + 'static,
        R: Send + 'static,
    {
        let mut guard = self.workspace.clone().lock_owned().await;
        tokio::task::spawn_blocking(move || f(&mut guard))
            .await
            .map_err(|err| JobError::Join {
                task: "workspace operation",
                reason: err.to_string(),
            })
    }

    /// Cancel the running job and every pending one, then stop the processor.
    pub async fn shutdown(&self) -> Result<(), JobError> {
        self.root_token.cancel();
        let _ = self.shutdown.send(());
        let handle = self.processor.lock().ok().and_then(|mut slot| slot.take());
        match handle {
            Some(handle) => handle_join("job processor", handle.await),
            None => Ok(()),
        }
    }
}

async fn processor_task<W: WorkspaceSession>(
    workspace: Arc<Mutex<W>>,
    fetcher: Arc<dyn ModelFetcher>,
    mut queue_rx: mpsc::Receiver<SyncJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), JobError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = queue_rx.recv() => {
                let Some(job) = maybe_job else { break };
                run_job(&workspace, &fetcher, job).await;
            }
        }
    }

    queue_rx.close();
    while let Ok(job) = queue_rx.try_recv() {
        finish(job, JobStatus::Cancelled);
    }
    Ok(())
}

async fn run_job<W: WorkspaceSession>(
    workspace: &Arc<Mutex<W>>,
    fetcher: &Arc<dyn ModelFetcher>,
    job: SyncJob,
) {
    if job.cancel.is_cancelled() {
        tracing::info!(job = job.id, "job cancelled before it started");
        finish(job, JobStatus::Cancelled);
        return;
    }

    let guard = workspace.clone().lock_owned().await;
    job.state.send_replace(JobState::Running);
    let label = job.scope.label();
    tracing::info!(job = job.id, scope = %label, "job started");
    let started = Instant::now();

    let scope = job.scope.clone();
    let cancel = job.cancel.clone();
    let fetcher = fetcher.clone();
    let joined = tokio::task::spawn_blocking(move || {
        let mut guard = guard;
        let outcome = apply(&mut guard, fetcher.as_ref(), &scope, &cancel);
        (guard, outcome)
    })
    .await;

    match joined {
        Ok((guard, outcome)) => {
            let status = status_for(label, outcome, started.elapsed());
            finish(job, status);
            // Released only once the status is out.
            drop(guard);
        }
        Err(err) => {
            finish(job, JobStatus::Failed(format!("job task join failure: {err}")));
        }
    }
}

/// Run the pipeline and persist whatever it applied, cancelled or not.
fn apply<W: WorkspaceSession>(
    guard: &mut OwnedMutexGuard<W>,
    fetcher: &dyn ModelFetcher,
    scope: &SyncScope,
    cancel: &CancellationToken,
) -> Result<Result<PipelineOutcome, SyncError>, WorkspaceError> {
    let session: &mut W = guard;
    let outcome = {
        let (workspace, configs) = session.parts();
        pipeline::run(workspace, configs, fetcher, scope, cancel)
    };
    session.flush()?;
    Ok(outcome)
}

fn status_for(
    label: String,
    outcome: Result<Result<PipelineOutcome, SyncError>, WorkspaceError>,
    elapsed: Duration,
) -> JobStatus {
    match outcome {
        Err(err) => JobStatus::Failed(format!("cannot save workspace: {err}")),
        Ok(Err(err)) if err.is_cancelled() => JobStatus::Cancelled,
        Ok(Err(err)) => JobStatus::Failed(err.to_string()),
        Ok(Ok(PipelineOutcome::Skipped { reason })) => JobStatus::Succeeded(JobSummary {
            label,
            mutations: 0,
            imported: vec![],
            uncoupled: vec![],
            skipped: Some(reason),
            duration_ms: elapsed.as_millis(),
        }),
        Ok(Ok(PipelineOutcome::Applied(report))) => {
            if !report.failures.is_empty() {
                return JobStatus::Failed(report.failure_summary());
            }
            JobStatus::Succeeded(JobSummary {
                label,
                mutations: report.mutations.len(),
                imported: report.imported().into_iter().cloned().collect(),
                uncoupled: report.uncoupled().into_iter().cloned().collect(),
                skipped: None,
                duration_ms: elapsed.as_millis(),
            })
        }
    }
}

fn finish(job: SyncJob, status: JobStatus) {
    match &status {
        JobStatus::Succeeded(summary) => {
            tracing::info!(
                job = job.id,
                mutations = summary.mutations,
                imported = summary.imported.len(),
                uncoupled = summary.uncoupled.len(),
                duration_ms = summary.duration_ms,
                "job succeeded",
            );
        }
        JobStatus::Failed(cause) => tracing::error!(job = job.id, cause = %cause, "job failed"),
        JobStatus::Cancelled => tracing::info!(job = job.id, "job cancelled"),
    }
    if let Some(callback) = job.callback {
        callback(&status);
    }
    job.state.send_replace(JobState::Finished(status));
}

fn handle_join(
    task: &'static str,
    result: Result<Result<(), JobError>, tokio::task::JoinError>,
) -> Result<(), JobError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(JobError::Join {
            task,
            reason: err.to_string(),
        }),
    }
}
