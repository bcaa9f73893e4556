//! Turns project removals into background refreshes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle as TaskHandle;
use tokio::time::{sleep_until, Instant};

use trellis_core::{ProjectName, WorkspaceSession};
use trellis_sync::SyncScope;

use crate::error::JobError;
use crate::runner::{JobHandle, JobRunner};

/// Removals closer together than this collapse into one refresh.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// Structural changes made to the workspace outside a synchronization run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceEvent {
    ProjectAdded(ProjectName),
    ProjectRemoved(ProjectName),
}

/// Schedules a `RefreshAfterRemoval` job after a burst of removals settles.
pub struct RemovalListener {
    events: mpsc::UnboundedSender<WorkspaceEvent>,
    task: TaskHandle<Result<Vec<JobHandle>, JobError>>,
}

impl RemovalListener {
    pub fn spawn<W: WorkspaceSession>(runner: Arc<JobRunner<W>>) -> Self {
        Self::spawn_with_window(runner, DEBOUNCE_WINDOW)
    }

    pub fn spawn_with_window<W: WorkspaceSession>(
        runner: Arc<JobRunner<W>>,
        window: Duration,
    ) -> Self {
        let (events, events_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(listen(runner, events_rx, window));
        Self { events, task }
    }

    pub fn notify(&self, event: WorkspaceEvent) -> Result<(), JobError> {
        self.events
            .send(event)
            .map_err(|_| JobError::ChannelClosed("workspace events"))
    }

    /// Stop listening. A refresh still waiting out its window is scheduled
    /// right away. Returns every job the listener scheduled.
    pub async fn stop(self) -> Result<Vec<JobHandle>, JobError> {
        drop(self.events);
        match self.task.await {
            Ok(inner) => inner,
            Err(err) => Err(JobError::Join {
                task: "removal listener",
                reason: err.to_string(),
            }),
        }
    }
}

async fn listen<W: WorkspaceSession>(
    runner: Arc<JobRunner<W>>,
    mut events_rx: mpsc::UnboundedReceiver<WorkspaceEvent>,
    window: Duration,
) -> Result<Vec<JobHandle>, JobError> {
    let mut scheduled = Vec::new();
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            event = events_rx.recv() => match event {
                Some(WorkspaceEvent::ProjectRemoved(name)) => {
                    tracing::debug!(project = %name, "project removed; refresh pending");
                    deadline = Some(Instant::now() + window);
                }
                Some(WorkspaceEvent::ProjectAdded(name)) => {
                    tracing::debug!(project = %name, "project added; nothing to refresh");
                }
                None => break,
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                deadline = None;
                scheduled.push(schedule_refresh(&runner).await?);
            }
        }
    }

    if deadline.is_some() {
        scheduled.push(schedule_refresh(&runner).await?);
    }
    Ok(scheduled)
}

async fn schedule_refresh<W: WorkspaceSession>(
    runner: &JobRunner<W>,
) -> Result<JobHandle, JobError> {
    let handle = runner.schedule(SyncScope::RefreshAfterRemoval, None).await?;
    tracing::info!(job = handle.id(), "refresh after removal scheduled");
    Ok(handle)
}
