//! Periodic ingestion driven by `tokio-cron-scheduler`.
//!
//! The poller owns at most one live job registration. Ticks and manual
//! `poll_once` calls share a busy guard, so a slow cycle causes the next
//! tick to be skipped rather than overlapped.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::service::{CyclePlan, CycleSummary, ReviewService, StopReason};

pub const POLL_JOB_NAME: &str = "review-poll";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PollerState {
    Stopped,
    Running { interval_minutes: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PollOutcome {
    Completed(CycleSummary),
    SkippedBusy,
    SkippedNoCredentials,
}

#[derive(Debug, Error)]
pub enum PollerError {
    #[error("poller is already running")]
    AlreadyRunning,
    #[error("polling interval must be at least 1 minute, got {0}")]
    InvalidInterval(u32),
    #[error("scheduler error: {0}")]
    Scheduler(#[from] JobSchedulerError),
}

struct CycleRunner {
    service: Arc<ReviewService>,
    plan: CyclePlan,
    busy: Mutex<()>,
}

impl CycleRunner {
    async fn run(&self) -> PollOutcome {
        let Ok(_guard) = self.busy.try_lock() else {
            warn!(job = POLL_JOB_NAME, "previous ingestion cycle still running; skipping");
            return PollOutcome::SkippedBusy;
        };
        if !self.service.marketplace().validate_credentials() {
            warn!(job = POLL_JOB_NAME, "marketplace credentials missing; skipping poll");
            return PollOutcome::SkippedNoCredentials;
        }
        PollOutcome::Completed(self.service.run_ingestion_cycle(self.plan).await)
    }
}

struct ActiveSchedule {
    scheduler: JobScheduler,
    job_id: Uuid,
}

pub struct ReviewPoller {
    runner: Arc<CycleRunner>,
    interval_minutes: u32,
    active: Option<ActiveSchedule>,
}

impl ReviewPoller {
    pub fn new(service: Arc<ReviewService>, plan: CyclePlan, interval_minutes: u32) -> Self {
        Self {
            runner: Arc::new(CycleRunner {
                service,
                plan,
                busy: Mutex::new(()),
            }),
            interval_minutes: interval_minutes.max(1),
            active: None,
        }
    }

    pub fn state(&self) -> PollerState {
        match self.active {
            Some(_) => PollerState::Running {
                interval_minutes: self.interval_minutes,
            },
            None => PollerState::Stopped,
        }
    }

    pub fn interval_minutes(&self) -> u32 {
        self.interval_minutes
    }

    /// Registers the repeating job, starts the scheduler, then polls once.
    pub async fn start(&mut self) -> Result<PollOutcome, PollerError> {
        if self.active.is_some() {
            return Err(PollerError::AlreadyRunning);
        }

        let scheduler = JobScheduler::new().await?;
        let job_id = scheduler.add(self.poll_job()?).await?;
        scheduler.start().await?;
        self.active = Some(ActiveSchedule { scheduler, job_id });
        info!(
            job = POLL_JOB_NAME,
            interval_minutes = self.interval_minutes,
            "review poller started"
        );

        Ok(self.poll_once().await)
    }

    /// Changes the interval. While running the job registration is replaced;
    /// the new job is registered before the old one is removed, so a failure
    /// never leaves the poller running without a timer.
    pub async fn reschedule(&mut self, minutes: u32) -> Result<(), PollerError> {
        if minutes < 1 {
            return Err(PollerError::InvalidInterval(minutes));
        }
        self.interval_minutes = minutes;

        let job = match self.active {
            Some(_) => self.poll_job()?,
            None => {
                info!(interval_minutes = minutes, "poll interval stored for next start");
                return Ok(());
            }
        };
        if let Some(active) = self.active.as_mut() {
            let replacement = active.scheduler.add(job).await?;
            let previous = std::mem::replace(&mut active.job_id, replacement);
            active.scheduler.remove(&previous).await?;
        }
        info!(job = POLL_JOB_NAME, interval_minutes = minutes, "review poller rescheduled");
        Ok(())
    }

    /// Stops future ticks. A cycle already in flight runs to completion.
    pub async fn stop(&mut self) -> Result<(), PollerError> {
        let Some(mut active) = self.active.take() else {
            return Ok(());
        };
        active.scheduler.remove(&active.job_id).await?;
        active.scheduler.shutdown().await?;
        info!(job = POLL_JOB_NAME, "review poller stopped");
        Ok(())
    }

    /// One guarded cycle, the same one a tick runs.
    pub async fn poll_once(&self) -> PollOutcome {
        self.runner.run().await
    }

    fn poll_job(&self) -> Result<Job, JobSchedulerError> {
        let runner = Arc::clone(&self.runner);
        let every = Duration::from_secs(u64::from(self.interval_minutes) * 60);
        Job::new_repeated_async(every, move |_uuid, _lock| {
            let runner = Arc::clone(&runner);
            Box::pin(async move {
                match runner.run().await {
                    PollOutcome::Completed(summary) => {
                        if let StopReason::FetchFailed(reason) | StopReason::StoreFailed(reason) =
                            &summary.stop
                        {
                            error!(job = POLL_JOB_NAME, run_id = %summary.run_id, reason = %reason, "scheduled poll ended early");
                        }
                    }
                    PollOutcome::SkippedBusy | PollOutcome::SkippedNoCredentials => {}
                }
            })
        })
    }
}
