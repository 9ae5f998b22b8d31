// Start of file: /src/scheduler/scheduler.rs

// * Job scheduler.
// * Each job runs in its own task: sleep until the next fire time, run,
// * repeat. A job never overlaps itself, and fire times missed while it was
// * busy or paused collapse into a single run.

use std::{
    collections::HashMap,
    future::Future,
    panic::AssertUnwindSafe,
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use cron::Schedule;
use futures::{future::BoxFuture, FutureExt};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use thiserror::Error;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::events::{AppStartEvent, AppStopEvent, EventBus, EventPriority};

type Job = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid cron expression '{expression}': {message}")]
    InvalidCron { expression: String, message: String },
    #[error("interval must be greater than zero")]
    ZeroInterval,
}

#[derive(Debug, Clone)]
pub enum Trigger {
    /// Six or seven field expression, seconds first.
    Cron(Box<Schedule>),
    Interval(Duration),
    Date(DateTime<Utc>),
}

impl Trigger {
    pub fn cron(expression: &str) -> Result<Self, SchedulerError> {
        Schedule::from_str(expression)
            .map(|schedule| Self::Cron(Box::new(schedule)))
            .map_err(|err| SchedulerError::InvalidCron {
                expression: expression.to_string(),
                message: err.to_string(),
            })
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Cron(schedule) => format!("cron[{schedule}]"),
            Self::Interval(every) => format!("interval[{every:?}]"),
            Self::Date(at) => format!("date[{}]", at.to_rfc3339()),
        }
    }
}

/// Public snapshot of a job.
#[derive(Debug, Clone, Serialize)]
pub struct TaskInfo {
    pub id: String,
    pub name: String,
    pub trigger: String,
    pub status: TaskStatus,
    pub paused: bool,
    pub next_run_time: Option<DateTime<Utc>>,
    pub last_run_time: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub run_count: u64,
}

struct Runner {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct TaskEntry {
    trigger: Trigger,
    job: Job,
    info: RwLock<TaskInfo>,
    paused: watch::Sender<bool>,
    last_fire: Mutex<Option<DateTime<Utc>>>,
    runner: Mutex<Option<Runner>>,
}

impl TaskEntry {
    /// Next fire time at or after `now`; `None` once a date job has run.
    fn next_fire(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match &self.trigger {
            Trigger::Cron(schedule) => schedule.after(&now).next(),
            Trigger::Interval(every) => {
                let every = chrono::Duration::from_std(*every).ok()?;
                let next: DateTime<Utc> = match *self.last_fire.lock() {
                    Some(previous) => previous + every,
                    None => now + every,
                };
                // coalesce missed runs into one
                Some(next.max(now))
            }
            Trigger::Date(at) => (self.info.read().run_count == 0).then_some(*at),
        }
    }

    async fn execute(&self) {
        let started: DateTime<Utc> = Utc::now();
        {
            let mut info = self.info.write();
            info.status = TaskStatus::Running;
            info.last_run_time = Some(started);
        }
        let name: String = self.info.read().name.clone();
        debug!(task = %name, "Running scheduled task");

        // the job is called inside the guarded future so a panic while
        // building it is caught as well
        let job: Job = self.job.clone();
        let outcome = AssertUnwindSafe(async move { job().await }).catch_unwind().await;

        let mut info = self.info.write();
        info.run_count += 1;
        match outcome {
            Ok(Ok(())) => {
                info.status = TaskStatus::Completed;
                info.last_error = None;
            }
            Ok(Err(err)) => {
                error!(task = %name, error = %err, "Scheduled task failed");
                info.status = TaskStatus::Failed;
                info.last_error = Some(format!("{err:#}"));
            }
            Err(panic) => {
                let message: String = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "job panicked".to_string());
                error!(task = %name, panic = %message, "Scheduled task panicked");
                info.status = TaskStatus::Failed;
                info.last_error = Some(message);
            }
        }
    }

    fn stop_runner(&self, wait: bool) -> Option<JoinHandle<()>> {
        let runner: Runner = self.runner.lock().take()?;
        runner.stop.send_replace(true);
        if wait {
            Some(runner.handle)
        } else {
            runner.handle.abort();
            None
        }
    }
}

async fn run_task(entry: Arc<TaskEntry>, mut stop: watch::Receiver<bool>) {
    let mut paused: watch::Receiver<bool> = entry.paused.subscribe();
    loop {
        if *stop.borrow() {
            break;
        }

        if *paused.borrow_and_update() {
            entry.info.write().next_run_time = None;
            tokio::select! {
                _ = paused.changed() => continue,
                _ = stop.changed() => break,
            }
        }

        let now: DateTime<Utc> = Utc::now();
        let Some(next) = entry.next_fire(now) else {
            entry.info.write().next_run_time = None;
            break;
        };
        entry.info.write().next_run_time = Some(next);

        let delay: Duration = (next - now).to_std().unwrap_or(Duration::ZERO);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = stop.changed() => break,
            _ = paused.changed() => continue,
        }

        *entry.last_fire.lock() = Some(next);
        entry.execute().await;
    }
}

#[derive(Default)]
pub struct Scheduler {
    tasks: RwLock<HashMap<String, Arc<TaskEntry>>>,
    running: AtomicBool,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("running", &self.is_running())
            .field("tasks", &self.tasks.read().len())
            .finish()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn spawn_runner(entry: &Arc<TaskEntry>) {
        let mut slot = entry.runner.lock();
        if slot.is_some() {
            return;
        }
        let (stop, stop_rx) = watch::channel(false);
        let handle: JoinHandle<()> = tokio::spawn(run_task(entry.clone(), stop_rx));
        *slot = Some(Runner { stop, handle });
    }

    fn add_job<F, Fut>(&self, name: &str, trigger: Trigger, job: F) -> String
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let id: String = Uuid::new_v4().to_string();
        let description: String = trigger.describe();
        let job: Job = Arc::new(move || -> BoxFuture<'static, anyhow::Result<()>> { Box::pin(job()) });
        let (paused, _) = watch::channel(false);

        let entry: Arc<TaskEntry> = Arc::new(TaskEntry {
            trigger,
            job,
            info: RwLock::new(TaskInfo {
                id: id.clone(),
                name: name.to_string(),
                trigger: description.clone(),
                status: TaskStatus::Pending,
                paused: false,
                next_run_time: None,
                last_run_time: None,
                last_error: None,
                run_count: 0,
            }),
            paused,
            last_fire: Mutex::new(None),
            runner: Mutex::new(None),
        });

        if self.is_running() {
            Self::spawn_runner(&entry);
        }
        self.tasks.write().insert(id.clone(), entry);
        info!(task = name, %id, trigger = %description, "Added scheduled task");
        id
    }

    /// `expression` uses seconds as its first field, e.g. `0 */5 * * * *`.
    pub fn add_cron_job<F, Fut>(&self, name: &str, expression: &str, job: F) -> Result<String, SchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let trigger: Trigger = Trigger::cron(expression)?;
        Ok(self.add_job(name, trigger, job))
    }

    /// First run happens one `every` after the scheduler starts.
    pub fn add_interval_job<F, Fut>(&self, name: &str, every: Duration, job: F) -> Result<String, SchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        if every.is_zero() {
            return Err(SchedulerError::ZeroInterval);
        }
        Ok(self.add_job(name, Trigger::Interval(every), job))
    }

    /// Runs once at `at`; a time in the past runs as soon as possible.
    pub fn add_date_job<F, Fut>(&self, name: &str, at: DateTime<Utc>, job: F) -> String
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.add_job(name, Trigger::Date(at), job)
    }

    pub fn remove_job(&self, id: &str) -> bool {
        let Some(entry) = self.tasks.write().remove(id) else {
            return false;
        };
        entry.stop_runner(false);
        let mut snapshot = entry.info.write();
        snapshot.status = TaskStatus::Cancelled;
        snapshot.next_run_time = None;
        info!(task = %snapshot.name, "Removed scheduled task");
        true
    }

    pub fn get_task(&self, id: &str) -> Option<TaskInfo> {
        self.tasks.read().get(id).map(|entry| entry.info.read().clone())
    }

    /// Snapshots ordered by name.
    pub fn get_all_tasks(&self) -> Vec<TaskInfo> {
        let mut tasks: Vec<TaskInfo> = self.tasks.read().values().map(|entry| entry.info.read().clone()).collect();
        tasks.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        tasks
    }

    fn set_paused(&self, id: &str, paused: bool) -> bool {
        let Some(entry) = self.tasks.read().get(id).cloned() else {
            return false;
        };
        entry.info.write().paused = paused;
        entry.paused.send_replace(paused);
        true
    }

    pub fn pause_job(&self, id: &str) -> bool {
        let paused: bool = self.set_paused(id, true);
        if paused {
            info!(%id, "Paused scheduled task");
        }
        paused
    }

    pub fn resume_job(&self, id: &str) -> bool {
        let resumed: bool = self.set_paused(id, false);
        if resumed {
            info!(%id, "Resumed scheduled task");
        }
        resumed
    }

    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let tasks: Vec<Arc<TaskEntry>> = self.tasks.read().values().cloned().collect();
        for entry in &tasks {
            Self::spawn_runner(entry);
        }
        info!(tasks = tasks.len(), "Scheduler started");
    }

    /// Stops every job. With `wait`, runs in progress finish first;
    /// otherwise they are aborted.
    pub async fn shutdown(&self, wait: bool) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let tasks: Vec<Arc<TaskEntry>> = self.tasks.read().values().cloned().collect();
        let handles: Vec<JoinHandle<()>> = tasks.iter().filter_map(|entry| entry.stop_runner(wait)).collect();
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "Scheduled task runner ended abnormally");
            }
        }
        info!("Scheduler stopped");
    }

    /// Starts with the application and stops with it.
    pub fn attach(self: &Arc<Self>, bus: &EventBus) {
        let scheduler: Arc<Scheduler> = self.clone();
        bus.register::<AppStartEvent, _, _>(EventPriority::Normal, "scheduler.start", move |_| {
            scheduler.start();
            futures::future::ready(Ok(()))
        });

        let scheduler: Arc<Scheduler> = self.clone();
        bus.register::<AppStopEvent, _, _>(EventPriority::Normal, "scheduler.stop", move |_| {
            let scheduler: Arc<Scheduler> = scheduler.clone();
            async move {
                scheduler.shutdown(true).await;
                Ok::<(), anyhow::Error>(())
            }
        });
    }
}


// End of file: /src/scheduler/scheduler.rs
