//! In-memory queue provider implementation for testing and development.
//!
//! [`InMemoryQueue`] plays the role of a beanstalkd server: it holds tubes and
//! jobs and hands out independent connections ([`InMemoryQueueClient`]).
//! Each connection has its own used tube, watch list and reservations, the
//! same way beanstalkd scopes them per TCP connection:
//!
//! - new connections use and watch `default`
//! - ready jobs are reserved by priority, then insertion order
//! - a reservation ends when the job is deleted, buried, or its time-to-run
//!   elapses, after which the job is ready again
//! - only the reserving connection may bury a reserved job or delete it

use crate::client::QueueClient;
use crate::error::QueueError;
use crate::job::{Job, JobId, PutOptions, TubeName};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Duration;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// ============================================================================
// Internal Storage Structures
// ============================================================================

type ConnectionId = u64;

/// Lifecycle state of a stored job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobState {
    Ready,
    Delayed { until: Instant },
    Reserved { by: ConnectionId, until: Instant },
    Buried,
}

/// A job held by the queue with its metadata
struct StoredJob {
    id: JobId,
    tube: TubeName,
    body: Bytes,
    priority: u32,
    time_to_run: std::time::Duration,
    state: JobState,
}

/// Shared server state
struct QueueStorage {
    next_job_id: u64,
    jobs: HashMap<JobId, StoredJob>,
}

impl QueueStorage {
    fn new() -> Self {
        Self {
            next_job_id: 1,
            jobs: HashMap::new(),
        }
    }

    /// Return expired reservations and elapsed delays to the ready state
    fn promote(&mut self, now: Instant) {
        for job in self.jobs.values_mut() {
            match job.state {
                JobState::Reserved { until, .. } | JobState::Delayed { until } if until <= now => {
                    job.state = JobState::Ready;
                }
                _ => {}
            }
        }
    }

    /// Most urgent ready job in any of the given tubes
    fn next_ready(&self, tubes: &BTreeSet<TubeName>) -> Option<JobId> {
        self.jobs
            .values()
            .filter(|job| job.state == JobState::Ready && tubes.contains(&job.tube))
            .min_by_key(|job| (job.priority, job.id))
            .map(|job| job.id)
    }

    /// Earliest instant at which a job could become ready on its own
    fn next_wakeup(&self) -> Option<Instant> {
        self.jobs
            .values()
            .filter_map(|job| match job.state {
                JobState::Reserved { until, .. } | JobState::Delayed { until } => Some(until),
                _ => None,
            })
            .min()
    }
}

struct Shared {
    storage: Mutex<QueueStorage>,
    job_ready: Notify,
    next_connection_id: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueStorage> {
        // A panic while holding the lock leaves the maps consistent, so keep going
        self.storage
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ============================================================================
// InMemoryQueue
// ============================================================================

/// Job counts of one tube
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TubeStats {
    pub ready: usize,
    pub delayed: usize,
    pub reserved: usize,
    pub buried: usize,
}

impl TubeStats {
    /// Total number of jobs in the tube
    pub fn total(&self) -> usize {
        self.ready + self.delayed + self.reserved + self.buried
    }
}

/// In-memory queue server
#[derive(Clone)]
pub struct InMemoryQueue {
    shared: Arc<Shared>,
}

impl InMemoryQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                storage: Mutex::new(QueueStorage::new()),
                job_ready: Notify::new(),
                next_connection_id: AtomicU64::new(1),
            }),
        }
    }

    /// Open a new connection using and watching `default`
    pub fn connect(&self) -> InMemoryQueueClient {
        let id = self.shared.next_connection_id.fetch_add(1, Ordering::Relaxed);
        InMemoryQueueClient {
            shared: Arc::clone(&self.shared),
            connection_id: id,
            using: TubeName::default(),
            watching: BTreeSet::from([TubeName::default()]),
        }
    }

    /// Current job counts of a tube
    pub fn stats_tube(&self, tube: &TubeName) -> TubeStats {
        let mut storage = self.shared.lock();
        storage.promote(Instant::now());

        let mut stats = TubeStats::default();
        for job in storage.jobs.values().filter(|job| &job.tube == tube) {
            match job.state {
                JobState::Ready => stats.ready += 1,
                JobState::Delayed { .. } => stats.delayed += 1,
                JobState::Reserved { .. } => stats.reserved += 1,
                JobState::Buried => stats.buried += 1,
            }
        }
        stats
    }

    /// Body of a job in any state, for inspection
    pub fn peek(&self, id: JobId) -> Option<Bytes> {
        self.shared.lock().jobs.get(&id).map(|job| job.body.clone())
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// InMemoryQueueClient
// ============================================================================

/// One connection to an [`InMemoryQueue`]
pub struct InMemoryQueueClient {
    shared: Arc<Shared>,
    connection_id: ConnectionId,
    using: TubeName,
    watching: BTreeSet<TubeName>,
}

impl InMemoryQueueClient {
    /// Tube used by `put`
    pub fn using(&self) -> &TubeName {
        &self.using
    }

    /// Tubes watched by `reserve`
    pub fn watching(&self) -> impl Iterator<Item = &TubeName> {
        self.watching.iter()
    }

    fn try_reserve(&self) -> (Option<Job>, Option<Instant>) {
        let now = Instant::now();
        let mut storage = self.shared.lock();
        storage.promote(now);

        let ready = storage.next_ready(&self.watching);
        if let Some(job) = ready.and_then(|id| storage.jobs.get_mut(&id)) {
            job.state = JobState::Reserved {
                by: self.connection_id,
                until: now + job.time_to_run,
            };
            return (Some(Job::new(job.id, job.body.clone())), None);
        }

        (None, storage.next_wakeup())
    }
}

#[async_trait]
impl QueueClient for InMemoryQueueClient {
    async fn use_tube(&mut self, tube: &TubeName) -> Result<(), QueueError> {
        self.using = tube.clone();
        Ok(())
    }

    async fn watch(&mut self, tube: &TubeName) -> Result<u32, QueueError> {
        self.watching.insert(tube.clone());
        Ok(self.watching.len() as u32)
    }

    async fn ignore(&mut self, tube: &TubeName) -> Result<u32, QueueError> {
        if self.watching.len() == 1 && self.watching.contains(tube) {
            return Err(QueueError::NotIgnored {
                tube: tube.to_string(),
            });
        }
        self.watching.remove(tube);
        Ok(self.watching.len() as u32)
    }

    async fn reserve(&mut self, timeout: Duration) -> Result<Option<Job>, QueueError> {
        let deadline = Instant::now() + timeout.to_std().unwrap_or_default();

        loop {
            // Register interest before checking so a put between the check
            // and the wait is not missed.
            let notified = self.shared.job_ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let (job, wakeup) = self.try_reserve();
            if let Some(job) = job {
                debug!(job_id = %job.id(), "Reserved in-memory job");
                return Ok(Some(job));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            let wait_until = wakeup.map_or(deadline, |w| w.min(deadline));
            let _ = tokio::time::timeout_at(wait_until, notified).await;
        }
    }

    async fn put(&mut self, body: Bytes, options: &PutOptions) -> Result<JobId, QueueError> {
        let now = Instant::now();
        let delay = options.delay.to_std().unwrap_or_default();
        let time_to_run = options
            .time_to_run
            .to_std()
            .unwrap_or_default()
            .max(std::time::Duration::from_secs(1));

        let id = {
            let mut storage = self.shared.lock();
            let id = JobId::new(storage.next_job_id);
            storage.next_job_id += 1;

            let state = if delay.is_zero() {
                JobState::Ready
            } else {
                JobState::Delayed { until: now + delay }
            };
            storage.jobs.insert(
                id,
                StoredJob {
                    id,
                    tube: self.using.clone(),
                    body,
                    priority: options.priority,
                    time_to_run,
                    state,
                },
            );
            id
        };

        debug!(job_id = %id, tube = %self.using, "Inserted in-memory job");
        self.shared.job_ready.notify_waiters();
        Ok(id)
    }

    async fn delete(&mut self, id: JobId) -> Result<(), QueueError> {
        let mut storage = self.shared.lock();
        storage.promote(Instant::now());

        let deletable = match storage.jobs.get(&id).map(|job| job.state) {
            Some(JobState::Reserved { by, .. }) => by == self.connection_id,
            Some(_) => true,
            None => false,
        };
        if !deletable {
            return Err(QueueError::JobNotFound { job_id: id });
        }

        storage.jobs.remove(&id);
        debug!(job_id = %id, "Deleted in-memory job");
        Ok(())
    }

    async fn bury(&mut self, id: JobId, priority: u32) -> Result<(), QueueError> {
        let mut storage = self.shared.lock();
        storage.promote(Instant::now());

        match storage.jobs.get_mut(&id) {
            Some(job)
                if matches!(job.state, JobState::Reserved { by, .. } if by == self.connection_id) =>
            {
                job.state = JobState::Buried;
                job.priority = priority;
                debug!(job_id = %id, "Buried in-memory job");
                Ok(())
            }
            _ => Err(QueueError::JobNotFound { job_id: id }),
        }
    }
}
