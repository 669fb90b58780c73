//! Client trait for the work-queue operations the transport consumes.

use crate::error::QueueError;
use crate::job::{Job, JobId, PutOptions, TubeName};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Duration;

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

/// Interface implemented by queue connections (beanstalkd, in-memory, ...)
///
/// A client is one logical connection. Every operation takes `&mut self`
/// because the underlying connection is not reentrant: callers needing
/// parallelism open one client per task.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueueClient: Send {
    /// Select the tube subsequent `put` commands insert into
    async fn use_tube(&mut self, tube: &TubeName) -> Result<(), QueueError>;

    /// Add a tube to the watch list; returns the number of watched tubes
    async fn watch(&mut self, tube: &TubeName) -> Result<u32, QueueError>;

    /// Remove a tube from the watch list; returns the number of watched tubes
    async fn ignore(&mut self, tube: &TubeName) -> Result<u32, QueueError>;

    /// Reserve the next ready job from any watched tube
    ///
    /// Returns `None` when no job became ready before `timeout` elapsed.
    async fn reserve(&mut self, timeout: Duration) -> Result<Option<Job>, QueueError>;

    /// Insert a job into the used tube and return its id
    async fn put(&mut self, body: Bytes, options: &PutOptions) -> Result<JobId, QueueError>;

    /// Remove a job from the queue
    async fn delete(&mut self, id: JobId) -> Result<(), QueueError>;

    /// Move a reserved job to the buried state
    async fn bury(&mut self, id: JobId, priority: u32) -> Result<(), QueueError>;
}
