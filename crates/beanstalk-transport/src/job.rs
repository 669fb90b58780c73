//! Job types for queue operations including core domain identifiers.

use crate::error::ValidationError;
use bytes::Bytes;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Maximum tube name length accepted by beanstalkd
pub const MAX_TUBE_NAME_LENGTH: usize = 200;

/// Validated tube name following beanstalkd naming rules
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TubeName(String);

impl TubeName {
    /// Create new tube name with validation
    pub fn new(name: String) -> Result<Self, ValidationError> {
        if name.is_empty() || name.len() > MAX_TUBE_NAME_LENGTH {
            return Err(ValidationError::OutOfRange {
                field: "tube".to_string(),
                message: format!("must be 1-{} bytes", MAX_TUBE_NAME_LENGTH),
            });
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-+/;.$_()".contains(c))
        {
            return Err(ValidationError::InvalidFormat {
                field: "tube".to_string(),
                message: "only ASCII letters, digits and -+/;.$_() allowed".to_string(),
            });
        }

        if name.starts_with('-') {
            return Err(ValidationError::InvalidFormat {
                field: "tube".to_string(),
                message: "must not start with a hyphen".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Get tube name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The tube every beanstalkd connection uses and watches initially
impl Default for TubeName {
    fn default() -> Self {
        Self("default".to_string())
    }
}

impl std::fmt::Display for TubeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TubeName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for TubeName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TubeName> for String {
    fn from(value: TubeName) -> Self {
        value.0
    }
}

/// Queue-assigned job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(u64);

impl JobId {
    /// Wrap a raw job id issued by the queue service
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw id
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "job_id".to_string(),
            });
        }

        s.parse::<u64>()
            .map(Self)
            .map_err(|e| ValidationError::InvalidFormat {
                field: "job_id".to_string(),
                message: e.to_string(),
            })
    }
}

impl From<u64> for JobId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

// ============================================================================
// Job Types
// ============================================================================

/// A reserved job as handed out by the queue service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    id: JobId,
    body: Bytes,
}

impl Job {
    /// Create new job from id and raw body
    pub fn new(id: JobId, body: impl Into<Bytes>) -> Self {
        Self {
            id,
            body: body.into(),
        }
    }

    /// Get job id
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Get raw job body
    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

// ============================================================================
// Put Options
// ============================================================================

/// Default job priority used by beanstalkd clients (lower is more urgent)
pub const DEFAULT_PRIORITY: u32 = 1024;

/// Default time-to-run for a reserved job
pub const DEFAULT_TTR_SECONDS: i64 = 60;

/// Protocol parameters of a `put` command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOptions {
    /// Job priority; 0 is most urgent
    pub priority: u32,
    /// Seconds before the job becomes ready
    pub delay: Duration,
    /// Seconds a reservation lasts before the job is released again
    pub time_to_run: Duration,
}

impl Default for PutOptions {
    fn default() -> Self {
        Self {
            priority: DEFAULT_PRIORITY,
            delay: Duration::zero(),
            time_to_run: Duration::seconds(DEFAULT_TTR_SECONDS),
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
