//! Envelope and stamp types.
//!
//! An [`Envelope`] carries one application message together with an ordered
//! list of typed [`Stamp`]s. Envelopes are values: attaching or removing a
//! stamp returns a new envelope and leaves the original untouched. Stamps are
//! shared behind `Arc`, so copying an envelope never copies stamp data.

use crate::job::JobId;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Stamps
// ============================================================================

/// Typed metadata attached to an envelope
pub trait Stamp: Any + fmt::Debug + Send + Sync {
    /// Stable identifier of the stamp type
    fn kind(&self) -> &'static str;

    /// Whether codecs should persist this stamp when the envelope is sent
    fn is_sendable(&self) -> bool {
        true
    }

    /// Access the stamp as `Any` for typed lookup
    fn as_any(&self) -> &dyn Any;
}

/// Durable queue identifier of the job an envelope was read from or sent as
///
/// Only the transport attaches this stamp. It never travels with the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransportMessageIdStamp {
    id: JobId,
}

impl TransportMessageIdStamp {
    /// Create stamp for a queue-assigned job id
    pub fn new(id: JobId) -> Self {
        Self { id }
    }

    /// Get the job id
    pub fn id(&self) -> JobId {
        self.id
    }
}

impl Stamp for TransportMessageIdStamp {
    fn kind(&self) -> &'static str {
        "transport_message_id"
    }

    fn is_sendable(&self) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Named string header supplied by application code
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HeaderStamp {
    name: String,
    value: String,
}

impl HeaderStamp {
    /// Create header stamp
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Get header name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get header value
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl Stamp for HeaderStamp {
    fn kind(&self) -> &'static str {
        "header"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// Immutable message container with ordered stamps
#[derive(Clone)]
pub struct Envelope<M> {
    message: M,
    stamps: Vec<Arc<dyn Stamp>>,
}

impl<M> Envelope<M> {
    /// Wrap a message without stamps
    pub fn new(message: M) -> Self {
        Self {
            message,
            stamps: Vec::new(),
        }
    }

    /// Wrap a message with an initial set of stamps, kept in iteration order
    pub fn with_stamps<I>(message: M, stamps: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Stamp>>,
    {
        Self {
            message,
            stamps: stamps.into_iter().collect(),
        }
    }

    /// Get the message
    pub fn message(&self) -> &M {
        &self.message
    }

    /// Take the message out of the envelope
    pub fn into_message(self) -> M {
        self.message
    }

    /// All stamps in attachment order
    pub fn stamps(&self) -> &[Arc<dyn Stamp>] {
        &self.stamps
    }

    /// Most recently attached stamp of type `S`
    pub fn last<S: Stamp>(&self) -> Option<&S> {
        self.stamps
            .iter()
            .rev()
            .find_map(|stamp| stamp.as_any().downcast_ref::<S>())
    }

    /// Every stamp of type `S` in attachment order
    pub fn all<S: Stamp>(&self) -> Vec<&S> {
        self.stamps
            .iter()
            .filter_map(|stamp| stamp.as_any().downcast_ref::<S>())
            .collect()
    }
}

impl<M: Clone> Envelope<M> {
    /// New envelope with `stamp` appended
    pub fn with<S: Stamp>(&self, stamp: S) -> Self {
        let mut stamps = self.stamps.clone();
        stamps.push(Arc::new(stamp));
        Self {
            message: self.message.clone(),
            stamps,
        }
    }

    /// New envelope with every stamp of type `S` removed
    pub fn without_all<S: Stamp>(&self) -> Self {
        Self {
            message: self.message.clone(),
            stamps: self
                .stamps
                .iter()
                .filter(|stamp| !stamp.as_any().is::<S>())
                .cloned()
                .collect(),
        }
    }
}

impl<M: fmt::Debug> fmt::Debug for Envelope<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("message", &self.message)
            .field("stamps", &self.stamps)
            .finish()
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
