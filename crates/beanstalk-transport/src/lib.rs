//! # Beanstalk Transport
//!
//! Envelope transport over beanstalkd tubes.
//!
//! This library provides:
//! - An immutable envelope model with typed stamps
//! - A JSON envelope codec for serde messages
//! - A queue client trait with a beanstalkd TCP provider and an in-memory provider
//! - The transport adapter mapping get/ack/reject/send to reserve/delete/bury/put
//! - Layered configuration from option maps, DSNs, files and the environment
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for queue, codec and transport operations
//! - [`job`] - Tube names, job ids and jobs
//! - [`envelope`] - Envelopes and stamps
//! - [`codec`] - Envelope codecs
//! - [`client`] - Queue client trait
//! - [`protocol`] - beanstalkd text protocol
//! - [`providers`] - Queue client implementations
//! - [`transport`] - The envelope transport
//! - [`config`] - Transport configuration

// Module declarations
pub mod client;
pub mod codec;
pub mod config;
pub mod envelope;
pub mod error;
pub mod job;
pub mod protocol;
pub mod providers;
pub mod transport;

// Re-export commonly used types at crate root for convenience
pub use client::QueueClient;
pub use codec::{EnvelopeCodec, JsonCodec};
pub use config::TransportConfig;
pub use envelope::{Envelope, HeaderStamp, Stamp, TransportMessageIdStamp};
pub use error::{
    CodecError, ConfigurationError, DecodeError, QueueError, TransportError, ValidationError,
};
pub use job::{Job, JobId, PutOptions, TubeName};
pub use providers::{BeanstalkdClient, InMemoryQueue, InMemoryQueueClient};
pub use transport::{BeanstalkTransport, Transport};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
