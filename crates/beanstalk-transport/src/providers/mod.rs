//! Queue client implementations.
//!
//! This module contains concrete implementations of the `QueueClient` trait
//! for different queue backends.

pub mod beanstalkd;
pub mod memory;

pub use beanstalkd::{BeanstalkdClient, DEFAULT_PORT};
pub use memory::{InMemoryQueue, InMemoryQueueClient, TubeStats};
