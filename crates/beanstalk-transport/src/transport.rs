//! Envelope transport over a single beanstalkd tube.
//!
//! [`BeanstalkTransport`] maps the envelope operations onto queue commands:
//!
//! | Transport | Queue                                  |
//! |-----------|----------------------------------------|
//! | `get`     | `watch` + `reserve-with-timeout`       |
//! | `ack`     | `use` + `delete`                       |
//! | `reject`  | `use` + `bury`                         |
//! | `send`    | `use` + `put`                          |
//!
//! The queue job id travels on the envelope as a [`TransportMessageIdStamp`].

use crate::client::QueueClient;
use crate::codec::EnvelopeCodec;
use crate::config::TransportConfig;
use crate::envelope::{Envelope, TransportMessageIdStamp};
use crate::error::{DecodeError, QueueError, TransportError};
use crate::job::{Job, JobId, PutOptions, TubeName, DEFAULT_PRIORITY};
use crate::providers::BeanstalkdClient;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Duration;
use tracing::{debug, warn};

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;

// ============================================================================
// Transport Trait
// ============================================================================

/// Receive, acknowledge, reject and send envelopes
#[async_trait]
pub trait Transport: Send {
    /// Application message type carried by the envelopes
    type Message: Clone + Send + Sync;

    /// Fetch at most one envelope; empty when nothing usable is available
    async fn get(&mut self) -> Result<Vec<Envelope<Self::Message>>, TransportError>;

    /// Mark a received envelope as handled and remove it from the queue
    async fn ack(&mut self, envelope: &Envelope<Self::Message>) -> Result<(), TransportError>;

    /// Mark a received envelope as failed, keeping it for inspection
    async fn reject(&mut self, envelope: &Envelope<Self::Message>) -> Result<(), TransportError>;

    /// Enqueue an envelope and return it stamped with its new transport id
    async fn send(
        &mut self,
        envelope: &Envelope<Self::Message>,
    ) -> Result<Envelope<Self::Message>, TransportError>;
}

// ============================================================================
// BeanstalkTransport
// ============================================================================

/// Transport bound to one tube of a queue connection
pub struct BeanstalkTransport<Q, C> {
    client: Q,
    tube: TubeName,
    timeout: Duration,
    codec: C,
}

impl<C> BeanstalkTransport<BeanstalkdClient, C>
where
    C: EnvelopeCodec,
{
    /// Connect to the beanstalkd server described by `config`
    ///
    /// The configuration is validated before any network I/O.
    pub async fn connect(config: &TransportConfig, codec: C) -> Result<Self, TransportError> {
        config.validate()?;

        let timeout = config.timeout_duration();
        let client = BeanstalkdClient::connect(&config.host, config.port, timeout).await?;

        Ok(Self::new(client, config.tube.clone(), timeout, codec))
    }
}

impl<Q, C> BeanstalkTransport<Q, C>
where
    Q: QueueClient,
    C: EnvelopeCodec,
{
    /// Create a transport over an existing queue connection
    pub fn new(client: Q, tube: TubeName, timeout: Duration, codec: C) -> Self {
        Self {
            client,
            tube,
            timeout,
            codec,
        }
    }

    /// Tube this transport reads from and writes to
    pub fn tube(&self) -> &TubeName {
        &self.tube
    }

    /// Reservation timeout of `get`
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Codec used for job bodies
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Underlying queue connection
    pub fn client(&self) -> &Q {
        &self.client
    }

    /// Release the queue connection
    pub fn into_client(self) -> Q {
        self.client
    }

    /// Parse a job body as JSON and decode it into an envelope
    pub(crate) fn decode_job(&self, job: &Job) -> Result<Envelope<C::Message>, DecodeError> {
        let value: serde_json::Value =
            serde_json::from_slice(job.body()).map_err(DecodeError::Json)?;
        Ok(self.codec.decode(value)?)
    }

    /// Restrict the watch list to the configured tube
    async fn watch_tube(&mut self) -> Result<(), QueueError> {
        self.client.watch(&self.tube).await?;

        let default_tube = TubeName::default();
        if self.tube != default_tube {
            self.client.ignore(&default_tube).await?;
        }

        Ok(())
    }
}

fn transport_id<M>(envelope: &Envelope<M>) -> Result<JobId, TransportError> {
    envelope
        .last::<TransportMessageIdStamp>()
        .map(TransportMessageIdStamp::id)
        .ok_or(TransportError::MissingStamp)
}

#[async_trait]
impl<Q, C> Transport for BeanstalkTransport<Q, C>
where
    Q: QueueClient,
    C: EnvelopeCodec,
    C::Message: Clone + Send + Sync,
{
    type Message = C::Message;

    /// Watch the tube and reserve one job
    ///
    /// A job whose body is not valid JSON is dropped from the result without
    /// being deleted or buried. It stays reserved until the server's
    /// time-to-run for it elapses and is then handed out again. A body that
    /// parses but that the codec rejects fails with [`TransportError::Decode`];
    /// that job also stays reserved.
    async fn get(&mut self) -> Result<Vec<Envelope<C::Message>>, TransportError> {
        self.watch_tube().await?;

        let Some(job) = self.client.reserve(self.timeout).await? else {
            debug!(tube = %self.tube, "No job ready before timeout");
            return Ok(Vec::new());
        };

        match self.decode_job(&job) {
            Ok(envelope) => {
                debug!(tube = %self.tube, job_id = %job.id(), "Received envelope");
                Ok(vec![envelope.with(TransportMessageIdStamp::new(job.id()))])
            }
            Err(DecodeError::Json(err)) => {
                warn!(
                    tube = %self.tube,
                    job_id = %job.id(),
                    error = %err,
                    "Discarding job with malformed JSON body"
                );
                Ok(Vec::new())
            }
            Err(DecodeError::Codec(err)) => {
                warn!(
                    tube = %self.tube,
                    job_id = %job.id(),
                    error = %err,
                    "Codec rejected job body"
                );
                Err(TransportError::Decode(err))
            }
        }
    }

    async fn ack(&mut self, envelope: &Envelope<C::Message>) -> Result<(), TransportError> {
        let id = transport_id(envelope)?;

        self.client.use_tube(&self.tube).await?;
        self.client.delete(id).await?;

        debug!(tube = %self.tube, job_id = %id, "Acknowledged envelope");
        Ok(())
    }

    async fn reject(&mut self, envelope: &Envelope<C::Message>) -> Result<(), TransportError> {
        let id = transport_id(envelope)?;

        self.client.use_tube(&self.tube).await?;
        self.client.bury(id, DEFAULT_PRIORITY).await?;

        debug!(tube = %self.tube, job_id = %id, "Rejected envelope");
        Ok(())
    }

    async fn send(
        &mut self,
        envelope: &Envelope<C::Message>,
    ) -> Result<Envelope<C::Message>, TransportError> {
        let encoded = self.codec.encode(envelope).map_err(TransportError::Encode)?;
        let payload = serde_json::to_vec(&encoded).map_err(TransportError::Serialization)?;

        self.client.use_tube(&self.tube).await?;
        let id = self
            .client
            .put(Bytes::from(payload), &PutOptions::default())
            .await?;

        debug!(tube = %self.tube, job_id = %id, "Sent envelope");
        Ok(envelope
            .without_all::<TransportMessageIdStamp>()
            .with(TransportMessageIdStamp::new(id)))
    }
}
