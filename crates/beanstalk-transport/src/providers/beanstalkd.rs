//! beanstalkd provider over a TCP connection.
//!
//! `BeanstalkdClient` speaks the text protocol defined in [`crate::protocol`]
//! over any `AsyncRead + AsyncWrite` stream. Production code connects with
//! [`BeanstalkdClient::connect`]; tests wrap an in-process duplex stream with
//! [`BeanstalkdClient::from_stream`].
//!
//! Every round trip is bounded by the I/O timeout given at construction. A
//! reservation is additionally allowed its own reservation timeout, which the
//! server enforces.
//!
//! A round trip that times out or fails mid-read leaves the stream at an
//! unknown position. The client then refuses every later command with
//! [`QueueError::ConnectionFailed`]; callers must reconnect.

use crate::client::QueueClient;
use crate::error::QueueError;
use crate::job::{Job, JobId, PutOptions, TubeName};
use crate::protocol::{Command, Response, CRLF};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

#[cfg(test)]
#[path = "beanstalkd_tests.rs"]
mod tests;

/// Default beanstalkd port
pub const DEFAULT_PORT: u16 = 11300;

/// Shortest I/O budget; a zero reservation timeout must not starve commands
const MIN_IO_TIMEOUT_SECONDS: i64 = 1;

/// Longest response line the client accepts before giving up on the stream
const MAX_LINE_LENGTH: usize = 1024;

/// Largest job body the client will read; the upper bound of beanstalkd's `-z`
pub const MAX_JOB_SIZE: usize = 1_073_741_824;

/// beanstalkd client bound to one connection
pub struct BeanstalkdClient<S = TcpStream> {
    stream: BufReader<S>,
    io_timeout: Duration,
    desynced: bool,
}

impl BeanstalkdClient<TcpStream> {
    /// Open a TCP connection to the server
    ///
    /// `timeout` bounds the connect and every later command round trip, with
    /// a floor of one second.
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, QueueError> {
        let timeout = timeout.max(Duration::seconds(MIN_IO_TIMEOUT_SECONDS));
        let connect_timeout = to_std(timeout);
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| QueueError::Timeout { duration: timeout })?
            .map_err(|e| QueueError::ConnectionFailed {
                message: format!("{}:{}: {}", host, port, e),
            })?;
        stream.set_nodelay(true)?;

        info!(host = %host, port = port, "Connected to beanstalkd");
        Ok(Self::from_stream(stream, timeout))
    }
}

impl<S> BeanstalkdClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an already established stream
    pub fn from_stream(stream: S, io_timeout: Duration) -> Self {
        Self {
            stream: BufReader::new(stream),
            io_timeout: io_timeout.max(Duration::seconds(MIN_IO_TIMEOUT_SECONDS)),
            desynced: false,
        }
    }

    /// Whether an earlier failure left the stream unusable
    pub fn is_desynced(&self) -> bool {
        self.desynced
    }

    fn ensure_in_sync(&self) -> Result<(), QueueError> {
        if self.desynced {
            return Err(QueueError::ConnectionFailed {
                message: "connection out of sync after an earlier failure; reconnect".to_string(),
            });
        }
        Ok(())
    }

    /// Record a failure after which replies can no longer be matched to commands
    fn desync(&mut self, err: QueueError) -> QueueError {
        if !self.desynced {
            warn!(error = %err, "Marking beanstalkd connection unusable");
            self.desynced = true;
        }
        err
    }

    /// Send a command and read its response line
    async fn round_trip(
        &mut self,
        command: &Command<'_>,
        extra_wait: Duration,
    ) -> Result<Response, QueueError> {
        self.ensure_in_sync()?;

        let budget = self.io_timeout + extra_wait;
        let payload = command.encode();

        let exchange = async {
            self.stream.get_mut().write_all(&payload).await?;
            self.stream.get_mut().flush().await?;
            self.read_response().await
        };

        let result = match tokio::time::timeout(to_std(budget), exchange).await {
            Ok(result) => result,
            Err(_) => Err(QueueError::Timeout { duration: budget }),
        };

        result.map_err(|err| self.desync(err))
    }

    async fn read_response(&mut self) -> Result<Response, QueueError> {
        let mut line = Vec::new();
        let read = (&mut self.stream)
            .take(MAX_LINE_LENGTH as u64)
            .read_until(b'\n', &mut line)
            .await?;

        if read == 0 {
            return Err(QueueError::ConnectionFailed {
                message: "server closed the connection".to_string(),
            });
        }

        let text = String::from_utf8_lossy(&line);
        Response::parse(&text)
    }

    async fn read_body(&mut self, bytes: usize) -> Result<Bytes, QueueError> {
        let length = bytes
            .checked_add(CRLF.len())
            .filter(|_| bytes <= MAX_JOB_SIZE)
            .ok_or_else(|| QueueError::UnexpectedResponse {
                command: "reserve-with-timeout".to_string(),
                response: format!(
                    "job body of {} bytes exceeds the {} byte limit",
                    bytes, MAX_JOB_SIZE
                ),
            })?;

        let mut body = vec![0_u8; length];
        self.stream.read_exact(&mut body).await?;

        if !body.ends_with(CRLF) {
            return Err(QueueError::UnexpectedResponse {
                command: "reserve-with-timeout".to_string(),
                response: "job body not terminated by CRLF".to_string(),
            });
        }

        body.truncate(bytes);
        Ok(Bytes::from(body))
    }
}

#[async_trait]
impl<S> QueueClient for BeanstalkdClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn use_tube(&mut self, tube: &TubeName) -> Result<(), QueueError> {
        let command = Command::Use(tube);
        match self.round_trip(&command, Duration::zero()).await? {
            Response::Using(_) => {
                debug!(tube = %tube, "Using tube");
                Ok(())
            }
            other => Err(other.into_error(&command)),
        }
    }

    async fn watch(&mut self, tube: &TubeName) -> Result<u32, QueueError> {
        let command = Command::Watch(tube);
        match self.round_trip(&command, Duration::zero()).await? {
            Response::Watching(count) => {
                debug!(tube = %tube, watched = count, "Watching tube");
                Ok(count)
            }
            other => Err(other.into_error(&command)),
        }
    }

    async fn ignore(&mut self, tube: &TubeName) -> Result<u32, QueueError> {
        let command = Command::Ignore(tube);
        match self.round_trip(&command, Duration::zero()).await? {
            Response::Watching(count) => {
                debug!(tube = %tube, watched = count, "Ignoring tube");
                Ok(count)
            }
            other => Err(other.into_error(&command)),
        }
    }

    async fn reserve(&mut self, timeout: Duration) -> Result<Option<Job>, QueueError> {
        let seconds = timeout.num_seconds().max(0);
        let command = Command::ReserveWithTimeout {
            seconds: seconds as u64,
        };

        match self.round_trip(&command, Duration::seconds(seconds)).await? {
            Response::Reserved { id, bytes } => {
                let io_timeout = self.io_timeout;
                let read = tokio::time::timeout(to_std(io_timeout), self.read_body(bytes)).await;
                let body = match read {
                    Ok(Ok(body)) => body,
                    Ok(Err(err)) => return Err(self.desync(err)),
                    Err(_) => {
                        return Err(self.desync(QueueError::Timeout {
                            duration: io_timeout,
                        }))
                    }
                };
                debug!(job_id = %id, bytes = bytes, "Reserved job");
                Ok(Some(Job::new(id, body)))
            }
            Response::TimedOut | Response::DeadlineSoon => Ok(None),
            other => Err(other.into_error(&command)),
        }
    }

    async fn put(&mut self, body: Bytes, options: &PutOptions) -> Result<JobId, QueueError> {
        let command = Command::Put {
            priority: options.priority,
            delay: options.delay.num_seconds().max(0) as u64,
            time_to_run: options.time_to_run.num_seconds().max(1) as u64,
            body: &body,
        };

        match self.round_trip(&command, Duration::zero()).await? {
            Response::Inserted(id) => {
                debug!(job_id = %id, bytes = body.len(), "Inserted job");
                Ok(id)
            }
            other => Err(other.into_error(&command)),
        }
    }

    async fn delete(&mut self, id: JobId) -> Result<(), QueueError> {
        let command = Command::Delete(id);
        match self.round_trip(&command, Duration::zero()).await? {
            Response::Deleted => {
                debug!(job_id = %id, "Deleted job");
                Ok(())
            }
            other => Err(other.into_error(&command)),
        }
    }

    async fn bury(&mut self, id: JobId, priority: u32) -> Result<(), QueueError> {
        let command = Command::Bury { id, priority };
        match self.round_trip(&command, Duration::zero()).await? {
            Response::Buried => {
                debug!(job_id = %id, "Buried job");
                Ok(())
            }
            other => Err(other.into_error(&command)),
        }
    }
}

fn to_std(duration: Duration) -> std::time::Duration {
    duration.to_std().unwrap_or(std::time::Duration::ZERO)
}
