//! Common test utilities for beanstalk-transport integration tests
//!
//! This module provides:
//! - A beanstalkd stand-in serving the text protocol over TCP, backed by
//!   the in-memory queue
//! - Message fixtures and transport builders

use beanstalk_transport::{
    BeanstalkTransport, InMemoryQueue, InMemoryQueueClient, JobId, JsonCodec, PutOptions,
    QueueClient, TransportConfig, TubeName,
};
use bytes::Bytes;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

// ============================================================================
// Fixtures
// ============================================================================

/// Application message used across the integration tests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceIssued {
    pub invoice: String,
    pub amount_cents: u64,
}

#[allow(dead_code)]
pub fn invoice(number: u32) -> InvoiceIssued {
    InvoiceIssued {
        invoice: format!("INV-{:04}", number),
        amount_cents: u64::from(number) * 100,
    }
}

pub fn tube(name: &str) -> TubeName {
    TubeName::new(name.to_string()).unwrap()
}

/// Transport over a fresh connection to an in-memory queue
#[allow(dead_code)]
pub fn in_memory_transport(
    queue: &InMemoryQueue,
    tube_name: &str,
) -> BeanstalkTransport<InMemoryQueueClient, JsonCodec<InvoiceIssued>> {
    BeanstalkTransport::new(
        queue.connect(),
        tube(tube_name),
        Duration::milliseconds(50),
        JsonCodec::new(),
    )
}

// ============================================================================
// beanstalkd Stand-in
// ============================================================================

/// TCP server speaking the beanstalkd commands the transport uses
///
/// Every accepted connection gets its own in-memory client, so use/watch
/// state and reservations are scoped per connection like on a real server.
#[allow(dead_code)]
pub struct FakeBeanstalkd {
    pub port: u16,
    pub queue: InMemoryQueue,
    accept_loop: JoinHandle<()>,
}

#[allow(dead_code)]
impl FakeBeanstalkd {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let queue = InMemoryQueue::new();

        let server_queue = queue.clone();
        let accept_loop = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve_connection(socket, server_queue.connect()));
            }
        });

        Self {
            port,
            queue,
            accept_loop,
        }
    }

    /// Transport configuration pointing at this server
    pub fn config(&self, tube_name: &str) -> TransportConfig {
        TransportConfig::new("127.0.0.1")
            .with_port(self.port)
            .with_timeout(1)
            .with_tube(tube(tube_name))
    }
}

impl Drop for FakeBeanstalkd {
    fn drop(&mut self) {
        self.accept_loop.abort();
    }
}

#[allow(dead_code)]
async fn serve_connection(socket: TcpStream, mut client: InMemoryQueueClient) {
    let mut stream = BufReader::new(socket);

    loop {
        let mut line = String::new();
        match stream.read_line(&mut line).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }

        let parts: Vec<&str> = line.trim_end().split(' ').collect();
        let reply = match parts.as_slice() {
            ["use", name] => {
                client.use_tube(&tube(name)).await.unwrap();
                format!("USING {}\r\n", name).into_bytes()
            }
            ["watch", name] => {
                let count = client.watch(&tube(name)).await.unwrap();
                format!("WATCHING {}\r\n", count).into_bytes()
            }
            ["ignore", name] => match client.ignore(&tube(name)).await {
                Ok(count) => format!("WATCHING {}\r\n", count).into_bytes(),
                Err(_) => b"NOT_IGNORED\r\n".to_vec(),
            },
            ["reserve-with-timeout", seconds] => {
                let timeout = Duration::seconds(seconds.parse().unwrap());
                match client.reserve(timeout).await.unwrap() {
                    Some(job) => {
                        let mut reply =
                            format!("RESERVED {} {}\r\n", job.id(), job.body().len()).into_bytes();
                        reply.extend_from_slice(job.body());
                        reply.extend_from_slice(b"\r\n");
                        reply
                    }
                    None => b"TIMED_OUT\r\n".to_vec(),
                }
            }
            ["put", priority, delay, ttr, bytes] => {
                let mut body = vec![0_u8; bytes.parse::<usize>().unwrap() + 2];
                stream.read_exact(&mut body).await.unwrap();
                body.truncate(body.len() - 2);

                let options = PutOptions {
                    priority: priority.parse().unwrap(),
                    delay: Duration::seconds(delay.parse().unwrap()),
                    time_to_run: Duration::seconds(ttr.parse().unwrap()),
                };
                let id = client.put(Bytes::from(body), &options).await.unwrap();
                format!("INSERTED {}\r\n", id).into_bytes()
            }
            ["delete", id] => match client.delete(JobId::new(id.parse().unwrap())).await {
                Ok(()) => b"DELETED\r\n".to_vec(),
                Err(_) => b"NOT_FOUND\r\n".to_vec(),
            },
            ["bury", id, priority] => {
                let id = JobId::new(id.parse().unwrap());
                match client.bury(id, priority.parse().unwrap()).await {
                    Ok(()) => b"BURIED\r\n".to_vec(),
                    Err(_) => b"NOT_FOUND\r\n".to_vec(),
                }
            }
            _ => b"UNKNOWN_COMMAND\r\n".to_vec(),
        };

        if stream.get_mut().write_all(&reply).await.is_err() {
            return;
        }
    }
}
