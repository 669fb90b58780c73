//! beanstalkd text protocol: command encoding and response parsing.
//!
//! Commands and response lines are ASCII terminated by `\r\n`. Job bodies
//! follow their header line as `<bytes>` raw octets plus a trailing `\r\n`.
//! This module is I/O free; the TCP client in `providers::beanstalkd` drives
//! it over a stream.

use crate::error::QueueError;
use crate::job::{JobId, TubeName};

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;

/// Line terminator used by every protocol message
pub const CRLF: &[u8] = b"\r\n";

/// A command sent to the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    Use(&'a TubeName),
    Watch(&'a TubeName),
    Ignore(&'a TubeName),
    ReserveWithTimeout {
        seconds: u64,
    },
    Put {
        priority: u32,
        delay: u64,
        time_to_run: u64,
        body: &'a [u8],
    },
    Delete(JobId),
    Bury {
        id: JobId,
        priority: u32,
    },
}

impl Command<'_> {
    /// Protocol verb, used in diagnostics
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Use(_) => "use",
            Self::Watch(_) => "watch",
            Self::Ignore(_) => "ignore",
            Self::ReserveWithTimeout { .. } => "reserve-with-timeout",
            Self::Put { .. } => "put",
            Self::Delete(_) => "delete",
            Self::Bury { .. } => "bury",
        }
    }

    /// Serialize the command, including the job body for `put`
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = match self {
            Self::Use(tube) => format!("use {}", tube),
            Self::Watch(tube) => format!("watch {}", tube),
            Self::Ignore(tube) => format!("ignore {}", tube),
            Self::ReserveWithTimeout { seconds } => format!("reserve-with-timeout {}", seconds),
            Self::Put {
                priority,
                delay,
                time_to_run,
                body,
            } => format!("put {} {} {} {}", priority, delay, time_to_run, body.len()),
            Self::Delete(id) => format!("delete {}", id),
            Self::Bury { id, priority } => format!("bury {} {}", id, priority),
        }
        .into_bytes();
        buf.extend_from_slice(CRLF);

        if let Self::Put { body, .. } = self {
            buf.extend_from_slice(body);
            buf.extend_from_slice(CRLF);
        }

        buf
    }
}

/// A parsed response line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Using(String),
    Watching(u32),
    /// Header of a reserved job; `bytes` octets of body follow
    Reserved {
        id: JobId,
        bytes: usize,
    },
    TimedOut,
    DeadlineSoon,
    Inserted(JobId),
    /// `put` succeeded but the server buried the job (out of memory)
    BuriedOnInsert(JobId),
    /// `bury` succeeded
    Buried,
    Deleted,
    NotFound,
    NotIgnored,
    ExpectedCrlf,
    JobTooBig,
    Draining,
    /// Generic failure: OUT_OF_MEMORY, INTERNAL_ERROR, BAD_FORMAT, UNKNOWN_COMMAND
    ServerError(String),
}

impl Response {
    /// Parse one response line, with or without its trailing CRLF
    pub fn parse(line: &str) -> Result<Self, QueueError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut parts = line.split(' ');
        let word = parts.next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();

        let response = match (word, args.as_slice()) {
            ("USING", [tube]) => Self::Using((*tube).to_string()),
            ("WATCHING", [count]) => Self::Watching(parse_number(line, count)?),
            ("RESERVED", [id, bytes]) => Self::Reserved {
                id: JobId::new(parse_number(line, id)?),
                bytes: parse_number(line, bytes)?,
            },
            ("TIMED_OUT", []) => Self::TimedOut,
            ("DEADLINE_SOON", []) => Self::DeadlineSoon,
            ("INSERTED", [id]) => Self::Inserted(JobId::new(parse_number(line, id)?)),
            ("BURIED", [id]) => Self::BuriedOnInsert(JobId::new(parse_number(line, id)?)),
            ("BURIED", []) => Self::Buried,
            ("DELETED", []) => Self::Deleted,
            ("NOT_FOUND", []) => Self::NotFound,
            ("NOT_IGNORED", []) => Self::NotIgnored,
            ("EXPECTED_CRLF", []) => Self::ExpectedCrlf,
            ("JOB_TOO_BIG", []) => Self::JobTooBig,
            ("DRAINING", []) => Self::Draining,
            ("OUT_OF_MEMORY" | "INTERNAL_ERROR" | "BAD_FORMAT" | "UNKNOWN_COMMAND", []) => {
                Self::ServerError(word.to_string())
            }
            _ => {
                return Err(QueueError::UnexpectedResponse {
                    command: "<unknown>".to_string(),
                    response: line.to_string(),
                })
            }
        };

        Ok(response)
    }

    /// Map a response that is not a success for `command` to an error
    pub fn into_error(self, command: &Command<'_>) -> QueueError {
        match (self, command) {
            (Self::NotFound, Command::Delete(id)) => QueueError::JobNotFound { job_id: *id },
            (Self::NotFound, Command::Bury { id, .. }) => QueueError::JobNotFound { job_id: *id },
            (Self::NotIgnored, Command::Ignore(tube)) => QueueError::NotIgnored {
                tube: tube.to_string(),
            },
            (Self::JobTooBig, Command::Put { body, .. }) => {
                QueueError::JobTooBig { size: body.len() }
            }
            (Self::ExpectedCrlf, _) => QueueError::ExpectedCrlf,
            (Self::Draining, _) => QueueError::Draining,
            (Self::BuriedOnInsert(id), _) => QueueError::BuriedOnInsert { job_id: id },
            (Self::ServerError(code), _) => QueueError::ServerError { code },
            (other, command) => QueueError::UnexpectedResponse {
                command: command.verb().to_string(),
                response: format!("{:?}", other),
            },
        }
    }
}

fn parse_number<T: std::str::FromStr>(line: &str, field: &str) -> Result<T, QueueError> {
    field.parse().map_err(|_| QueueError::UnexpectedResponse {
        command: "<unknown>".to_string(),
        response: line.to_string(),
    })
}
