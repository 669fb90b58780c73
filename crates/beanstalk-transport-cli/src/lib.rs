//! # Beanstalk Transport CLI
//!
//! Command-line interface for the beanstalk envelope transport.
//!
//! This module provides CLI commands for:
//! - Sending one JSON message to a tube
//! - Receiving one message and acknowledging, rejecting or leaving it
//! - Showing the resolved configuration

use beanstalk_transport::{
    BeanstalkTransport, ConfigurationError, Envelope, EnvelopeCodec, HeaderStamp, JsonCodec,
    Transport, TransportConfig, TransportError, TransportMessageIdStamp,
};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// ============================================================================
// CLI Structure
// ============================================================================

/// Beanstalk Transport CLI - send and receive envelopes over beanstalkd
#[derive(Parser, Debug)]
#[command(name = "beanstalk-transport")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Send and receive envelopes over beanstalkd tubes")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "BEANSTALK_TRANSPORT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Logging level
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,

    /// Queue server host
    #[arg(long)]
    pub host: Option<String>,

    /// Queue server port
    #[arg(long)]
    pub port: Option<u16>,

    /// Tube to send to and receive from
    #[arg(long)]
    pub tube: Option<String>,

    /// Reservation and connection timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send one message and print the assigned job id
    Send {
        /// Message body as JSON
        #[arg(short, long)]
        body: String,

        /// Header as name=value, may be repeated
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },

    /// Receive at most one message and print it as JSON
    Receive {
        /// What to do with a received message
        #[arg(short, long, value_enum, default_value = "leave")]
        then: AfterReceive,
    },

    /// Validate and print the resolved configuration
    Config,
}

/// Follow-up action for a received message
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum AfterReceive {
    /// Delete the job
    Ack,
    /// Bury the job
    Reject,
    /// Keep the job reserved until the connection closes
    Leave,
}

// ============================================================================
// Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 1,
            Self::Transport(TransportError::Configuration(_)) => 1,
            Self::Transport(_) => 2,
            Self::InvalidArgument { .. } => 3,
            Self::Io(_) => 4,
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Main CLI entry point
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();

    initialize_logging(&cli)?;

    let mut stdout = std::io::stdout();
    execute(cli, &mut stdout).await
}

/// Run a parsed command, writing results to `out`
pub async fn execute<W: Write>(cli: Cli, out: &mut W) -> Result<(), CliError> {
    let config = resolve_configuration(&cli)?;
    debug!(host = %config.host, port = config.port, tube = %config.tube, "Resolved configuration");

    match cli.command {
        Commands::Send { body, headers } => execute_send_command(&config, &body, &headers, out).await,
        Commands::Receive { then } => execute_receive_command(&config, then, out).await,
        Commands::Config => execute_config_command(&config, out),
    }
}

/// Initialize logging based on CLI arguments
///
/// `RUST_LOG` takes precedence over `--log-level`. Logs go to stderr so
/// command output on stdout stays machine readable.
fn initialize_logging(cli: &Cli) -> Result<(), CliError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .map_err(|e| CliError::InvalidArgument {
            arg: "log-level".to_string(),
            message: e.to_string(),
        })?;

    let json_layer = cli.json_logs.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });
    let text_layer = (!cli.json_logs)
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();

    Ok(())
}

/// Merge the configuration file, environment and command-line overrides
pub fn resolve_configuration(cli: &Cli) -> Result<TransportConfig, CliError> {
    let mut overrides = HashMap::new();
    if let Some(host) = &cli.host {
        overrides.insert("host".to_string(), host.clone());
    }
    if let Some(port) = cli.port {
        overrides.insert("port".to_string(), port.to_string());
    }
    if let Some(tube) = &cli.tube {
        overrides.insert("tube".to_string(), tube.clone());
    }
    if let Some(timeout) = cli.timeout {
        overrides.insert("timeout".to_string(), timeout.to_string());
    }

    Ok(TransportConfig::load_with_overrides(
        cli.config.as_deref(),
        &overrides,
    )?)
}

/// Split a `name=value` header argument
pub fn parse_header(raw: &str) -> Result<HeaderStamp, CliError> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok(HeaderStamp::new(name.trim(), value))
        }
        _ => Err(CliError::InvalidArgument {
            arg: "header".to_string(),
            message: format!("expected name=value, got '{}'", raw),
        }),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// Execute send command
async fn execute_send_command<W: Write>(
    config: &TransportConfig,
    body: &str,
    headers: &[String],
    out: &mut W,
) -> Result<(), CliError> {
    let message: Value = serde_json::from_str(body).map_err(|e| CliError::InvalidArgument {
        arg: "body".to_string(),
        message: e.to_string(),
    })?;

    let mut envelope = Envelope::new(message);
    for raw in headers {
        envelope = envelope.with(parse_header(raw)?);
    }

    let mut transport = BeanstalkTransport::connect(config, JsonCodec::<Value>::new()).await?;
    let sent = transport.send(&envelope).await?;

    if let Some(stamp) = sent.last::<TransportMessageIdStamp>() {
        info!(job_id = %stamp.id(), tube = %config.tube, "Message sent");
        writeln!(out, "{}", stamp.id())?;
    }
    Ok(())
}

/// Execute receive command
async fn execute_receive_command<W: Write>(
    config: &TransportConfig,
    then: AfterReceive,
    out: &mut W,
) -> Result<(), CliError> {
    let codec = JsonCodec::<Value>::new();
    let mut transport = BeanstalkTransport::connect(config, codec.clone()).await?;

    let Some(envelope) = transport.get().await?.into_iter().next() else {
        writeln!(out, "no message")?;
        return Ok(());
    };

    let mut rendered = codec.encode(&envelope).map_err(TransportError::Encode)?;
    if let (Value::Object(fields), Some(stamp)) =
        (&mut rendered, envelope.last::<TransportMessageIdStamp>())
    {
        fields.insert("id".to_string(), Value::from(stamp.id().as_u64()));
    }
    let rendered = serde_json::to_string_pretty(&rendered).map_err(TransportError::Serialization)?;
    writeln!(out, "{}", rendered)?;

    match then {
        AfterReceive::Ack => transport.ack(&envelope).await?,
        AfterReceive::Reject => transport.reject(&envelope).await?,
        AfterReceive::Leave => {}
    }
    info!(action = ?then, tube = %config.tube, "Message received");

    Ok(())
}

/// Execute config command
fn execute_config_command<W: Write>(config: &TransportConfig, out: &mut W) -> Result<(), CliError> {
    let rendered = toml::to_string_pretty(config).map_err(std::io::Error::other)?;
    write!(out, "{}", rendered)?;
    Ok(())
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
