//! Error types for ferrisned.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::driver::Phase;

/// Main error type for ferrisned operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level errors, including expect deadlines.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Connect-time session establishment errors.
    #[error("Connect error: {0}")]
    Connect(#[from] ConnectError),

    /// A command was rejected by the device.
    #[error("Apply error: {0}")]
    Apply(#[from] ApplyError),

    /// The device reported a transient condition for a command.
    ///
    /// Consumed by the apply retry loop; only visible to callers that
    /// drive single lines themselves.
    #[error("Device busy on '{command}': {device_text}")]
    TransientBusy {
        command: String,
        device_text: String,
    },

    /// A lifecycle phase failed.
    #[error("{phase} failed: {source}")]
    Lifecycle {
        phase: Phase,
        #[source]
        source: Box<Error>,
    },

    /// The driver was used in a state that does not allow the operation.
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// Platform/family definition errors.
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Settings loading errors.
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
}

impl Error {
    /// Wrap this error with the lifecycle phase it originated in.
    ///
    /// Errors already tagged with a phase are returned unchanged.
    pub fn in_phase(self, phase: Phase) -> Self {
        match self {
            Error::Lifecycle { .. } => self,
            other => Error::Lifecycle {
                phase,
                source: Box::new(other),
            },
        }
    }

    /// Whether this error (or the error it wraps) is an expect deadline expiry.
    pub fn is_transport_timeout(&self) -> bool {
        match self {
            Error::Transport(TransportError::Timeout { .. }) => true,
            Error::Lifecycle { source, .. } => source.is_transport_timeout(),
            _ => false,
        }
    }

    /// The apply failure carried by this error, if any.
    pub fn apply_error(&self) -> Option<&ApplyError> {
        match self {
            Error::Apply(e) => Some(e),
            Error::Lifecycle { source, .. } => source.apply_error(),
            _ => None,
        }
    }
}

/// Transport layer errors (connection, authentication, stream I/O).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to connect to host
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// SSH key error
    #[error("SSH key error: {0}")]
    Key(String),

    /// The server presented a host key that differs from known_hosts.
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// Strict verification rejected an unknown host.
    #[error("Host {host}:{port} is not in known_hosts")]
    HostKeyUnknown { host: String, port: u16 },

    /// known_hosts could not be read or written.
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// Connection was closed unexpectedly
    #[error("Connection disconnected")]
    Disconnected,

    /// No expected pattern appeared before the deadline.
    #[error("No pattern matched within {after:?}; pending output: {pending:?}")]
    Timeout { after: Duration, pending: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors raised while establishing a device session.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// The device asked for credentials instead of presenting a prompt.
    #[error("Authentication failure: device answered with '{prompt}'")]
    AuthenticationFailure { prompt: String },

    /// The version probe matched no known family signature.
    #[error("Unrecognized device: {excerpt}")]
    UnrecognizedDevice { excerpt: String },
}

/// A command rejected by the device, with the navigational facts that
/// drive the unwind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("command: {command}: {device_text}")]
pub struct ApplyError {
    /// The command line that failed, as sent.
    pub command: String,
    /// The device text that classified the failure, verbatim.
    pub device_text: String,
    /// Whether the session was at the top-level config prompt.
    pub at_top: bool,
    /// Whether the session was still in config mode.
    pub in_config_mode: bool,
}

impl ApplyError {
    pub fn new(
        command: impl Into<String>,
        device_text: impl Into<String>,
        at_top: bool,
        in_config_mode: bool,
    ) -> Self {
        Self {
            command: command.into(),
            device_text: device_text.into(),
            at_top,
            in_config_mode,
        }
    }
}

/// Driver usage errors.
#[derive(Error, Debug)]
pub enum DriverError {
    /// Command refused in the current mode.
    #[error("Command '{command}' refused: {reason}")]
    CommandRefused { command: String, reason: String },

    /// Device output did not contain what an operation requires.
    #[error("Unexpected device output for '{command}': {output}")]
    UnexpectedOutput { command: String, output: String },

    /// Invalid configuration in the session builder
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

/// Platform/family definition errors.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// No family is registered under this name.
    #[error("Unknown device family '{name}'")]
    UnknownFamily { name: String },

    /// Invalid pattern in a family definition
    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Settings loading errors.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// The settings file could not be read.
    #[error("Failed to read settings: {0}")]
    Io(#[from] io::Error),

    /// The settings document is not valid TOML for the schema.
    #[error("Failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Result type alias using ferrisned's Error.
pub type Result<T> = std::result::Result<T, Error>;
