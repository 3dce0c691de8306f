//! SSH connection settings for a device session.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

/// Default SSH port.
pub const DEFAULT_PORT: u16 = 22;

/// PTY width requested from the device. Wide enough that long config
/// lines are never wrapped by the CLI, which would break echo matching.
pub const DEFAULT_TERMINAL_WIDTH: u32 = 511;

pub const DEFAULT_TERMINAL_HEIGHT: u32 = 24;

/// How the server host key is checked against known_hosts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HostKeyVerification {
    /// Reject unknown and changed keys.
    Strict,
    /// Learn unknown keys, reject changed ones.
    #[default]
    AcceptNew,
    /// Accept any key. Lab devices only.
    Disabled,
}

/// Where and how to open the device shell.
#[derive(Debug)]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: AuthMethod,
    /// Bound on TCP connect plus key exchange, and the idle limit of the
    /// SSH connection.
    pub timeout: Duration,
    pub terminal_width: u32,
    pub terminal_height: u32,
    /// Interval of SSH keepalives while a long apply is running.
    pub keepalive: Option<Duration>,
    pub host_key_verification: HostKeyVerification,
    /// known_hosts file other than `~/.ssh/known_hosts`.
    pub known_hosts_path: Option<PathBuf>,
}

impl SshConfig {
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            username: username.into(),
            auth: AuthMethod::None,
            timeout: Duration::from_secs(30),
            terminal_width: DEFAULT_TERMINAL_WIDTH,
            terminal_height: DEFAULT_TERMINAL_HEIGHT,
            keepalive: None,
            host_key_verification: HostKeyVerification::default(),
            known_hosts_path: None,
        }
    }

    /// `host:port`, as used in log lines and errors.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Credentials offered to the device.
#[derive(Debug)]
pub enum AuthMethod {
    /// `none` authentication, for test servers.
    None,
    Password(SecretString),
    PrivateKey {
        path: PathBuf,
        /// For encrypted key files.
        passphrase: Option<SecretString>,
    },
}
