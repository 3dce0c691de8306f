//! Builder for SSH device sessions.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use super::lifecycle::{DeviceDriver, DriverOptions};
use crate::error::{DriverError, Result};
use crate::transport::config::{
    AuthMethod, DEFAULT_PORT, DEFAULT_TERMINAL_HEIGHT, DEFAULT_TERMINAL_WIDTH, HostKeyVerification,
    SshConfig,
};
use crate::transport::SshTransport;

/// Builder for connecting a [`DeviceDriver`] over SSH.
///
/// # Example
///
/// ```rust,no_run
/// use ferrisned::driver::{DriverOptions, SessionBuilder};
///
/// # async fn example() -> Result<(), ferrisned::Error> {
/// let driver = SessionBuilder::new("192.168.1.1")
///     .username("admin")
///     .password("secret")
///     .open(DriverOptions::new("pe1"))
///     .await?;
/// println!("{}", driver.family());
/// # Ok(())
/// # }
/// ```
pub struct SessionBuilder {
    host: String,
    port: u16,
    username: Option<String>,
    auth: AuthMethod,
    timeout: Duration,
    terminal_width: u32,
    terminal_height: u32,
    keepalive: Option<Duration>,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
}

impl SessionBuilder {
    /// Create a new session builder for the specified host.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            username: None,
            auth: AuthMethod::None,
            timeout: Duration::from_secs(30),
            terminal_width: DEFAULT_TERMINAL_WIDTH,
            terminal_height: DEFAULT_TERMINAL_HEIGHT,
            keepalive: None,
            host_key_verification: HostKeyVerification::default(),
            known_hosts_path: None,
        }
    }

    /// Set the SSH port (default: 22).
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the username for authentication.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set password authentication.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.auth = AuthMethod::Password(SecretString::from(password.into()));
        self
    }

    /// Set private key authentication.
    pub fn private_key(mut self, key_path: impl Into<PathBuf>) -> Self {
        self.auth = AuthMethod::PrivateKey {
            path: key_path.into(),
            passphrase: None,
        };
        self
    }

    /// Set private key authentication with passphrase.
    pub fn private_key_with_passphrase(
        mut self,
        key_path: impl Into<PathBuf>,
        passphrase: impl Into<String>,
    ) -> Self {
        self.auth = AuthMethod::PrivateKey {
            path: key_path.into(),
            passphrase: Some(SecretString::from(passphrase.into())),
        };
        self
    }

    /// Set the connection timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send SSH keepalives at `interval`, for devices that drop idle
    /// sessions during long retries.
    pub fn keepalive(mut self, interval: Duration) -> Self {
        self.keepalive = Some(interval);
        self
    }

    /// Set terminal dimensions.
    pub fn terminal_size(mut self, width: u32, height: u32) -> Self {
        self.terminal_width = width;
        self.terminal_height = height;
        self
    }

    /// Set the host key verification mode.
    pub fn host_key_verification(mut self, mode: HostKeyVerification) -> Self {
        self.host_key_verification = mode;
        self
    }

    /// Use a known_hosts file other than `~/.ssh/known_hosts`.
    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    fn into_config(self) -> Result<SshConfig> {
        let username = self.username.ok_or_else(|| DriverError::InvalidConfig {
            message: format!("no username given for {}", self.host),
        })?;
        let mut config = SshConfig::new(self.host, username);
        config.port = self.port;
        config.auth = self.auth;
        config.timeout = self.timeout;
        config.terminal_width = self.terminal_width;
        config.terminal_height = self.terminal_height;
        config.keepalive = self.keepalive;
        config.host_key_verification = self.host_key_verification;
        config.known_hosts_path = self.known_hosts_path;
        Ok(config)
    }

    /// Open the SSH shell without identifying the device.
    pub async fn connect(self) -> Result<SshTransport> {
        let config = self.into_config()?;
        SshTransport::connect(&config).await
    }

    /// Connect, identify the device and resolve its settings.
    pub async fn open(self, options: DriverOptions) -> Result<DeviceDriver<SshTransport>> {
        let transport = self.connect().await?;
        DeviceDriver::open(transport, options).await
    }
}
