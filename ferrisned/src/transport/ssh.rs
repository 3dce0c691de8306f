//! Device shell over SSH (russh).
//!
//! The CLI runs in an interactive PTY shell, like an operator login.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use russh::client::{self, Handle, Msg};
use russh::keys::{PrivateKeyWithHashAlg, PublicKey, load_secret_key};
use russh::{Channel, ChannelMsg};
use secrecy::ExposeSecret;

use super::Transport;
use super::config::{AuthMethod, HostKeyVerification, SshConfig};
use crate::error::{Result, TransportError};

/// PTY shell on a device.
pub struct SshTransport {
    session: Handle<SshHandler>,
    channel: Channel<Msg>,
}

impl SshTransport {
    /// Connect, authenticate and start the shell.
    pub async fn connect(config: &SshConfig) -> Result<Self> {
        let ssh_config = Arc::new(client::Config {
            inactivity_timeout: Some(config.timeout),
            keepalive_interval: config.keepalive,
            ..Default::default()
        });

        let host_key_error: Arc<Mutex<Option<TransportError>>> = Arc::new(Mutex::new(None));

        let handler = SshHandler {
            host: config.host.clone(),
            port: config.port,
            host_key_verification: config.host_key_verification.clone(),
            known_hosts_path: config.known_hosts_path.clone(),
            host_key_error: host_key_error.clone(),
        };

        let mut session = tokio::time::timeout(
            config.timeout,
            client::connect(ssh_config, (config.host.as_str(), config.port), handler),
        )
        .await
        .map_err(|_| TransportError::Timeout {
            after: config.timeout,
            pending: String::new(),
        })?
        .map_err(|e| {
            // prefer the detailed host key error recorded by the handler
            let recorded = host_key_error.lock().ok().and_then(|mut slot| slot.take());
            recorded.unwrap_or(TransportError::Ssh(e))
        })?;

        Self::authenticate(&mut session, config).await?;
        info!("{}: authenticated as {}", config.socket_addr(), config.username);

        let channel = Self::open_shell(&session, config).await?;
        Ok(Self { session, channel })
    }

    async fn open_shell(session: &Handle<SshHandler>, config: &SshConfig) -> Result<Channel<Msg>> {
        let channel = session.channel_open_session().await.map_err(TransportError::Ssh)?;
        // plain vt100, no colour
        channel
            .request_pty(
                true,
                "vt100",
                config.terminal_width,
                config.terminal_height,
                0,
                0,
                &[],
            )
            .await
            .map_err(TransportError::Ssh)?;
        channel.request_shell(true).await.map_err(TransportError::Ssh)?;
        debug!(
            "{}: shell open, {}x{}",
            config.socket_addr(),
            config.terminal_width,
            config.terminal_height
        );
        Ok(channel)
    }

    async fn authenticate(session: &mut Handle<SshHandler>, config: &SshConfig) -> Result<()> {
        let success = match &config.auth {
            AuthMethod::None => session
                .authenticate_none(&config.username)
                .await
                .map_err(TransportError::Ssh)?
                .success(),
            AuthMethod::Password(password) => session
                .authenticate_password(&config.username, password.expose_secret())
                .await
                .map_err(TransportError::Ssh)?
                .success(),
            AuthMethod::PrivateKey { path, passphrase } => {
                let key = load_secret_key(path, passphrase.as_ref().map(|p| p.expose_secret()))
                    .map_err(|e| TransportError::Key(e.to_string()))?;

                let hash_alg = session
                    .best_supported_rsa_hash()
                    .await
                    .map_err(TransportError::Ssh)?
                    .flatten();

                session
                    .authenticate_publickey(
                        &config.username,
                        PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                    )
                    .await
                    .map_err(TransportError::Ssh)?
                    .success()
            }
        };

        if !success {
            return Err(TransportError::AuthenticationFailed {
                user: config.username.clone(),
            }
            .into());
        }

        Ok(())
    }
}

impl Transport for SshTransport {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.channel.data(data).await.map_err(TransportError::Ssh)?;
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            match self.channel.wait().await {
                Some(ChannelMsg::Data { data }) => return Ok(Some(data.to_vec())),
                Some(ChannelMsg::ExtendedData { data, .. }) => return Ok(Some(data.to_vec())),
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => return Ok(None),
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    debug!("device shell exited with {}", exit_status);
                    continue;
                }
                Some(_) => continue,
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Err(e) = self.channel.close().await {
            debug!("channel close: {}", e);
        }
        self.session
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await
            .map_err(TransportError::Ssh)?;
        Ok(())
    }
}

/// Host key policy for one connection.
struct SshHandler {
    host: String,
    port: u16,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
    host_key_error: Arc<Mutex<Option<TransportError>>>,
}

impl SshHandler {
    /// `Ok(true)` if known, `Ok(false)` if the host is not in known_hosts.
    fn check_known_hosts(&self, pubkey: &PublicKey) -> std::result::Result<bool, TransportError> {
        let result = match &self.known_hosts_path {
            Some(path) => russh::keys::check_known_hosts_path(&self.host, self.port, pubkey, path),
            None => russh::keys::check_known_hosts(&self.host, self.port, pubkey),
        };

        match result {
            Ok(matched) => Ok(matched),
            Err(russh::keys::Error::KeyChanged { line }) => Err(TransportError::HostKeyChanged {
                host: self.host.clone(),
                port: self.port,
                line,
            }),
            Err(e) => Err(TransportError::KnownHosts(e.to_string())),
        }
    }

    fn learn_host_key(&self, pubkey: &PublicKey) -> std::result::Result<(), TransportError> {
        let result = match &self.known_hosts_path {
            Some(path) => {
                russh::keys::known_hosts::learn_known_hosts_path(&self.host, self.port, pubkey, path)
            }
            None => russh::keys::known_hosts::learn_known_hosts(&self.host, self.port, pubkey),
        };

        result.map_err(|e| TransportError::KnownHosts(e.to_string()))
    }

    fn reject(&self, error: TransportError) -> bool {
        if let Ok(mut slot) = self.host_key_error.lock() {
            *slot = Some(error);
        }
        false
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        let accepted = match self.host_key_verification {
            HostKeyVerification::Disabled => true,
            HostKeyVerification::AcceptNew => match self.check_known_hosts(server_public_key) {
                Ok(true) => true,
                Ok(false) => {
                    if let Err(e) = self.learn_host_key(server_public_key) {
                        warn!("{}:{}: could not record host key: {}", self.host, self.port, e);
                    }
                    true
                }
                Err(e) => self.reject(e),
            },
            HostKeyVerification::Strict => match self.check_known_hosts(server_public_key) {
                Ok(true) => true,
                Ok(false) => self.reject(TransportError::HostKeyUnknown {
                    host: self.host.clone(),
                    port: self.port,
                }),
                Err(e) => self.reject(e),
            },
        };
        Ok(accepted)
    }
}
