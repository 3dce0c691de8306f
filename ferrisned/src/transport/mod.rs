//! Transport layer: raw byte streams to a device.
//!
//! A [`Transport`] only moves bytes. Prompt detection, echo handling and
//! timeouts live in the channel layer on top of it.
//!
//! Two implementations ship with the crate:
//! - [`SshTransport`] opens an interactive PTY shell over SSH (russh).
//! - [`StreamTransport`] wraps any `AsyncRead + AsyncWrite` stream, such
//!   as a raw TCP connection to a terminal server.

pub mod config;
mod ssh;
mod stream;

use std::future::Future;

use crate::error::Result;

pub use config::{AuthMethod, HostKeyVerification, SshConfig};
pub use ssh::SshTransport;
pub use stream::StreamTransport;

/// A connected, bidirectional byte stream to a device CLI.
pub trait Transport: Send {
    /// Write raw bytes to the device.
    fn write(&mut self, data: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Read the next chunk of output.
    ///
    /// Resolves to `Ok(None)` once the peer has closed the stream.
    fn read(&mut self) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Close the stream.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}
