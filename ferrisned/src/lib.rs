//! # Ferrisned
//!
//! Async configuration deployment and drift detection for CLI-driven
//! network devices.
//!
//! Ferrisned pushes desired-configuration blocks into the config mode of
//! a device CLI over SSH, classifies every reply, and drives the change
//! through prepare, commit, abort, revert and persist. Reading the
//! configuration back produces the same normalized text that is pushed,
//! so drift can be detected by comparison or by fingerprint.
//!
//! ## Features
//!
//! - Async SSH sessions via russh, or any `AsyncRead + AsyncWrite` stream
//! - Device family identification (ALU SR, Cisco IOS, Cisco IOS XR)
//! - Per-family prompt, confirmation and error tables
//! - Outbound line rewriting with disable-before-delete safety
//! - Retry of lines the device reports as busy, with caller deadline
//!   extension
//! - Unwinding to the top-level prompt and out of config mode on failure
//! - Normalized configuration dumps and MD5 fingerprints
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ferrisned::{ChangeLifecycle, DriverOptions, SessionBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ferrisned::Error> {
//!     let mut driver = SessionBuilder::new("192.168.1.1")
//!         .username("admin")
//!         .password("secret")
//!         .open(DriverOptions::new("r1"))
//!         .await?;
//!
//!     driver.prepare("interface Loopback0\n description managed\n!\n").await?;
//!     driver.commit().await?;
//!     driver.persist().await?;
//!
//!     println!("{}", driver.fingerprint().await?);
//!     driver.close().await?;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod context;
pub mod driver;
pub mod error;
pub mod normalize;
pub mod platform;
pub mod settings;
pub mod store;
pub mod transform;
pub mod transport;

// Re-export main types for convenience
pub use context::{CallerContext, NoopContext, TraceDirection};
pub use driver::{
    ChangeLifecycle, DeviceDriver, DriverOptions, Phase, Response, Session, SessionBuilder,
};
pub use error::{ApplyError, Error};
pub use platform::{Family, FamilyPolicy};
pub use settings::{NedSettings, SettingsFile};
pub use store::{ConfigStore, MemoryStore};
pub use transport::{AuthMethod, SshConfig};
