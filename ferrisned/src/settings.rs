//! Driver settings with global, family and device scopes.
//!
//! Settings are read from TOML. Every scope holds the same optional
//! fields; resolution walks global, then the family, then the device,
//! and the most specific value set for a field wins.
//!
//! ```toml
//! [global]
//! fingerprint = "config-hash"
//!
//! [family.alu-sr]
//! persist-on = "prepare"
//!
//! [device.pe1]
//! fingerprint = "checkpoint"
//! shutdown-before-apply = true
//! ```

use std::path::Path;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SettingsError};
use crate::platform::Family;

/// When the non-volatile save happens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PersistOn {
    /// Save in the persist phase.
    #[default]
    Persist,
    /// Save at the end of prepare.
    Prepare,
}

/// How the change fingerprint is computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FingerprintMethod {
    /// Hash of the normalized configuration plus auxiliary dumps.
    #[default]
    ConfigHash,
    /// Hash of the device-reported checkpoint identifier.
    Checkpoint,
}

/// One scope of settings. Unset fields defer to the enclosing scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct SettingsLayer {
    pub persist_on: Option<PersistOn>,
    pub fingerprint: Option<FingerprintMethod>,
    pub transactional_config: Option<bool>,
    pub shutdown_before_apply: Option<bool>,
    pub read_timeout_secs: Option<u64>,
    pub write_timeout_secs: Option<u64>,
    pub trace: Option<bool>,
}

impl SettingsLayer {
    fn apply_to(&self, settings: &mut NedSettings) {
        if let Some(v) = self.persist_on {
            settings.persist_on = v;
        }
        if let Some(v) = self.fingerprint {
            settings.fingerprint = v;
        }
        if let Some(v) = self.transactional_config {
            settings.transactional_config = v;
        }
        if let Some(v) = self.shutdown_before_apply {
            settings.shutdown_before_apply = v;
        }
        if let Some(v) = self.read_timeout_secs {
            settings.read_timeout = Duration::from_secs(v);
        }
        if let Some(v) = self.write_timeout_secs {
            settings.write_timeout = Duration::from_secs(v);
        }
        if let Some(v) = self.trace {
            settings.trace = v;
        }
    }
}

/// A settings document: the global scope plus per-family and per-device
/// overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsFile {
    pub global: SettingsLayer,
    /// Keyed by family name, e.g. `cisco-ios`.
    pub family: IndexMap<String, SettingsLayer>,
    /// Keyed by device id.
    pub device: IndexMap<String, SettingsLayer>,
}

impl SettingsFile {
    /// Parse a TOML settings document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text).map_err(SettingsError::Parse)?)
    }

    /// Read and parse a TOML settings file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(SettingsError::Io)?;
        Self::from_toml_str(&text)
    }

    /// Effective settings for one device of a given family.
    pub fn resolve(&self, device_id: &str, family: Family) -> NedSettings {
        self.resolve_scopes(device_id, Some(family))
    }

    /// Settings for a device whose family is not known yet, used while
    /// connecting.
    pub fn resolve_unidentified(&self, device_id: &str) -> NedSettings {
        self.resolve_scopes(device_id, None)
    }

    fn resolve_scopes(&self, device_id: &str, family: Option<Family>) -> NedSettings {
        let mut settings = NedSettings::default();
        self.global.apply_to(&mut settings);
        if let Some(layer) = family.and_then(|f| self.family.get(f.name())) {
            layer.apply_to(&mut settings);
        }
        if let Some(layer) = self.device.get(device_id) {
            layer.apply_to(&mut settings);
        }
        settings
    }
}

/// Fully resolved settings for one device session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NedSettings {
    pub persist_on: PersistOn,
    pub fingerprint: FingerprintMethod,
    /// Edit through an exclusive candidate and commit it explicitly.
    pub transactional_config: bool,
    /// Disable nodes that carry a shutdown leaf while they are edited.
    pub shutdown_before_apply: bool,
    /// Deadline for each expect.
    pub read_timeout: Duration,
    /// Budget the caller grants per stretch of apply work.
    pub write_timeout: Duration,
    /// Forward the send/receive trace to the caller context.
    pub trace: bool,
}

impl Default for NedSettings {
    fn default() -> Self {
        Self {
            persist_on: PersistOn::Persist,
            fingerprint: FingerprintMethod::ConfigHash,
            transactional_config: false,
            shutdown_before_apply: false,
            read_timeout: Duration::from_secs(20),
            write_timeout: Duration::from_secs(20),
            trace: false,
        }
    }
}
