//! Device families and their policy tables.
//!
//! A [`Family`] names one CLI dialect. Its [`FamilyPolicy`] holds every
//! family-specific pattern and command; the rest of the crate is generic
//! over it.

pub mod policy;
mod registry;
pub mod vendors;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, PlatformError};

pub use policy::{
    AuxMode, BlockFixup, CheckpointQuery, Classification, CommitStep, Confirmation, Diagnostic,
    Discard, Dispatch, EchoMatch, ErrorRule, Extract, FamilyPolicy, PromptKind, PromptRule,
    Reorder, Rewrite, SaveStep, SessionCommands, ShutdownRule, Slot, WaitSet,
};

/// Supported device families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Family {
    /// ALU / Nokia SR classic CLI.
    AluSr,
    /// Cisco IOS.
    CiscoIos,
    /// Cisco IOS XR.
    #[serde(rename = "cisco-iosxr")]
    CiscoIosXr,
}

impl Family {
    /// Identification order. IOS XR banners also mention IOS, so XR is
    /// tried first.
    pub const ALL: [Family; 3] = [Family::CiscoIosXr, Family::CiscoIos, Family::AluSr];

    pub fn name(self) -> &'static str {
        match self {
            Family::AluSr => vendors::alu_sr::PLATFORM_NAME,
            Family::CiscoIos => vendors::cisco_ios::PLATFORM_NAME,
            Family::CiscoIosXr => vendors::cisco_iosxr::PLATFORM_NAME,
        }
    }

    /// The family's policy table.
    pub fn policy(self) -> &'static FamilyPolicy {
        registry::policy(self)
    }

    /// Look a family up by name.
    pub fn from_name(name: &str) -> Option<Family> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    /// Identify the family from a version probe reply.
    pub fn identify(probe_reply: &str) -> Option<Family> {
        Self::ALL.into_iter().find(|family| {
            family
                .policy()
                .signatures
                .iter()
                .any(|sig| probe_reply.contains(sig))
        })
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Family {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Family::from_name(s).ok_or_else(|| {
            PlatformError::UnknownFamily {
                name: s.to_string(),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identify() {
        assert_eq!(
            Family::identify("Cisco IOS XR Software, Version 6.1.2\nCopyright"),
            Some(Family::CiscoIosXr)
        );
        assert_eq!(
            Family::identify("Cisco IOS Software, C2900 Software, Version 15.2(4)M"),
            Some(Family::CiscoIos)
        );
        assert_eq!(
            Family::identify("TiMOS-C-12.0.R4 cpm/hops64 ALCATEL SR 7750 Copyright"),
            Some(Family::AluSr)
        );
        assert_eq!(Family::identify("Linux 6.1.0"), None);
    }

    #[test]
    fn test_names_round_trip() {
        for family in Family::ALL {
            assert_eq!(family.name().parse::<Family>().unwrap(), family);
        }
        assert!("junos".parse::<Family>().is_err());
    }

    #[test]
    fn test_serde_names() {
        #[derive(Deserialize)]
        struct Doc {
            family: Family,
        }
        let doc: Doc = toml::from_str("family = \"cisco-iosxr\"").unwrap();
        assert_eq!(doc.family, Family::CiscoIosXr);
        let doc: Doc = toml::from_str("family = \"alu-sr\"").unwrap();
        assert_eq!(doc.family, Family::AluSr);
    }
}
