//! Process-wide family policy tables.
//!
//! Policies are immutable and built on first use; every session of a
//! family shares the same table.

use once_cell::sync::Lazy;

use super::policy::FamilyPolicy;
use super::{Family, vendors};

static ALU_SR: Lazy<FamilyPolicy> = Lazy::new(vendors::alu_sr::policy);
static CISCO_IOS: Lazy<FamilyPolicy> = Lazy::new(vendors::cisco_ios::policy);
static CISCO_IOSXR: Lazy<FamilyPolicy> = Lazy::new(vendors::cisco_iosxr::policy);

/// The shared policy of a family.
pub(super) fn policy(family: Family) -> &'static FamilyPolicy {
    match family {
        Family::AluSr => &ALU_SR,
        Family::CiscoIos => &CISCO_IOS,
        Family::CiscoIosXr => &CISCO_IOSXR,
    }
}
