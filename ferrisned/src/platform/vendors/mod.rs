//! Built-in device family policies.

pub mod alu_sr;
pub mod cisco_ios;
pub mod cisco_iosxr;

use regex::Regex;

use crate::channel::CompiledPattern;

fn rx(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap()
}

fn prompt(pattern: &str) -> CompiledPattern {
    CompiledPattern::new(pattern).unwrap()
}

/// Case-insensitive alternation of regex fragments.
fn any_of(fragments: &[&str]) -> Regex {
    rx(&format!("(?i)(?:{})", fragments.join("|")))
}
