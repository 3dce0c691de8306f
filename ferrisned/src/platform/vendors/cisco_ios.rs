//! Cisco IOS.
//!
//! ```text
//! router1#                  # exec
//! router1(config)#          # top-level config
//! router1(config-if)#       # nested config
//! ```
//!
//! Lines are sent one at a time and each echo is awaited in full.

use super::{any_of, prompt, rx};
use crate::normalize::{Normalizer, Pass};
use crate::platform::{
    BlockFixup, Classification, EchoMatch, FamilyPolicy, PromptKind, Rewrite, SaveStep,
    SessionCommands,
};

/// Family name.
pub const PLATFORM_NAME: &str = "cisco-ios";

const WARNINGS: &[&str] = &[
    r"Warning: \S+",
    "AAA: Warning",
    "hqm_tablemap_inform: CLASS_REMOVE error",
    "name length exceeded the recommended length of .* characters",
    "A profile is deemed incomplete until it has .* statements",
];

// Alphabetical.
const FATAL: &[&str] = &[
    "aborted",
    "a .* already exists for network",
    "bad mask",
    "being used",
    "cannot apply",
    "cannot be deleted",
    "cannot configure",
    "cannot negate",
    "cannot redistribute",
    "command is depreceated",
    "command rejected",
    "configuration not accepted",
    "configure .* first",
    "create .* first",
    "disable .* first",
    r"does not exist\.",
    "does not support .* configurations",
    "duplicate name",
    "enable .* globally before configuring",
    "error",
    "exceeded",
    "failed",
    "first configure the",
    "has already been assigned to",
    "hash values can not exceed 255",
    "illegal hostname",
    "is being un/configured in sub-mode, cannot remove it",
    "in use, cannot",
    "incomplete",
    "inconsistent address.*mask",
    "interface .* already configured as default ",
    "interface.* combination tied to .* already",
    "interface .* is not associated with vrf",
    "invalid",
    "is configured as .* already",
    "is linked to a vrf. enable .* on that vrf first",
    "is not logically valid",
    "is not permitted",
    "is not running",
    "is not supported",
    "is used by",
    "may not be configured",
    "must be configured first",
    "must be disabled first",
    "must be greater than",
    "must be removed first",
    "must configure ip address for",
    "must enable .* routing first",
    "must specify a .* port as the next hop interface",
    "no existing configuration binding the default",
    "no such",
    "not allowed",
    "not a valid ",
    "not added",
    "not configured",
    "not enough memory",
    "not defined",
    "not supported in",
    "overlaps with",
    "peer.* combination tied to .* already",
    "please configure .* before configuring",
    "please remove the service-policy on the zone-pair",
    "please 'shutdown' this interface before trying to delete it",
    "previously established ldp sessions may not have",
    "protocol not in this image",
    "routing not enabled",
    "setting rekey authentication rejected",
    "should be in range",
    "specify .* commands first",
    "sum total of .* exceeds 100 percent",
    "table is full",
    "unable to add",
    "unable to set_.* for ",
    "unable to populate",
    "unknown vrf specified",
    "use 'ip vrf forwarding' command for vrf",
    "use 'vrf forwarding' command for vrf",
    "vpn routing instance .* does not exist",
    "vrf specified does not match .* router",
];

const RETRY: &[&str] = &[
    "is in use",
    "wait for it to complete",
    "is currently being deconfigured",
    "already exists",
];

/// Create the Cisco IOS policy.
pub fn policy() -> FamilyPolicy {
    let mut policy = FamilyPolicy::new(PLATFORM_NAME)
        .with_signature("Cisco IOS Software")
        .with_signature("Cisco Internetwork Operating")
        .with_prompt(
            PromptKind::TopConfig,
            prompt(r"(?m)^[^\s#()]+\((?:config|cfg)\)#"),
        )
        .with_prompt(
            PromptKind::NestedConfig,
            prompt(r"(?m)^[^\s#()]+\([^\s()]+\)#"),
        )
        .with_prompt(PromptKind::Exec, prompt(r"(?m)^[^\s#()]+# ?$"))
        .with_confirmation(prompt(r"Continue\?\[confirm\]"), "c", false)
        .with_confirmation(prompt(r"\? \[yes/no\]"), "yes", true)
        .with_confirmation(prompt(r"Do you want to destroy .*\?\[confirm\]"), "yes", true)
        .with_confirmation(prompt(r"Continue\? \[yes\]"), "yes", true)
        .with_confirmation(
            prompt(r"Do you want to kill that session and continue"),
            "yes",
            true,
        )
        .with_confirmation(
            prompt(r"Overwrite the previous NVRAM configuration\?\[confirm\]"),
            "y",
            false,
        )
        .with_error_leader(prompt(r"(?m)^(?:Aborted|Error|syntax error|error:).*\n"))
        // already deleted on the device
        .with_command_error(
            rx(r"no ip address "),
            rx(r"Invalid address"),
            Classification::Warning,
        )
        // `no media-type` also removes duplex
        .with_command_error(
            rx(r"^no duplex$"),
            rx(r"Invalid input detected at"),
            Classification::Warning,
        );
    for warning in WARNINGS {
        policy = policy.with_error(rx(warning), Classification::Warning);
    }

    policy
        .with_error(any_of(FATAL), Classification::Fatal)
        .with_error(any_of(RETRY), Classification::Retry)
        .with_rewrite(Rewrite::Banner {
            delimiter: "^".into(),
        })
        .with_rewrite(Rewrite::Replace {
            pattern: rx(r"^ip address$"),
            replacement: "!ip address".into(),
        })
        .with_rewrite(Rewrite::Replace {
            pattern: rx(r"no disable passive-interface "),
            replacement: "passive-interface ".into(),
        })
        .with_rewrite(Rewrite::Replace {
            pattern: rx(r"disable passive-interface "),
            replacement: "no passive-interface ".into(),
        })
        .with_rewrite(Rewrite::Replace {
            pattern: rx(r"network-clock-participate wic-disabled "),
            replacement: "no network-clock-participate wic ".into(),
        })
        .with_rewrite(Rewrite::Replace {
            pattern: rx(r"no mls qos srr-queue (\S+) (\S+)-map .*"),
            replacement: "no mls qos srr-queue ${1} ${2}-map".into(),
        })
        .with_rewrite(Rewrite::Drop(rx(r"^tailfned ")))
        .with_rewrite(Rewrite::Drop(rx(r"^config t$")))
        .with_block_fixup(BlockFixup::DequoteBodies {
            opener: rx(r"^ certificate "),
        })
        .with_block_fixup(BlockFixup::HoistNegations {
            opener: rx(r"^policy-map "),
            context: rx(r"^\s*(?:!|class )"),
            negation: rx(r"^\s*no (?:bandwidth|priority) percent "),
        })
        .with_reorder(rx(r"^\s*no switchport\s*$"), rx(r"^\s*no switchport \S+"))
        .with_dispatch(100, false, EchoMatch::FullLine)
        .with_strict_config_mode(true)
        .with_commands(SessionCommands {
            setup: vec!["terminal length 0".into(), "terminal width 0".into()],
            enter_config: vec!["config t".into()],
            exit_config: "exit".into(),
            exit_config_repeat: true,
            context_exit: "exit".into(),
            save: Some(SaveStep {
                command: "write memory".into(),
                required: None,
                expected: None,
            }),
            dump: "show running-config".into(),
            ..Default::default()
        })
        .with_normalizer(normalizer())
}

fn normalizer() -> Normalizer {
    Normalizer::new(vec![
        Pass::TrimLines,
        Pass::CutThrough(rx(r"^Current configuration")),
        Pass::CutThrough(rx(r"^! Last configuration change")),
        Pass::CutThrough(rx(r"^No entries found\.")),
        Pass::CutFromLast(rx(r"^end$")),
        // banner bodies are opaque to the line passes below
        Pass::QuoteBanners,
        Pass::DropLines(rx(r"^! NVRAM config last updated")),
        Pass::DropRanges {
            start: rx(r"^macro name"),
            end: rx(r"^@"),
        },
        Pass::DropRanges {
            start: rx(r"^boot-start-marker$"),
            end: rx(r"^boot-end-marker$"),
        },
        Pass::DropLines(rx(r"^(?:alias |hw-module|ntp clock-period| ! Incomplete config, )")),
        Pass::QuoteBodies {
            opener: rx(r"^ certificate "),
            closer: rx(r"^\s*quit$"),
        },
        Pass::FoldInto {
            pattern: rx(r"^\s*switchport trunk allowed vlan add (?P<tail>\S+)$"),
            separator: ",".into(),
        },
        Pass::ReplaceInLines {
            lines: rx(r"^\s*instance \d+ vlan "),
            pattern: rx(r", "),
            replacement: ",".into(),
        },
        Pass::Replace {
            pattern: rx(r"(?m)^ip domain-(name|list) "),
            replacement: "ip domain ${1} ".into(),
        },
        Pass::Replace {
            pattern: rx(r"(?m)^ip domain-lookup"),
            replacement: "ip domain lookup".into(),
        },
        Pass::Replace {
            pattern: rx(r"(?m)^aaa authorization (.*)local if-authenticated"),
            replacement: "aaa authorization ${1}if-authenticated local".into(),
        },
        Pass::Replace {
            pattern: rx(r"(?m)^line con 0$"),
            replacement: "line console 0".into(),
        },
        Pass::Replace {
            pattern: rx(r"channel-misconfig \(STP\)"),
            replacement: "channel-misconfig".into(),
        },
        // inverse of the outbound rewrites
        Pass::Replace {
            pattern: rx(r"no passive-interface "),
            replacement: "disable passive-interface ".into(),
        },
        Pass::Replace {
            pattern: rx(r"no network-clock-participate wic "),
            replacement: "network-clock-participate wic-disabled ".into(),
        },
        Pass::Replace {
            pattern: rx(r"(?m)^( +)random-detect$"),
            replacement: "${1}random-detect precedence-based".into(),
        },
        Pass::Replace {
            pattern: rx(r"(?m)^( *)police (\d+) (\d+) (\d+)\b"),
            replacement: "${1}police cir ${2} bc ${3} be ${4}".into(),
        },
        Pass::Replace {
            pattern: rx(r"(?m)^( *)police (\d+) (\d+)\b"),
            replacement: "${1}police cir ${2} bc ${3}".into(),
        },
        Pass::Replace {
            pattern: rx(r"(?m)^( *)police (\d+)($| [a-z-]+-action)"),
            replacement: "${1}police cir ${2}${3}".into(),
        },
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Slot;

    fn kind(text: &str) -> Option<PromptKind> {
        policy().prompt_kind(text)
    }

    // =========================================================================
    // Prompts
    // =========================================================================

    #[test]
    fn test_prompt_kinds() {
        assert_eq!(kind("router1#"), Some(PromptKind::Exec));
        assert_eq!(kind("router1# "), Some(PromptKind::Exec));
        assert_eq!(kind("router1(config)#"), Some(PromptKind::TopConfig));
        assert_eq!(kind("router1(cfg)#"), Some(PromptKind::TopConfig));
        assert_eq!(kind("router1(config-if)#"), Some(PromptKind::NestedConfig));
        assert_eq!(kind("router1(config-pmap-c)#"), Some(PromptKind::NestedConfig));
    }

    #[test]
    fn test_top_config_preferred_over_nested() {
        let set = policy().prompt_set();
        let (index, _, _) = set.set.find_earliest(b"\nrouter1(config)#").unwrap();
        assert_eq!(set.slot(index), Slot::Prompt(PromptKind::TopConfig));
    }

    #[test]
    fn test_confirmation_answers() {
        let p = policy();
        let set = p.command_set();
        let (index, _, _) = set
            .set
            .find_earliest(b"Destination filename [startup-config]? Continue?[confirm]")
            .unwrap();
        let Slot::Confirm(i) = set.slot(index) else {
            panic!("expected a confirmation");
        };
        assert_eq!(p.confirmations[i].reply(), "c");

        let (index, _, _) = set
            .set
            .find_earliest(b"Are you sure? [yes/no]")
            .unwrap();
        let Slot::Confirm(i) = set.slot(index) else {
            panic!("expected a confirmation");
        };
        assert_eq!(p.confirmations[i].reply(), "yes\n");
    }

    #[test]
    fn test_error_leader_in_line_set_only() {
        let p = policy();
        let data = b"syntax error, expecting <cr>\n";
        assert!(p.prompt_set().set.find_earliest(data).is_none());
        let set = p.line_set();
        let (index, _, _) = set.set.find_earliest(data).unwrap();
        assert_eq!(set.slot(index), Slot::ErrorLeader);
    }

    // =========================================================================
    // Classification and rewrites
    // =========================================================================

    #[test]
    fn test_warnings_precede_errors() {
        let p = policy();
        assert_eq!(
            p.classify("Warning: interface Gi0/1 is shut down"),
            Classification::Warning
        );
        assert_eq!(
            p.classify("name length exceeded the recommended length of 32 characters"),
            Classification::Warning
        );
    }

    #[test]
    fn test_fatal_precedes_retry() {
        let p = policy();
        assert_eq!(
            p.classify("% Interface is in use, cannot remove"),
            Classification::Fatal
        );
        assert_eq!(
            p.classify("% Please wait for it to complete"),
            Classification::Retry
        );
    }

    #[test]
    fn test_outbound_rewrites() {
        let p = policy();
        let out = |l: &str| p.transform_outbound(l).map(|o| o.text);
        assert_eq!(out("ip address").as_deref(), Some("!ip address"));
        assert_eq!(
            out("disable passive-interface Gi0/1").as_deref(),
            Some("no passive-interface Gi0/1")
        );
        assert_eq!(
            out("no disable passive-interface Gi0/1").as_deref(),
            Some("passive-interface Gi0/1")
        );
        assert_eq!(
            out("no mls qos srr-queue input cos-map queue 1 threshold 2 1").as_deref(),
            Some("no mls qos srr-queue input cos-map")
        );
        assert_eq!(out("tailfned police cirmode"), None);
        assert_eq!(out("config t"), None);
    }

    // =========================================================================
    // Normalizer
    // =========================================================================

    const DUMP: &str = "\
Building configuration...\r
\r
Current configuration : 2048 bytes\r
!\r
! Last configuration change at 10:00:00 UTC Thu Oct 1 2026\r
! NVRAM config last updated at 10:00:00 UTC Thu Oct 1 2026\r
!\r
version 15.2\r
boot-start-marker\r
boot system flash:c2900.bin\r
boot-end-marker\r
!\r
hostname r1\r
ip domain-name example.net\r
aaa authorization exec default local if-authenticated\r
!\r
banner motd ^C\r
Authorized access only\r
^C\r
interface GigabitEthernet0/1\r
 switchport trunk allowed vlan 1-10\r
 switchport trunk allowed vlan add 20,30\r
 no passive-interface\r
!\r
policy-map PM\r
 class C1\r
  police 8000 1000\r
  random-detect\r
!\r
line con 0\r
!\r
end\r
";

    #[test]
    fn test_normalize_dump() {
        let out = policy().transform_inbound(DUMP);
        assert!(out.starts_with("!\nversion 15.2\n!\nhostname r1\n"));
        assert!(out.contains("\nip domain name example.net\n"));
        assert!(out.contains("\naaa authorization exec default if-authenticated local\n"));
        assert!(out.contains("\nbanner motd \"\\nAuthorized access only\\n\"\n"));
        assert!(out.contains("\n switchport trunk allowed vlan 1-10,20,30\n"));
        assert!(out.contains("\n  police cir 8000 bc 1000\n"));
        assert!(out.contains("\n  random-detect precedence-based\n"));
        assert!(out.contains("\nline console 0\n"));
        assert!(!out.contains("NVRAM"));
        assert!(!out.contains("boot"));
        assert!(!out.contains("\nend"));
        assert!(!out.contains('\r'));
    }

    #[test]
    fn test_normalizer_is_idempotent() {
        let p = policy();
        let once = p.transform_inbound(DUMP);
        assert_eq!(p.transform_inbound(&once), once);
    }

    const MARKER_DUMP: &str = "\
Building configuration...\r
\r
Current configuration : 512 bytes\r
!\r
! Last configuration change at 10:00:00 UTC Thu Oct 1 2026\r
!\r
hostname r1\r
banner motd ^é\r
Zugang nur für Befugte\r
alias exec s show\r
end\r
^é\r
interface GigabitEthernet0/1\r
 description Last configuration change by ops, Current configuration ünchanged\r
 ip address 10.0.0.1 255.255.255.0\r
!\r
end\r
";

    #[test]
    fn test_marker_text_in_config_survives() {
        let p = policy();
        let once = p.transform_inbound(MARKER_DUMP);
        assert_eq!(
            once,
            "!\n\
             hostname r1\n\
             banner motd \"\\nZugang nur für Befugte\\nalias exec s show\\nend\\n\"\n\
             interface GigabitEthernet0/1\n \
             description Last configuration change by ops, Current configuration ünchanged\n \
             ip address 10.0.0.1 255.255.255.0\n\
             !\n"
        );
        assert_eq!(p.transform_inbound(&once), once);
    }

    #[test]
    fn test_marker_text_without_header() {
        let raw = "hostname r1\ninterface Gi0/1\n description Last configuration change by ops\n ip address 10.0.0.1 255.255.255.0\n";
        assert_eq!(policy().transform_inbound(raw), raw);
    }

    #[test]
    fn test_mst_instance_vlan_list_compacted() {
        let raw = "spanning-tree mst configuration\n instance 1 vlan 10, 20-30, 40\n";
        assert_eq!(
            policy().transform_inbound(raw),
            "spanning-tree mst configuration\n instance 1 vlan 10,20-30,40\n"
        );
    }

    #[test]
    fn test_police_forms() {
        let p = policy();
        assert_eq!(
            p.transform_inbound("  police 8000\n"),
            "  police cir 8000\n"
        );
        assert_eq!(
            p.transform_inbound("  police 8000 1000 2000\n"),
            "  police cir 8000 bc 1000 be 2000\n"
        );
        assert_eq!(
            p.transform_inbound("  police cir 8000\n"),
            "  police cir 8000\n"
        );
        assert_eq!(
            p.transform_inbound("  police 8000 bps 1000 byte\n"),
            "  police 8000 bps 1000 byte\n"
        );
    }
}
