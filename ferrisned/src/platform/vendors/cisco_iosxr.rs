//! Cisco IOS XR.
//!
//! ```text
//! RP/0/RSP0/CPU0:xr1#                   # exec
//! RP/0/RSP0/CPU0:xr1(config)#           # top-level config
//! RP/0/RSP0/CPU0:xr1(config-if)#        # nested config
//! ```
//!
//! Edits go into an exclusive target configuration. Prepare stages them
//! with `commit confirmed`, so the device rolls back on its own unless
//! persist confirms them.

use super::{any_of, prompt, rx};
use crate::normalize::{Normalizer, Pass};
use crate::platform::{
    BlockFixup, CheckpointQuery, Classification, CommitStep, Diagnostic, EchoMatch, Extract,
    FamilyPolicy, PromptKind, Rewrite, SessionCommands,
};

/// Family name.
pub const PLATFORM_NAME: &str = "cisco-iosxr";

const FATAL: &[&str] = &[
    "error",
    "aborted",
    "exceeded",
    "invalid",
    "incomplete",
    "duplicate name",
    "may not be configured",
    "should be in range",
    "is used by",
    "being used",
    "cannot be deleted",
    "bad mask",
    "failed",
];

/// Create the Cisco IOS XR policy.
pub fn policy() -> FamilyPolicy {
    FamilyPolicy::new(PLATFORM_NAME)
        .with_signature("Cisco IOS XR Software")
        .with_prompt(PromptKind::TopConfig, prompt(r"(?m)^[^\s#()]+\(config\)#"))
        .with_prompt(
            PromptKind::NestedConfig,
            prompt(r"(?m)^[^\s#()]+\(config-[^\s()]+\)#"),
        )
        .with_prompt(PromptKind::Exec, prompt(r"(?m)^[^\s#()]+# ?$"))
        .with_confirmation(
            prompt(r"You are exiting after a 'commit confirm'"),
            "yes",
            true,
        )
        .with_confirmation(prompt(r"Are you sure"), "y", true)
        .with_confirmation(prompt(r"Proceed"), "y", true)
        .with_error(
            rx(r"hqm_tablemap_inform: CLASS_REMOVE error"),
            Classification::Warning,
        )
        .with_error(any_of(FATAL), Classification::Fatal)
        .with_rewrite(Rewrite::Banner {
            delimiter: "^".into(),
        })
        .with_block_fixup(BlockFixup::DequoteBodies {
            opener: rx(r"^route-policy "),
        })
        // sets are replaced wholesale, their entries cannot be negated
        .with_block_fixup(BlockFixup::StripNegationsInBlocks {
            opener: rx(
                r"^\s*(?:extcommunity-set rt|rd-set|prefix-set|as-path-set|community-set) \S+\s*$",
            ),
            closer: rx(r"^\s*end-set\s*$"),
            negation: rx(r"^\s*no \S+"),
        })
        .with_dispatch(1000, true, EchoMatch::FullLine)
        .with_strict_config_mode(true)
        .with_commands(SessionCommands {
            setup: vec!["terminal length 0".into(), "terminal width 0".into()],
            enter_config: vec!["config exclusive".into()],
            exit_config: "exit".into(),
            exit_config_repeat: true,
            context_exit: "exit".into(),
            prepare_commit: Some(CommitStep {
                command: "commit confirmed".into(),
                diagnostic: Some(Diagnostic {
                    command: "show configuration failed".into(),
                    benign: "No such configuration".into(),
                }),
            }),
            settle_commit: Some(CommitStep {
                command: "commit".into(),
                diagnostic: Some(Diagnostic {
                    command: "show configuration failed".into(),
                    benign: "No such configuration".into(),
                }),
            }),
            confirming_commit: Some("commit".into()),
            dump: "show running-config".into(),
            checkpoint: Some(CheckpointQuery {
                command: "show configuration commit list 1".into(),
                extract: Extract::From("SNo.".into()),
            }),
            ..Default::default()
        })
        .with_normalizer(normalizer())
}

fn normalizer() -> Normalizer {
    Normalizer::new(vec![
        Pass::TrimLines,
        Pass::CutThrough(rx(r"^Building configuration\.\.\.")),
        Pass::CutThrough(rx(r"^!! Last configuration change")),
        Pass::CutThrough(rx(r"^No entries found\.")),
        Pass::CutFromLast(rx(r"^end$")),
        Pass::QuoteBanners,
        Pass::DropRanges {
            start: rx(r"^boot-start-marker$"),
            end: rx(r"^boot-end-marker$"),
        },
        Pass::DropLines(rx(r"^!!")),
        Pass::QuoteBodies {
            opener: rx(r"^route-policy "),
            closer: rx(r"^end-policy$"),
        },
    ])
}
