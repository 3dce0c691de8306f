//! ALU / Nokia SR classic CLI.
//!
//! Prompts carry the context path, so nesting is read straight off the
//! prompt. A leading `*` marks unsaved changes.
//!
//! ```text
//! A:pe1#                               # exec
//! *A:pe1>config#                       # top-level config
//! A:pe1>debug#                         # top-level debug config
//! *A:pe1>config>service>vpls#          # nested config
//! ```
//!
//! Lines are sent in pipelined batches of 100 and matched back one prompt
//! per line, waiting for the echo of each line's first word only.

use super::{any_of, prompt, rx};
use crate::normalize::{Normalizer, Pass};
use crate::platform::{
    AuxMode, Classification, CheckpointQuery, CommitStep, Discard, EchoMatch, Extract,
    FamilyPolicy, PromptKind, Rewrite, SaveStep, SessionCommands, ShutdownRule,
};

/// Family name.
pub const PLATFORM_NAME: &str = "alu-sr";

const FATAL: &[&str] = &[
    "error",
    "exceeded",
    "invalid",
    "incomplete",
    "missing",
    "duplicate name",
    "not allowed",
    "can not",
    "failed",
];

const RETRY: &[&str] = &["is in use", "already exists"];

/// Create the ALU SR policy.
pub fn policy() -> FamilyPolicy {
    FamilyPolicy::new(PLATFORM_NAME)
        .with_signature("ALCATEL SR 7750 ")
        .with_signature("7705")
        .with_signature("7950")
        .with_signature("7450")
        .with_signature("7210")
        .with_prompt(
            PromptKind::NestedConfig,
            prompt(r"(?m)^[*!]?(?:\([\w:]+\))?[A-D]:[\w._-]+>(?:config|debug)>[\w>-]+#(?: |$)"),
        )
        .with_prompt(
            PromptKind::TopConfig,
            prompt(r"(?m)^[*!]?(?:\([\w:]+\))?[A-D]:[\w._-]+>(?:config|debug)#(?: |$)"),
        )
        .with_prompt(
            PromptKind::Exec,
            prompt(r"(?m)^[*!]?(?:\([\w:]+\))?[A-D]:[\w._-]+#(?: |$)"),
        )
        .with_error(any_of(FATAL), Classification::Fatal)
        .with_error(any_of(RETRY), Classification::Retry)
        // the device has no key for the default ospf instance
        .with_rewrite(Rewrite::Replace {
            pattern: rx(r"\bno ospf 0$"),
            replacement: "no ospf".into(),
        })
        .with_rewrite(Rewrite::Replace {
            pattern: rx(r"\bospf 0( +|$)"),
            replacement: "ospf${1}".into(),
        })
        .with_rewrite(Rewrite::Replace {
            pattern: rx(r"^egress-scheduler-override$"),
            replacement: "egress-scheduler-override create".into(),
        })
        .with_rewrite(Rewrite::Replace {
            pattern: rx(r"used-by all"),
            replacement: String::new(),
        })
        .with_rewrite(Rewrite::Replace {
            pattern: rx(r"!$"),
            replacement: "exit".into(),
        })
        .with_discard(Discard::Prefix("ipv6 no dhcp6-relay".into()))
        .with_discard(Discard::Prefix("no dhcp".into()))
        .with_discard(Discard::Prefix("no stp".into()))
        .with_discard(Discard::Prefix("no ingress".into()))
        .with_discard(Discard::Prefix("no ethernet".into()))
        .with_discard(Discard::Prefix("no eth-cfm".into()))
        .with_discard(Discard::Exact("no network".into()))
        .with_discard(Discard::Exact("no begin".into()))
        .with_discard(Discard::Exact("no interface-parameters".into()))
        .with_discard(Discard::Exact("no interface system".into()))
        .with_discard(Discard::Exact("no egress".into()))
        .with_discard(Discard::Prefix("no single-sub-parameters".into()))
        .with_discard(Discard::Prefix("router-advertisement no interface".into()))
        .with_aux_mode(AuxMode {
            trigger: "debug".into(),
            enter: vec!["exit all".into()],
            leave: vec!["exit all".into(), "configure".into()],
        })
        .with_shutdown(ShutdownRule {
            patterns: vec![
                rx(r"^(.*)no (([-\w]+)(?: .*))$"),
                rx(r"^(.*)no ((ldp|bgp|bgp-ad|mpls|rsvp|server))$"),
            ],
            disable: "shutdown".into(),
            enable: "no shutdown".into(),
        })
        .with_dispatch(100, true, EchoMatch::FirstWord)
        .with_commands(SessionCommands {
            setup: vec!["environment no more".into()],
            enter_config: vec!["exit all".into(), "configure".into()],
            transactional_enter: vec!["candidate edit exclusive".into()],
            exit_config: "exit all".into(),
            exit_config_repeat: false,
            context_exit: "exit".into(),
            transactional_commit: Some(CommitStep {
                command: "candidate commit".into(),
                diagnostic: None,
            }),
            save: Some(SaveStep {
                command: "admin save".into(),
                required: Some("ok".into()),
                expected: Some("completed".into()),
            }),
            checkpoint_save: Some("admin rollback save".into()),
            dump: "admin display-config".into(),
            aux_dumps: vec!["show debug".into()],
            checkpoint: Some(CheckpointQuery {
                command: "show system rollback | match latest".into(),
                extract: Extract::Line("latest".into()),
            }),
            ..Default::default()
        })
        .with_normalizer(normalizer())
}

fn normalizer() -> Normalizer {
    Normalizer::new(vec![
        Pass::DropLines(rx(r"^(?:#|echo)")),
        Pass::TrimLines,
        Pass::Replace {
            pattern: rx(r"(?m) +create$"),
            replacement: String::new(),
        },
        // default keys the device leaves out of its display
        Pass::Replace {
            pattern: rx(r"(?m)^( *)router$"),
            replacement: r#"${1}router "Base""#.into(),
        },
        Pass::Replace {
            pattern: rx(r"(?m)^( *)ospf$"),
            replacement: r#"${1}ospf "0""#.into(),
        },
        Pass::Replace {
            pattern: rx(r"(?m)^( *)ospf( \d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})$"),
            replacement: r#"${1}ospf "0"${2}"#.into(),
        },
        Pass::Replace {
            pattern: rx(r"(?m)^( *)isis$"),
            replacement: "${1}isis 0".into(),
        },
        Pass::Replace {
            pattern: rx(r"(?m)^( *)urpf-check$"),
            replacement: "${1}urpf-check mode strict".into(),
        },
        Pass::Replace {
            pattern: rx(r"(?m)^( *)!$"),
            replacement: "${1}exit".into(),
        },
        Pass::Body {
            start: rx(r"^configure$"),
            end: rx(r"^exit all$"),
        },
    ])
}
