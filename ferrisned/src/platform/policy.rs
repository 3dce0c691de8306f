//! Pattern policy tables.
//!
//! A [`FamilyPolicy`] is the complete, immutable description of one CLI
//! dialect: how its prompts look, how to read its error messages, how to
//! rewrite outbound lines and inbound dumps, and which commands drive its
//! modes. The session, transform pipeline and lifecycle controller are
//! generic; everything family-specific is data in here.

use regex::Regex;

use crate::channel::{CompiledPattern, PatternSet};
use crate::normalize::{Normalizer, dequote};
use crate::transform::OutboundLine;

/// Where a prompt says the session is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    /// Config mode, top-level context.
    TopConfig,
    /// Config mode, inside a nested context.
    NestedConfig,
    /// Operational mode, outside config.
    Exec,
}

impl PromptKind {
    pub fn in_config(self) -> bool {
        !matches!(self, PromptKind::Exec)
    }

    pub fn at_top(self) -> bool {
        !matches!(self, PromptKind::NestedConfig)
    }
}

/// A prompt pattern and what it means.
#[derive(Debug, Clone)]
pub struct PromptRule {
    pub kind: PromptKind,
    pub pattern: CompiledPattern,
}

/// A question the device asks mid-command and the answer to give.
#[derive(Debug, Clone)]
pub struct Confirmation {
    pub pattern: CompiledPattern,
    pub answer: String,
    /// Whether the answer is followed by a newline.
    pub newline: bool,
}

impl Confirmation {
    /// Bytes to write in response.
    pub fn reply(&self) -> String {
        if self.newline {
            format!("{}\n", self.answer)
        } else {
            self.answer.clone()
        }
    }
}

/// How a line of device output is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The command was rejected.
    Fatal,
    /// Informational; ignored.
    Warning,
    /// Transient condition; the command may succeed if resent.
    Retry,
    /// Nothing recognized.
    Ok,
}

/// One entry of the ordered error classification table.
#[derive(Debug, Clone)]
pub struct ErrorRule {
    pub pattern: Regex,
    pub class: Classification,
    /// Restrict the rule to replies to commands matching this pattern.
    pub command: Option<Regex>,
}

impl ErrorRule {
    fn applies(&self, command: Option<&str>, line: &str) -> bool {
        if let Some(filter) = &self.command {
            match command {
                Some(cmd) if filter.is_match(cmd) => {}
                _ => return false,
            }
        }
        self.pattern.is_match(line)
    }
}

/// Per-line outbound rewrite.
#[derive(Debug, Clone)]
pub enum Rewrite {
    /// Regex substitution.
    Replace { pattern: Regex, replacement: String },
    /// Drop matching lines entirely.
    Drop(Regex),
    /// Turn `banner <kind> "<quoted>"` back into a delimited multi-line
    /// banner. The device echoes banners unpredictably, so the echo is not
    /// awaited.
    Banner { delimiter: String },
}

/// Lines that are never sent.
#[derive(Debug, Clone)]
pub enum Discard {
    Exact(String),
    Prefix(String),
}

impl Discard {
    fn matches(&self, line: &str) -> bool {
        match self {
            Discard::Exact(s) => line == s,
            Discard::Prefix(p) => line.starts_with(p.as_str()),
        }
    }
}

/// Whole-block outbound fixups, run before the block is split.
#[derive(Debug, Clone)]
pub enum BlockFixup {
    /// Replace a quoted line following an opener line with its dequoted,
    /// multi-line body.
    DequoteBodies { opener: Regex },

    /// For each top-level block starting at `opener` that contains a line
    /// matching `negation`, move those lines (with the `context` lines that
    /// lead to them) into a block sent first.
    HoistNegations {
        opener: Regex,
        context: Regex,
        negation: Regex,
    },

    /// Remove lines matching `negation` between an `opener` line and the
    /// next `closer` line.
    StripNegationsInBlocks {
        opener: Regex,
        closer: Regex,
        negation: Regex,
    },
}

/// An unqualified line that must follow its qualified siblings.
#[derive(Debug, Clone)]
pub struct Reorder {
    pub bare: Regex,
    pub qualified: Regex,
}

/// An auxiliary top-level mode entered by a trigger line, for example the
/// debug tree on SR OS.
#[derive(Debug, Clone)]
pub struct AuxMode {
    pub trigger: String,
    /// Sent before the trigger line.
    pub enter: Vec<String>,
    /// Sent before the first top-level line after the auxiliary block.
    pub leave: Vec<String>,
}

/// Disable-before-delete rule.
#[derive(Debug, Clone)]
pub struct ShutdownRule {
    /// Delete-style patterns. Group 1 is a prefix kept verbatim, group 2
    /// the target command, group 3 the target's node tag.
    pub patterns: Vec<Regex>,
    pub disable: String,
    pub enable: String,
}

/// Which part of a sent line is awaited as echo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoMatch {
    FullLine,
    FirstWord,
    Off,
}

/// How lines are put on the wire.
#[derive(Debug, Clone, Copy)]
pub struct Dispatch {
    pub batch_size: usize,
    /// Send a whole batch at once, then collect one response per line.
    pub pipelined: bool,
    pub echo: EchoMatch,
}

/// Follow-up command run when a commit step fails.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub command: String,
    /// Output marker meaning "nothing to report"; the commit failure
    /// stands.
    pub benign: String,
}

/// A device-side commit with an explicit result.
#[derive(Debug, Clone)]
pub struct CommitStep {
    pub command: String,
    pub diagnostic: Option<Diagnostic>,
}

/// Non-volatile save.
#[derive(Debug, Clone)]
pub struct SaveStep {
    pub command: String,
    /// Text the reply must contain (case-insensitive).
    pub required: Option<String>,
    /// Text whose absence is only logged.
    pub expected: Option<String>,
}

/// What to take from a checkpoint query reply.
#[derive(Debug, Clone)]
pub enum Extract {
    /// The first line starting with the prefix.
    Line(String),
    /// Everything from the first occurrence of the marker.
    From(String),
}

impl Extract {
    pub fn apply(&self, text: &str) -> Option<String> {
        match self {
            Extract::Line(prefix) => text
                .lines()
                .map(str::trim)
                .find(|l| l.starts_with(prefix.as_str()))
                .map(str::to_string),
            Extract::From(marker) => text.find(marker.as_str()).map(|i| text[i..].trim_end().to_string()),
        }
    }
}

/// Device-reported checkpoint query.
#[derive(Debug, Clone)]
pub struct CheckpointQuery {
    pub command: String,
    pub extract: Extract,
}

/// Commands that drive modes and lifecycle steps.
#[derive(Debug, Clone, Default)]
pub struct SessionCommands {
    /// Run once after the family is identified.
    pub setup: Vec<String>,
    /// Priming sequence into top-level config mode.
    pub enter_config: Vec<String>,
    /// Prepended to the priming sequence for transactional editing.
    pub transactional_enter: Vec<String>,
    pub exit_config: String,
    /// Repeat `exit_config` until the exec prompt shows.
    pub exit_config_repeat: bool,
    /// Leaves one nested context.
    pub context_exit: String,
    /// Commit step for transactional editing.
    pub transactional_commit: Option<CommitStep>,
    /// Commit step run at the end of prepare.
    pub prepare_commit: Option<CommitStep>,
    /// Commit step run at the end of abort and revert.
    pub settle_commit: Option<CommitStep>,
    /// Confirms a staged commit in persist.
    pub confirming_commit: Option<String>,
    pub save: Option<SaveStep>,
    /// Extra save run when checkpoint fingerprints are in use.
    pub checkpoint_save: Option<String>,
    /// Full configuration dump.
    pub dump: String,
    /// Auxiliary dumps hashed together with the configuration.
    pub aux_dumps: Vec<String>,
    pub checkpoint: Option<CheckpointQuery>,
}

/// Role of an alternative in a wait set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Prompt(PromptKind),
    Confirm(usize),
    ErrorLeader,
}

/// A pattern set plus the role of each alternative.
#[derive(Debug, Clone)]
pub struct WaitSet {
    pub set: PatternSet,
    pub slots: Vec<Slot>,
}

impl WaitSet {
    pub fn slot(&self, index: usize) -> Slot {
        self.slots[index]
    }
}

/// The complete policy for one device family.
#[derive(Debug, Clone)]
pub struct FamilyPolicy {
    pub name: &'static str,
    /// Substrings of the version probe reply identifying the family.
    pub signatures: Vec<&'static str>,
    /// Ordered, deepest nesting first.
    pub prompts: Vec<PromptRule>,
    pub confirmations: Vec<Confirmation>,
    /// Output that ends a reply on its own and always means failure.
    pub error_leaders: Vec<CompiledPattern>,
    /// Ordered; the first matching rule classifies a line.
    pub errors: Vec<ErrorRule>,
    pub block_fixups: Vec<BlockFixup>,
    pub reorders: Vec<Reorder>,
    pub outbound: Vec<Rewrite>,
    pub discard: Vec<Discard>,
    pub aux_mode: Option<AuxMode>,
    pub shutdown: Option<ShutdownRule>,
    pub dispatch: Dispatch,
    /// An exec prompt seen while applying means the device dropped out of
    /// config mode, which fails the line.
    pub strict_config_mode: bool,
    pub commands: SessionCommands,
    pub normalizer: Normalizer,
}

impl FamilyPolicy {
    /// Create an empty policy: line-by-line dispatch with full echo.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            signatures: Vec::new(),
            prompts: Vec::new(),
            confirmations: Vec::new(),
            error_leaders: Vec::new(),
            errors: Vec::new(),
            block_fixups: Vec::new(),
            reorders: Vec::new(),
            outbound: Vec::new(),
            discard: Vec::new(),
            aux_mode: None,
            shutdown: None,
            dispatch: Dispatch {
                batch_size: 100,
                pipelined: false,
                echo: EchoMatch::FullLine,
            },
            strict_config_mode: false,
            commands: SessionCommands::default(),
            normalizer: Normalizer::default(),
        }
    }

    /// Add a version probe signature.
    pub fn with_signature(mut self, signature: &'static str) -> Self {
        self.signatures.push(signature);
        self
    }

    /// Add a prompt. Deeper nesting must be added first.
    pub fn with_prompt(mut self, kind: PromptKind, pattern: CompiledPattern) -> Self {
        self.prompts.push(PromptRule { kind, pattern });
        self
    }

    /// Add an auto-answered question.
    pub fn with_confirmation(
        mut self,
        pattern: CompiledPattern,
        answer: impl Into<String>,
        newline: bool,
    ) -> Self {
        self.confirmations.push(Confirmation {
            pattern,
            answer: answer.into(),
            newline,
        });
        self
    }

    /// Add an error leader.
    pub fn with_error_leader(mut self, pattern: CompiledPattern) -> Self {
        self.error_leaders.push(pattern);
        self
    }

    /// Append a classification rule.
    pub fn with_error(mut self, pattern: Regex, class: Classification) -> Self {
        self.errors.push(ErrorRule {
            pattern,
            class,
            command: None,
        });
        self
    }

    /// Append a classification rule that only applies to replies to
    /// commands matching `command`.
    pub fn with_command_error(
        mut self,
        command: Regex,
        pattern: Regex,
        class: Classification,
    ) -> Self {
        self.errors.push(ErrorRule {
            pattern,
            class,
            command: Some(command),
        });
        self
    }

    pub fn with_block_fixup(mut self, fixup: BlockFixup) -> Self {
        self.block_fixups.push(fixup);
        self
    }

    pub fn with_reorder(mut self, bare: Regex, qualified: Regex) -> Self {
        self.reorders.push(Reorder { bare, qualified });
        self
    }

    pub fn with_rewrite(mut self, rewrite: Rewrite) -> Self {
        self.outbound.push(rewrite);
        self
    }

    pub fn with_discard(mut self, discard: Discard) -> Self {
        self.discard.push(discard);
        self
    }

    pub fn with_aux_mode(mut self, aux: AuxMode) -> Self {
        self.aux_mode = Some(aux);
        self
    }

    pub fn with_shutdown(mut self, rule: ShutdownRule) -> Self {
        self.shutdown = Some(rule);
        self
    }

    pub fn with_dispatch(mut self, batch_size: usize, pipelined: bool, echo: EchoMatch) -> Self {
        self.dispatch = Dispatch {
            batch_size,
            pipelined,
            echo,
        };
        self
    }

    pub fn with_strict_config_mode(mut self, strict: bool) -> Self {
        self.strict_config_mode = strict;
        self
    }

    pub fn with_commands(mut self, commands: SessionCommands) -> Self {
        self.commands = commands;
        self
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Classify one line of device output.
    pub fn classify(&self, line: &str) -> Classification {
        self.classify_reply(None, line)
    }

    /// Classify one line of the reply to `command`.
    pub fn classify_reply(&self, command: Option<&str>, line: &str) -> Classification {
        self.errors
            .iter()
            .find(|rule| rule.applies(command, line))
            .map(|rule| rule.class)
            .unwrap_or(Classification::Ok)
    }

    /// The first fatal or retryable line of a reply, in output order.
    pub fn scan_reply(&self, command: &str, reply: &str) -> Option<(Classification, String)> {
        reply.lines().map(str::trim).find_map(|line| {
            if line.is_empty() {
                return None;
            }
            match self.classify_reply(Some(command), line) {
                class @ (Classification::Fatal | Classification::Retry) => {
                    Some((class, line.to_string()))
                }
                Classification::Warning | Classification::Ok => None,
            }
        })
    }

    /// Rewrite one trimmed outbound line; `None` drops it.
    pub fn transform_outbound(&self, line: &str) -> Option<OutboundLine> {
        let mut text = line.to_string();
        let mut await_echo = true;
        for rule in &self.outbound {
            match rule {
                Rewrite::Replace {
                    pattern,
                    replacement,
                } => {
                    if pattern.is_match(&text) {
                        text = pattern.replace_all(&text, replacement.as_str()).into_owned();
                    }
                }
                Rewrite::Drop(pattern) => {
                    if pattern.is_match(&text) {
                        return None;
                    }
                }
                Rewrite::Banner { delimiter } => {
                    if let Some(banner) = expand_banner(&text, delimiter) {
                        text = banner;
                        await_echo = false;
                    }
                }
            }
        }
        Some(OutboundLine {
            text: text.trim().to_string(),
            await_echo,
        })
    }

    /// Normalize a raw configuration dump.
    pub fn transform_inbound(&self, dump: &str) -> String {
        self.normalizer.normalize(dump)
    }

    /// Whether a transformed line is in the discard set.
    pub fn is_discarded(&self, line: &str) -> bool {
        self.discard.iter().any(|d| d.matches(line))
    }

    /// The prompt kind of a prompt string, if it is one of ours.
    pub fn prompt_kind(&self, prompt: &str) -> Option<PromptKind> {
        self.prompts
            .iter()
            .find(|rule| rule.pattern.is_match(prompt.as_bytes()))
            .map(|rule| rule.kind)
    }

    /// Prompts only.
    pub fn prompt_set(&self) -> WaitSet {
        self.build_wait_set(false, false)
    }

    /// Prompts and confirmations.
    pub fn command_set(&self) -> WaitSet {
        self.build_wait_set(true, false)
    }

    /// Prompts, confirmations and error leaders: what a config line waits on.
    pub fn line_set(&self) -> WaitSet {
        self.build_wait_set(true, true)
    }

    fn build_wait_set(&self, confirmations: bool, leaders: bool) -> WaitSet {
        let mut set = PatternSet::default();
        let mut slots = Vec::new();
        for rule in &self.prompts {
            set.push(rule.pattern.clone());
            slots.push(Slot::Prompt(rule.kind));
        }
        if confirmations {
            for (i, c) in self.confirmations.iter().enumerate() {
                set.push(c.pattern.clone());
                slots.push(Slot::Confirm(i));
            }
        }
        if leaders {
            for leader in &self.error_leaders {
                set.push(leader.clone());
                slots.push(Slot::ErrorLeader);
            }
        }
        WaitSet { set, slots }
    }

    /// Echo text to await for a sent line.
    pub fn echo_of<'a>(&self, line: &'a OutboundLine) -> Option<&'a str> {
        if !line.await_echo {
            return None;
        }
        match self.dispatch.echo {
            EchoMatch::FullLine => Some(line.text.as_str()),
            EchoMatch::FirstWord => line.text.split_whitespace().next(),
            EchoMatch::Off => None,
        }
        .filter(|echo| !echo.is_empty())
    }
}

/// `banner motd "..."` to `banner motd ^...^`.
fn expand_banner(line: &str, delimiter: &str) -> Option<String> {
    let rest = line.strip_prefix("banner ")?;
    let (kind, body) = rest.split_once(' ')?;
    if !body.starts_with('"') {
        return None;
    }
    Some(format!(
        "banner {} {}{}{}",
        kind,
        delimiter,
        dequote(body),
        delimiter
    ))
}
