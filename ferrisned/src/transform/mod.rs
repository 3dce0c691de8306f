//! Outbound line transform pipeline.
//!
//! Turns a desired-configuration block into device-native command
//! batches:
//!
//! 1. whole-block fixups from the family policy,
//! 2. local reordering of unqualified lines after their qualified siblings,
//! 3. auxiliary-mode bracketing, then per-line trim and family rewrites,
//! 4. disable-before-delete safety,
//! 5. dropping of empty and discarded lines,
//! 6. chunking into fixed-size batches.

mod shutdown;

use log::{debug, trace};

use crate::normalize::{dequote, is_quoted};
use crate::platform::{BlockFixup, FamilyPolicy};
use crate::store::ConfigStore;

pub use shutdown::{ShutdownTags, disable_command, infer_path, is_top_start, leading_indent};
use shutdown::ShutdownSafety;

/// One line ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundLine {
    pub text: String,
    /// Whether the device echo of this line is awaited before its prompt.
    pub await_echo: bool,
}

impl OutboundLine {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            await_echo: true,
        }
    }

    /// A line whose echo is not awaited.
    pub fn unechoed(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            await_echo: false,
        }
    }
}

/// An ordered, size-bounded chunk of outbound lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyBatch {
    pub lines: Vec<OutboundLine>,
}

impl ApplyBatch {
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The batch as one newline-joined block.
    pub fn joined(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(&line.text);
            out.push('\n');
        }
        out
    }
}

/// Split lines into batches of at most `size` lines.
pub fn chunk(lines: Vec<OutboundLine>, size: usize) -> Vec<ApplyBatch> {
    let size = size.max(1);
    let mut batches = Vec::with_capacity(lines.len().div_ceil(size));
    let mut rest = lines.into_iter().peekable();
    while rest.peek().is_some() {
        batches.push(ApplyBatch {
            lines: rest.by_ref().take(size).collect(),
        });
    }
    batches
}

/// A line of the fixed-up block, before per-line rewrites.
#[derive(Debug, Clone)]
struct Staged {
    text: String,
    await_echo: bool,
}

impl Staged {
    fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            await_echo: true,
        }
    }
}

/// Outbound pipeline for one family.
pub struct Pipeline<'a> {
    policy: &'a FamilyPolicy,
    tags: &'a ShutdownTags,
    store: &'a dyn ConfigStore,
    shutdown_before_apply: bool,
}

impl<'a> Pipeline<'a> {
    pub fn new(policy: &'a FamilyPolicy, tags: &'a ShutdownTags, store: &'a dyn ConfigStore) -> Self {
        Self {
            policy,
            tags,
            store,
            shutdown_before_apply: false,
        }
    }

    /// Disable nodes with a shutdown leaf while they are edited.
    pub fn with_shutdown_before_apply(mut self, enabled: bool) -> Self {
        self.shutdown_before_apply = enabled;
        self
    }

    /// Transform a block and chunk it by the family batch size.
    pub fn batches(&self, block: &str) -> Vec<ApplyBatch> {
        chunk(self.lines(block), self.policy.dispatch.batch_size)
    }

    /// Transform a block into the ordered lines to send.
    pub fn lines(&self, block: &str) -> Vec<OutboundLine> {
        let mut staged = fix_block(block, &self.policy.block_fixups);
        reorder(&mut staged, self.policy);

        let raw: Vec<&str> = staged.iter().map(|s| s.text.as_str()).collect();
        let mut safety = self
            .policy
            .shutdown
            .as_ref()
            .map(|rule| ShutdownSafety::new(rule, self.tags, self.store, self.shutdown_before_apply));

        let mut out = Vec::with_capacity(raw.len());
        let mut in_aux = false;
        for (i, item) in staged.iter().enumerate() {
            if let Some(aux) = &self.policy.aux_mode {
                if is_top_start(&item.text) {
                    if item.text.trim() == aux.trigger {
                        in_aux = true;
                        out.extend(aux.enter.iter().map(OutboundLine::new));
                    } else if in_aux {
                        in_aux = false;
                        out.extend(aux.leave.iter().map(OutboundLine::new));
                    }
                }
            }

            let Some(mut line) = self.policy.transform_outbound(item.text.trim()) else {
                trace!("dropped by rewrite: {}", item.text.trim());
                continue;
            };
            line.await_echo &= item.await_echo;
            if line.text.is_empty() {
                continue;
            }
            if self.policy.is_discarded(&line.text) {
                debug!("discarding {}", line.text);
                continue;
            }

            match safety.as_mut() {
                Some(safety) => safety.emit(line, &raw, i, &mut out),
                None => out.push(line),
            }
        }
        out
    }
}

fn fix_block(block: &str, fixups: &[BlockFixup]) -> Vec<Staged> {
    let mut lines: Vec<Staged> = block.lines().map(Staged::new).collect();
    for fixup in fixups {
        lines = match fixup {
            BlockFixup::DequoteBodies { opener } => dequote_bodies(lines, |l| opener.is_match(l)),
            BlockFixup::HoistNegations {
                opener,
                context,
                negation,
            } => hoist_negations(lines, opener, context, negation),
            BlockFixup::StripNegationsInBlocks {
                opener,
                closer,
                negation,
            } => {
                let mut inside = false;
                lines
                    .into_iter()
                    .filter(|l| {
                        if inside {
                            if closer.is_match(&l.text) {
                                inside = false;
                            } else if negation.is_match(&l.text) {
                                return false;
                            }
                        } else if opener.is_match(&l.text) {
                            inside = true;
                        }
                        true
                    })
                    .collect()
            }
        };
    }
    lines
}

/// Replace a quoted line that follows an opener line with the lines of
/// its dequoted body. Body lines are sent without awaiting their echo.
fn dequote_bodies(lines: Vec<Staged>, is_opener: impl Fn(&str) -> bool) -> Vec<Staged> {
    let mut out = Vec::with_capacity(lines.len());
    let mut after_opener = false;
    for line in lines {
        let trimmed = line.text.trim();
        if after_opener && is_quoted(trimmed) {
            out.extend(dequote(trimmed).lines().map(|body| Staged {
                text: body.to_string(),
                await_echo: false,
            }));
            after_opener = false;
            continue;
        }
        after_opener = is_opener(&line.text);
        out.push(line);
    }
    out
}

/// For every block from an opener line to the next top-level `!` that
/// contains negation lines, send a copy holding only the negations and
/// their context first, then the block without them.
fn hoist_negations(
    lines: Vec<Staged>,
    opener: &regex::Regex,
    context: &regex::Regex,
    negation: &regex::Regex,
) -> Vec<Staged> {
    let mut out = Vec::with_capacity(lines.len());
    let mut i = 0;
    while i < lines.len() {
        if !opener.is_match(&lines[i].text) {
            out.push(lines[i].clone());
            i += 1;
            continue;
        }
        let end = lines[i + 1..]
            .iter()
            .position(|l| l.text.starts_with('!'))
            .map(|off| i + 1 + off);
        let Some(end) = end else {
            out.push(lines[i].clone());
            i += 1;
            continue;
        };
        let block = &lines[i..=end];
        if !block.iter().any(|l| negation.is_match(&l.text)) {
            out.extend_from_slice(block);
            i = end + 1;
            continue;
        }
        debug!("hoisting removals of {}", lines[i].text.trim());
        out.extend(
            block
                .iter()
                .filter(|l| negation.is_match(&l.text) || context.is_match(&l.text) || opener.is_match(&l.text))
                .cloned(),
        );
        out.extend(block.iter().filter(|l| !negation.is_match(&l.text)).cloned());
        i = end + 1;
    }
    out
}

/// Move each unqualified line after the qualified siblings that follow it.
fn reorder(lines: &mut [Staged], policy: &FamilyPolicy) {
    for rule in &policy.reorders {
        let mut i = 0;
        while i < lines.len() {
            if rule.bare.is_match(&lines[i].text) {
                while i + 1 < lines.len() && rule.qualified.is_match(&lines[i + 1].text) {
                    lines.swap(i, i + 1);
                    i += 1;
                }
            }
            i += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Family;
    use crate::store::MemoryStore;

    fn run(family: Family, block: &str) -> Vec<String> {
        let tags = ShutdownTags::default();
        let store = MemoryStore::new();
        Pipeline::new(family.policy(), &tags, &store)
            .lines(block)
            .into_iter()
            .map(|l| l.text)
            .collect()
    }

    fn numbered(n: usize) -> Vec<OutboundLine> {
        (0..n).map(|i| OutboundLine::new(format!("line {}", i))).collect()
    }

    // =========================================================================
    // Chunking
    // =========================================================================

    #[test]
    fn test_chunk_count_is_ceiling() {
        for (n, size, expected) in [(0, 100, 0), (1, 100, 1), (100, 100, 1), (101, 100, 2), (250, 100, 3), (7, 1, 7)] {
            assert_eq!(chunk(numbered(n), size).len(), expected, "n={} size={}", n, size);
        }
    }

    #[test]
    fn test_chunks_reconstruct_sequence() {
        let lines = numbered(257);
        let rebuilt: Vec<OutboundLine> = chunk(lines.clone(), 100)
            .into_iter()
            .flat_map(|b| b.lines)
            .collect();
        assert_eq!(rebuilt, lines);
    }

    #[test]
    fn test_joined_batch() {
        let batch = ApplyBatch {
            lines: vec![OutboundLine::new("a"), OutboundLine::new("b")],
        };
        assert_eq!(batch.joined(), "a\nb\n");
    }

    // =========================================================================
    // Pipeline
    // =========================================================================

    #[test]
    fn test_alu_default_key_elided() {
        let out = run(Family::AluSr, "router Base\n    no ospf 0\n    ospf 0 10.0.0.1\nexit");
        assert_eq!(out, ["router Base", "no ospf", "ospf 10.0.0.1", "exit"]);
    }

    #[test]
    fn test_alu_discard_and_exit_marker() {
        let out = run(Family::AluSr, "service\n    no dhcp\n    no network\n    !\n");
        assert_eq!(out, ["service", "exit"]);
    }

    #[test]
    fn test_alu_debug_mode_bracketing() {
        let out = run(Family::AluSr, "debug\n    router Base\n    exit\nsystem\n    exit\n");
        assert_eq!(
            out,
            ["exit all", "debug", "router Base", "exit", "exit all", "configure", "system", "exit"]
        );
    }

    #[test]
    fn test_ios_reorder_bare_no_switchport() {
        let block = "interface Gi0/1\n no switchport\n no switchport mode\n no switchport access vlan\n!";
        let out = run(Family::CiscoIos, block);
        assert_eq!(
            out,
            [
                "interface Gi0/1",
                "no switchport mode",
                "no switchport access vlan",
                "no switchport",
                "!"
            ]
        );
    }

    #[test]
    fn test_ios_hoists_percent_removals() {
        let block = "policy-map PM\n class C1\n  no bandwidth percent 10\n  priority percent 20\n!";
        let out = run(Family::CiscoIos, block);
        assert_eq!(
            out,
            [
                "policy-map PM",
                "class C1",
                "no bandwidth percent 10",
                "!",
                "policy-map PM",
                "class C1",
                "priority percent 20",
                "!"
            ]
        );
    }

    #[test]
    fn test_ios_certificate_body_unechoed() {
        let tags = ShutdownTags::default();
        let store = MemoryStore::new();
        let block = "crypto pki certificate chain X\n certificate ca 01\n  \"  3082 01\\n  AB CD\"\n  quit";
        let lines = Pipeline::new(Family::CiscoIos.policy(), &tags, &store).lines(block);
        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(
            texts,
            ["crypto pki certificate chain X", "certificate ca 01", "3082 01", "AB CD", "quit"]
        );
        assert!(lines[1].await_echo);
        assert!(!lines[2].await_echo && !lines[3].await_echo);
    }

    #[test]
    fn test_xr_strips_negations_in_sets() {
        let block = "prefix-set PS\n  10.0.0.0/8,\n  no 11.0.0.0/8\nend-set\nno router static";
        let out = run(Family::CiscoIosXr, block);
        assert_eq!(out, ["prefix-set PS", "10.0.0.0/8,", "end-set", "no router static"]);
    }

    #[test]
    fn test_shutdown_insertion_in_pipeline() {
        let tags = ShutdownTags::new(["service/vpls/sap/"]);
        let store = MemoryStore::new();
        let block = "service\n    vpls 10 customer 1 create\n        no sap 1/1/1\n    exit\nexit";
        let out: Vec<String> = Pipeline::new(Family::AluSr.policy(), &tags, &store)
            .lines(block)
            .into_iter()
            .map(|l| l.text)
            .collect();
        assert_eq!(
            out,
            [
                "service",
                "vpls 10 customer 1 create",
                "sap 1/1/1 shutdown",
                "no sap 1/1/1",
                "exit",
                "exit"
            ]
        );
    }

    #[test]
    fn test_untagged_delete_is_unchanged() {
        let tags = ShutdownTags::new(["port/"]);
        let store = MemoryStore::new();
        let block = "service\n    no vpls 10";
        let out: Vec<String> = Pipeline::new(Family::AluSr.policy(), &tags, &store)
            .lines(block)
            .into_iter()
            .map(|l| l.text)
            .collect();
        assert_eq!(out, ["service", "no vpls 10"]);
    }

    #[test]
    fn test_batches_follow_family_size() {
        let tags = ShutdownTags::default();
        let store = MemoryStore::new();
        let block: String = (0..250).map(|i| format!("system\n    name r{}\n", i)).collect();
        let batches = Pipeline::new(Family::AluSr.policy(), &tags, &store).batches(&block);
        assert_eq!(batches.len(), 5);
        assert!(batches.iter().all(|b| b.len() <= 100));
    }
}
