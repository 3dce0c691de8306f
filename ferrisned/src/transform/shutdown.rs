//! Disable-before-delete safety.
//!
//! Node types that carry a shutdown leaf must be disabled before they can be
//! deleted, and optionally while they are being edited. The set of such node
//! types is read once from the config store and shared process-wide.
//!
//! Nesting is inferred from indentation alone: a line's parent is the
//! nearest preceding line with less leading whitespace, and a `!` line
//! belongs to the nearest preceding line at its own depth. Indentation is
//! measured as `len - trimmed_len`, so trailing whitespace counts towards it.

use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, trace};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;

use crate::platform::ShutdownRule;
use crate::store::ConfigStore;
use crate::transform::OutboundLine;

static GLOBAL: OnceCell<Arc<ShutdownTags>> = OnceCell::new();

static NODE_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\S+) (\S+)").unwrap());

/// Schema paths (`/`-separated, `/`-terminated, without keys) of node types
/// that have a shutdown leaf.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownTags {
    tags: HashSet<String>,
}

impl ShutdownTags {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// Bulk-load the tag set from the store.
    pub fn from_store(store: &dyn ConfigStore) -> Self {
        let tags = Self::new(store.shutdown_paths());
        debug!("loaded {} shutdown tags", tags.len());
        tags
    }

    /// Populate the process-wide set. Only the first call reads the store.
    pub fn init_global(store: &dyn ConfigStore) -> Arc<ShutdownTags> {
        GLOBAL
            .get_or_init(|| Arc::new(Self::from_store(store)))
            .clone()
    }

    /// The process-wide set, if it has been initialised.
    pub fn global() -> Option<Arc<ShutdownTags>> {
        GLOBAL.get().cloned()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// Leading whitespace, measured as `len - trimmed_len`.
pub fn leading_indent(line: &str) -> usize {
    line.len() - line.trim().len()
}

/// Whether `line` opens a top-level statement.
pub fn is_top_start(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && trimmed != "!" && leading_indent(line) == 0
}

/// Path of the nodes enclosing `lines[current]`.
///
/// With `keyed` each component carries its first argument as a key, e.g.
/// `service/vpls{10}/`; otherwise only keywords are used, e.g.
/// `service/vpls/`.
pub fn infer_path(lines: &[&str], current: usize, keyed: bool) -> String {
    let mut path = String::new();
    let mut c = current;
    loop {
        let depth = leading_indent(lines[c]);
        let closing = lines[c].trim() == "!";
        let parent = (0..c).rev().find(|&i| {
            let line = lines[i];
            if line.is_empty() {
                return false;
            }
            let d = leading_indent(line);
            if closing { d == depth } else { depth > d }
        });
        let Some(i) = parent else {
            return path;
        };
        path.insert_str(0, &component(lines[i], keyed));
        c = i;
    }
}

fn component(line: &str, keyed: bool) -> String {
    let mut words = line.split_whitespace();
    let keyword = words.next().unwrap_or_default();
    match words.next() {
        Some(key) if keyed => format!("{}{{{}}}/", keyword, key),
        _ => format!("{}/", keyword),
    }
}

/// The disable command to send before a delete-style line, if its target
/// node type has a shutdown leaf.
pub fn disable_command(
    rule: &ShutdownRule,
    tags: &ShutdownTags,
    line: &str,
    lines: &[&str],
    current: usize,
) -> Option<String> {
    if line.contains("shutdown") || line.contains("exit") {
        return None;
    }
    let caps = rule.patterns.iter().find_map(|p| p.captures(line))?;
    let (prefix, command, node) = (caps.get(1)?, caps.get(2)?, caps.get(3)?);

    let tag = format!("{}{}/", infer_path(lines, current, false), node.as_str());
    if !tags.contains(&tag) {
        trace!("no shutdown tag {}", tag);
        return None;
    }
    Some(format!(
        "{}{} {}",
        prefix.as_str(),
        command.as_str(),
        rule.disable
    ))
}

/// Per-block state of the shutdown safety step.
pub(crate) struct ShutdownSafety<'a> {
    rule: &'a ShutdownRule,
    tags: &'a ShutdownTags,
    store: &'a dyn ConfigStore,
    before_apply: bool,
    /// An explicit (no) shutdown was seen in the current node.
    explicit: bool,
}

impl<'a> ShutdownSafety<'a> {
    pub(crate) fn new(
        rule: &'a ShutdownRule,
        tags: &'a ShutdownTags,
        store: &'a dyn ConfigStore,
        before_apply: bool,
    ) -> Self {
        Self {
            rule,
            tags,
            store,
            before_apply,
            explicit: false,
        }
    }

    /// Emit `line` (the transformed form of `lines[current]`) together
    /// with any synthesized disable or enable commands.
    pub(crate) fn emit(
        &mut self,
        line: OutboundLine,
        lines: &[&str],
        current: usize,
        out: &mut Vec<OutboundLine>,
    ) {
        if let Some(disable) = disable_command(self.rule, self.tags, &line.text, lines, current) {
            debug!("disabling before delete: {}", disable);
            out.push(OutboundLine::new(disable));
            out.push(line);
            return;
        }
        if !self.before_apply {
            out.push(line);
            return;
        }

        if self.node_has_shutdown_leaf(&line.text, lines, current) {
            let disabled = self.node_disabled(&line.text, lines, current);
            out.push(line);
            if !disabled {
                out.push(OutboundLine::new(self.rule.disable.clone()));
            }
        } else if line.text == "exit" {
            let parent = infer_path(lines, current, false);
            if self.tags.contains(&parent)
                && !self.explicit
                && !self.node_disabled(&line.text, lines, current)
            {
                out.push(OutboundLine::new(self.rule.enable.clone()));
            }
            out.push(line);
            self.explicit = false;
        } else {
            if line.text.contains(self.rule.disable.as_str()) {
                self.explicit = true;
            }
            out.push(line);
        }
    }

    fn node_has_shutdown_leaf(&self, line: &str, lines: &[&str], current: usize) -> bool {
        let keyword = match NODE_LINE.captures(line) {
            Some(caps) => caps[1].to_string(),
            None => line.to_string(),
        };
        let tag = format!("{}{}/", infer_path(lines, current, false), keyword);
        self.tags.contains(&tag)
    }

    /// Current disable state of the node opened by `line`, or of the node
    /// an `exit` line closes.
    fn node_disabled(&self, line: &str, lines: &[&str], current: usize) -> bool {
        let mut path = infer_path(lines, current, true);
        if let Some(caps) = NODE_LINE.captures(line) {
            path.push_str(&format!("{}{{{}}}/", &caps[1], &caps[2]));
        } else if line != "exit" {
            path.push_str(line);
            path.push('/');
        }
        path.push_str(self.rule.disable.as_str());
        self.store.is_disabled(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Family;
    use crate::store::MemoryStore;

    fn rule() -> &'static ShutdownRule {
        Family::AluSr.policy().shutdown.as_ref().unwrap()
    }

    fn texts(lines: &[OutboundLine]) -> Vec<&str> {
        lines.iter().map(|l| l.text.as_str()).collect()
    }

    #[test]
    fn test_indent_and_top_start() {
        assert_eq!(leading_indent("    sap 1/1/1"), 4);
        assert!(is_top_start("service"));
        assert!(!is_top_start("!"));
        assert!(!is_top_start("  exit"));
        assert!(!is_top_start(""));
    }

    #[test]
    fn test_infer_path() {
        let lines = [
            "service",
            "    vpls 10 customer 1 create",
            "        sap 1/1/1 create",
            "            description x",
            "        !",
        ];
        assert_eq!(infer_path(&lines, 3, false), "service/vpls/sap/");
        assert_eq!(infer_path(&lines, 3, true), "service/vpls{10}/sap{1/1/1}/");
        // a `!` belongs to the node it closes
        assert_eq!(infer_path(&lines, 4, false), "service/vpls/sap/");
        assert_eq!(infer_path(&lines, 0, false), "");
    }

    #[test]
    fn test_disable_before_delete() {
        let tags = ShutdownTags::new(["service/vpls/sap/"]);
        let lines = ["service", "    vpls 10 customer 1 create", "        no sap 1/1/1"];
        assert_eq!(
            disable_command(rule(), &tags, "no sap 1/1/1", &lines, 2).as_deref(),
            Some("sap 1/1/1 shutdown")
        );
        // untagged node types pass through
        let other = ["service", "    vpls 10 customer 1 create", "        no mesh-sdp 1:1"];
        assert_eq!(disable_command(rule(), &tags, "no mesh-sdp 1:1", &other, 2), None);
    }

    #[test]
    fn test_disable_protocol_keyword() {
        let tags = ShutdownTags::new(["router/bgp/"]);
        let lines = ["router Base", "    no bgp"];
        assert_eq!(
            disable_command(rule(), &tags, "no bgp", &lines, 1).as_deref(),
            Some("bgp shutdown")
        );
    }

    #[test]
    fn test_shutdown_lines_are_never_rewritten() {
        let tags = ShutdownTags::new(["port/"]);
        assert_eq!(disable_command(rule(), &tags, "no shutdown", &["no shutdown"], 0), None);
    }

    #[test]
    fn test_bracket_edit_of_enabled_node() {
        let tags = ShutdownTags::new(["port/"]);
        let store = MemoryStore::new();
        let lines = ["port 1/1/1", "    description uplink", "    exit"];
        let mut safety = ShutdownSafety::new(rule(), &tags, &store, true);
        let mut out = Vec::new();
        safety.emit(OutboundLine::new("port 1/1/1"), &lines, 0, &mut out);
        safety.emit(OutboundLine::new("description uplink"), &lines, 1, &mut out);
        safety.emit(OutboundLine::new("exit"), &lines, 2, &mut out);
        assert_eq!(
            texts(&out),
            ["port 1/1/1", "shutdown", "description uplink", "no shutdown", "exit"]
        );
    }

    #[test]
    fn test_bracket_leaves_disabled_node_alone() {
        let tags = ShutdownTags::new(["port/"]);
        let store = MemoryStore::new();
        store.insert("port{1/1/1}/shutdown");
        let lines = ["port 1/1/1", "    description uplink", "    exit"];
        let mut safety = ShutdownSafety::new(rule(), &tags, &store, true);
        let mut out = Vec::new();
        for (i, l) in ["port 1/1/1", "description uplink", "exit"].iter().enumerate() {
            safety.emit(OutboundLine::new(*l), &lines, i, &mut out);
        }
        assert_eq!(texts(&out), ["port 1/1/1", "description uplink", "exit"]);
    }

    #[test]
    fn test_explicit_shutdown_suppresses_restore() {
        let tags = ShutdownTags::new(["port/"]);
        let store = MemoryStore::new();
        let lines = ["port 1/1/1", "    shutdown", "    exit"];
        let mut safety = ShutdownSafety::new(rule(), &tags, &store, true);
        let mut out = Vec::new();
        for (i, l) in ["port 1/1/1", "shutdown", "exit"].iter().enumerate() {
            safety.emit(OutboundLine::new(*l), &lines, i, &mut out);
        }
        assert_eq!(texts(&out), ["port 1/1/1", "shutdown", "shutdown", "exit"]);
    }
}
