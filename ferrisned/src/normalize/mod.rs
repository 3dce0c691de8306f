//! Read-path normalization of device configuration dumps.
//!
//! A [`Normalizer`] is an ordered list of [`Pass`]es owned by a family
//! policy. Running it turns a raw dump into canonical text that diffs
//! cleanly against the desired configuration.
//!
//! Every pass is written so that its own output contains nothing it would
//! change again. Cut markers are anchored header lines and are removed with
//! the cut. Substitutions never re-match their replacement. Quoting skips
//! bodies that are already quoted. Family normalizers quote banners before
//! their line passes, so banner text is never taken for a header.
//! Normalizing normalized text is therefore a no-op.

mod quote;

use regex::Regex;

pub use quote::{dequote, is_quoted, quote};

/// One normalization step.
#[derive(Debug, Clone)]
pub enum Pass {
    /// Remove carriage returns and trailing whitespace on every line.
    TrimLines,

    /// Remove every line matching the pattern.
    DropLines(Regex),

    /// Substitute over the whole text.
    Replace { pattern: Regex, replacement: String },

    /// Substitute within the lines matching `lines` only.
    ReplaceInLines {
        lines: Regex,
        pattern: Regex,
        replacement: String,
    },

    /// Drop everything up to and including the first matching line.
    CutThrough(Regex),

    /// Drop the last matching line and everything after it.
    CutFromLast(Regex),

    /// Keep only the lines after the last `start` line that precede the
    /// first `end` line following it.
    Body { start: Regex, end: Regex },

    /// Remove each `start`..=`end` range of lines.
    DropRanges { start: Regex, end: Regex },

    /// Quote `banner <kind> <delim>...<delim>` bodies into one line.
    QuoteBanners,

    /// Quote the lines between an opener line and the next closer line.
    QuoteBodies { opener: Regex, closer: Regex },

    /// Append the `tail` capture of a matching line to the previous line.
    FoldInto { pattern: Regex, separator: String },
}

impl Pass {
    fn run(&self, text: String) -> String {
        match self {
            Pass::TrimLines => join_lines(text.lines().map(|l| l.trim_end().replace('\r', ""))),
            Pass::DropLines(pattern) => {
                join_lines(text.lines().filter(|l| !pattern.is_match(l)).map(str::to_string))
            }
            Pass::Replace {
                pattern,
                replacement,
            } => pattern.replace_all(&text, replacement.as_str()).into_owned(),
            Pass::ReplaceInLines {
                lines,
                pattern,
                replacement,
            } => join_lines(text.lines().map(|l| {
                if lines.is_match(l) {
                    pattern.replace_all(l, replacement.as_str()).into_owned()
                } else {
                    l.to_string()
                }
            })),
            Pass::CutThrough(marker) => {
                let lines: Vec<&str> = text.lines().collect();
                match lines.iter().position(|l| marker.is_match(l)) {
                    Some(pos) => join_lines(lines[pos + 1..].iter().map(|l| l.to_string())),
                    None => text,
                }
            }
            Pass::CutFromLast(marker) => {
                let lines: Vec<&str> = text.lines().collect();
                match lines.iter().rposition(|l| marker.is_match(l)) {
                    Some(pos) => join_lines(lines[..pos].iter().map(|l| l.to_string())),
                    None => text,
                }
            }
            Pass::Body { start, end } => body(&text, start, end),
            Pass::DropRanges { start, end } => drop_ranges(&text, start, end),
            Pass::QuoteBanners => quote_banners(&text),
            Pass::QuoteBodies { opener, closer } => quote_bodies(&text, opener, closer),
            Pass::FoldInto { pattern, separator } => fold_into(&text, pattern, separator),
        }
    }
}

/// Ordered normalization passes for one device family.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    passes: Vec<Pass>,
}

impl Normalizer {
    pub fn new(passes: Vec<Pass>) -> Self {
        Self { passes }
    }

    /// Normalize a raw dump.
    pub fn normalize(&self, raw: &str) -> String {
        self.passes
            .iter()
            .fold(raw.to_string(), |text, pass| pass.run(text))
    }

    pub fn passes(&self) -> &[Pass] {
        &self.passes
    }
}

fn join_lines<I, S>(lines: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for line in lines {
        out.push_str(line.as_ref());
        out.push('\n');
    }
    out
}

fn body(text: &str, start: &Regex, end: &Regex) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let mut last_start = None;
    let mut stop = lines.len();
    for (i, line) in lines.iter().enumerate() {
        if start.is_match(line) {
            last_start = Some(i);
        } else if last_start.is_some() && end.is_match(line) {
            stop = i;
            break;
        }
    }
    match last_start {
        Some(s) => join_lines(lines[s + 1..stop].iter()),
        None => text.to_string(),
    }
}

fn drop_ranges(text: &str, start: &Regex, end: &Regex) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let mut out = Vec::with_capacity(lines.len());
    let mut i = 0;
    while i < lines.len() {
        if start.is_match(lines[i]) {
            if let Some(off) = lines[i + 1..].iter().position(|l| end.is_match(l)) {
                i += off + 2;
                continue;
            }
        }
        out.push(lines[i]);
        i += 1;
    }
    join_lines(out)
}

fn quote_banners(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        let Some((head, rest)) = banner_parts(line) else {
            out.push(line.to_string());
            i += 1;
            continue;
        };
        if rest.starts_with('"') {
            out.push(line.to_string());
            i += 1;
            continue;
        }

        // `^C` style delimiters are two characters
        let mut chars = rest.char_indices();
        let delim_len = match (chars.next(), chars.next()) {
            (Some((_, '^')), Some((at, next))) => at + next.len_utf8(),
            (Some((_, first)), _) => first.len_utf8(),
            (None, _) => 0,
        };
        if delim_len == 0 {
            out.push(line.to_string());
            i += 1;
            continue;
        }
        let delim = &rest[..delim_len];
        let after = &rest[delim_len..];

        if let Some(pos) = after.find(delim) {
            out.push(format!("{} {}", head, quote(&after[..pos])));
            i += 1;
            continue;
        }

        let mut body = String::from(after);
        let mut j = i + 1;
        let mut closed = false;
        while j < lines.len() {
            body.push('\n');
            if let Some(pos) = lines[j].find(delim) {
                body.push_str(&lines[j][..pos]);
                closed = true;
                break;
            }
            body.push_str(lines[j]);
            j += 1;
        }
        if !closed {
            out.push(line.to_string());
            i += 1;
            continue;
        }
        out.push(format!("{} {}", head, quote(&body)));
        i = j + 1;
    }
    join_lines(out)
}

/// Split `banner <kind> <rest>` into (`banner <kind>`, `<rest>`).
fn banner_parts(line: &str) -> Option<(&str, &str)> {
    let after = line.strip_prefix("banner ")?;
    let kind_end = after.find(' ')?;
    let rest = &after[kind_end + 1..];
    if rest.is_empty() {
        return None;
    }
    Some((&line[.."banner ".len() + kind_end], rest))
}

fn quote_bodies(text: &str, opener: &Regex, closer: &Regex) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut i = 0;
    while i < lines.len() {
        out.push(lines[i].to_string());
        if !opener.is_match(lines[i]) {
            i += 1;
            continue;
        }
        let Some(off) = lines[i + 1..].iter().position(|l| closer.is_match(l)) else {
            i += 1;
            continue;
        };
        let body = &lines[i + 1..i + 1 + off];
        let already = body.len() == 1 && is_quoted(body[0]);
        if body.is_empty() || already {
            i += 1;
            continue;
        }
        let indent_len = body[0].len() - body[0].trim_start().len();
        out.push(format!("{}{}", &body[0][..indent_len], quote(&body.join("\n"))));
        i += 1 + off;
    }
    join_lines(out)
}

fn fold_into(text: &str, pattern: &Regex, separator: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    for line in text.lines() {
        if let (Some(caps), Some(prev)) = (pattern.captures(line), out.last_mut()) {
            if let Some(tail) = caps.name("tail") {
                prev.push_str(separator);
                prev.push_str(tail.as_str());
                continue;
            }
        }
        out.push(line.to_string());
    }
    join_lines(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rx(p: &str) -> Regex {
        Regex::new(p).unwrap()
    }

    fn assert_idempotent(normalizer: &Normalizer, raw: &str) -> String {
        let once = normalizer.normalize(raw);
        let twice = normalizer.normalize(&once);
        assert_eq!(once, twice, "second pass changed the text");
        once
    }

    // =========================================================================
    // Individual passes
    // =========================================================================

    #[test]
    fn test_body_keeps_text_between_markers() {
        let n = Normalizer::new(vec![Pass::Body {
            start: rx(r"^configure$"),
            end: rx(r"^exit all$"),
        }]);
        let raw = "exit all\nconfigure\n    system\n    exit\nexit all\n# done\n";
        assert_eq!(assert_idempotent(&n, raw), "    system\n    exit\n");
    }

    #[test]
    fn test_body_without_end_runs_to_eof() {
        let n = Normalizer::new(vec![Pass::Body {
            start: rx(r"^configure$"),
            end: rx(r"^exit all$"),
        }]);
        assert_eq!(n.normalize("hdr\nconfigure\n  a\n"), "  a\n");
    }

    #[test]
    fn test_cut_passes() {
        let n = Normalizer::new(vec![
            Pass::CutThrough(rx(r"^Current configuration")),
            Pass::CutFromLast(rx(r"^end$")),
        ]);
        let raw = "Building\nCurrent configuration : 12 bytes\nhostname r1\nend\n";
        assert_eq!(assert_idempotent(&n, raw), "hostname r1\n");
    }

    #[test]
    fn test_drop_ranges() {
        let n = Normalizer::new(vec![Pass::DropRanges {
            start: rx(r"^boot-start-marker$"),
            end: rx(r"^boot-end-marker$"),
        }]);
        let raw = "a\nboot-start-marker\nboot system x\nboot-end-marker\nb\n";
        assert_eq!(assert_idempotent(&n, raw), "a\nb\n");
    }

    #[test]
    fn test_quote_banners_multiline() {
        let n = Normalizer::new(vec![Pass::QuoteBanners]);
        let raw = "banner motd ^C\nAuthorized \"only\"\n^C\nline con 0\n";
        let out = assert_idempotent(&n, raw);
        assert_eq!(out, "banner motd \"\\nAuthorized \\\"only\\\"\\n\"\nline con 0\n");
    }

    #[test]
    fn test_quote_banners_single_line() {
        let n = Normalizer::new(vec![Pass::QuoteBanners]);
        assert_eq!(n.normalize("banner exec #hello#\n"), "banner exec \"hello\"\n");
    }

    #[test]
    fn test_quote_banners_multibyte_delimiter() {
        let n = Normalizer::new(vec![Pass::QuoteBanners]);
        assert_eq!(
            assert_idempotent(&n, "banner motd ^é hello ^é\n"),
            "banner motd \" hello \"\n"
        );
        assert_eq!(
            assert_idempotent(&n, "banner login ¤\nZugang für Befugte\n¤\n"),
            "banner login \"\\nZugang für Befugte\\n\"\n"
        );
    }

    #[test]
    fn test_quote_banners_unclosed_kept() {
        let n = Normalizer::new(vec![Pass::QuoteBanners]);
        let raw = "banner exec ^Ü\nno closing delimiter\n";
        assert_eq!(assert_idempotent(&n, raw), raw);
    }

    #[test]
    fn test_cut_marker_inside_body_line() {
        let n = Normalizer::new(vec![Pass::CutThrough(rx(r"^! Last configuration change"))]);
        let raw = "! Last configuration change at 10:00\nhostname r1\n description ! Last configuration change\n";
        assert_eq!(
            assert_idempotent(&n, raw),
            "hostname r1\n description ! Last configuration change\n"
        );
    }

    #[test]
    fn test_quote_bodies() {
        let n = Normalizer::new(vec![Pass::QuoteBodies {
            opener: rx(r"^ certificate "),
            closer: rx(r"^\s*quit$"),
        }]);
        let raw = "crypto pki certificate chain X\n certificate ca 01\n  3082 01\n  AB CD\n  quit\n";
        let out = assert_idempotent(&n, raw);
        assert_eq!(
            out,
            "crypto pki certificate chain X\n certificate ca 01\n  \"  3082 01\\n  AB CD\"\n  quit\n"
        );
    }

    #[test]
    fn test_fold_into_previous_line() {
        let n = Normalizer::new(vec![Pass::FoldInto {
            pattern: rx(r"^\s*switchport trunk allowed vlan add (?P<tail>\S+)$"),
            separator: ",".to_string(),
        }]);
        let raw = " switchport trunk allowed vlan 1-10\n switchport trunk allowed vlan add 20,30\n";
        assert_eq!(
            assert_idempotent(&n, raw),
            " switchport trunk allowed vlan 1-10,20,30\n"
        );
    }

    #[test]
    fn test_replace_in_matching_lines_only() {
        let n = Normalizer::new(vec![Pass::ReplaceInLines {
            lines: rx(r"^\s*instance \d+ vlan "),
            pattern: rx(r", "),
            replacement: ",".to_string(),
        }]);
        let raw = " instance 1 vlan 10, 20-30, 40\n description a, b\n";
        assert_eq!(
            assert_idempotent(&n, raw),
            " instance 1 vlan 10,20-30,40\n description a, b\n"
        );
    }

    #[test]
    fn test_trim_lines() {
        let n = Normalizer::new(vec![Pass::TrimLines]);
        assert_eq!(assert_idempotent(&n, "a  \r\nb\r\n"), "a\nb\n");
    }
}
