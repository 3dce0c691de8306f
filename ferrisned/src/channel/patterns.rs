//! Ordered pattern sets for prompt and response detection.

use regex::bytes::Regex;

/// A compiled pattern with optional negative matches.
///
/// A match is rejected when the matched text contains any of the
/// `not_contains` strings; the search then continues after it.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    /// The main pattern to match.
    pattern: Regex,

    /// Strings that must NOT be present in the matched text.
    not_contains: Vec<String>,
}

impl CompiledPattern {
    /// Create a new compiled pattern from a pattern string.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            not_contains: Vec::new(),
        })
    }

    /// Create a compiled pattern with negative matches.
    pub fn with_not_contains(
        pattern: &str,
        not_contains: Vec<String>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            not_contains,
        })
    }

    /// Create a pattern matching `text` literally.
    pub fn literal(text: &str) -> Result<Self, regex::Error> {
        Self::new(&regex::escape(text))
    }

    /// Get a reference to the underlying regex.
    pub fn regex(&self) -> &Regex {
        &self.pattern
    }

    /// First acceptable match as `(start, end)`.
    pub fn find(&self, data: &[u8]) -> Option<(usize, usize)> {
        self.pattern
            .find_iter(data)
            .find(|m| {
                let text = String::from_utf8_lossy(m.as_bytes());
                !self.not_contains.iter().any(|nc| text.contains(nc.as_str()))
            })
            .map(|m| (m.start(), m.end()))
    }

    /// Check if the data contains an acceptable match.
    pub fn is_match(&self, data: &[u8]) -> bool {
        self.find(data).is_some()
    }
}

/// An ordered list of alternatives handed to `expect`.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<CompiledPattern>,
}

impl PatternSet {
    /// Start building a pattern set.
    pub fn builder() -> PatternSetBuilder {
        PatternSetBuilder::default()
    }

    /// Create a set from already compiled patterns.
    pub fn from_patterns(patterns: Vec<CompiledPattern>) -> Self {
        Self { patterns }
    }

    /// Append an alternative, returning its index.
    pub fn push(&mut self, pattern: CompiledPattern) -> usize {
        self.patterns.push(pattern);
        self.patterns.len() - 1
    }

    /// Number of alternatives.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Check if the set has no alternatives.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Iterate over the alternatives in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &CompiledPattern> {
        self.patterns.iter()
    }

    /// Find the alternative whose match starts earliest in `data`.
    ///
    /// When several alternatives match at the same offset the one declared
    /// first wins, so more specific patterns must be declared before more
    /// general ones sharing a suffix.
    pub fn find_earliest(&self, data: &[u8]) -> Option<(usize, usize, usize)> {
        let mut best: Option<(usize, usize, usize)> = None;
        for (index, pattern) in self.patterns.iter().enumerate() {
            if let Some((start, end)) = pattern.find(data) {
                match best {
                    Some((_, best_start, _)) if best_start <= start => {}
                    _ => best = Some((index, start, end)),
                }
            }
        }
        best
    }
}

/// Builder for [`PatternSet`].
#[derive(Debug, Default)]
pub struct PatternSetBuilder {
    patterns: Vec<(String, Vec<String>)>,
}

impl PatternSetBuilder {
    /// Add a regex alternative.
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push((pattern.into(), Vec::new()));
        self
    }

    /// Add a regex alternative with negative matches.
    pub fn pattern_not_containing(
        mut self,
        pattern: impl Into<String>,
        not_contains: &[&str],
    ) -> Self {
        self.patterns.push((
            pattern.into(),
            not_contains.iter().map(|s| s.to_string()).collect(),
        ));
        self
    }

    /// Add a literal alternative.
    pub fn literal(mut self, text: &str) -> Self {
        self.patterns.push((regex::escape(text), Vec::new()));
        self
    }

    /// Compile all alternatives.
    pub fn build(self) -> Result<PatternSet, regex::Error> {
        let patterns = self
            .patterns
            .into_iter()
            .map(|(p, nc)| CompiledPattern::with_not_contains(&p, nc))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PatternSet { patterns })
    }
}
