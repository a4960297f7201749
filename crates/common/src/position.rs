//! Source position tables.
//!
//! Two parallel arrays map every generic bytecode word to the (inclusive)
//! character range of source text it was produced from.

/// Start and end character offsets per generic bytecode word.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceIndices {
    pub starts: Vec<usize>,
    pub ends: Vec<usize>,
}

impl SourceIndices {
    pub fn new(starts: Vec<usize>, ends: Vec<usize>) -> Self {
        Self { starts, ends }
    }

    /// True if both tables have exactly `code_len` entries.
    pub fn covers(&self, code_len: usize) -> bool {
        self.starts.len() == code_len && self.ends.len() == code_len
    }

    /// Character span of the word at `offset`, if known.
    ///
    /// The end is inclusive, as produced by the parser.
    pub fn span(&self, offset: usize) -> Option<(usize, usize)> {
        Some((*self.starts.get(offset)?, *self.ends.get(offset)?))
    }
}

/// Line/column helpers over source text, by character index.
pub struct SourceLines {
    chars: Vec<char>,
}

impl SourceLines {
    pub fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
        }
    }

    /// Number of characters.
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// Zero-based line number containing character `at`.
    pub fn line_of(&self, at: usize) -> usize {
        self.chars[..at.min(self.chars.len())]
            .iter()
            .filter(|&&c| c == '\n')
            .count()
    }

    /// Character range `[start, end)` of the line containing `at`,
    /// newline excluded.
    pub fn line_bounds(&self, at: usize) -> (usize, usize) {
        let at = at.min(self.chars.len());
        let start = self.chars[..at]
            .iter()
            .rposition(|&c| c == '\n')
            .map_or(0, |p| p + 1);
        let end = self.chars[at..]
            .iter()
            .position(|&c| c == '\n')
            .map_or(self.chars.len(), |p| at + p);
        (start, end)
    }

    /// The characters in `[start, end)`.
    pub fn slice(&self, start: usize, end: usize) -> String {
        let end = end.min(self.chars.len());
        self.chars[start.min(end)..end].iter().collect()
    }

    /// The character at `at`.
    pub fn char_at(&self, at: usize) -> Option<char> {
        self.chars.get(at).copied()
    }
}
