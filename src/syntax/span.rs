//! Source locations for query text.

use std::fmt;
use std::ops::Range;

use serde::Serialize;

/// Byte range in the source text.
pub type Span = Range<usize>;

/// A point in the source text.
///
/// Lines and columns are 1-based; columns count characters, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Position {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(offset: usize, line: usize, column: usize) -> Self {
        Self {
            offset,
            line,
            column,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Maps byte offsets to line/column positions.
#[derive(Debug, Clone)]
pub struct LineIndex<'src> {
    source: &'src str,
    line_starts: Vec<usize>,
}

impl<'src> LineIndex<'src> {
    pub fn new(source: &'src str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self {
            source,
            line_starts,
        }
    }

    /// Position of a byte offset. Offsets past the end clamp to the end.
    pub fn position(&self, offset: usize) -> Position {
        let offset = offset.min(self.source.len());
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let start = self.line_starts[line];
        let column = self
            .source
            .get(start..offset)
            .map(|s| s.chars().count())
            .unwrap_or(offset - start)
            + 1;
        Position::new(offset, line + 1, column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_line() {
        let idx = LineIndex::new("SELECT Name FROM Account");
        assert_eq!(idx.position(0), Position::new(0, 1, 1));
        assert_eq!(idx.position(7), Position::new(7, 1, 8));
    }

    #[test]
    fn test_multi_line() {
        let idx = LineIndex::new("SELECT Name\nFROM Account\nWHERE");
        assert_eq!(idx.position(12), Position::new(12, 2, 1));
        assert_eq!(idx.position(17), Position::new(17, 2, 6));
        assert_eq!(idx.position(25), Position::new(25, 3, 1));
    }

    #[test]
    fn test_offset_past_end_clamps() {
        let idx = LineIndex::new("abc");
        assert_eq!(idx.position(10), Position::new(3, 1, 4));
    }
}
