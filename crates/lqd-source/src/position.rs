/// A zero-based line and column position within a template source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineCol {
    line: u32,
    column: u32,
}

impl LineCol {
    #[must_use]
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    #[must_use]
    pub fn line(&self) -> u32 {
        self.line
    }

    #[must_use]
    pub fn column(&self) -> u32 {
        self.column
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    start: u32,
    length: u32,
}

impl Span {
    #[must_use]
    pub fn new(start: u32, length: u32) -> Self {
        Self { start, length }
    }

    #[must_use]
    pub fn from_parts(start: usize, length: usize) -> Self {
        let start_u32 = u32::try_from(start).unwrap_or(u32::MAX);
        let length_u32 = u32::try_from(length).unwrap_or(u32::MAX.saturating_sub(start_u32));
        Span::new(start_u32, length_u32)
    }

    /// Construct a span from byte offsets `start..end`.
    #[must_use]
    pub fn from_bounds(start: usize, end: usize) -> Self {
        Self::from_parts(start, end.saturating_sub(start))
    }

    #[must_use]
    pub fn start(self) -> u32 {
        self.start
    }

    #[must_use]
    pub fn start_usize(self) -> usize {
        self.start as usize
    }

    #[must_use]
    pub fn end(self) -> u32 {
        self.start.saturating_add(self.length)
    }

    #[must_use]
    pub fn length(self) -> u32 {
        self.length
    }

    #[must_use]
    pub fn length_usize(self) -> usize {
        self.length as usize
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.length == 0
    }

    #[must_use]
    pub fn to_line_col(&self, line_index: &LineIndex) -> (LineCol, LineCol) {
        (
            line_index.to_line_col(self.start),
            line_index.to_line_col(self.end()),
        )
    }
}

/// Byte offsets of every line start in a source text.
///
/// Engine errors carry one-based line numbers; the index maps them back onto
/// byte spans so they can be annotated in a snippet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndex {
    starts: Vec<u32>,
    len: u32,
}

impl LineIndex {
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        let mut starts = vec![0];
        for (idx, byte) in text.bytes().enumerate() {
            if byte == b'\n' {
                starts.push(u32::try_from(idx + 1).unwrap_or(u32::MAX));
            }
        }
        Self {
            starts,
            len: u32::try_from(text.len()).unwrap_or(u32::MAX),
        }
    }

    #[must_use]
    pub fn line_count(&self) -> usize {
        self.starts.len()
    }

    #[must_use]
    pub fn to_line_col(&self, offset: u32) -> LineCol {
        let line = match self.starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next.saturating_sub(1),
        };
        let column = offset - self.starts[line];
        LineCol::new(u32::try_from(line).unwrap_or(u32::MAX), column)
    }

    /// Span of the given one-based line, excluding its newline.
    #[must_use]
    pub fn line_span(&self, line_number: usize) -> Option<Span> {
        let index = line_number.checked_sub(1)?;
        let start = *self.starts.get(index)?;
        let end = self
            .starts
            .get(index + 1)
            .map_or(self.len, |next| next.saturating_sub(1));
        Some(Span::new(start, end.saturating_sub(start)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_map_to_lines() {
        let index = LineIndex::from_text("ab\ncd\n\nef");
        assert_eq!(index.line_count(), 4);
        assert_eq!(index.to_line_col(0), LineCol::new(0, 0));
        assert_eq!(index.to_line_col(4), LineCol::new(1, 1));
        assert_eq!(index.to_line_col(7), LineCol::new(3, 0));
    }

    #[test]
    fn position_after_multibyte_text() {
        let index = LineIndex::from_text("é\nxyz");
        insta::assert_debug_snapshot!(index.to_line_col(5), @r"
        LineCol {
            line: 1,
            column: 2,
        }
        ");
    }

    #[test]
    fn line_spans_exclude_newline() {
        let index = LineIndex::from_text("{% if %}\nbody\n{% endif %}");
        assert_eq!(index.line_span(1), Some(Span::new(0, 8)));
        assert_eq!(index.line_span(2), Some(Span::new(9, 4)));
        assert_eq!(index.line_span(3), Some(Span::new(14, 11)));
        assert_eq!(index.line_span(0), None);
        assert_eq!(index.line_span(4), None);
    }

    #[test]
    fn span_bounds() {
        let span = Span::from_bounds(3, 10);
        assert_eq!(span.start(), 3);
        assert_eq!(span.length(), 7);
        assert_eq!(span.end(), 10);
        assert!(Span::from_bounds(5, 2).is_empty());
    }
}
