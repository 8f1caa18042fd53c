#[derive(Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Span {
    start: usize,
    end: usize,
}

impl Span {
    pub fn from_start_end(start: usize, end: usize) -> Span {
        let (start, end) = (start.min(end), start.max(end));
        Span { start, end }
    }

    pub fn from_start_len(start: usize, len: usize) -> Span {
        Span {
            start,
            end: start + len,
        }
    }

    pub fn start(self) -> usize {
        self.start
    }
    pub fn end(self) -> usize {
        self.end
    }
    pub fn len(self) -> usize {
        self.end.saturating_sub(self.start)
    }
    pub fn is_empty(self) -> bool {
        self.len() == 0
    }
    /// The default span marks nodes without a source location, such as
    /// statements synthesized during lowering.
    pub fn is_none(self) -> bool {
        self == Span::default()
    }
    pub fn union(self, other: Span) -> Span {
        if self.is_none() {
            other
        } else if other.is_none() {
            self
        } else {
            Span::from_start_end(self.start.min(other.start), self.end.max(other.end))
        }
    }
    /// Union of an arbitrary number of spans; `Span::default()` if empty.
    pub fn join(spans: impl IntoIterator<Item = Span>) -> Span {
        spans.into_iter().fold(Span::default(), Span::union)
    }

    pub fn start_pos(self, src: &str) -> Position {
        Position::from_byte_offset(src, self.start)
    }
    pub fn end_pos(self, src: &str) -> Position {
        Position::from_byte_offset(src, self.end)
    }
}

impl std::fmt::Debug for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Span({}..{})", self.start, self.end)
    }
}

impl From<Span> for miette::SourceSpan {
    fn from(span: Span) -> Self {
        miette::SourceSpan::new(miette::SourceOffset::from(span.start()), span.len())
    }
}

#[derive(Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Position {
        Position { line, column }
    }

    pub fn to_byte_offset(self, src: &str) -> Option<usize> {
        let mut offset = 0;
        let mut lines = 0;
        for (line_no, line) in src.split_inclusive('\n').enumerate() {
            if line_no == self.line {
                let trimmed = line.strip_suffix('\n').unwrap_or(line);
                return (self.column <= trimmed.len()).then_some(offset + self.column);
            }
            offset += line.len();
            lines += 1;
        }
        // One line past the final newline (or the empty source): only column 0 exists.
        (self.line == lines && self.column == 0).then_some(offset)
    }

    pub fn from_byte_offset(src: &str, byte_offset: usize) -> Position {
        if byte_offset > src.len() || !src.is_char_boundary(byte_offset) {
            tracing::debug!(byte_offset, len = src.len(), "byte offset out of range");
            return Position::from_byte_offset(src, src.len());
        }
        let prefix = &src[..byte_offset];
        let line = prefix.bytes().filter(|&b| b == b'\n').count();
        let column = prefix.rfind('\n').map_or(byte_offset, |nl| byte_offset - nl - 1);
        Position::new(line, column)
    }
}

impl std::fmt::Debug for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn union_ignores_missing_positions() {
        let a = Span::from_start_end(3, 7);
        assert_eq!(Span::default().union(a), a);
        assert_eq!(a.union(Span::default()), a);
        assert_eq!(Span::join([a, Span::from_start_end(10, 12)]).end(), 12);
    }

    proptest! {
        #[test]
        fn position_round_trip(src in ".*", byte_offset in 0..10_000usize) {
            let pos = Position::from_byte_offset(&src, byte_offset);
            if byte_offset <= src.len() && src.is_char_boundary(byte_offset) {
                prop_assert_eq!(pos.to_byte_offset(&src), Some(byte_offset));
            }
        }
    }
}
