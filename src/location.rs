//! Source location utilities.

use saphyr_parser::Span as ParserSpan;

/// Row/column location within the source YAML document (1-indexed, character-based).
///
/// Every [`crate::Error`] produced while events are being consumed carries the location of
/// the event that caused it. Errors raised before parsing starts (schema checks) and
/// allocation failures carry [`Location::UNKNOWN`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Location {
    /// 1-indexed line number.
    pub line: usize,
    /// 1-indexed column number.
    pub column: usize,
}

impl Location {
    /// Sentinel meaning "no location available".
    pub const UNKNOWN: Self = Self { line: 0, column: 0 };

    pub(crate) const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    /// True when both line and column are set.
    pub fn is_known(&self) -> bool {
        self.line != 0 && self.column != 0
    }
}

/// Convert a parser span into our (start) location.
pub(crate) fn location_from_span(span: &ParserSpan) -> Location {
    let start = &span.start;
    Location::new(start.line(), start.col() + 1)
}
