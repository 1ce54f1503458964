//
// utf16.rs
//
// Conversions between the wire encoding (UTF-16 code units) and the
// code-point positions used everywhere inside the server
//

use ropey::{Rope, RopeSlice};
use tower_lsp::lsp_types::{Position, Range};

/// A position counted in code points, zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CharPosition {
    pub line: usize,
    pub column: usize,
}

impl CharPosition {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// A range of code-point positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CharRange {
    pub start: CharPosition,
    pub end: CharPosition,
}

impl CharRange {
    pub fn new(start: CharPosition, end: CharPosition) -> Self {
        Self { start, end }
    }

    /// Range on a single line.
    pub fn on_line(line: usize, start: usize, end: usize) -> Self {
        Self {
            start: CharPosition::new(line, start),
            end: CharPosition::new(line, end),
        }
    }

    pub fn contains(&self, pos: CharPosition) -> bool {
        self.start <= pos && pos <= self.end
    }
}

/// Convert a UTF-16 column to a code-point column within `line`.
///
/// A column pointing into the middle of a surrogate pair lands after the pair.
/// Columns past the end clamp to the line length.
pub fn utf16_to_char_column(line: &str, utf16_col: u32) -> usize {
    let target = utf16_col as usize;
    let mut utf16_count = 0;
    for (char_idx, ch) in line.chars().enumerate() {
        if utf16_count >= target {
            return char_idx;
        }
        utf16_count += ch.len_utf16();
    }
    line.chars().count()
}

/// Convert a code-point column within `line` to a UTF-16 column.
pub fn char_to_utf16_column(line: &str, char_col: usize) -> u32 {
    line.chars().take(char_col).map(char::len_utf16).sum::<usize>() as u32
}

/// Line content without its trailing line break.
pub fn line_slice(rope: &Rope, line: usize) -> Option<RopeSlice<'_>> {
    if line >= rope.len_lines() {
        return None;
    }
    let slice = rope.line(line);
    let len = slice.len_chars();
    if len > 0 && slice.char(len - 1) == '\n' {
        Some(slice.slice(..len - 1))
    } else {
        Some(slice)
    }
}

pub fn line_text(rope: &Rope, line: usize) -> Option<String> {
    line_slice(rope, line).map(|s| s.to_string())
}

/// Absolute char index of `pos`, with the column clamped to the line.
pub fn char_offset(rope: &Rope, pos: CharPosition) -> Option<usize> {
    let slice = line_slice(rope, pos.line)?;
    Some(rope.line_to_char(pos.line) + pos.column.min(slice.len_chars()))
}

/// Map a wire position onto the document, or `None` if the line does not exist.
pub fn position_from_wire(rope: &Rope, pos: Position) -> Option<CharPosition> {
    let slice = line_slice(rope, pos.line as usize)?;
    let target = pos.character as usize;
    let mut utf16_count = 0;
    let mut column = slice.len_chars();
    for (char_idx, ch) in slice.chars().enumerate() {
        if utf16_count >= target {
            column = char_idx;
            break;
        }
        utf16_count += ch.len_utf16();
    }
    Some(CharPosition::new(pos.line as usize, column))
}

pub fn position_to_wire(rope: &Rope, pos: CharPosition) -> Position {
    let character = match line_slice(rope, pos.line) {
        Some(slice) => slice
            .chars()
            .take(pos.column)
            .map(char::len_utf16)
            .sum::<usize>() as u32,
        None => pos.column as u32,
    };
    Position::new(pos.line as u32, character)
}

pub fn range_from_wire(rope: &Rope, range: Range) -> Option<CharRange> {
    Some(CharRange::new(
        position_from_wire(rope, range.start)?,
        position_from_wire(rope, range.end)?,
    ))
}

pub fn range_to_wire(rope: &Rope, range: CharRange) -> Range {
    Range::new(
        position_to_wire(rope, range.start),
        position_to_wire(rope, range.end),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_surrogate_pair_columns() {
        let line = "a😀b";
        assert_eq!(char_to_utf16_column(line, 0), 0);
        assert_eq!(char_to_utf16_column(line, 1), 1);
        assert_eq!(char_to_utf16_column(line, 2), 3);
        assert_eq!(char_to_utf16_column(line, 3), 4);
        assert_eq!(utf16_to_char_column(line, 3), 2);
        assert_eq!(utf16_to_char_column(line, 4), 3);
        assert_eq!(utf16_to_char_column(line, 99), 3);
    }

    #[test]
    fn test_range_round_trip_on_emoji_line() {
        let rope = Rope::from_str("first\nx😀y😀z\nlast");
        let wire = Range::new(Position::new(1, 1), Position::new(1, 4));
        let internal = range_from_wire(&rope, wire).unwrap();
        assert_eq!(internal, CharRange::on_line(1, 1, 3));
        assert_eq!(range_to_wire(&rope, internal), wire);
    }

    #[test]
    fn test_position_past_last_line_is_none() {
        let rope = Rope::from_str("one\ntwo");
        assert!(position_from_wire(&rope, Position::new(2, 0)).is_none());
        // trailing newline opens an empty last line
        let rope = Rope::from_str("one\n");
        assert_eq!(
            position_from_wire(&rope, Position::new(1, 0)),
            Some(CharPosition::new(1, 0))
        );
    }

    fn line_strategy() -> impl Strategy<Value = String> {
        prop::collection::vec(
            prop_oneof![
                Just('a'),
                Just(' '),
                Just('é'),
                Just('😀'),
                Just('𝄞'),
                Just('中'),
            ],
            0..12,
        )
        .prop_map(|chars| chars.into_iter().collect())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_wire_range_round_trips(
            lines in prop::collection::vec(line_strategy(), 1..5),
            a in any::<prop::sample::Index>(),
            b in any::<prop::sample::Index>(),
            la in any::<prop::sample::Index>(),
            lb in any::<prop::sample::Index>(),
        ) {
            let text = lines.join("\n");
            let rope = Rope::from_str(&text);
            let l1 = la.index(lines.len());
            let l2 = lb.index(lines.len());
            let (l1, l2) = (l1.min(l2), l1.max(l2));
            let c1 = a.index(lines[l1].chars().count() + 1);
            let c2 = b.index(lines[l2].chars().count() + 1);
            let start = position_to_wire(&rope, CharPosition::new(l1, c1));
            let end = position_to_wire(&rope, CharPosition::new(l2, c2));
            let wire = Range::new(start, end);

            let internal = range_from_wire(&rope, wire).unwrap();
            prop_assert_eq!(range_to_wire(&rope, internal), wire);
        }
    }
}
