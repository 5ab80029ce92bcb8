//! Text matrix file format.
//!
//! One matrix row per line, values whitespace-separated, row-major text
//! order. Shape is inferred: the number of non-blank lines gives the row
//! count, the token count of the first row gives the column count, and every
//! later row must match it.
//!
//! Parsing is host-only and returns a structured [`FormatError`]; the
//! matrix constructors sit above this layer and apply the crate's fatal
//! policy to a malformed file.

use std::fmt::{Display, Write as _};
use std::str::FromStr;

use thiserror::Error;

/// Error type for text matrix parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    /// The input contained no rows at all.
    #[error("matrix text is empty")]
    Empty,

    /// A row's token count disagreed with the first row's.
    #[error("row {row} has {got} values, expected {expected}")]
    RaggedRow {
        /// 1-based row number in the input.
        row: usize,
        /// Token count found on that row.
        got: usize,
        /// Token count established by the first row.
        expected: usize,
    },

    /// A token failed to parse as a number.
    #[error("row {row}: `{token}` is not a number")]
    BadNumber {
        /// 1-based row number in the input.
        row: usize,
        /// The offending token.
        token: String,
    },
}

/// A parsed matrix: shape plus values in row-major order, as read.
#[derive(Debug, PartialEq)]
pub(crate) struct ParsedMatrix<T> {
    pub rows: usize,
    pub cols: usize,
    /// Row-major, `rows * cols` elements.
    pub data: Vec<T>,
}

/// Parse the text format. Blank lines are ignored, so a trailing newline is
/// harmless.
pub(crate) fn parse<T: FromStr>(text: &str) -> Result<ParsedMatrix<T>, FormatError> {
    let mut rows = 0usize;
    let mut cols = 0usize;
    let mut data = Vec::new();

    for (line_idx, line) in text.lines().enumerate() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }
        if rows == 0 {
            cols = tokens.len();
        } else if tokens.len() != cols {
            return Err(FormatError::RaggedRow {
                row: line_idx + 1,
                got: tokens.len(),
                expected: cols,
            });
        }
        for token in tokens {
            let value = token.parse::<T>().map_err(|_| FormatError::BadNumber {
                row: line_idx + 1,
                token: token.to_string(),
            })?;
            data.push(value);
        }
        rows += 1;
    }

    if rows == 0 {
        return Err(FormatError::Empty);
    }

    Ok(ParsedMatrix { rows, cols, data })
}

/// Render a row-major matrix into the text format.
///
/// Values are written with Rust's shortest round-trip float formatting, so
/// render-then-parse reproduces the contents exactly.
pub(crate) fn render<T: Display>(rows: usize, cols: usize, data: &[T]) -> String {
    debug_assert_eq!(data.len(), rows * cols);
    let mut out = String::new();
    for r in 0..rows {
        for c in 0..cols {
            if c > 0 {
                out.push(' ');
            }
            // String formatting cannot fail.
            let _ = write!(out, "{}", data[r * cols + c]);
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rectangular_input() {
        let parsed = parse::<f32>("1 2 3\n4 5 6\n").expect("valid input");
        assert_eq!(parsed.rows, 2);
        assert_eq!(parsed.cols, 3);
        assert_eq!(parsed.data, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn parses_single_value() {
        let parsed = parse::<f64>("42.5").expect("valid input");
        assert_eq!((parsed.rows, parsed.cols), (1, 1));
        assert_eq!(parsed.data, vec![42.5]);
    }

    #[test]
    fn ignores_blank_lines() {
        let parsed = parse::<f32>("\n1 2\n\n3 4\n\n").expect("valid input");
        assert_eq!((parsed.rows, parsed.cols), (2, 2));
    }

    #[test]
    fn rejects_ragged_rows() {
        let err = parse::<f32>("1 2 3\n4 5\n").unwrap_err();
        assert_eq!(
            err,
            FormatError::RaggedRow {
                row: 2,
                got: 2,
                expected: 3
            }
        );
    }

    #[test]
    fn rejects_non_numeric_tokens() {
        let err = parse::<f32>("1 2\n3 potato\n").unwrap_err();
        assert!(matches!(err, FormatError::BadNumber { row: 2, .. }));
    }

    #[test]
    fn rejects_empty_input() {
        assert_eq!(parse::<f32>("").unwrap_err(), FormatError::Empty);
        assert_eq!(parse::<f32>("\n\n").unwrap_err(), FormatError::Empty);
    }

    #[test]
    fn render_then_parse_round_trips_exactly() {
        let data = vec![1.0f32, -2.5, 0.333_333_34, 1.0e-7, 4.0, 5.0];
        let text = render(2, 3, &data);
        let parsed = parse::<f32>(&text).expect("rendered text is valid");
        assert_eq!((parsed.rows, parsed.cols), (2, 3));
        assert_eq!(parsed.data, data);
    }

    #[test]
    fn render_layout_is_one_row_per_line() {
        let text = render(2, 2, &[1.0f32, 2.0, 3.0, 4.0]);
        assert_eq!(text, "1 2\n3 4\n");
    }
}
