//! Column resolution: header names to positions, and A1 column arithmetic

use crate::error::SyncError;

/// A sheet's header row, the semantic-to-positional column mapping.
///
/// Read fresh for every operation; never reuse one across a header change.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderRow {
    sheet: String,
    row: u32,
    names: Vec<String>,
}

impl HeaderRow {
    pub fn new(sheet: impl Into<String>, row: u32, names: Vec<String>) -> Self {
        Self {
            sheet: sheet.into(),
            row,
            names: names.into_iter().map(|n| n.trim().to_string()).collect(),
        }
    }

    /// 1-based row number the header was read from
    pub fn row(&self) -> u32 {
        self.row
    }

    /// Number of columns the header spans, ignoring trailing blank cells
    pub fn width(&self) -> usize {
        self.names
            .iter()
            .rposition(|n| !n.is_empty())
            .map(|i| i + 1)
            .unwrap_or(0)
    }

    /// 1-based position of a named column
    pub fn position(&self, name: &str) -> Result<u32, SyncError> {
        self.index(name).map(|i| i as u32 + 1)
    }

    /// 0-based index of a named column
    pub fn index(&self, name: &str) -> Result<usize, SyncError> {
        let wanted = name.trim();
        self.names
            .iter()
            .position(|n| n == wanted)
            .ok_or_else(|| SyncError::ColumnNotFound {
                sheet: self.sheet.clone(),
                column: wanted.to_string(),
                header_row: self.row,
            })
    }

    /// Inclusive 0-based index range from `start` to `end`.
    ///
    /// With `expected` set, a span of any other width is schema drift.
    pub fn span(
        &self,
        start: &str,
        end: &str,
        expected: Option<usize>,
    ) -> Result<Vec<usize>, SyncError> {
        let first = self.index(start)?;
        let last = self.index(end)?;
        let actual = if last >= first { last - first + 1 } else { 0 };

        if actual == 0 || expected.is_some_and(|n| n != actual) {
            return Err(SyncError::ColumnCountMismatch {
                sheet: self.sheet.clone(),
                start: start.to_string(),
                end: end.to_string(),
                expected: expected.unwrap_or(actual),
                actual,
            });
        }

        Ok((first..=last).collect())
    }
}

/// Where one value of a composed row goes
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnTarget {
    /// Column whose header cell carries this name
    Header(String),
    /// A1 column letter, independent of the header
    Letter(String),
    /// 0-based column index
    Index(usize),
}

/// Target columns of a sheet, resolved against its live header row
#[derive(Debug, Clone, PartialEq)]
pub enum TargetColumns {
    /// One target per value, in order
    Each(Vec<ColumnTarget>),
    /// Every column from `start` to `end` inclusive
    Span {
        start: String,
        end: String,
        expected: Option<usize>,
    },
}

impl TargetColumns {
    /// 0-based indices, one per value of a composed row
    pub fn resolve(&self, header: &HeaderRow) -> Result<Vec<usize>, SyncError> {
        match self {
            TargetColumns::Each(targets) => targets
                .iter()
                .map(|target| match target {
                    ColumnTarget::Header(name) => header.index(name),
                    ColumnTarget::Letter(letter) => {
                        column_index(letter).ok_or_else(|| SyncError::ColumnNotFound {
                            sheet: header.sheet.clone(),
                            column: letter.clone(),
                            header_row: header.row,
                        })
                    }
                    ColumnTarget::Index(idx) => Ok(*idx),
                })
                .collect(),
            TargetColumns::Span { start, end, expected } => header.span(start, end, *expected),
        }
    }
}

/// 0-based column index to A1 letters (0 -> A, 25 -> Z, 26 -> AA)
pub fn column_letter(mut index: usize) -> String {
    let mut buf = Vec::new();
    loop {
        buf.push(b'A' + (index % 26) as u8);
        index /= 26;
        if index == 0 {
            break;
        }
        index -= 1;
    }
    buf.reverse();
    String::from_utf8(buf).unwrap_or_default()
}

/// A1 letters to 0-based column index; case-insensitive
pub fn column_index(letters: &str) -> Option<usize> {
    let letters = letters.trim();
    if letters.is_empty() {
        return None;
    }
    let mut col: usize = 0;
    for ch in letters.bytes() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        let val = (ch.to_ascii_uppercase() - b'A') as usize + 1;
        col = col.checked_mul(26)?.checked_add(val)?;
    }
    Some(col - 1)
}

/// Column `offset` places away from `letters` (`Z` + 1 = `AA`).
/// `None` for invalid letters or a result left of column A.
pub fn offset_column(letters: &str, offset: isize) -> Option<String> {
    let index = column_index(letters)?.checked_add_signed(offset)?;
    Some(column_letter(index))
}
