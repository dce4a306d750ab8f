//! Grid cell coordinates and single-step movement

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A grid cell, addressed by row and column
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub row: i32,
    pub column: i32,
}

impl Position {
    pub fn new(row: i32, column: i32) -> Self {
        Self { row, column }
    }

    pub fn is_same(&self, other: &Position) -> bool {
        self == other
    }

    /// Stable cell key, unique per (row, column)
    pub fn to_key(&self) -> String {
        self.to_string()
    }

    /// Take exactly one grid step toward `target`.
    ///
    /// With `allow_diagonal`, both axes advance together when both differ.
    /// Otherwise rows are closed first, then columns.
    pub fn move_toward(&mut self, target: Position, allow_diagonal: bool) {
        let inc_row = increment(self.row, target.row);
        let inc_col = increment(self.column, target.column);

        if allow_diagonal && inc_row != 0 && inc_col != 0 {
            self.row += inc_row;
            self.column += inc_col;
        } else if inc_row != 0 {
            self.row += inc_row;
        } else if inc_col != 0 {
            self.column += inc_col;
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.row, self.column)
    }
}

#[inline]
fn increment(current: i32, target: i32) -> i32 {
    match current.cmp(&target) {
        Ordering::Less => 1,
        Ordering::Greater => -1,
        Ordering::Equal => 0,
    }
}
