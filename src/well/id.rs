use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Well identifier: row letter plus 1-based column number (`A1`, `H12`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WellId {
    /// 0-based row index (`A` = 0)
    row: u8,

    /// 1-based column number
    col: u8,
}

impl WellId {
    /// Create a well id from a 0-based row index and 1-based column number.
    ///
    /// Returns `None` if the row is beyond `Z` or the column is 0.
    pub fn new(row: u8, col: u8) -> Option<Self> {
        if row >= 26 || col == 0 {
            return None;
        }
        Some(Self { row, col })
    }

    /// 0-based row index.
    pub fn row(&self) -> u8 {
        self.row
    }

    /// 1-based column number.
    pub fn col(&self) -> u8 {
        self.col
    }

    /// Row letter.
    pub fn row_letter(&self) -> char {
        (b'A' + self.row) as char
    }
}

impl fmt::Display for WellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.row_letter(), self.col)
    }
}

impl FromStr for WellId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut chars = s.chars();
        let letter = chars
            .next()
            .filter(|c| c.is_ascii_alphabetic())
            .ok_or_else(|| format!("invalid well id '{}': expected a row letter", s))?;

        let digits = chars.as_str();
        let col: u8 = Some(digits)
            .filter(|d| !d.is_empty() && d.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|d| d.parse().ok())
            .ok_or_else(|| format!("invalid well id '{}': expected a column number", s))?;

        let row = letter.to_ascii_uppercase() as u8 - b'A';
        WellId::new(row, col).ok_or_else(|| format!("invalid well id '{}'", s))
    }
}

impl Serialize for WellId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for WellId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
