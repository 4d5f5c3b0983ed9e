use serde::{Deserialize, Serialize};
use stagetab_core::ParsedRecord;

/// One recognized character with Tesseract box coordinates
/// (origin at the bottom-left corner of the page).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharBox {
    pub symbol: String,
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
    pub page: u32,
}

/// Why a line produced no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rejection {
    /// Fewer than two tokens after splitting.
    TooFewTokens,
    /// The first token holds no digit, so there is no distance.
    NoDistance,
    /// The label is all digits: two numeric columns read as one line.
    NumericLabel,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::TooFewTokens => write!(f, "too_few_tokens"),
            Rejection::NoDistance => write!(f, "no_distance"),
            Rejection::NumericLabel => write!(f, "numeric_label"),
        }
    }
}

/// A line that passed every rule, before it is given a sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageLine {
    pub distance: String,
    pub stage_label: String,
}

impl StageLine {
    pub fn into_record(self, sequence: u32) -> ParsedRecord {
        ParsedRecord {
            distance: self.distance,
            stage_label: self.stage_label,
            sequence,
        }
    }
}

/// Outcome of classifying a single line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineVerdict {
    Accept(StageLine),
    Reject(Rejection),
}

impl LineVerdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, LineVerdict::Accept(_))
    }
}
