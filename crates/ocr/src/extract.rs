use std::sync::OnceLock;

use regex::Regex;
use stagetab_core::{LabelPolicy, ParsedRecord};
use tracing::trace;

use crate::types::{LineVerdict, Rejection, StageLine};

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

// Table borders and underlines come back as `|`, `{` and `_`.
re!(re_separators, r"[ {|_]");

/// Tokens read as a unit after the distance under [`LabelPolicy::SkipUnitMarkers`].
const UNIT_MARKERS: &[&str] = &["km", "kms", "mi", "m", "mile", "miles"];

// ── Rule table ───────────────────────────────────────────────────────────────

/// A tokenized line with its candidate label already chosen.
struct LineParts<'a> {
    tokens: Vec<&'a str>,
    label: &'a str,
}

struct Rule {
    passes: fn(&LineParts<'_>) -> bool,
    rejection: Rejection,
}

/// Evaluated in order; the first failing rule decides the verdict.
const RULES: [Rule; 3] = [
    Rule {
        passes: has_two_tokens,
        rejection: Rejection::TooFewTokens,
    },
    Rule {
        passes: first_token_has_digit,
        rejection: Rejection::NoDistance,
    },
    Rule {
        passes: label_is_not_numeric,
        rejection: Rejection::NumericLabel,
    },
];

fn has_two_tokens(parts: &LineParts<'_>) -> bool {
    parts.tokens.len() >= 2
}

fn first_token_has_digit(parts: &LineParts<'_>) -> bool {
    parts
        .tokens
        .first()
        .is_some_and(|t| t.chars().any(|c| c.is_ascii_digit()))
}

fn label_is_not_numeric(parts: &LineParts<'_>) -> bool {
    !is_numeric(parts.label)
}

// ── Public parsing API ───────────────────────────────────────────────────────

/// Turns OCR text into stage records, one candidate per line.
///
/// Greedy and line-local: no backtracking and no context from neighbouring
/// lines. Rejected lines are dropped silently since OCR of a photographed
/// board is mostly noise (headers, borders, stray punctuation).
#[derive(Debug, Clone, Default)]
pub struct RecordParser {
    policy: LabelPolicy,
}

impl RecordParser {
    pub fn new(policy: LabelPolicy) -> Self {
        Self { policy }
    }

    /// Parse a whole OCR text block. Sequence numbers start at 1.
    pub fn parse_lines(&self, text: &str) -> Vec<ParsedRecord> {
        split_lines(text)
            .filter(|line| !line.is_empty())
            .filter_map(|line| match self.classify(line) {
                LineVerdict::Accept(stage) => Some(stage),
                LineVerdict::Reject(reason) => {
                    trace!(%reason, line, "line rejected");
                    None
                }
            })
            .zip(1u32..)
            .map(|(stage, sequence)| stage.into_record(sequence))
            .collect()
    }

    /// Run one line through the rule table.
    pub fn classify(&self, line: &str) -> LineVerdict {
        let tokens = tokenize(line);
        let label = self.pick_label(&tokens);
        let parts = LineParts { tokens, label };

        if let Some(rule) = RULES.iter().find(|rule| !(rule.passes)(&parts)) {
            return LineVerdict::Reject(rule.rejection);
        }

        LineVerdict::Accept(StageLine {
            distance: digits_of(parts.tokens[0]),
            stage_label: parts.label.to_string(),
        })
    }

    fn pick_label<'a>(&self, tokens: &[&'a str]) -> &'a str {
        let Some(&second) = tokens.get(1) else {
            return "";
        };
        let chosen: &'a str = match self.policy {
            LabelPolicy::SecondToken => second,
            LabelPolicy::SkipUnitMarkers => tokens[1..]
                .iter()
                .copied()
                .find(|t| !is_unit_marker(t))
                .unwrap_or(second),
        };
        chosen.trim()
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

pub fn tokenize(line: &str) -> Vec<&str> {
    re_separators()
        .split(line)
        .filter(|t| !t.is_empty())
        .collect()
}

/// Split on every Unicode line boundary, including the form feed Tesseract
/// emits after each page.
fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| {
        matches!(
            c,
            '\n' | '\r' | '\x0b' | '\x0c' | '\x1c' | '\x1d' | '\x1e' | '\u{85}' | '\u{2028}' | '\u{2029}'
        )
    })
}

fn digits_of(token: &str) -> String {
    token.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.chars().all(char::is_numeric)
}

fn is_unit_marker(token: &str) -> bool {
    let lowered = token.trim().to_lowercase();
    UNIT_MARKERS.contains(&lowered.as_str())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Vec<ParsedRecord> {
        RecordParser::default().parse_lines(text)
    }

    // ── Acceptance ───────────────────────────────────────────────────────────

    #[test]
    fn separators_split_and_unit_is_taken_as_label() {
        let r = parse("12{ km Coastal Pass|");
        assert_eq!(r, vec![ParsedRecord::new("12", "km", 1)]);
    }

    #[test]
    fn tokenize_discards_empty_tokens() {
        assert_eq!(
            tokenize("12{ km Coastal Pass|"),
            vec!["12", "km", "Coastal", "Pass"]
        );
        assert_eq!(tokenize("|__|"), Vec::<&str>::new());
    }

    #[test]
    fn misread_letters_dropped_from_distance() {
        let r = parse("12O Lakeside");
        assert_eq!(r[0].distance, "12");
        assert_eq!(r[0].stage_label, "Lakeside");
    }

    #[test]
    fn digits_anywhere_in_first_token() {
        let r = parse("k1m2 Ridge");
        assert_eq!(r[0].distance, "12");
    }

    #[test]
    fn tokens_beyond_second_are_ignored() {
        let r = parse("30 Alpe d Huez");
        assert_eq!(r[0].stage_label, "Alpe");
    }

    #[test]
    fn whitespace_only_label_is_accepted_empty() {
        let r = parse("12 \t");
        assert_eq!(r, vec![ParsedRecord::new("12", "", 1)]);
    }

    #[test]
    fn mixed_label_is_not_numeric() {
        let r = parse("8 3b");
        assert_eq!(r[0].stage_label, "3b");
    }

    // ── Rejection ────────────────────────────────────────────────────────────

    #[test]
    fn two_numeric_columns_rejected() {
        assert!(parse("42 7").is_empty());
        assert_eq!(
            RecordParser::default().classify("42 7"),
            LineVerdict::Reject(Rejection::NumericLabel)
        );
    }

    #[test]
    fn no_digit_in_first_token_rejected() {
        assert!(parse("Start").is_empty());
        assert_eq!(
            RecordParser::default().classify("Start Finish"),
            LineVerdict::Reject(Rejection::NoDistance)
        );
    }

    #[test]
    fn single_token_rejected_before_digit_check() {
        assert_eq!(
            RecordParser::default().classify("Start"),
            LineVerdict::Reject(Rejection::TooFewTokens)
        );
        assert_eq!(
            RecordParser::default().classify("120"),
            LineVerdict::Reject(Rejection::TooFewTokens)
        );
    }

    #[test]
    fn blank_and_whitespace_lines_rejected() {
        assert!(parse("").is_empty());
        assert!(parse("   ").is_empty());
        assert_eq!(
            RecordParser::default().classify(""),
            LineVerdict::Reject(Rejection::TooFewTokens)
        );
    }

    #[test]
    fn unicode_numeric_label_rejected() {
        assert!(parse("5 ½").is_empty());
    }

    // ── Whole blocks ─────────────────────────────────────────────────────────

    #[test]
    fn sequence_counts_only_accepted_lines() {
        let text = "ROUTE TABLE\n0 Start\n42 7\n15 Col\n|||\n\n31 Summit\n";
        let r = parse(text);
        let seq: Vec<u32> = r.iter().map(|x| x.sequence).collect();
        assert_eq!(seq, vec![1, 2, 3]);
        assert_eq!(r[1], ParsedRecord::new("15", "Col", 2));
    }

    #[test]
    fn tesseract_form_feed_and_crlf_handled() {
        let r = parse("10 Gap\r\n20 Pass\r\n\x0c");
        assert_eq!(r.len(), 2);
        assert_eq!(r[1].stage_label, "Pass");
    }

    #[test]
    fn fields_hold_their_shape() {
        let text = "12{ km Coastal\n7a 88\n3 4\nx9 Bridge\n___ 5\n 44_Lake\n0 0x\n";
        for rec in parse(text) {
            assert!(!rec.distance.is_empty());
            assert!(rec.distance.chars().all(|c| c.is_ascii_digit()));
            assert!(!is_numeric(&rec.stage_label), "label {:?}", rec.stage_label);
        }
    }

    #[test]
    fn rejected_lines_stay_rejected() {
        let parser = RecordParser::default();
        let text = "HEADER\n12 Col\n42 7\n|\n9 9\n5 Pass\nStart Here\n";
        let rejected: Vec<&str> = text
            .lines()
            .filter(|l| !parser.classify(l).is_accept())
            .collect();
        assert_eq!(rejected.len(), 5);
        assert!(parser.parse_lines(&rejected.join("\n")).is_empty());
    }

    // ── Label policy ─────────────────────────────────────────────────────────

    #[test]
    fn skip_unit_markers_takes_stage_name() {
        let parser = RecordParser::new(LabelPolicy::SkipUnitMarkers);
        let r = parser.parse_lines("12{ km Coastal Pass|");
        assert_eq!(r, vec![ParsedRecord::new("12", "Coastal", 1)]);
    }

    #[test]
    fn skip_unit_markers_falls_back_when_only_units() {
        let parser = RecordParser::new(LabelPolicy::SkipUnitMarkers);
        let r = parser.parse_lines("12 KM mi");
        assert_eq!(r[0].stage_label, "KM");
    }

    #[test]
    fn skip_unit_markers_still_rejects_numeric_name() {
        let parser = RecordParser::new(LabelPolicy::SkipUnitMarkers);
        assert!(parser.parse_lines("12 km 7").is_empty());
    }
}
