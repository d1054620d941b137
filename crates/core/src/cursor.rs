//! Client-held position marker into a thread's message stream.
//!
//! The cursor is a Slack-style `seconds.fraction` timestamp string. It is not
//! signed and not security-sensitive; it only keeps a polling client from
//! receiving the same operator message twice. The empty cursor means "from the
//! beginning of the thread".

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollCursor(pub String);

impl PollCursor {
    pub fn start() -> Self {
        Self(String::new())
    }

    pub fn is_start(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Advance to `candidate` only if it sorts after the current position.
    ///
    /// Candidates that do not parse as a timestamp are ignored, so a corrupt
    /// server response can never move the cursor backwards or wedge it.
    pub fn advance(&mut self, candidate: &str) -> bool {
        let Some(next) = parse_ts(candidate) else {
            return false;
        };
        let moved = match parse_ts(&self.0) {
            Some(current) => next > current,
            None => true,
        };
        if moved {
            self.0 = candidate.to_string();
        }
        moved
    }
}

/// Parse a `seconds.fraction` timestamp into an ordered pair. The fraction is
/// right-padded so `"1.1"` and `"1.100"` compare equal, matching Slack's
/// fixed-width microsecond suffix.
fn parse_ts(value: &str) -> Option<(u64, u64)> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let (seconds, fraction) = match value.split_once('.') {
        Some((seconds, fraction)) => (seconds, fraction),
        None => (value, ""),
    };
    let seconds = seconds.parse::<u64>().ok()?;
    let fraction = if fraction.is_empty() {
        0
    } else {
        if fraction.len() > 9 || !fraction.bytes().all(|byte| byte.is_ascii_digit()) {
            return None;
        }
        let padded = format!("{fraction:0<9}");
        padded.parse::<u64>().ok()?
    };
    Some((seconds, fraction))
}

#[cfg(test)]
mod tests {
    use super::PollCursor;

    #[test]
    fn starts_empty_and_advances_forward() {
        let mut cursor = PollCursor::start();
        assert!(cursor.is_start());
        assert!(cursor.advance("1730000000.000100"));
        assert_eq!(cursor.as_str(), "1730000000.000100");
        assert!(cursor.advance("1730000001.000000"));
    }

    #[test]
    fn never_moves_backward() {
        let mut cursor = PollCursor("1730000005.000200".to_string());
        assert!(!cursor.advance("1730000005.000100"));
        assert!(!cursor.advance("1730000004.999999"));
        assert_eq!(cursor.as_str(), "1730000005.000200");
    }

    #[test]
    fn equal_position_does_not_advance() {
        let mut cursor = PollCursor("1730000005.000200".to_string());
        assert!(!cursor.advance("1730000005.000200"));
    }

    #[test]
    fn fraction_widths_compare_numerically() {
        let mut cursor = PollCursor("1730000005.1".to_string());
        assert!(!cursor.advance("1730000005.100"));
        assert!(cursor.advance("1730000005.2"));
    }

    #[test]
    fn garbage_candidates_are_ignored() {
        let mut cursor = PollCursor("1730000005.000200".to_string());
        for garbage in ["", "not-a-ts", "12.ab", "1.2.3", "9999999999999999999999.1"] {
            assert!(!cursor.advance(garbage), "advanced on {garbage:?}");
        }
        assert_eq!(cursor.as_str(), "1730000005.000200");
    }
}
