use crate::core::line::classifier::{classify_line, strip_escapes, Segment};
use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::debug;

/// Text substituted for a line that is not valid UTF-8
pub const DECODING_ERROR: &str = "<Decoding Error>";

/// Timestamp format of log lines
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One processed device line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    /// Wall-clock time the line was read
    pub timestamp: String,
    /// Timestamped line with escape sequences intact
    pub raw_line: String,
    /// Timestamped line as written to the log file
    pub plain_line: String,
    /// Display classification of `raw_line`
    pub segments: Vec<Segment>,
}

impl LogEntry {
    /// Rebuild an entry from a line of an existing log file.
    ///
    /// File lines carry no escape codes, so only keyword tagging applies.
    pub fn from_plain(line: &str) -> Self {
        let timestamp = match line.split_once(" : ") {
            Some((prefix, _)) if prefix.len() == 19 => prefix.to_string(),
            _ => String::new(),
        };

        LogEntry {
            timestamp,
            raw_line: line.to_string(),
            plain_line: line.to_string(),
            segments: classify_line(line),
        }
    }
}

/// Decode a device line, falling back to [`DECODING_ERROR`]
pub fn decode_line(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.trim_end().to_string(),
        Err(e) => {
            debug!("Undecodable line ({}): {}", e, hex::encode(bytes));
            DECODING_ERROR.to_string()
        }
    }
}

/// Turn raw device bytes read at `now` into a [`LogEntry`]
pub fn process_line(bytes: &[u8], now: &DateTime<Local>) -> LogEntry {
    let text = decode_line(bytes);
    let timestamp = now.format(TIMESTAMP_FORMAT).to_string();

    let raw_line = format!("{} : {}", timestamp, text);
    let plain_line = format!("{} : {}", timestamp, strip_escapes(&text).trim_end());
    let segments = classify_line(&raw_line);

    LogEntry {
        timestamp,
        raw_line,
        plain_line,
        segments,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::line::classifier::Tag;
    use chrono::TimeZone;

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 7, 10, 14, 30, 0).unwrap()
    }

    #[test]
    fn test_end_to_end_colored_line() {
        let entry = process_line(b"\x1b[31mGPS: fix acquired\x1b[0m\r\n", &at());

        assert_eq!(entry.timestamp, "2024-07-10 14:30:00");
        assert_eq!(entry.plain_line, "2024-07-10 14:30:00 : GPS: fix acquired");
        assert!(entry.segments.contains(&Segment::new("GPS: fix acquired", Tag::Gps)));
        assert!(entry.segments.last().unwrap().is_line_break());
    }

    #[test]
    fn test_invalid_utf8_uses_sentinel() {
        let entry = process_line(&[0x66, 0xff, 0xfe, 0x0a], &at());
        assert_eq!(entry.plain_line, "2024-07-10 14:30:00 : <Decoding Error>");
        assert_eq!(decode_line(&[0xc3, 0x28]), DECODING_ERROR);
    }

    #[test]
    fn test_trailing_whitespace_trimmed() {
        assert_eq!(decode_line(b"NET up   \r\n"), "NET up");
    }

    #[test]
    fn test_trailing_space_before_reset_code_not_in_file() {
        let entry = process_line(b"\x1b[32mlink up \x1b[0m\n", &at());
        assert_eq!(entry.plain_line, "2024-07-10 14:30:00 : link up");
    }

    #[test]
    fn test_from_plain_file_line() {
        let entry = LogEntry::from_plain("2024-07-10 14:30:00 : CAN frame 0x1a");
        assert_eq!(entry.timestamp, "2024-07-10 14:30:00");
        assert_eq!(entry.segments[0].tag, Tag::Can);

        let comment = LogEntry::from_plain("# note");
        assert!(comment.timestamp.is_empty());
        assert_eq!(comment.segments[0].tag, Tag::None);
    }

    #[test]
    fn test_timestamp_prefix_is_untagged() {
        let entry = process_line(b"\x1b[35mbus off", &at());
        assert_eq!(entry.segments[0], Segment::new("2024-07-10 14:30:00 : ", Tag::None));
        assert_eq!(entry.segments[1], Segment::new("bus off", Tag::Can));
    }
}
