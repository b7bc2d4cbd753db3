//! Display classification of device lines.
//!
//! Two rules decide the [`Tag`] of each text run:
//!
//! 1. SGR color codes (`ESC[31m`, `ESC[0m`, ...) change a tag that persists
//!    for the rest of the line.
//! 2. A flag keyword (`GPS`, `NET`, ...) inside a run overrides the tag for
//!    that run only. The persisted color state is left untouched.
//!
//! Classification never changes the characters of the line. Escape
//! stripping for the file copy lives in [`strip_escapes`] and shares no
//! state with the classifier.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Semantic label of a rendered text run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tag {
    Info,
    Gps,
    Cvp,
    Can,
    Net,
    Pla,
    Debug,
    #[default]
    None,
}

impl Tag {
    /// Keyword flags in match priority order
    pub const FLAGS: [(&'static str, Tag); 7] = [
        ("INFO", Tag::Info),
        ("GPS", Tag::Gps),
        ("CVP", Tag::Cvp),
        ("CAN", Tag::Can),
        ("NET", Tag::Net),
        ("PLA", Tag::Pla),
        ("DEBUG", Tag::Debug),
    ];

    /// First flag keyword contained in `text`
    pub fn from_keyword(text: &str) -> Option<Tag> {
        Self::FLAGS
            .iter()
            .find(|(flag, _)| text.contains(flag))
            .map(|&(_, tag)| tag)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tag::Info => "info",
            Tag::Gps => "gps",
            Tag::Cvp => "cvp",
            Tag::Can => "can",
            Tag::Net => "net",
            Tag::Pla => "pla",
            Tag::Debug => "debug",
            Tag::None => "none",
        };
        f.write_str(name)
    }
}

/// One classified run of text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    pub tag: Tag,
}

impl Segment {
    pub fn new(text: impl Into<String>, tag: Tag) -> Self {
        Self {
            text: text.into(),
            tag,
        }
    }

    /// Marker closing every classified line
    pub fn line_break() -> Self {
        Self::new("\n", Tag::None)
    }

    pub fn is_line_break(&self) -> bool {
        self.text == "\n" && self.tag == Tag::None
    }
}

fn sgr_pattern() -> &'static Regex {
    static SGR: OnceLock<Regex> = OnceLock::new();
    SGR.get_or_init(|| Regex::new(r"\x1b\[\d+(?:;\d+)*m").expect("invalid SGR pattern"))
}

fn escape_pattern() -> &'static Regex {
    static ESCAPE: OnceLock<Regex> = OnceLock::new();
    ESCAPE.get_or_init(|| Regex::new(r"\x1b[@-_][0-?]*[ -/]*[@-~]").expect("invalid escape pattern"))
}

/// Remove terminal control sequences, leaving plain text for the log file
pub fn strip_escapes(line: &str) -> String {
    escape_pattern().replace_all(line, "").into_owned()
}

/// Color state carried across the pieces of one line
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ClassifierState {
    pub current_tag: Tag,
}

impl ClassifierState {
    /// Apply the parameters of one SGR sequence, left to right
    pub fn apply_sgr(&mut self, sequence: &str) {
        let params = sequence
            .trim_start_matches("\x1b[")
            .trim_end_matches('m')
            .split(';');

        for code in params {
            match code {
                "31" => self.current_tag = Tag::Gps,
                "32" => self.current_tag = Tag::Net,
                "34" => self.current_tag = Tag::Cvp,
                "35" => self.current_tag = Tag::Can,
                "33" => self.current_tag = Tag::Pla,
                "0" => self.current_tag = Tag::None,
                _ => {}
            }
        }
    }

    /// Tag for a text run: a keyword wins, otherwise the color state
    pub fn tag_for(&self, text: &str) -> Tag {
        Tag::from_keyword(text).unwrap_or(self.current_tag)
    }
}

/// Split `line` into tagged runs, terminated by [`Segment::line_break`].
///
/// Every text run between escape codes is emitted, empty ones included.
pub fn classify_line(line: &str) -> Vec<Segment> {
    let mut state = ClassifierState::default();
    let mut segments = Vec::new();
    let mut cursor = 0;

    for sgr in sgr_pattern().find_iter(line) {
        let text = &line[cursor..sgr.start()];
        segments.push(Segment::new(text, state.tag_for(text)));
        state.apply_sgr(sgr.as_str());
        cursor = sgr.end();
    }

    let tail = &line[cursor..];
    segments.push(Segment::new(tail, state.tag_for(tail)));
    segments.push(Segment::line_break());
    segments
}
