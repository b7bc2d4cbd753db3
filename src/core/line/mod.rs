// Line module - Decoding, stripping and classification of device lines
pub mod classifier;
pub mod entry;

pub use classifier::{classify_line, strip_escapes, ClassifierState, Segment, Tag};
pub use entry::{decode_line, process_line, LogEntry, DECODING_ERROR};
