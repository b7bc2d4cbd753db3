//! PortLog Library
//!
//! Watches for attached serial devices, classifies every line they emit
//! with a semantic color tag, and records a plain copy to a log file.

pub mod cli;
pub mod core;
pub mod domain;
pub mod infrastructure;

pub use domain::error::{PortLogError, PortLogResult};
pub use domain::config::PortLogConfig;
pub use core::line::{classify_line, process_line, LogEntry, Segment, Tag};
pub use core::session::{SessionController, SessionEvent, SessionState};
pub use core::watcher::{PortWatcher, Transition};
