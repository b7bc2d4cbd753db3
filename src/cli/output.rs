use crate::cli::args::OutputFormat;
use crate::core::line::{LogEntry, Tag};
use crate::core::session::{SessionEvent, SessionState};
use crate::domain::config::PortLogConfig;
use crate::infrastructure::serial::PortSummary;
use crossterm::queue;
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use crossterm::terminal::SetTitle;
use std::io::{self, Write};
use tabled::{Table, Tabled};

/// Output writer trait for different formats
pub trait OutputWriter {
    fn write_event(&mut self, event: &SessionEvent) -> Result<(), OutputError>;
    fn write_ports(&mut self, ports: &[PortSummary]) -> Result<(), OutputError>;
    fn write_config(&mut self, config: &PortLogConfig) -> Result<(), OutputError>;
    fn write_message(&mut self, message: &str) -> Result<(), OutputError>;
    fn write_error(&mut self, error: &str) -> Result<(), OutputError>;
}

/// Output formatting errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("TOML serialization error: {0}")]
    TomlError(#[from] toml::ser::Error),
}

impl From<OutputError> for crate::domain::error::PortLogError {
    fn from(err: OutputError) -> Self {
        Self::Output(err.to_string())
    }
}

/// Terminal color of a tag; `None` keeps the terminal default
pub fn tag_color(tag: Tag) -> Option<Color> {
    match tag {
        Tag::Info => Some(Color::White),
        Tag::Gps => Some(Color::Red),
        Tag::Cvp => Some(Color::Blue),
        Tag::Can => Some(Color::Magenta),
        Tag::Net => Some(Color::Green),
        Tag::Pla => Some(Color::Yellow),
        Tag::Debug | Tag::None => None,
    }
}

/// Window title reflecting the connection state
pub fn title_for(state: SessionState, device: Option<&str>) -> String {
    match (state, device) {
        (SessionState::Disconnected, _) => "PortLog (Disconnected)".to_string(),
        (_, Some(device)) => format!("PortLog (Connected: {})", device),
        (_, None) => "PortLog (Connected)".to_string(),
    }
}

#[derive(Tabled)]
struct PortTableRow {
    #[tabled(rename = "Port")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Description")]
    description: String,
}

impl From<&PortSummary> for PortTableRow {
    fn from(port: &PortSummary) -> Self {
        Self {
            name: port.name.clone(),
            kind: port.kind.clone(),
            description: port.description.clone(),
        }
    }
}

/// Console output writer; the renderer for session events
pub struct ConsoleWriter<W: Write = io::Stdout> {
    out: W,
    format: OutputFormat,
    color: bool,
}

impl ConsoleWriter<io::Stdout> {
    pub fn new(format: OutputFormat, color: bool) -> Self {
        Self::with_writer(io::stdout(), format, color)
    }
}

impl<W: Write> ConsoleWriter<W> {
    pub fn with_writer(out: W, format: OutputFormat, color: bool) -> Self {
        Self { out, format, color }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_entry_text(&mut self, entry: &LogEntry) -> Result<(), OutputError> {
        for segment in &entry.segments {
            if segment.is_line_break() {
                writeln!(self.out)?;
                continue;
            }
            match tag_color(segment.tag).filter(|_| self.color) {
                Some(color) => queue!(
                    self.out,
                    SetForegroundColor(color),
                    Print(&segment.text),
                    ResetColor
                )?,
                None => write!(self.out, "{}", segment.text)?,
            }
        }
        Ok(())
    }

    fn write_json<T: serde::Serialize>(&mut self, value: &T) -> Result<(), OutputError> {
        serde_json::to_writer(&mut self.out, value)?;
        writeln!(self.out)?;
        Ok(())
    }
}

impl<W: Write> OutputWriter for ConsoleWriter<W> {
    fn write_event(&mut self, event: &SessionEvent) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => self.write_json(event)?,
            OutputFormat::Text => match event {
                SessionEvent::Entry(entry) => self.write_entry_text(entry)?,
                SessionEvent::Status { message } => writeln!(self.out, "{}", message)?,
                SessionEvent::StateChanged { state, device } => {
                    let title = title_for(*state, device.as_deref());
                    if self.color {
                        queue!(self.out, SetTitle(&title))?;
                    }
                    writeln!(self.out, "{}", title)?;
                }
                SessionEvent::Comment { text } => writeln!(self.out, "# {}", text)?,
                SessionEvent::Warning { message } => {
                    if self.color {
                        queue!(
                            self.out,
                            SetForegroundColor(Color::Yellow),
                            Print(format!("warning: {}", message)),
                            ResetColor
                        )?;
                        writeln!(self.out)?;
                    } else {
                        writeln!(self.out, "warning: {}", message)?;
                    }
                }
            },
        }
        self.out.flush()?;
        Ok(())
    }

    fn write_ports(&mut self, ports: &[PortSummary]) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => self.write_json(&ports)?,
            OutputFormat::Text => {
                if ports.is_empty() {
                    writeln!(self.out, "No serial ports found")?;
                } else {
                    let rows: Vec<PortTableRow> = ports.iter().map(PortTableRow::from).collect();
                    writeln!(self.out, "{}", Table::new(rows))?;
                }
            }
        }
        Ok(())
    }

    fn write_config(&mut self, config: &PortLogConfig) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => self.write_json(config)?,
            OutputFormat::Text => write!(self.out, "{}", toml::to_string_pretty(config)?)?,
        }
        Ok(())
    }

    fn write_message(&mut self, message: &str) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => self.write_json(&serde_json::json!({ "message": message }))?,
            OutputFormat::Text => writeln!(self.out, "{}", message)?,
        }
        Ok(())
    }

    fn write_error(&mut self, error: &str) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => self.write_json(&serde_json::json!({ "error": error }))?,
            OutputFormat::Text => eprintln!("Error: {}", error),
        }
        Ok(())
    }
}
