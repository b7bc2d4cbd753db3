use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Command line arguments for PortLog
#[derive(Parser, Debug)]
#[command(
    name = "portlog",
    version = env!("CARGO_PKG_VERSION"),
    about = "Serial device logger with semantic line coloring",
    long_about = "Watches for attached serial devices, renders each line they emit with a color tag, and records a plain copy to serial_log_<timestamp>.log."
)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress diagnostic logging
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    pub output: OutputFormat,

    /// Command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Watch for serial ports and log whatever attaches
    Watch,
    /// Log a specific serial port
    Connect {
        /// Serial port path
        #[arg(short, long)]
        port: String,
    },
    /// List available serial ports
    Ports,
    /// Render an existing log file with line coloring
    View {
        /// Log file to render
        file: PathBuf,
    },
    /// Configuration management commands
    Config(ConfigArgs),
    /// Display version information
    Version,
}

/// Output format options
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable colored text
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Configuration management arguments
#[derive(ClapArgs, Debug)]
pub struct ConfigArgs {
    /// Configuration subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,
    /// Write a default configuration file
    Init {
        /// Write the global file instead of ./.portlog/config.toml
        #[arg(long)]
        global: bool,
    },
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}
