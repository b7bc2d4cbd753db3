use thiserror::Error;

/// PortLog unified error type
#[derive(Error, Debug)]
pub enum PortLogError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("No serial port available or it is not open")]
    DeviceNotConnected,

    #[error("Device error: {message}")]
    Device { message: String },

    #[error("Port enumeration failed: {message}")]
    Enumeration { message: String },

    #[error("No log file is open")]
    LogNotOpen,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Output error: {0}")]
    Output(String),
}

pub type PortLogResult<T> = Result<T, PortLogError>;
