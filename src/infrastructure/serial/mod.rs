// Serial module - Device handles and port enumeration
pub mod device;
pub mod ports;

pub use device::{DeviceHandle, SerialDevice};
pub use ports::{DeviceOpener, PortEnumerator, PortSummary, SystemPorts};
