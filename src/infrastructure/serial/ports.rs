use crate::domain::error::{PortLogError, PortLogResult};
use crate::infrastructure::serial::device::{DeviceHandle, SerialDevice};
use serde::Serialize;

/// Lists the device identifiers currently present
pub trait PortEnumerator: Send + Sync {
    fn available_ports(&self) -> PortLogResult<Vec<String>>;
}

/// Opens a [`DeviceHandle`] for an identifier
pub trait DeviceOpener: Send + Sync {
    fn open(&self, name: &str) -> PortLogResult<Box<dyn DeviceHandle>>;
}

/// Details about one enumerated port, for listing
#[derive(Debug, Clone, Serialize)]
pub struct PortSummary {
    pub name: String,
    pub kind: String,
    pub description: String,
}

/// Operating-system serial ports
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPorts;

impl SystemPorts {
    pub fn new() -> Self {
        Self
    }

    /// Enumerate ports with their type information
    pub fn describe(&self) -> PortLogResult<Vec<PortSummary>> {
        let ports = serialport::available_ports().map_err(|e| PortLogError::Enumeration {
            message: e.to_string(),
        })?;

        Ok(ports
            .into_iter()
            .map(|port| {
                let (kind, description) = match port.port_type {
                    serialport::SerialPortType::UsbPort(usb) => (
                        "usb".to_string(),
                        usb.product
                            .or(usb.manufacturer)
                            .unwrap_or_else(|| format!("{:04x}:{:04x}", usb.vid, usb.pid)),
                    ),
                    serialport::SerialPortType::PciPort => ("pci".to_string(), String::new()),
                    serialport::SerialPortType::BluetoothPort => ("bluetooth".to_string(), String::new()),
                    serialport::SerialPortType::Unknown => ("unknown".to_string(), String::new()),
                };
                PortSummary {
                    name: port.port_name,
                    kind,
                    description,
                }
            })
            .collect())
    }
}

impl PortEnumerator for SystemPorts {
    fn available_ports(&self) -> PortLogResult<Vec<String>> {
        serialport::available_ports()
            .map(|ports| ports.into_iter().map(|p| p.port_name).collect())
            .map_err(|e| PortLogError::Enumeration {
                message: e.to_string(),
            })
    }
}

impl DeviceOpener for SystemPorts {
    fn open(&self, name: &str) -> PortLogResult<Box<dyn DeviceHandle>> {
        Ok(Box::new(SerialDevice::open(name)?))
    }
}
