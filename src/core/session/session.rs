use crate::core::session::state::SessionState;
use crate::infrastructure::serial::DeviceHandle;
use crate::infrastructure::sink::LogSink;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Everything one device session owns.
///
/// The sink is present iff the state is `Logging`; the device is present
/// iff the state is `Connected` or `Logging`. Only the methods below change
/// these fields, which keeps both invariants in one place.
pub struct Session {
    id: String,
    state: SessionState,
    device: Option<Box<dyn DeviceHandle>>,
    sink: Option<LogSink>,
    running: Option<Arc<AtomicBool>>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: String::new(),
            state: SessionState::Disconnected,
            device: None,
            sink: None,
            running: None,
        }
    }

    /// Identifier of the current device session, empty when disconnected
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn device_name(&self) -> Option<&str> {
        self.device.as_ref().map(|d| d.name())
    }

    /// `None` when no device is held
    pub fn device_closed(&self) -> Option<bool> {
        self.device.as_ref().map(|d| !d.is_open())
    }

    pub fn device_open(&self) -> bool {
        self.device_closed() == Some(false)
    }

    pub fn device_mut(&mut self) -> Option<&mut (dyn DeviceHandle + 'static)> {
        self.device.as_deref_mut()
    }

    pub fn sink_mut(&mut self) -> Option<&mut LogSink> {
        self.sink.as_mut()
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.sink.as_ref().map(|s| s.path())
    }

    /// Take ownership of `device`. Any previous session must be released first.
    pub(crate) fn attach(&mut self, device: Box<dyn DeviceHandle>) {
        debug_assert!(self.device.is_none() && self.sink.is_none());
        self.id = format!("serial_{}", uuid::Uuid::new_v4().simple());
        info!("Session '{}' attached to {}", self.id, device.name());
        self.device = Some(device);
        self.state = SessionState::Connected;
    }

    /// Enter `Logging` with `sink`; returns the read loop's cancellation flag
    pub(crate) fn begin_logging(&mut self, sink: LogSink) -> Arc<AtomicBool> {
        let running = Arc::new(AtomicBool::new(true));
        self.sink = Some(sink);
        self.running = Some(Arc::clone(&running));
        self.state = SessionState::Logging;
        running
    }

    /// Leave `Logging`: cancel the read loop, close the device and the sink.
    ///
    /// Returns false when the session was not logging.
    pub(crate) fn end_logging(&mut self) -> bool {
        if self.state != SessionState::Logging {
            return false;
        }

        if let Some(running) = self.running.take() {
            running.store(false, Ordering::SeqCst);
        }

        if let Some(device) = self.device.as_mut() {
            if device.is_open() {
                device.close();
            }
        }

        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.close() {
                warn!("Failed to close log file {}: {}", sink.path().display(), e);
            }
        }

        self.state = SessionState::Connected;
        true
    }

    /// Drop the device, ending logging first. Returns the released device name.
    pub(crate) fn detach(&mut self) -> Option<String> {
        self.end_logging();

        let mut device = self.device.take()?;
        if device.is_open() {
            device.close();
        }
        info!("Session '{}' detached from {}", self.id, device.name());

        self.state = SessionState::Disconnected;
        self.id.clear();
        Some(device.name().to_string())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
