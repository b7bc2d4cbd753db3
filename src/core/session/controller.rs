use crate::core::line::{process_line, LogEntry};
use crate::core::session::{
    session::Session,
    state::{SessionEvent, SessionState},
};
use crate::domain::config::READ_POLL_INTERVAL;
use crate::domain::error::{PortLogError, PortLogResult};
use crate::infrastructure::serial::DeviceHandle;
use crate::infrastructure::sink::LogSink;
use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Wall-clock source for timestamps and log file names
pub type Clock = Arc<dyn Fn() -> DateTime<Local> + Send + Sync>;

/// Owner of the single device session.
///
/// Cloning is cheap; every clone drives the same session. All access to the
/// session goes through one mutex, shared with the read loop.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

struct Inner {
    session: Mutex<Session>,
    readers: Mutex<Vec<JoinHandle<()>>>,
    events: mpsc::UnboundedSender<SessionEvent>,
    log_dir: PathBuf,
    clock: Clock,
}

impl SessionController {
    /// Create a controller writing log files into `log_dir`.
    ///
    /// The receiver yields renderer events in the order they were produced.
    pub fn new(log_dir: impl Into<PathBuf>) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        Self::with_clock(log_dir, Arc::new(Local::now))
    }

    pub fn with_clock(
        log_dir: impl Into<PathBuf>,
        clock: Clock,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();

        let controller = Self {
            inner: Arc::new(Inner {
                session: Mutex::new(Session::new()),
                readers: Mutex::new(Vec::new()),
                events,
                log_dir: log_dir.into(),
                clock,
            }),
        };

        (controller, receiver)
    }

    /// Take ownership of an opened device, releasing any previous one
    pub async fn connect(&self, device: Box<dyn DeviceHandle>) {
        let mut session = self.inner.session.lock().await;

        if session.state().has_device() {
            warn!(
                "Replacing {} with {}",
                session.device_name().unwrap_or("device"),
                device.name()
            );
            self.inner.disconnect_locked(&mut session);
        }

        let name = device.name().to_string();
        session.attach(device);
        self.inner.emit(SessionEvent::StateChanged {
            state: SessionState::Connected,
            device: Some(name),
        });
    }

    /// Open a log file if needed and start the read loop.
    ///
    /// Fails with [`PortLogError::DeviceNotConnected`] when no open device
    /// is held. Calling this while already logging does nothing.
    pub async fn start(&self) -> PortLogResult<()> {
        let mut session = self.inner.session.lock().await;

        if !session.device_open() {
            warn!("Cannot start logging: no serial port available or it is not open");
            return Err(PortLogError::DeviceNotConnected);
        }

        if session.state() == SessionState::Logging {
            return Ok(());
        }

        let sink = LogSink::open(&self.inner.log_dir, &(self.inner.clock)())?;
        let running = session.begin_logging(sink);
        info!(
            "Session '{}' logging to {}",
            session.id(),
            session.log_path().map(|p| p.display().to_string()).unwrap_or_default()
        );
        self.inner.emit(SessionEvent::status("Logging started..."));

        let inner = Arc::clone(&self.inner);
        let handle = tokio::task::spawn_blocking(move || read_loop(inner, running));
        drop(session);

        let mut readers = self.inner.readers.lock().await;
        readers.retain(|reader| !reader.is_finished());
        readers.push(handle);

        Ok(())
    }

    /// Stop logging: cancel the read loop, close the device and the log file
    pub async fn stop(&self) {
        let mut session = self.inner.session.lock().await;
        self.inner.stop_locked(&mut session);
    }

    /// Stop logging and release the device
    pub async fn disconnect(&self) {
        let mut session = self.inner.session.lock().await;
        self.inner.disconnect_locked(&mut session);
    }

    /// Process one raw line as if the device had produced it
    pub async fn feed_line(&self, bytes: &[u8]) -> LogEntry {
        let mut session = self.inner.session.lock().await;
        self.inner.record_locked(&mut session, bytes)
    }

    /// Record a user comment in the rendered stream and the log file
    pub async fn comment(&self, text: &str) -> PortLogResult<()> {
        if text.trim().is_empty() || text.contains('\n') {
            return Err(PortLogError::InvalidInput(
                "comment must be a single non-empty line".to_string(),
            ));
        }

        let mut session = self.inner.session.lock().await;

        if let Some(sink) = session.sink_mut() {
            sink.write(&format!("# {}", text))?;
        }
        self.inner.emit(SessionEvent::Comment {
            text: text.to_string(),
        });
        Ok(())
    }

    /// Force the open log file to disk
    pub async fn flush(&self) -> PortLogResult<()> {
        let mut session = self.inner.session.lock().await;
        session.sink_mut().ok_or(PortLogError::LogNotOpen)?.flush()
    }

    /// Write raw bytes to the held device
    pub async fn send(&self, data: &[u8]) -> PortLogResult<()> {
        let mut session = self.inner.session.lock().await;
        match session.device_mut() {
            Some(device) if device.is_open() => device.write(data),
            _ => Err(PortLogError::DeviceNotConnected),
        }
    }

    /// Release everything and wait for read loops to finish
    pub async fn shutdown(&self) {
        self.disconnect().await;

        let readers: Vec<_> = self.inner.readers.lock().await.drain(..).collect();
        for reader in readers {
            if let Err(e) = reader.await {
                warn!("Read loop ended abnormally: {}", e);
            }
        }
        info!("Session controller shut down");
    }

    pub async fn state(&self) -> SessionState {
        self.inner.session.lock().await.state()
    }

    pub async fn device_name(&self) -> Option<String> {
        self.inner.session.lock().await.device_name().map(str::to_string)
    }

    /// `None` when no device is held, otherwise whether it reports closed
    pub async fn device_closed(&self) -> Option<bool> {
        self.inner.session.lock().await.device_closed()
    }

    pub async fn log_path(&self) -> Option<PathBuf> {
        self.inner.session.lock().await.log_path().map(|p| p.to_path_buf())
    }
}

impl Inner {
    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("Renderer gone, dropping session event");
        }
    }

    fn stop_locked(&self, session: &mut Session) -> bool {
        if !session.end_logging() {
            return false;
        }
        info!("Session '{}' stopped logging", session.id());
        self.emit(SessionEvent::status("Logging stopped."));
        true
    }

    fn disconnect_locked(&self, session: &mut Session) {
        self.stop_locked(session);
        if let Some(device) = session.detach() {
            self.emit(SessionEvent::StateChanged {
                state: SessionState::Disconnected,
                device: Some(device),
            });
        }
    }

    fn record_locked(&self, session: &mut Session, bytes: &[u8]) -> LogEntry {
        let entry = process_line(bytes, &(self.clock)());

        if let Some(sink) = session.sink_mut() {
            if let Err(e) = sink.write(&entry.plain_line) {
                warn!("Failed to write log file {}: {}", sink.path().display(), e);
                self.emit(SessionEvent::warning(format!("Log write failed: {}", e)));
            }
        }

        self.emit(SessionEvent::Entry(entry.clone()));
        entry
    }
}

/// Poll the device once; `None` when nothing is waiting
fn poll_line(device: &mut dyn DeviceHandle) -> PortLogResult<Option<Vec<u8>>> {
    if device.bytes_available()? == 0 {
        return Ok(None);
    }
    device.read_line().map(Some)
}

fn read_loop(inner: Arc<Inner>, running: Arc<AtomicBool>) {
    debug!("Read loop started");

    while running.load(Ordering::SeqCst) {
        let mut session = inner.session.blocking_lock();
        if !running.load(Ordering::SeqCst) {
            break;
        }

        let polled = match session.device_mut() {
            Some(device) if device.is_open() => poll_line(device),
            _ => {
                debug!("Device closed, read loop exiting");
                break;
            }
        };

        match polled {
            Ok(Some(bytes)) if !bytes.is_empty() => {
                inner.record_locked(&mut session, &bytes);
            }
            Ok(Some(_)) => {}
            Ok(None) => {
                drop(session);
                std::thread::sleep(READ_POLL_INTERVAL);
            }
            Err(e) => {
                error!("Error reading from serial: {}", e);
                inner.stop_locked(&mut session);
                break;
            }
        }
    }

    debug!("Read loop finished");
}
