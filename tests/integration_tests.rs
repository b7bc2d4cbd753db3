use chrono::{DateTime, Local, TimeZone};
use portlog::core::session::Clock;
use portlog::infrastructure::serial::{DeviceHandle, DeviceOpener, PortEnumerator};
use portlog::{
    PortLogError, PortLogResult, PortWatcher, SessionController, SessionEvent, SessionState, Tag,
    Transition,
};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;
use tokio_test::{assert_err, assert_ok};

#[derive(Default)]
struct DeviceState {
    lines: VecDeque<Vec<u8>>,
    open: bool,
}

struct MockDevice {
    name: String,
    state: Arc<Mutex<DeviceState>>,
}

impl MockDevice {
    fn new(name: &str, lines: &[&str]) -> (Self, Arc<Mutex<DeviceState>>) {
        let state = Arc::new(Mutex::new(DeviceState {
            lines: lines.iter().map(|l| l.as_bytes().to_vec()).collect(),
            open: true,
        }));
        let device = Self {
            name: name.to_string(),
            state: Arc::clone(&state),
        };
        (device, state)
    }
}

impl DeviceHandle for MockDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_open(&self) -> bool {
        self.state.lock().unwrap().open
    }

    fn bytes_available(&mut self) -> PortLogResult<usize> {
        Ok(self.state.lock().unwrap().lines.front().map_or(0, Vec::len))
    }

    fn read_line(&mut self) -> PortLogResult<Vec<u8>> {
        Ok(self.state.lock().unwrap().lines.pop_front().unwrap_or_default())
    }

    fn write(&mut self, _data: &[u8]) -> PortLogResult<()> {
        Ok(())
    }

    fn close(&mut self) {
        self.state.lock().unwrap().open = false;
    }
}

/// Port list the test mutates between ticks; opened devices stay reachable
#[derive(Default)]
struct MockPorts {
    ports: Mutex<Vec<String>>,
    opened: Mutex<Vec<Arc<Mutex<DeviceState>>>>,
    refuse_open: bool,
}

impl MockPorts {
    fn set(&self, names: &[&str]) {
        *self.ports.lock().unwrap() = names.iter().map(|n| n.to_string()).collect();
    }

    fn last_opened(&self) -> Arc<Mutex<DeviceState>> {
        Arc::clone(self.opened.lock().unwrap().last().unwrap())
    }
}

impl PortEnumerator for MockPorts {
    fn available_ports(&self) -> PortLogResult<Vec<String>> {
        Ok(self.ports.lock().unwrap().clone())
    }
}

impl DeviceOpener for MockPorts {
    fn open(&self, name: &str) -> PortLogResult<Box<dyn DeviceHandle>> {
        if self.refuse_open {
            return Err(PortLogError::Device {
                message: format!("{} is busy", name),
            });
        }
        let (device, state) = MockDevice::new(name, &[]);
        self.opened.lock().unwrap().push(state);
        Ok(Box::new(device))
    }
}

fn base_time() -> DateTime<Local> {
    Local.with_ymd_and_hms(2024, 7, 10, 14, 30, 0).unwrap()
}

/// Clock that advances one second per reading
fn stepping_clock() -> Clock {
    let ticks = Arc::new(AtomicI64::new(0));
    Arc::new(move || base_time() + chrono::Duration::seconds(ticks.fetch_add(1, Ordering::SeqCst)))
}

fn log_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("serial_log_"))
        .collect();
    names.sort();
    names
}

fn drain(events: &mut UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

fn count_state(events: &[SessionEvent], wanted: SessionState) -> usize {
    events
        .iter()
        .filter(|event| matches!(event, SessionEvent::StateChanged { state, .. } if *state == wanted))
        .count()
}

#[tokio::test]
async fn test_sgr_state_persists_only_within_line() {
    let dir = TempDir::new().unwrap();
    let (controller, _events) = SessionController::new(dir.path());

    let colored = controller.feed_line(b"\x1b[31mfix\x1b[0m\n").await;
    let tags: Vec<Tag> = colored.segments.iter().map(|s| s.tag).collect();
    assert!(tags.contains(&Tag::Gps));

    let plain = controller.feed_line(b"plain line\n").await;
    assert!(plain.segments.iter().all(|s| s.tag == Tag::None));
}

#[tokio::test]
async fn test_keyword_tags_plain_line() {
    let dir = TempDir::new().unwrap();
    let (controller, _events) = SessionController::new(dir.path());

    let entry = controller.feed_line(b"GPS: fix acquired\n").await;
    let tagged: Vec<_> = entry.segments.iter().filter(|s| s.tag == Tag::Gps).collect();
    assert_eq!(tagged.len(), 1);
    assert!(tagged[0].text.contains("GPS: fix acquired"));
}

#[tokio::test]
async fn test_keyword_overrides_segment_then_reverts() {
    let dir = TempDir::new().unwrap();
    let (controller, _events) = SessionController::new(dir.path());

    let entry = controller
        .feed_line(b"\x1b[32mlink up \x1b[0m\x1b[32mGPS lock\x1b[0m\x1b[32m done\n")
        .await;
    let tags: Vec<(String, Tag)> = entry
        .segments
        .iter()
        .filter(|s| !s.text.is_empty() && !s.is_line_break())
        .map(|s| (s.text.clone(), s.tag))
        .collect();

    assert!(tags.contains(&("link up ".to_string(), Tag::Net)));
    assert!(tags.contains(&("GPS lock".to_string(), Tag::Gps)));
    assert!(tags.contains(&(" done".to_string(), Tag::Net)));
}

#[tokio::test]
async fn test_undecodable_line_uses_sentinel() {
    let dir = TempDir::new().unwrap();
    let (controller, _events) = SessionController::new(dir.path());

    let entry = controller.feed_line(&[0x47, 0xff, 0x50, b'\n']).await;
    assert!(entry.plain_line.ends_with(" : <Decoding Error>"));
}

#[tokio::test]
async fn test_start_twice_opens_one_file() {
    let dir = TempDir::new().unwrap();
    let (controller, _events) = SessionController::with_clock(dir.path(), stepping_clock());

    let (device, _state) = MockDevice::new("/dev/ttyUSB0", &[]);
    controller.connect(Box::new(device)).await;
    assert_ok!(controller.start().await);
    let first = controller.log_path().await;
    assert_ok!(controller.start().await);

    assert_eq!(controller.log_path().await, first);
    assert_eq!(log_files(dir.path()).len(), 1);
    controller.shutdown().await;
}

#[tokio::test]
async fn test_stop_then_start_opens_distinct_file() {
    let dir = TempDir::new().unwrap();
    let (controller, _events) = SessionController::with_clock(dir.path(), stepping_clock());

    let (device, _state) = MockDevice::new("/dev/ttyUSB0", &[]);
    controller.connect(Box::new(device)).await;
    assert_ok!(controller.start().await);
    controller.stop().await;

    // stop releases the device; logging again needs a fresh handle
    assert_err!(controller.start().await);
    let (device, _state) = MockDevice::new("/dev/ttyUSB0", &[]);
    controller.connect(Box::new(device)).await;
    assert_ok!(controller.start().await);
    controller.shutdown().await;

    let files = log_files(dir.path());
    assert_eq!(files.len(), 2);
    assert_ne!(files[0], files[1]);
}

#[tokio::test]
async fn test_device_lines_reach_file_and_renderer() {
    let dir = TempDir::new().unwrap();
    let at = base_time();
    let (controller, mut events) = SessionController::with_clock(dir.path(), Arc::new(move || at));

    let (device, _state) = MockDevice::new(
        "/dev/ttyUSB0",
        &["\x1b[31mGPS: fix acquired\x1b[0m\r\n", "CAN frame 0x1a\n", "idle\n"],
    );
    controller.connect(Box::new(device)).await;
    assert_ok!(controller.start().await);

    let mut rendered = Vec::new();
    while rendered.len() < 3 {
        let event = timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for entries")
            .expect("event channel closed");
        if let SessionEvent::Entry(entry) = event {
            rendered.push(entry.plain_line);
        }
    }
    controller.shutdown().await;

    let expected = vec![
        "2024-07-10 14:30:00 : GPS: fix acquired".to_string(),
        "2024-07-10 14:30:00 : CAN frame 0x1a".to_string(),
        "2024-07-10 14:30:00 : idle".to_string(),
    ];
    assert_eq!(rendered, expected);

    let content = std::fs::read_to_string(dir.path().join("serial_log_20240710_143000.log")).unwrap();
    assert_eq!(content.lines().collect::<Vec<_>>(), expected);
    assert!(!content.contains('\x1b'));
}

#[tokio::test]
async fn test_status_lines_bracket_logging() {
    let dir = TempDir::new().unwrap();
    let (controller, mut events) = SessionController::new(dir.path());

    let (device, _state) = MockDevice::new("/dev/ttyACM0", &[]);
    controller.connect(Box::new(device)).await;
    assert_ok!(controller.start().await);
    controller.stop().await;
    controller.stop().await;

    let events = drain(&mut events);
    assert_eq!(
        events,
        vec![
            SessionEvent::StateChanged {
                state: SessionState::Connected,
                device: Some("/dev/ttyACM0".to_string()),
            },
            SessionEvent::status("Logging started..."),
            SessionEvent::status("Logging stopped."),
        ]
    );
    assert_eq!(controller.state().await, SessionState::Connected);
    controller.shutdown().await;
}

#[tokio::test]
async fn test_watcher_attach_and_detach() {
    let dir = TempDir::new().unwrap();
    let (controller, mut events) = SessionController::new(dir.path());
    let ports = Arc::new(MockPorts::default());
    let mut watcher = PortWatcher::new(controller.clone(), ports.clone(), ports.clone());

    ports.set(&["/dev/ttyS0"]);
    assert_eq!(assert_ok!(watcher.tick().await), Transition::Attached("/dev/ttyS0".to_string()));
    controller.disconnect().await;
    drain(&mut events);

    ports.set(&["/dev/ttyS0", "/dev/ttyUSB0"]);
    assert_eq!(
        assert_ok!(watcher.tick().await),
        Transition::Attached("/dev/ttyUSB0".to_string())
    );
    assert_eq!(assert_ok!(watcher.tick().await), Transition::Unchanged);
    assert_eq!(controller.state().await, SessionState::Logging);
    assert_eq!(controller.device_name().await.as_deref(), Some("/dev/ttyUSB0"));

    let attached = drain(&mut events);
    assert_eq!(count_state(&attached, SessionState::Connected), 1);
    assert!(attached.contains(&SessionEvent::status("Logging started...")));

    ports.set(&["/dev/ttyS0"]);
    assert_eq!(assert_ok!(watcher.tick().await), Transition::Detached);
    assert_eq!(assert_ok!(watcher.tick().await), Transition::Unchanged);
    assert_eq!(controller.state().await, SessionState::Disconnected);
    assert!(!ports.last_opened().lock().unwrap().open);

    let detached = drain(&mut events);
    assert_eq!(count_state(&detached, SessionState::Disconnected), 1);
    assert!(detached.contains(&SessionEvent::status("Logging stopped.")));

    controller.shutdown().await;
}

#[tokio::test]
async fn test_watcher_detaches_closed_handle() {
    let dir = TempDir::new().unwrap();
    let (controller, mut events) = SessionController::new(dir.path());
    let ports = Arc::new(MockPorts::default());
    let mut watcher = PortWatcher::new(controller.clone(), ports.clone(), ports.clone());

    ports.set(&["/dev/ttyUSB0"]);
    assert_ok!(watcher.tick().await);
    drain(&mut events);

    ports.last_opened().lock().unwrap().open = false;
    assert_eq!(assert_ok!(watcher.tick().await), Transition::Detached);
    assert_eq!(controller.state().await, SessionState::Disconnected);
    assert_eq!(count_state(&drain(&mut events), SessionState::Disconnected), 1);

    // No handle is held any more, so nothing further happens
    assert_eq!(assert_ok!(watcher.tick().await), Transition::Unchanged);
    assert!(drain(&mut events).is_empty());

    controller.shutdown().await;
}

#[tokio::test]
async fn test_watcher_without_handle_does_not_disconnect() {
    let dir = TempDir::new().unwrap();
    let (controller, mut events) = SessionController::new(dir.path());
    let ports = Arc::new(MockPorts {
        refuse_open: true,
        ..MockPorts::default()
    });
    let mut watcher = PortWatcher::new(controller.clone(), ports.clone(), ports.clone());

    assert_eq!(assert_ok!(watcher.tick().await), Transition::Unchanged);

    ports.set(&["/dev/ttyUSB0"]);
    assert_eq!(assert_ok!(watcher.tick().await), Transition::Unchanged);
    assert_eq!(watcher.snapshot().to_vec(), vec!["/dev/ttyUSB0".to_string()]);

    ports.set(&[]);
    assert_eq!(assert_ok!(watcher.tick().await), Transition::Detached);
    assert_eq!(controller.state().await, SessionState::Disconnected);
    assert!(drain(&mut events).is_empty());
}

#[tokio::test]
async fn test_comment_lands_in_log_file() {
    let dir = TempDir::new().unwrap();
    let at = base_time();
    let (controller, mut events) = SessionController::with_clock(dir.path(), Arc::new(move || at));

    let (device, _state) = MockDevice::new("/dev/ttyUSB0", &[]);
    controller.connect(Box::new(device)).await;
    assert_ok!(controller.start().await);
    assert_ok!(controller.comment("power cycled board").await);
    assert_ok!(controller.flush().await);

    let path = controller.log_path().await.unwrap();
    let content = std::fs::read_to_string(path).unwrap();
    assert_eq!(content, "# power cycled board\n");
    assert!(drain(&mut events).contains(&SessionEvent::Comment {
        text: "power cycled board".to_string()
    }));

    controller.shutdown().await;
    assert!(matches!(controller.flush().await, Err(PortLogError::LogNotOpen)));
}
