use crate::core::session::SessionController;
use crate::domain::config::WATCH_INTERVAL;
use crate::domain::error::PortLogResult;
use crate::infrastructure::serial::{DeviceOpener, PortEnumerator, SystemPorts};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Outcome of comparing two port snapshots
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// A port appeared; carries the last enumerated identifier
    Attached(String),
    /// A port disappeared or the held device reports closed
    Detached,
    Unchanged,
}

impl Transition {
    /// Decide the session transition for one watcher tick.
    ///
    /// `handle_closed` is `None` when no device is held, so the closed check
    /// only applies to an existing handle. When several ports appear at once
    /// the last enumerated one wins, which depends on OS enumeration order.
    pub fn decide(previous_count: usize, current: &[String], handle_closed: Option<bool>) -> Self {
        if current.len() > previous_count {
            match current.last() {
                Some(name) => Transition::Attached(name.clone()),
                None => Transition::Unchanged,
            }
        } else if current.len() < previous_count || handle_closed == Some(true) {
            Transition::Detached
        } else {
            Transition::Unchanged
        }
    }
}

/// Polls for serial ports and drives the session on attach and detach
pub struct PortWatcher {
    controller: SessionController,
    enumerator: Arc<dyn PortEnumerator>,
    opener: Arc<dyn DeviceOpener>,
    previous: Vec<String>,
    interval: Duration,
}

impl PortWatcher {
    pub fn new(
        controller: SessionController,
        enumerator: Arc<dyn PortEnumerator>,
        opener: Arc<dyn DeviceOpener>,
    ) -> Self {
        Self {
            controller,
            enumerator,
            opener,
            previous: Vec::new(),
            interval: WATCH_INTERVAL,
        }
    }

    /// Watcher over the operating system's serial ports
    pub fn system(controller: SessionController) -> Self {
        let ports = Arc::new(SystemPorts::new());
        Self::new(controller, ports.clone(), ports)
    }

    /// Ports seen on the last successful tick
    pub fn snapshot(&self) -> &[String] {
        &self.previous
    }

    /// Run one poll. Enumeration errors leave the snapshot untouched.
    pub async fn tick(&mut self) -> PortLogResult<Transition> {
        let current = self.enumerator.available_ports()?;
        let handle_closed = self.controller.device_closed().await;

        let transition = Transition::decide(self.previous.len(), &current, handle_closed);
        debug!("Ports {:?} -> {:?}: {:?}", self.previous, current, transition);
        self.previous = current;

        match &transition {
            Transition::Attached(name) => {
                info!("Serial port {} attached", name);
                let device = match self.opener.open(name) {
                    Ok(device) => device,
                    Err(e) => {
                        warn!("Failed to open {}: {}", name, e);
                        return Ok(Transition::Unchanged);
                    }
                };

                self.controller.connect(device).await;
                if let Err(e) = self.controller.start().await {
                    warn!("Failed to start logging on {}: {}", name, e);
                }
            }
            Transition::Detached if handle_closed.is_none() => {
                debug!("Port count dropped with no device held");
            }
            Transition::Detached => {
                info!("Serial port detached");
                self.controller.disconnect().await;
            }
            Transition::Unchanged => {}
        }

        Ok(transition)
    }

    /// Poll forever on the configured cadence
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Watching for serial ports every {:?}", self.interval);

        loop {
            ticker.tick().await;
            if let Err(e) = self.tick().await {
                warn!("Error checking ports: {}", e);
            }
        }
    }
}
