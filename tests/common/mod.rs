//! In-memory collaborators for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;
use tokio::sync::mpsc;

use gpu_watchdog::backends::{
    BackendError, BackendResult, InitSystem, Journal, JournalEntry, LogStream, LogTailer,
    Restarter,
};
use gpu_watchdog::config::WatchdogConfig;
use gpu_watchdog::Collaborators;

/// Log tailer that replays scripted sessions, then idles forever.
#[derive(Default)]
pub struct ScriptedTailer {
    sessions: Mutex<HashMap<String, VecDeque<Vec<String>>>>,
    opens: Mutex<Vec<String>>,
}

impl ScriptedTailer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue one connect's worth of lines for `service`.
    pub fn script(&self, service: &str, lines: &[&str]) {
        self.sessions
            .lock()
            .unwrap()
            .entry(service.to_string())
            .or_default()
            .push_back(lines.iter().map(|l| l.to_string()).collect());
    }

    pub fn opens(&self, service: &str) -> usize {
        self.opens
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.as_str() == service)
            .count()
    }
}

#[async_trait]
impl LogTailer for ScriptedTailer {
    async fn tail(&self, service: &str) -> BackendResult<LogStream> {
        self.opens.lock().unwrap().push(service.to_string());
        let session = self
            .sessions
            .lock()
            .unwrap()
            .get_mut(service)
            .and_then(VecDeque::pop_front);

        match session {
            Some(lines) => Ok(Box::pin(stream::iter(lines.into_iter().map(Ok)))),
            None => Ok(Box::pin(stream::pending())),
        }
    }
}

/// Restarter that records calls and the peak number of overlapping calls.
#[derive(Default)]
pub struct RecordingRestarter {
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
    failing: HashSet<String>,
}

impl RecordingRestarter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::default()
        })
    }

    pub fn failing(services: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            failing: services.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Restarter for RecordingRestarter {
    async fn restart(&self, service: &str) -> BackendResult<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        } else {
            tokio::task::yield_now().await;
        }

        self.calls.lock().unwrap().push(service.to_string());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(service) {
            return Err(BackendError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "container engine unavailable",
            )));
        }
        Ok(())
    }
}

/// Journal fed from a channel. Ends when the sender is dropped.
pub struct ChannelJournal {
    rx: mpsc::UnboundedReceiver<JournalEntry>,
}

pub fn channel_journal() -> (mpsc::UnboundedSender<JournalEntry>, Box<dyn Journal>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let journal: Box<dyn Journal> = Box::new(ChannelJournal { rx });
    (tx, journal)
}

#[async_trait]
impl Journal for ChannelJournal {
    async fn next_entry(&mut self) -> BackendResult<Option<JournalEntry>> {
        Ok(self.rx.recv().await)
    }
}

/// Init system reporting a fixed, adjustable unit state.
pub struct FixedInit {
    state: Mutex<String>,
    queries: Mutex<Vec<String>>,
}

impl FixedInit {
    pub fn new(state: &str) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state.to_string()),
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn set_state(&self, state: &str) {
        *self.state.lock().unwrap() = state.to_string();
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl InitSystem for FixedInit {
    async fn active_state(&self, unit: &str) -> BackendResult<String> {
        self.queries.lock().unwrap().push(unit.to_string());
        Ok(self.state.lock().unwrap().clone())
    }

    async fn restart_unit(&self, _unit: &str) -> BackendResult<()> {
        Ok(())
    }
}

/// `sd` primary with an `upscaler` auxiliary; kernel watching off.
pub fn sd_config() -> WatchdogConfig {
    let mut config = WatchdogConfig::default();
    config.compose.project_dir = "/srv/sd".into();
    config.compose.services = vec!["sd".into(), "upscaler".into()];
    config.kernel.enabled = false;
    config
}

pub fn collaborators(
    tailer: Arc<ScriptedTailer>,
    restarter: Arc<RecordingRestarter>,
) -> Collaborators {
    Collaborators {
        tailer,
        restarter,
        journal: None,
        init: None,
    }
}

/// Poll `check` until it holds or the timeout passes.
pub async fn eventually<F: FnMut() -> bool>(mut check: F) -> bool {
    for _ in 0..500 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
