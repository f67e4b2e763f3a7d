//! Log capture for the debug view.
//!
//! `init_tracing` routes every `tracing` event through a compact fmt layer
//! into a bounded in-memory buffer, so a host can show the recent activity of
//! the grid components without a terminal attached.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use chrono::{DateTime, Local};
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;

/// Records kept before the oldest are dropped
pub const LOG_CAPACITY: usize = 1000;

const UNTAGGED: &str = "general";

#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub at: DateTime<Local>,
    pub level: Level,
    /// The `target:` the event was logged with
    pub component: String,
    pub message: String,
}

impl LogRecord {
    pub fn new(level: Level, component: &str, message: impl Into<String>) -> Self {
        Self {
            at: Local::now(),
            level,
            component: component.to_string(),
            message: message.into(),
        }
    }

    pub fn display_line(&self) -> String {
        format!(
            "{} {:>5} {:<16} {}",
            self.at.format("%H:%M:%S%.3f"),
            self.level,
            self.component,
            self.message
        )
    }
}

/// Bounded, shareable record store
#[derive(Clone)]
pub struct LogCapture {
    records: Arc<Mutex<VecDeque<LogRecord>>>,
    capacity: usize,
}

impl Default for LogCapture {
    fn default() -> Self {
        Self::with_capacity(LOG_CAPACITY)
    }
}

impl LogCapture {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    fn records(&self) -> MutexGuard<'_, VecDeque<LogRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, record: LogRecord) {
        let mut records = self.records();
        while records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// The last `count` records, oldest first
    pub fn recent(&self, count: usize) -> Vec<LogRecord> {
        let records = self.records();
        let start = records.len().saturating_sub(count);
        records.range(start..).cloned().collect()
    }

    /// Records of one component at `min_level` or more severe
    pub fn for_component(&self, component: &str, min_level: Level) -> Vec<LogRecord> {
        self.records()
            .iter()
            .filter(|r| r.component == component && r.level <= min_level)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }
}

/// Split a compact fmt line ("LEVEL target: message") into a record
fn parse_compact(line: &str) -> LogRecord {
    let (level, rest) = match line.split_once(' ') {
        Some((head, rest)) => match head.parse::<Level>() {
            Ok(level) => (level, rest.trim_start()),
            Err(_) => return LogRecord::new(Level::INFO, UNTAGGED, line),
        },
        None => return LogRecord::new(Level::INFO, UNTAGGED, line),
    };
    match rest.split_once(':') {
        Some((component, message)) if !component.contains(' ') => {
            LogRecord::new(level, component, message.trim())
        }
        _ => LogRecord::new(level, UNTAGGED, rest),
    }
}

/// fmt-layer sink feeding a [`LogCapture`]
#[derive(Clone)]
struct CaptureWriter(LogCapture);

impl std::io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            self.0.record(parse_compact(line));
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CaptureWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

static CAPTURE: OnceLock<LogCapture> = OnceLock::new();

/// The process-wide capture, once [`init_tracing`] ran
pub fn log_capture() -> Option<LogCapture> {
    CAPTURE.get().cloned()
}

/// Install the global subscriber; `RUST_LOG` overrides the default `info` filter.
/// Repeated calls return the capture installed by the first one.
pub fn init_tracing() -> LogCapture {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    if let Some(capture) = log_capture() {
        return capture;
    }
    let capture = CAPTURE.get_or_init(LogCapture::default).clone();

    let layer = fmt::layer()
        .with_writer(CaptureWriter(capture.clone()))
        .with_ansi(false)
        .without_time()
        .compact();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .is_ok()
    {
        tracing::info!(target: "grid_editor", "Log capture ready ({} records)", LOG_CAPACITY);
    }
    capture
}
