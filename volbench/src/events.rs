//! Named, colored, nestable event brackets.
//!
//! Every [`EventLogger::start`] hands out an [`EventGuard`]; the event ends when
//! the guard drops. A bracket therefore closes exactly once no matter how the
//! bracketed scope is left: normal return, `?`, or a panic unwinding through
//! it. Completed events are retained for the run's [`Trace`] and forwarded to
//! any attached [`TraceSink`].

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::thread::ThreadId;
use std::time::Instant;

use crate::BenchResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct EventHandle(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EventColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl EventColor {
    pub const GREEN: EventColor = EventColor { r: 0, g: 255, b: 0 };
    pub const BLUE: EventColor = EventColor { r: 0, g: 0, b: 255 };
    pub const ORANGE: EventColor = EventColor { r: 255, g: 165, b: 0 };
    pub const GRAY: EventColor = EventColor { r: 128, g: 128, b: 128 };
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceEvent {
    pub id: EventHandle,
    pub category: String,
    pub label: String,
    pub thread: String,
    pub start_ns: u64,
    pub end_ns: u64,
    /// Brackets already open when this one started.
    pub depth: usize,
}

impl TraceEvent {
    pub fn duration_ns(&self) -> u64 {
        self.end_ns.saturating_sub(self.start_ns)
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Sinks
// ────────────────────────────────────────────────────────────────────────────────

/// Receives every completed event, in completion order.
pub trait TraceSink: Send {
    fn event(&mut self, event: &TraceEvent);
}

/// Keeps completed events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Vec<TraceEvent>,
}

impl MemorySink {
    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }
}

impl TraceSink for MemorySink {
    fn event(&mut self, event: &TraceEvent) {
        self.events.push(event.clone());
    }
}

/// Emits one `trace`-level log record per completed event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl TraceSink for LogSink {
    fn event(&mut self, event: &TraceEvent) {
        tracing::trace!(
            category = %event.category,
            label = %event.label,
            thread = %event.thread,
            depth = event.depth,
            duration_us = event.duration_ns() / 1_000,
            "event"
        );
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Logger
// ────────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Category {
    pub name: String,
    pub color: EventColor,
}

struct LoggerState {
    categories: Vec<Category>,
    by_name: HashMap<String, EventHandle>,
    threads: HashMap<ThreadId, String>,
    open: usize,
    started: u64,
    ended: u64,
    memory: MemorySink,
}

pub struct EventLogger {
    epoch: Instant,
    state: Mutex<LoggerState>,
    /// Locked after `state` is released, so a sink may query the logger.
    sinks: Mutex<Vec<Box<dyn TraceSink>>>,
}

impl Default for EventLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLogger {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            state: Mutex::new(LoggerState {
                categories: Vec::new(),
                by_name: HashMap::new(),
                threads: HashMap::new(),
                open: 0,
                started: 0,
                ended: 0,
                memory: MemorySink::default(),
            }),
            sinks: Mutex::new(Vec::new()),
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn TraceSink>) -> Self {
        self.sinks.get_mut().push(sink);
        self
    }

    /// Name the calling thread in the trace.
    pub fn register_thread(&self, name: &str) {
        self.state
            .lock()
            .threads
            .insert(std::thread::current().id(), name.to_string());
    }

    /// Register a category, or return the handle already registered under
    /// `name`. The first registration's color wins.
    pub fn create_event_id(&self, name: &str, color: EventColor) -> EventHandle {
        let mut state = self.state.lock();
        if let Some(&handle) = state.by_name.get(name) {
            return handle;
        }
        let handle = EventHandle(state.categories.len() as u32);
        state.categories.push(Category {
            name: name.to_string(),
            color,
        });
        state.by_name.insert(name.to_string(), handle);
        handle
    }

    pub fn start(&self, handle: EventHandle, label: impl Into<String>) -> EventGuard<'_> {
        let start_ns = self.now_ns();
        let depth = {
            let mut state = self.state.lock();
            state.started += 1;
            state.open += 1;
            state.open - 1
        };
        EventGuard {
            logger: self,
            handle,
            label: label.into(),
            start_ns,
            depth,
        }
    }

    pub fn open_events(&self) -> usize {
        self.state.lock().open
    }

    pub fn started(&self) -> u64 {
        self.state.lock().started
    }

    pub fn ended(&self) -> u64 {
        self.state.lock().ended
    }

    pub fn category_count(&self) -> usize {
        self.state.lock().categories.len()
    }

    /// Close the logger and hand back everything it retained.
    pub fn teardown(self) -> Trace {
        let state = self.state.into_inner();
        if state.open > 0 {
            tracing::warn!(open = state.open, "event logger torn down with open events");
        }
        Trace {
            categories: state.categories,
            threads: state.threads.into_values().collect(),
            started: state.started,
            ended: state.ended,
            events: state.memory.into_events(),
        }
    }

    fn now_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    fn end(&self, guard: &mut EventGuard<'_>) {
        let end_ns = self.now_ns();
        let event = {
            let mut state = self.state.lock();
            let thread = state
                .threads
                .get(&std::thread::current().id())
                .cloned()
                .unwrap_or_else(|| "unregistered".to_string());
            let category = state
                .categories
                .get(guard.handle.0 as usize)
                .map(|c| c.name.clone())
                .unwrap_or_default();
            let event = TraceEvent {
                id: guard.handle,
                category,
                label: std::mem::take(&mut guard.label),
                thread,
                start_ns: guard.start_ns,
                end_ns,
                depth: guard.depth,
            };
            state.open -= 1;
            state.ended += 1;
            state.memory.event(&event);
            event
        };
        for sink in self.sinks.lock().iter_mut() {
            sink.event(&event);
        }
    }
}

/// Open bracket; ends its event when dropped.
#[must_use = "the event ends as soon as the guard is dropped"]
pub struct EventGuard<'a> {
    logger: &'a EventLogger,
    handle: EventHandle,
    label: String,
    start_ns: u64,
    depth: usize,
}

impl Drop for EventGuard<'_> {
    fn drop(&mut self) {
        let logger = self.logger;
        logger.end(self);
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Trace
// ────────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Trace {
    pub categories: Vec<Category>,
    pub threads: Vec<String>,
    pub started: u64,
    pub ended: u64,
    pub events: Vec<TraceEvent>,
}

#[derive(Serialize)]
struct ChromeEvent<'a> {
    name: &'a str,
    cat: &'a str,
    ph: &'static str,
    ts: f64,
    dur: f64,
    pid: u32,
    tid: usize,
    args: ChromeArgs,
}

#[derive(Serialize)]
struct ChromeArgs {
    depth: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChromeTrace<'a> {
    trace_events: Vec<ChromeEvent<'a>>,
    display_time_unit: &'static str,
}

impl Trace {
    pub fn is_balanced(&self) -> bool {
        self.started == self.ended
    }

    pub fn events_in<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a TraceEvent> + 'a {
        self.events.iter().filter(move |e| e.category == category)
    }

    /// Chrome trace-event JSON, loadable by `chrome://tracing` and Perfetto.
    pub fn to_chrome_json(&self) -> BenchResult<String> {
        let mut tids: HashMap<&str, usize> = HashMap::new();
        let trace_events = self
            .events
            .iter()
            .map(|e| {
                let next = tids.len();
                let tid = *tids.entry(e.thread.as_str()).or_insert(next);
                ChromeEvent {
                    name: &e.label,
                    cat: &e.category,
                    ph: "X",
                    ts: e.start_ns as f64 / 1_000.0,
                    dur: e.duration_ns() as f64 / 1_000.0,
                    pid: 1,
                    tid,
                    args: ChromeArgs { depth: e.depth },
                }
            })
            .collect();
        let trace = ChromeTrace {
            trace_events,
            display_time_unit: "ms",
        };
        Ok(serde_json::to_string_pretty(&trace)?)
    }

    pub fn write_chrome_json(&self, path: &Path) -> BenchResult<()> {
        std::fs::write(path, self.to_chrome_json()?)?;
        Ok(())
    }
}
