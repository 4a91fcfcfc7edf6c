//! Structured access log.
//!
//! Exactly one [`AccessLogEntry`] is produced per request. Entries are
//! pushed onto a bounded queue without waiting and written to a [`LogSink`]
//! by a dedicated drain task. The drain task hands sink I/O to the blocking
//! pool in batches, so a slow or broken sink never holds up a request or
//! an async worker. Sink failures and queue overflow are reported on the diagnostic
//! `tracing` channel.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::{LogFormat, LogOutput, LoggingConfig};
use crate::observability::metrics;

/// Admission outcome recorded in the access log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessDecision {
    Admitted,
    Rejected,
    /// The caller went away before the outcome was known.
    Cancelled,
}

impl AccessDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessDecision::Admitted => "admitted",
            AccessDecision::Rejected => "rejected",
            AccessDecision::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for AccessDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable record per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessLogEntry {
    pub correlation_id: String,
    pub method: String,
    pub path: String,
    pub client_key: String,
    pub decision: AccessDecision,
    pub status_code: u16,
    pub latency_ms: f64,
    /// Arrival time of the request.
    pub timestamp: DateTime<Utc>,
}

/// Serialize an entry in the configured encoding.
pub fn encode(entry: &AccessLogEntry, format: LogFormat) -> String {
    match format {
        LogFormat::Structured => serde_json::to_string(entry).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to encode access log entry as JSON");
            encode_text(entry)
        }),
        LogFormat::Text => encode_text(entry),
    }
}

fn encode_text(entry: &AccessLogEntry) -> String {
    format!(
        "[{}] {} {} {} | Status: {} | {:.2}ms | client={} | id={}",
        entry.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        entry.decision,
        entry.method,
        entry.path,
        entry.status_code,
        entry.latency_ms,
        entry.client_key,
        entry.correlation_id,
    )
}

/// Destination for encoded access log lines.
pub trait LogSink: Send + 'static {
    fn write(&mut self, entry: &AccessLogEntry, line: &str) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Buffered line writer over any `io::Write`.
pub struct WriterSink<W: Write + Send + 'static> {
    writer: BufWriter<W>,
}

impl<W: Write + Send + 'static> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
        }
    }
}

impl<W: Write + Send + 'static> LogSink for WriterSink<W> {
    fn write(&mut self, _entry: &AccessLogEntry, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

pub type StdoutSink = WriterSink<io::Stdout>;
pub type StderrSink = WriterSink<io::Stderr>;
pub type FileSink = WriterSink<File>;

impl FileSink {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(WriterSink::new(file))
    }
}

/// Open the sink named by configuration.
pub fn open_sink(output: &LogOutput) -> io::Result<Box<dyn LogSink>> {
    Ok(match output {
        LogOutput::Stdout => Box::new(WriterSink::new(io::stdout())),
        LogOutput::Stderr => Box::new(WriterSink::new(io::stderr())),
        LogOutput::File(path) => Box::new(FileSink::open(path)?),
    })
}

/// In-memory sink; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<(AccessLogEntry, String)>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AccessLogEntry> {
        self.lock().iter().map(|(entry, _)| entry.clone()).collect()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lock().iter().map(|(_, line)| line.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of recorded entries with the given decision.
    pub fn count(&self, decision: AccessDecision) -> usize {
        self.lock()
            .iter()
            .filter(|(entry, _)| entry.decision == decision)
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(AccessLogEntry, String)>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl LogSink for MemorySink {
    fn write(&mut self, entry: &AccessLogEntry, line: &str) -> io::Result<()> {
        self.lock().push((entry.clone(), line.to_string()));
        Ok(())
    }
}

enum Command {
    Entry(AccessLogEntry),
    Flush(oneshot::Sender<()>),
}

/// Cloneable handle to the access log queue.
#[derive(Debug, Clone)]
pub struct AccessLogger {
    tx: mpsc::Sender<Command>,
    dropped: Arc<AtomicU64>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Entry(entry) => f.debug_tuple("Entry").field(&entry.correlation_id).finish(),
            Command::Flush(_) => f.write_str("Flush"),
        }
    }
}

impl AccessLogger {
    /// Open the configured sink and start the drain task.
    pub fn from_config(
        config: &LoggingConfig,
        shutdown: broadcast::Receiver<()>,
    ) -> io::Result<(Self, JoinHandle<()>)> {
        let sink = open_sink(&config.output)?;
        Ok(Self::spawn(config, sink, shutdown))
    }

    /// Start the drain task writing to `sink`.
    ///
    /// The task exits when `shutdown` fires or every handle is dropped,
    /// writing out whatever is still queued first.
    pub fn spawn(
        config: &LoggingConfig,
        sink: Box<dyn LogSink>,
        shutdown: broadcast::Receiver<()>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let flush_interval = Duration::from_millis(config.flush_interval_ms.max(1));
        let handle = tokio::spawn(drain(rx, sink, config.format, flush_interval, shutdown));

        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            handle,
        )
    }

    /// Queue an entry. Never waits; drops the entry if the queue is full.
    pub fn emit(&self, entry: AccessLogEntry) {
        if let Err(err) = self.tx.try_send(Command::Entry(entry)) {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            metrics::record_log_dropped();
            if dropped.is_power_of_two() {
                let reason = match err {
                    TrySendError::Full(_) => "queue full",
                    TrySendError::Closed(_) => "logger stopped",
                };
                tracing::warn!(dropped, reason, "Access log entry dropped");
            }
        }
    }

    /// Wait until every entry queued before this call is written and flushed.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Command::Flush(ack)).await.is_ok() {
            let _ = done.await;
        }
    }

    /// Entries lost to a full or closed queue.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Most commands handed to one blocking write.
const MAX_BATCH: usize = 256;

/// Sink plus its unflushed-writes flag. Only touched on the blocking pool.
struct SinkWriter {
    sink: Box<dyn LogSink>,
    format: LogFormat,
    dirty: bool,
}

impl SinkWriter {
    fn write_batch(&mut self, batch: Vec<Command>) {
        for command in batch {
            match command {
                Command::Entry(entry) => {
                    let line = encode(&entry, self.format);
                    if let Err(e) = self.sink.write(&entry, &line) {
                        metrics::record_sink_error();
                        tracing::error!(
                            correlation_id = %entry.correlation_id,
                            error = %e,
                            "Access log sink write failed"
                        );
                    }
                    self.dirty = true;
                }
                Command::Flush(ack) => {
                    self.flush();
                    let _ = ack.send(());
                }
            }
        }
    }

    fn flush(&mut self) {
        if !self.dirty {
            return;
        }
        self.dirty = false;
        if let Err(e) = self.sink.flush() {
            metrics::record_sink_error();
            tracing::error!(error = %e, "Access log sink flush failed");
        }
    }
}

/// Run sink I/O on the blocking pool so a stalled sink never parks an
/// async worker. `None` if the write panicked.
async fn offload<F>(mut writer: SinkWriter, f: F) -> Option<SinkWriter>
where
    F: FnOnce(&mut SinkWriter) + Send + 'static,
{
    let result = tokio::task::spawn_blocking(move || {
        f(&mut writer);
        writer
    })
    .await;

    match result {
        Ok(writer) => Some(writer),
        Err(e) => {
            tracing::error!(error = %e, "Access log writer panicked; access logging stopped");
            None
        }
    }
}

async fn drain(
    mut rx: mpsc::Receiver<Command>,
    sink: Box<dyn LogSink>,
    format: LogFormat,
    flush_interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut writer = SinkWriter {
        sink,
        format,
        dirty: false,
    };
    let mut ticker = tokio::time::interval(flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(command) => {
                    let mut batch = vec![command];
                    while batch.len() < MAX_BATCH {
                        match rx.try_recv() {
                            Ok(command) => batch.push(command),
                            Err(_) => break,
                        }
                    }
                    writer = match offload(writer, move |w| w.write_batch(batch)).await {
                        Some(writer) => writer,
                        None => return,
                    };
                }
                None => break,
            },
            _ = ticker.tick(), if writer.dirty => {
                writer = match offload(writer, SinkWriter::flush).await {
                    Some(writer) => writer,
                    None => return,
                };
            }
            result = shutdown.recv() => {
                if !matches!(result, Err(RecvError::Lagged(_))) {
                    break;
                }
            }
        }
    }

    rx.close();
    let mut rest = Vec::new();
    while let Ok(command) = rx.try_recv() {
        rest.push(command);
    }
    let drained = offload(writer, move |w| {
        w.write_batch(rest);
        w.flush();
    })
    .await;
    if drained.is_some() {
        tracing::debug!("Access log drained");
    }
}
