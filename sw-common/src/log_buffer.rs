//! Bounded in-memory log buffer
//!
//! A `tracing_subscriber::Layer` that keeps the most recent log records so
//! they can be served on the log page. Every record gets a running sequence
//! number; the buffer drops the oldest entry once full.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// One captured log line
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    /// Sequence number (1-based, counts every record ever seen)
    pub n: u64,
    pub timestamp: DateTime<Utc>,
    pub level: String,
    /// Module path the event was emitted from
    pub target: String,
    pub message: String,
}

/// Snapshot of the buffer for display
#[derive(Debug, Clone, Serialize)]
pub struct LogSnapshot {
    /// Total records seen since startup
    pub total: u64,
    /// Records currently held
    pub in_buffer: usize,
    /// Newest first
    pub records: Vec<LogRecord>,
}

#[derive(Debug)]
struct Inner {
    records: VecDeque<LogRecord>,
    capacity: usize,
    seen: u64,
}

/// Shared handle to the ring buffer; clones refer to the same storage
#[derive(Debug, Clone)]
pub struct LogBuffer {
    inner: Arc<Mutex<Inner>>,
}

impl LogBuffer {
    /// Create a buffer holding at most `capacity` records (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                records: VecDeque::with_capacity(capacity),
                capacity,
                seen: 0,
            })),
        }
    }

    /// Append a record, evicting the oldest when full
    pub fn push(&self, level: &Level, target: &str, message: String) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        inner.seen += 1;
        let record = LogRecord {
            n: inner.seen,
            timestamp: Utc::now(),
            level: level.to_string(),
            target: target.to_string(),
            message,
        };
        if inner.records.len() == inner.capacity {
            inner.records.pop_front();
        }
        inner.records.push_back(record);
    }

    pub fn snapshot(&self) -> LogSnapshot {
        match self.inner.lock() {
            Ok(inner) => LogSnapshot {
                total: inner.seen,
                in_buffer: inner.records.len(),
                records: inner.records.iter().rev().cloned().collect(),
            },
            Err(_) => LogSnapshot {
                total: 0,
                in_buffer: 0,
                records: Vec::new(),
            },
        }
    }

    /// Drop buffered records; the sequence counter keeps running
    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.records.clear();
        }
    }

    /// Layer that feeds this buffer
    pub fn layer(&self) -> LogBufferLayer {
        LogBufferLayer {
            buffer: self.clone(),
        }
    }
}

/// `tracing` layer writing formatted events into a [`LogBuffer`]
#[derive(Debug, Clone)]
pub struct LogBufferLayer {
    buffer: LogBuffer,
}

/// Collects the `message` field plus any structured fields as `key=value`
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

impl<S> Layer<S> for LogBufferLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let metadata = event.metadata();
        let message = format!("{}{}", visitor.message, visitor.fields);
        self.buffer.push(metadata.level(), metadata.target(), message);
    }
}
