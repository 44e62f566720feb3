//! Observability for the merge engine
//!
//! Provides:
//! - Structured logging (JSON lines on stderr)
//! - Typed lifecycle events
//! - Process-wide counters
//!
//! Observability is read-only: it never changes merge results, and a
//! failure to write a log line never fails a merge.
//!
//! # Usage
//!
//! ```ignore
//! use shardmerge::observability::{log_event, Event};
//!
//! log_event(Event::MergeStart, &[("merge_id", "..."), ("shards", "3")]);
//! ```

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};

/// Log a lifecycle event at its default severity
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}

/// Log a lifecycle event at an explicit severity
pub fn log_event_at(severity: Severity, event: Event, fields: &[(&str, &str)]) {
    Logger::log(severity, event.as_str(), fields);
}
