//! Observability for the storage engine
//!
//! - Structured JSON-lines logging to stderr
//! - Counters shared by one open database
//! - Lifecycle and exceptional events only; nothing is logged per record
//!
//! ```ignore
//! use mstdb::observability::{log_event_with_fields, EngineMetrics, Event};
//!
//! log_event_with_fields(Event::MasterOpen, &[("path", "/data/cds")]);
//!
//! let metrics = EngineMetrics::new();
//! metrics.increment_records_read();
//! ```

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};

#[cfg(test)]
pub(crate) use logger::capture_logs;
pub use metrics::{EngineMetrics, MetricsSnapshot};

fn severity_of(event: Event) -> Severity {
    if event.is_failure() {
        Severity::Error
    } else if event.is_warning() {
        Severity::Warn
    } else {
        Severity::Info
    }
}

/// Log a lifecycle event
pub fn log_event(event: Event) {
    Logger::log(severity_of(event), event.as_str(), &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(severity_of(event), event.as_str(), fields);
}
