//! Structured session log.
//!
//! The session reports what it does as [`LogEntry`] values so an
//! application can show them to a user. [`TracingLogSink`] forwards them to
//! `tracing`, which is what the library uses when nothing else is supplied.

use tracing::{info, warn};

/// Which stream an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogChannel {
    /// Everyday session activity.
    Routine,
    /// Events worth highlighting, such as discovered devices.
    Notable,
    /// Failed preconditions and transport errors.
    Error,
}

/// What an entry is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    /// Adapter state.
    Bluetooth,
    /// Device discovery.
    Discovery,
    /// Connect and disconnect.
    Connection,
    /// Stats refresh.
    Stats,
    /// Band clock.
    Time,
    /// Heart rate commands and readings.
    HeartRate,
    /// Activity counters.
    Activity,
    /// Battery state.
    Battery,
    /// Vibration alerts.
    Alert,
    /// Failures.
    Error,
}

impl std::fmt::Display for LogCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            Self::Bluetooth => "bluetooth",
            Self::Discovery => "discovery",
            Self::Connection => "connection",
            Self::Stats => "stats",
            Self::Time => "time",
            Self::HeartRate => "heart-rate",
            Self::Activity => "activity",
            Self::Battery => "battery",
            Self::Alert => "alert",
            Self::Error => "error",
        };
        f.write_str(tag)
    }
}

/// One structured log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Stream the entry belongs to.
    pub channel: LogChannel,
    /// What the entry is about.
    pub category: LogCategory,
    /// Short headline.
    pub title: String,
    /// Optional details, empty if none.
    pub detail: String,
}

impl LogEntry {
    /// Create a routine entry.
    pub fn routine(
        category: LogCategory,
        title: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            channel: LogChannel::Routine,
            category,
            title: title.into(),
            detail: detail.into(),
        }
    }

    /// Create a notable entry.
    pub fn notable(
        category: LogCategory,
        title: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            channel: LogChannel::Notable,
            category,
            title: title.into(),
            detail: detail.into(),
        }
    }

    /// Create an error entry.
    pub fn error(title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            channel: LogChannel::Error,
            category: LogCategory::Error,
            title: title.into(),
            detail: detail.into(),
        }
    }
}

/// Receiver of session log entries.
pub trait LogSink: Send + Sync {
    /// Record an entry.
    fn log(&self, entry: LogEntry);
}

/// Log sink that emits entries as `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn log(&self, entry: LogEntry) {
        let category = entry.category.to_string();
        match entry.channel {
            LogChannel::Routine => {
                info!(category = %category, detail = %entry.detail, "{}", entry.title)
            }
            LogChannel::Notable => {
                info!(
                    category = %category,
                    detail = %entry.detail,
                    notable = true,
                    "{}",
                    entry.title
                )
            }
            LogChannel::Error => {
                warn!(category = %category, detail = %entry.detail, "{}", entry.title)
            }
        }
    }
}
