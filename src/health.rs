//! Health record sink.
//!
//! Heart rate measurements are handed to a [`HealthRecordSink`], which is
//! where an application plugs in its health data store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

use crate::error::Result;

/// A heart rate sample to be stored.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HeartRateSample {
    /// Beats per minute.
    pub bpm: f64,
    /// When the sample was taken.
    pub recorded_at: DateTime<Utc>,
}

impl HeartRateSample {
    /// Create a sample taken now.
    pub fn now(bpm: f64) -> Self {
        Self {
            bpm,
            recorded_at: Utc::now(),
        }
    }
}

/// Destination for heart rate samples.
#[async_trait]
pub trait HealthRecordSink: Send + Sync {
    /// Store one sample.
    async fn record_heart_rate(&self, sample: HeartRateSample) -> Result<()>;
}

/// Health sink that keeps samples in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryHealthRecords {
    samples: Arc<Mutex<Vec<HeartRateSample>>>,
}

impl MemoryHealthRecords {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// All samples recorded so far.
    pub fn samples(&self) -> Vec<HeartRateSample> {
        self.samples.lock().clone()
    }

    /// Number of samples recorded so far.
    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    /// Check if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }
}

#[async_trait]
impl HealthRecordSink for MemoryHealthRecords {
    async fn record_heart_rate(&self, sample: HeartRateSample) -> Result<()> {
        self.samples.lock().push(sample);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_records() {
        let records = MemoryHealthRecords::new();
        assert!(records.is_empty());

        records
            .record_heart_rate(HeartRateSample::now(72.0))
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records.samples()[0].bpm, 72.0);
    }
}
