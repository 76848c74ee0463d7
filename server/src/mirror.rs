use crate::db::ReadingStore;
use crate::errors::Result;
use crate::model::{Reading, HUMIDITY, MQ6_READING, TEMPERATURE};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Series {
    Temperature,
    Humidity,
    Mq6,
}

impl Series {
    pub fn field(self) -> &'static str {
        match self {
            Series::Temperature => TEMPERATURE,
            Series::Humidity => HUMIDITY,
            Series::Mq6 => MQ6_READING,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MirrorEntry {
    pub timestamp: String,
    pub value: Value,
}

#[derive(Debug, Default)]
struct MirrorSet {
    temperature: VecDeque<MirrorEntry>,
    humidity: VecDeque<MirrorEntry>,
    mq6: VecDeque<MirrorEntry>,
}

impl MirrorSet {
    fn series_mut(&mut self, series: Series) -> &mut VecDeque<MirrorEntry> {
        match series {
            Series::Temperature => &mut self.temperature,
            Series::Humidity => &mut self.humidity,
            Series::Mq6 => &mut self.mq6,
        }
    }

    fn series(&self, series: Series) -> &VecDeque<MirrorEntry> {
        match series {
            Series::Temperature => &self.temperature,
            Series::Humidity => &self.humidity,
            Series::Mq6 => &self.mq6,
        }
    }
}

/// Process-local copies of recent readings, one bounded queue per series.
///
/// Ingestion is the only writer. Readers copy a series out and release the
/// lock before doing any rendering.
#[derive(Debug, Clone)]
pub struct Mirrors {
    inner: Arc<RwLock<MirrorSet>>,
    capacity: usize,
}

impl Mirrors {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(MirrorSet::default())),
            capacity,
        }
    }

    pub async fn record(&self, reading: &Reading) {
        let mut set = self.inner.write().await;
        for series in [Series::Temperature, Series::Humidity, Series::Mq6] {
            if let Some(value) = reading.field(series.field()) {
                let queue = set.series_mut(series);
                queue.push_back(MirrorEntry {
                    timestamp: reading.timestamp.clone(),
                    value: value.clone(),
                });
                while queue.len() > self.capacity {
                    queue.pop_front();
                }
            }
        }
    }

    pub async fn snapshot(&self, series: Series) -> Vec<MirrorEntry> {
        self.inner.read().await.series(series).iter().cloned().collect()
    }

    /// Load the newest stored readings, oldest first, so charts survive a
    /// restart. Returns the number of readings recorded.
    pub async fn hydrate(&self, store: &dyn ReadingStore) -> Result<usize> {
        let Some(snapshot) = store.fetch_all().await? else {
            return Ok(0);
        };

        let mut readings: Vec<Reading> = snapshot.into_values().collect();
        readings.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        let count = readings.len();
        for reading in &readings {
            self.record(reading).await;
        }
        info!("Hydrated mirrors from {} stored readings", count);
        Ok(count)
    }
}
