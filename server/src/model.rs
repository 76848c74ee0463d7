use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Server-local timestamp format stamped on every reading.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const TEMPERATURE: &str = "temperature";
pub const HUMIDITY: &str = "humidity";
pub const MQ6_READING: &str = "mq6_reading";

/// One sensor data point as persisted in the store.
///
/// Measurement fields are kept as raw JSON so devices sending a string or a
/// nested value get it stored unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingKind {
    Climate,
    Gas,
}

impl Reading {
    pub fn climate(timestamp: String, temperature: Value, humidity: Value) -> Self {
        let mut fields = Map::new();
        fields.insert(TEMPERATURE.to_string(), temperature);
        fields.insert(HUMIDITY.to_string(), humidity);
        Self { timestamp, fields }
    }

    pub fn gas(timestamp: String, mq6_reading: Value) -> Self {
        let mut fields = Map::new();
        fields.insert(MQ6_READING.to_string(), mq6_reading);
        Self { timestamp, fields }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn kind(&self) -> Option<ReadingKind> {
        if self.fields.contains_key(MQ6_READING) {
            Some(ReadingKind::Gas)
        } else if self.fields.contains_key(TEMPERATURE) || self.fields.contains_key(HUMIDITY) {
            Some(ReadingKind::Climate)
        } else {
            None
        }
    }
}

/// Full collection as returned by the store, keyed by generated record key.
pub type Snapshot = BTreeMap<String, Reading>;

pub fn now_timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Body of `POST /temperature_humidity_data`
#[derive(Debug, Default, Deserialize)]
pub struct ClimatePayload {
    pub temperature: Option<Value>,
    pub humidity: Option<Value>,
}

/// Body of `POST /mq6_data`
#[derive(Debug, Default, Deserialize)]
pub struct GasPayload {
    pub mq6_reading: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredReading {
    pub key: String,
    #[serde(flatten)]
    pub reading: Reading,
}

/// REST API response wrapper
#[derive(Debug, Serialize)]
pub struct ReadingsResponse {
    pub data: Vec<StoredReading>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}
