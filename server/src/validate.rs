use crate::errors::{Error, Result};
use crate::model::{ClimatePayload, GasPayload, Reading, HUMIDITY, MQ6_READING, TEMPERATURE};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Parses a request body into one of the ingestion payloads.
pub fn parse_payload<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    let value = serde_json::from_slice::<Value>(body)
        .map_err(|e| Error::Validation(format!("JSON parse error: {}", e)))?;
    if !value.is_object() {
        return Err(Error::Validation(
            "Request body must be a JSON object".to_string(),
        ));
    }
    serde_json::from_value::<T>(value)
        .map_err(|e| Error::Validation(format!("JSON parse error: {}", e)))
}

fn require(value: Option<Value>, field: &str) -> Result<Value> {
    value.ok_or_else(|| Error::Validation(format!("Missing field '{}'", field)))
}

/// Builds a temperature/humidity reading; only presence is checked.
pub fn climate_reading(payload: ClimatePayload, timestamp: String) -> Result<Reading> {
    let temperature = require(payload.temperature, TEMPERATURE)?;
    let humidity = require(payload.humidity, HUMIDITY)?;
    Ok(Reading::climate(timestamp, temperature, humidity))
}

/// Builds an MQ6 gas reading; only presence is checked.
pub fn gas_reading(payload: GasPayload, timestamp: String) -> Result<Reading> {
    let mq6_reading = require(payload.mq6_reading, MQ6_READING)?;
    Ok(Reading::gas(timestamp, mq6_reading))
}
