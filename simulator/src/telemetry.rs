use rand::Rng;
use serde::Serialize;

/// Body of `POST /temperature_humidity_data`, as an AHT21 board sends it
#[derive(Debug, Clone, Serialize)]
pub struct ClimateReading {
    pub temperature: f64,
    pub humidity: f64,
}

/// Body of `POST /mq6_data`
#[derive(Debug, Clone, Serialize)]
pub struct GasReading {
    pub mq6_reading: u32,
}

pub fn generate_climate(rng: &mut impl Rng) -> ClimateReading {
    let temperature = if rng.gen_bool(0.05) {
        rng.gen_range(-10.0..50.0) // 5% outliers
    } else {
        rng.gen_range(18.0..30.0) // Normal range
    };

    let humidity = if rng.gen_bool(0.05) {
        rng.gen_range(0.0..100.0) // 5% outliers
    } else {
        rng.gen_range(35.0..70.0) // Normal range
    };

    ClimateReading {
        temperature: (temperature * 10.0_f64).round() / 10.0,
        humidity: (humidity * 10.0_f64).round() / 10.0,
    }
}

pub fn generate_gas(rng: &mut impl Rng) -> GasReading {
    // Raw 10-bit ADC value; leaks show up as spikes.
    let mq6_reading = if rng.gen_bool(0.02) {
        rng.gen_range(600..1024)
    } else {
        rng.gen_range(150..350)
    };

    GasReading { mq6_reading }
}
