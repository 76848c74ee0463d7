mod telemetry;

use clap::Parser;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "simulator", about = "Posts synthetic AHT21 and MQ6 readings to the sensor server")]
struct Args {
    /// Base URL of the sensor server
    #[arg(long, env = "SERVER_URL", default_value = "http://localhost:5000")]
    server_url: String,

    /// Readings per second, split evenly between the two sensors
    #[arg(long, env = "RATE", default_value_t = 1)]
    rate: u64,

    /// Stop after this many readings (0 runs until interrupted)
    #[arg(long, env = "COUNT", default_value_t = 0)]
    count: u64,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("Starting sensor simulator");
    info!("Server: {}, Rate: {} readings/s", args.server_url, args.rate);

    let client = match Client::builder().timeout(Duration::from_secs(10)).build() {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to build HTTP client: {}", e);
            std::process::exit(1);
        }
    };

    let base = args.server_url.trim_end_matches('/').to_string();
    let climate_url = format!("{}/temperature_humidity_data", base);
    let gas_url = format!("{}/mq6_data", base);

    let mut rng = rand::thread_rng();
    let mut ticker = tokio::time::interval(Duration::from_millis(1000 / args.rate.max(1)));
    let mut sent = 0u64;
    let mut failed = 0u64;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        }

        let delivered = if sent % 2 == 0 {
            post(&client, &climate_url, &telemetry::generate_climate(&mut rng)).await
        } else {
            post(&client, &gas_url, &telemetry::generate_gas(&mut rng)).await
        };

        sent += 1;
        if !delivered {
            failed += 1;
        }

        // Log progress periodically
        if sent % 100 == 0 {
            info!("Posted {} readings ({} failed)", sent, failed);
        }

        if args.count > 0 && sent >= args.count {
            break;
        }
    }

    info!("Simulator stopped after {} readings ({} failed)", sent, failed);
}

async fn post<T: Serialize>(client: &Client, url: &str, body: &T) -> bool {
    match client.post(url).json(body).send().await {
        Ok(response) if response.status().is_success() => true,
        Ok(response) => {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            warn!("Server rejected reading ({}): {}", status, text);
            false
        }
        Err(e) => {
            warn!("Failed to post reading: {}", e);
            false
        }
    }
}
