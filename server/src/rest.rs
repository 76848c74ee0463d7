use crate::chart::{self, Panel};
use crate::db::ReadingStore;
use crate::errors::{Error, ErrorKind};
use crate::metrics::{INGEST_LATENCY_SECONDS, INVALID_READINGS_TOTAL, READINGS_TOTAL};
use crate::mirror::{Mirrors, Series};
use crate::model::{
    now_timestamp, ClimatePayload, GasPayload, Reading, ReadingKind, ReadingsResponse,
    StoredReading,
};
use crate::pages;
use crate::retention::RetentionManager;
use crate::validate::{climate_reading, gas_reading, parse_payload};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::header,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn ReadingStore>,
    mirrors: Mirrors,
    retention: Arc<RetentionManager>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ReadingStore>,
        mirrors: Mirrors,
        retention: Arc<RetentionManager>,
    ) -> Self {
        Self {
            store,
            mirrors,
            retention,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReadingsQuery {
    kind: Option<ReadingKind>,
    limit: Option<usize>,
    offset: Option<usize>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/temperature_humidity_data", post(receive_climate))
        .route("/mq6_data", post(receive_gas))
        .route("/plot_mq6", get(plot_mq6))
        .route("/plot_aht21", get(plot_aht21))
        .route("/overall", get(overall))
        .route("/mq6", get(mq6_page))
        .route("/aht21", get(aht21_page))
        .route("/api/v1/readings", get(get_readings))
        .with_state(state)
}

async fn home() -> Html<String> {
    Html(pages::landing())
}

async fn receive_climate(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<&'static str, AppError> {
    let reading = parse_payload::<ClimatePayload>(&body)
        .and_then(|payload| climate_reading(payload, now_timestamp()))
        .map_err(|e| {
            INVALID_READINGS_TOTAL.inc();
            e
        })?;

    ingest(&state, reading).await?;
    Ok("Temperature and humidity data received successfully")
}

async fn receive_gas(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<&'static str, AppError> {
    let reading = parse_payload::<GasPayload>(&body)
        .and_then(|payload| gas_reading(payload, now_timestamp()))
        .map_err(|e| {
            INVALID_READINGS_TOTAL.inc();
            e
        })?;

    ingest(&state, reading).await?;
    Ok("MQ6 data received successfully")
}

/// Append, mirror, then run the retention check before acknowledging.
async fn ingest(state: &AppState, reading: Reading) -> Result<(), Error> {
    let start = Instant::now();

    let key = state.store.push(&reading).await?;
    READINGS_TOTAL.inc();
    state.mirrors.record(&reading).await;
    debug!("Stored reading {} at {}", key, reading.timestamp);

    let outcome = state.retention.enforce().await?;
    if outcome.deleted > 0 {
        debug!("Retention removed {} readings", outcome.deleted);
    }

    INGEST_LATENCY_SECONDS.observe(start.elapsed().as_secs_f64());
    Ok(())
}

async fn render(panels: Vec<Panel>, size: (u32, u32)) -> Result<Response, AppError> {
    let png = tokio::task::spawn_blocking(move || chart::render_png(&panels, size))
        .await
        .map_err(Error::from)??;

    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}

async fn plot_mq6(State(state): State<AppState>) -> Result<Response, AppError> {
    let panels = vec![Panel::new(
        state.mirrors.snapshot(Series::Mq6).await,
        chart::MQ6_COLOR,
    )];
    render(panels, chart::MQ6_SIZE).await
}

async fn plot_aht21(State(state): State<AppState>) -> Result<Response, AppError> {
    let panels = vec![
        Panel::new(
            state.mirrors.snapshot(Series::Temperature).await,
            chart::TEMPERATURE_COLOR,
        ),
        Panel::new(
            state.mirrors.snapshot(Series::Humidity).await,
            chart::HUMIDITY_COLOR,
        ),
    ];
    render(panels, chart::AHT21_SIZE).await
}

async fn overall(State(state): State<AppState>) -> Result<Response, AppError> {
    let panels = vec![
        Panel::new(state.mirrors.snapshot(Series::Mq6).await, chart::MQ6_COLOR),
        Panel::new(
            state.mirrors.snapshot(Series::Temperature).await,
            chart::TEMPERATURE_COLOR,
        ),
        Panel::new(
            state.mirrors.snapshot(Series::Humidity).await,
            chart::HUMIDITY_COLOR,
        ),
    ];
    render(panels, chart::OVERALL_SIZE).await
}

async fn mq6_page(State(state): State<AppState>) -> Html<String> {
    Html(pages::mq6_listing(&state.mirrors.snapshot(Series::Mq6).await))
}

async fn aht21_page(State(state): State<AppState>) -> Html<String> {
    let temperature = state.mirrors.snapshot(Series::Temperature).await;
    let humidity = state.mirrors.snapshot(Series::Humidity).await;
    Html(pages::aht21_listing(&temperature, &humidity))
}

async fn get_readings(
    State(state): State<AppState>,
    Query(params): Query<ReadingsQuery>,
) -> Result<Json<ReadingsResponse>, AppError> {
    let limit = params.limit.unwrap_or(100).min(1000);
    let offset = params.offset.unwrap_or(0);

    let mut readings: Vec<StoredReading> = state
        .store
        .fetch_all()
        .await?
        .unwrap_or_default()
        .into_iter()
        .filter(|(_, reading)| params.kind.map_or(true, |kind| reading.kind() == Some(kind)))
        .map(|(key, reading)| StoredReading { key, reading })
        .collect();

    // Newest first
    readings.sort_by(|a, b| b.reading.timestamp.cmp(&a.reading.timestamp));
    let total = readings.len();

    Ok(Json(ReadingsResponse {
        data: readings.into_iter().skip(offset).take(limit).collect(),
        total,
        limit,
        offset,
    }))
}

pub struct AppError(Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        match self.0.kind() {
            ErrorKind::Validation => warn!("Rejected request: {}", self.0),
            _ => error!("API error: {}", self.0),
        }
        (status, self.0.to_string()).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}
