//! Open-Meteo client extracting the current temperature for a coordinate.
//!
//! One GET per call, no caching. Every failure (transport, non-2xx status,
//! unexpected body) is reported as a single [`FetchFailed`] so callers only
//! decide whether to retry.

use serde::Deserialize;
use std::future::Future;

use crate::config::WeatherConfig;
use crate::error::{OracleError, Result};

/// A weather lookup that did not produce a temperature.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Fetch failed: {reason}")]
pub struct FetchFailed {
    pub reason: String,
}

impl FetchFailed {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for FetchFailed {
    fn from(err: reqwest::Error) -> Self {
        FetchFailed::new(err.to_string())
    }
}

/// Source of the scalar submitted back to the ledger.
///
/// The relay is generic over this so tests can script failures.
pub trait WeatherSource: Send + Sync + 'static {
    fn fetch(
        &self,
        lat: i64,
        lon: i64,
    ) -> impl Future<Output = std::result::Result<String, FetchFailed>> + Send;
}

// ── Wire format ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current_weather: CurrentWeather,
}

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    temperature: f64,
}

/// Render a temperature the way the ledger stores it (`21.5`, `-3`, `0.25`).
pub fn format_temperature(value: f64) -> String {
    format!("{}", value)
}

/// Pull `current_weather.temperature` out of a response body.
pub fn parse_temperature(body: &str) -> std::result::Result<f64, FetchFailed> {
    let response: ForecastResponse = serde_json::from_str(body)
        .map_err(|e| FetchFailed::new(format!("unexpected response body: {}", e)))?;
    Ok(response.current_weather.temperature)
}

// ── Client ──────────────────────────────────────────────────────────

/// HTTP client for an Open-Meteo compatible forecast endpoint.
#[derive(Debug, Clone)]
pub struct OpenMeteoClient {
    client: reqwest::Client,
    base_url: String,
}

impl OpenMeteoClient {
    /// Build a client whose every request is bounded by `config.timeout_secs`.
    pub fn new(config: &WeatherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| OracleError::Init(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn current_temperature(&self, lat: i64, lon: i64) -> std::result::Result<f64, FetchFailed> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("latitude", lat.to_string()),
                ("longitude", lon.to_string()),
                ("current_weather", "true".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchFailed::new(format!(
                "provider returned status {}",
                status.as_u16()
            )));
        }

        let body = response.text().await?;
        parse_temperature(&body)
    }
}

impl WeatherSource for OpenMeteoClient {
    async fn fetch(&self, lat: i64, lon: i64) -> std::result::Result<String, FetchFailed> {
        match self.current_temperature(lat, lon).await {
            Ok(value) => {
                let formatted = format_temperature(value);
                log::debug!("[Fetcher] ({}, {}) -> {}", lat, lon, formatted);
                Ok(formatted)
            }
            Err(e) => {
                log::warn!("[Fetcher] ({}, {}): {}", lat, lon, e);
                Err(e)
            }
        }
    }
}
