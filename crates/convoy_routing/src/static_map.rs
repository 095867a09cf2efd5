use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::{coordinate::Coordinate, retry::AttemptTimedOut};

pub const MAPBOX_STATIC_API_URL: &str = "https://api.mapbox.com/styles/v1";
pub const DEFAULT_STYLE: &str = "mapbox/streets-v12";

#[derive(Debug, Error)]
pub enum StaticMapError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Static map {0}")]
    TimedOut(#[from] AttemptTimedOut),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapMarker {
    pub position: Coordinate,
    /// Single character or maki icon name.
    pub label: Option<String>,
    /// Hex color without the leading '#'.
    pub color: String,
}

impl MapMarker {
    pub fn new(position: Coordinate, color: &str) -> Self {
        Self {
            position,
            label: None,
            color: color.to_string(),
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    fn overlay(&self) -> String {
        let label = self
            .label
            .as_ref()
            .map(|label| format!("-{label}"))
            .unwrap_or_default();

        format!(
            "pin-s{}+{}({:.5},{:.5})",
            label, self.color, self.position.lon, self.position.lat
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaticMapRequest {
    pub center: Coordinate,
    pub zoom: f64,
    pub bearing: f64,
    pub markers: Vec<MapMarker>,
    pub width: u32,
    pub height: u32,
}

/// A static map source. Implementations perform a single attempt; retrying is
/// the caller's concern.
#[async_trait]
pub trait StaticMapProvider: Send + Sync {
    fn url(&self, request: &StaticMapRequest) -> String;

    async fn render(&self, request: &StaticMapRequest) -> Result<Vec<u8>, StaticMapError>;
}

pub struct MapboxStaticMap {
    access_token: String,
    style: String,
    client: reqwest::Client,
}

impl MapboxStaticMap {
    pub fn new(access_token: String) -> Self {
        Self {
            access_token,
            style: String::from(DEFAULT_STYLE),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_style(mut self, style: &str) -> Self {
        self.style = style.to_string();
        self
    }
}

#[async_trait]
impl StaticMapProvider for MapboxStaticMap {
    fn url(&self, request: &StaticMapRequest) -> String {
        let overlay = request
            .markers
            .iter()
            .map(MapMarker::overlay)
            .collect::<Vec<_>>()
            .join(",");

        let mut url = format!("{}/{}/static/", MAPBOX_STATIC_API_URL, self.style);
        if !overlay.is_empty() {
            url.push_str(&overlay);
            url.push('/');
        }

        url.push_str(&format!(
            "{:.5},{:.5},{:.2},{:.1}/{}x{}?access_token={}",
            request.center.lon,
            request.center.lat,
            request.zoom.clamp(0.0, 22.0),
            request.bearing,
            request.width.clamp(1, 1280),
            request.height.clamp(1, 1280),
            self.access_token
        ));

        url
    }

    async fn render(&self, request: &StaticMapRequest) -> Result<Vec<u8>, StaticMapError> {
        let response = self.client.get(self.url(request)).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(StaticMapError::Api { status, message });
        }

        Ok(response.bytes().await?.to_vec())
    }
}
