use async_trait::async_trait;
use jiff::{SignedDuration, Timestamp};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use crate::{
    coordinate::Coordinate,
    retry::{AttemptTimedOut, RetryPolicy},
};

pub const MAPBOX_SEARCH_BOX_API_URL: &str = "https://api.mapbox.com/search/searchbox/v1";

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("Address not found: {0}")]
    NotFound(String),

    #[error("Address is empty")]
    EmptyQuery,

    #[error("Superseded by a newer lookup")]
    Superseded,

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Deserialization error: {0}")]
    Deserialize(#[from] serde_json::Error),

    #[error("Geocoding {0}")]
    TimedOut(#[from] AttemptTimedOut),
}

impl GeocodeError {
    /// Errors the user fixes by editing the address rather than retrying.
    pub fn is_user_correctable(&self) -> bool {
        matches!(self, GeocodeError::NotFound(_) | GeocodeError::EmptyQuery)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodedPlace {
    pub coordinate: Coordinate,
    pub display_name: String,
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn resolve(&self, address: &str) -> Result<GeocodedPlace, GeocodeError>;
}

/// Billing session token. A session ends after a completed resolution or once
/// the token is older than `max_age`; either way a fresh token is issued.
#[derive(Debug, Clone)]
pub struct SessionToken {
    value: Uuid,
    issued_at: Timestamp,
    max_age: SignedDuration,
}

impl SessionToken {
    pub const DEFAULT_MAX_AGE: SignedDuration = SignedDuration::from_secs(60 * 60);

    pub fn new(now: Timestamp, max_age: SignedDuration) -> Self {
        Self {
            value: Uuid::new_v4(),
            issued_at: now,
            max_age,
        }
    }

    pub fn value(&self) -> Uuid {
        self.value
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        now.duration_since(self.issued_at) >= self.max_age
    }

    /// Token to use for a request issued at `now`, rotating first if expired.
    pub fn current(&mut self, now: Timestamp) -> Uuid {
        if self.is_expired(now) {
            self.rotate(now);
        }
        self.value
    }

    pub fn rotate(&mut self, now: Timestamp) {
        self.value = Uuid::new_v4();
        self.issued_at = now;
    }
}

#[derive(Deserialize)]
struct SuggestResponse {
    #[serde(default)]
    suggestions: Vec<Suggestion>,
}

#[derive(Deserialize)]
struct Suggestion {
    mapbox_id: String,
}

#[derive(Deserialize)]
struct RetrieveResponse {
    #[serde(default)]
    features: Vec<RetrievedFeature>,
}

#[derive(Deserialize)]
struct RetrievedFeature {
    geometry: PointGeometry,
    properties: FeatureProperties,
}

#[derive(Deserialize)]
struct PointGeometry {
    coordinates: [f64; 2],
}

#[derive(Deserialize)]
struct FeatureProperties {
    name: Option<String>,
    full_address: Option<String>,
}

/// Search Box suggest + retrieve flow, grouped under one session token.
pub struct MapboxGeocoder {
    access_token: String,
    base_url: String,
    session_token: Mutex<SessionToken>,
    retry_policy: RetryPolicy,
    client: reqwest::Client,
}

impl MapboxGeocoder {
    pub fn new(access_token: String) -> Self {
        Self {
            access_token,
            base_url: String::from(MAPBOX_SEARCH_BOX_API_URL),
            session_token: Mutex::new(SessionToken::new(
                Timestamp::now(),
                SessionToken::DEFAULT_MAX_AGE,
            )),
            retry_policy: RetryPolicy::default(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn session_token(&self) -> Uuid {
        self.session_token.lock().value()
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: String,
        query: &[(&str, String)],
    ) -> Result<T, GeocodeError> {
        let response = self.client.get(url).query(query).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(GeocodeError::Api { status, message });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl Geocoder for MapboxGeocoder {
    async fn resolve(&self, address: &str) -> Result<GeocodedPlace, GeocodeError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(GeocodeError::EmptyQuery);
        }

        let token = self.session_token.lock().current(Timestamp::now());

        self.retry_policy
            .call(
                "geocode",
                || self.suggest_and_retrieve(address, token),
                |error: &GeocodeError| !error.is_user_correctable(),
            )
            .await
    }
}

impl MapboxGeocoder {
    async fn suggest_and_retrieve(
        &self,
        address: &str,
        token: Uuid,
    ) -> Result<GeocodedPlace, GeocodeError> {
        let suggestions: SuggestResponse = self
            .get_json(
                format!("{}/suggest", self.base_url),
                &[
                    ("q", address.to_string()),
                    ("access_token", self.access_token.clone()),
                    ("session_token", token.to_string()),
                    ("limit", String::from("1")),
                ],
            )
            .await?;

        let suggestion = suggestions
            .suggestions
            .into_iter()
            .next()
            .ok_or_else(|| GeocodeError::NotFound(address.to_string()))?;

        let retrieved: RetrieveResponse = self
            .get_json(
                format!("{}/retrieve/{}", self.base_url, suggestion.mapbox_id),
                &[
                    ("access_token", self.access_token.clone()),
                    ("session_token", token.to_string()),
                ],
            )
            .await?;

        // retrieve closes the billing session
        self.session_token.lock().rotate(Timestamp::now());

        let feature = retrieved
            .features
            .into_iter()
            .next()
            .ok_or_else(|| GeocodeError::NotFound(address.to_string()))?;

        debug!("Geocoded '{}' to {:?}", address, feature.geometry.coordinates);

        Ok(place_from_feature(feature, address))
    }
}

fn place_from_feature(feature: RetrievedFeature, address: &str) -> GeocodedPlace {
    let display_name = feature
        .properties
        .full_address
        .or(feature.properties.name)
        .unwrap_or_else(|| address.to_string());

    GeocodedPlace {
        coordinate: Coordinate::from(feature.geometry.coordinates),
        display_name,
    }
}

/// Wraps a geocoder so that starting a lookup cancels the one still in flight.
pub struct LatestOnlyGeocoder<G> {
    inner: G,
    latest: watch::Sender<u64>,
}

impl<G: Geocoder> LatestOnlyGeocoder<G> {
    pub fn new(inner: G) -> Self {
        let (latest, _) = watch::channel(0);
        Self { inner, latest }
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }

    pub async fn resolve(&self, address: &str) -> Result<GeocodedPlace, GeocodeError> {
        let mut ticket = 0;
        self.latest.send_modify(|latest| {
            *latest += 1;
            ticket = *latest;
        });

        let mut receiver = self.latest.subscribe();

        tokio::select! {
            result = self.inner.resolve(address) => {
                if *self.latest.borrow() != ticket {
                    Err(GeocodeError::Superseded)
                } else {
                    result
                }
            }
            _ = superseded(&mut receiver, ticket) => Err(GeocodeError::Superseded),
        }
    }
}

async fn superseded(receiver: &mut watch::Receiver<u64>, ticket: u64) {
    loop {
        if receiver.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
        if *receiver.borrow() != ticket {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;

    struct SlowGeocoder;

    #[async_trait]
    impl Geocoder for SlowGeocoder {
        async fn resolve(&self, address: &str) -> Result<GeocodedPlace, GeocodeError> {
            let delay = if address == "slow" { 5 } else { 1 };
            tokio::time::sleep(Duration::from_secs(delay)).await;
            Ok(GeocodedPlace {
                coordinate: Coordinate::new(4.35, 50.85),
                display_name: address.to_string(),
            })
        }
    }

    #[test]
    fn test_session_token_rotation() {
        let now: Timestamp = "2025-06-10T08:00:00Z".parse().unwrap();
        let mut token = SessionToken::new(now, SignedDuration::from_secs(3600));
        let first = token.value();

        assert_eq!(token.current(now + SignedDuration::from_secs(60)), first);

        let later = now + SignedDuration::from_secs(3600);
        assert!(token.is_expired(later));
        assert_ne!(token.current(later), first);

        let second = token.value();
        token.rotate(later);
        assert_ne!(token.value(), second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_lookup_supersedes_older_one() {
        let geocoder = Arc::new(LatestOnlyGeocoder::new(SlowGeocoder));

        let first = tokio::spawn({
            let geocoder = Arc::clone(&geocoder);
            async move { geocoder.resolve("slow").await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = geocoder.resolve("fast").await.unwrap();
        let first = first.await.unwrap();

        assert_eq!(second.display_name, "fast");
        assert!(matches!(first, Err(GeocodeError::Superseded)));
    }

    #[test]
    fn test_place_from_feature_prefers_full_address() {
        let feature: RetrievedFeature = serde_json::from_str(
            r#"{
                "geometry": { "coordinates": [-122.4194, 37.7749] },
                "properties": { "name": "San Francisco", "full_address": "San Francisco, California, United States" }
            }"#,
        )
        .unwrap();

        let place = place_from_feature(feature, "sf");

        assert_eq!(place.coordinate, Coordinate::new(-122.4194, 37.7749));
        assert_eq!(place.display_name, "San Francisco, California, United States");
    }

    #[test]
    fn test_user_correctable_errors() {
        assert!(GeocodeError::NotFound(String::from("nowhere")).is_user_correctable());
        assert!(!GeocodeError::Superseded.is_user_correctable());
        assert!(
            !GeocodeError::TimedOut(AttemptTimedOut(Duration::from_secs(1))).is_user_correctable()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresponsive_service_gives_up() {
        // accepts connections into the backlog and never answers
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let geocoder = MapboxGeocoder::new(String::from("token"))
            .with_base_url(&base_url)
            .with_retry_policy(RetryPolicy {
                max_attempts: 2,
                attempt_timeout: Duration::from_secs(2),
                ..RetryPolicy::default()
            });

        let result = tokio::time::timeout(
            Duration::from_secs(3600),
            geocoder.resolve("Los Angeles"),
        )
        .await;

        let error = result.expect("lookup must give up on its own").unwrap_err();
        assert!(!error.is_user_correctable());
        drop(listener);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_address_is_rejected_without_request() {
        let geocoder =
            MapboxGeocoder::new(String::from("token")).with_base_url("http://127.0.0.1:9");

        let error = geocoder.resolve("   ").await.unwrap_err();

        assert!(matches!(error, GeocodeError::EmptyQuery));
    }
}
