// ================
// crates/directions/src/lib.rs
// ================
//! Directions gateway.
//!
//! Wraps the external mapping provider behind one uniform call. The gateway
//! is stateless and never errors to the caller: a timeout, a provider error,
//! a non-OK provider status or a missing route all collapse to `None`.
//! Retrying is the caller's decision (the next refresh cycle), and callers
//! are expected to throttle since every call consumes provider quota.

use async_trait::async_trait;
use rendezvous_common::Coordinates;
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

/// Bound on a single provider request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Travel mode passed through to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TravelMode {
    Driving,
    Walking,
    Bicycling,
    Transit,
}

impl TravelMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TravelMode::Driving => "driving",
            TravelMode::Walking => "walking",
            TravelMode::Bicycling => "bicycling",
            TravelMode::Transit => "transit",
        }
    }
}

/// A normalized route between two coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub duration_seconds: u64,
    pub distance_meters: u64,
    pub duration_text: String,
    pub distance_text: String,
}

impl Route {
    pub fn duration_minutes(&self) -> f64 {
        self.duration_seconds as f64 / 60.0
    }
}

/// The uniform gateway contract.
#[async_trait]
pub trait DirectionsProvider: Send + Sync {
    /// Resolve a route, or `None` if the provider could not produce one.
    async fn directions(
        &self,
        origin: Coordinates,
        destination: Coordinates,
        mode: TravelMode,
    ) -> Option<Route>;
}

// Provider response shape: {status, routes: [{legs: [{duration, distance}]}]}.

#[derive(Debug, Deserialize)]
struct ProviderResponse {
    status: String,
    #[serde(default)]
    routes: Vec<ProviderRoute>,
}

#[derive(Debug, Deserialize)]
struct ProviderRoute {
    #[serde(default)]
    legs: Vec<ProviderLeg>,
}

#[derive(Debug, Deserialize)]
struct ProviderLeg {
    duration: ProviderTextValue,
    distance: ProviderTextValue,
}

#[derive(Debug, Deserialize)]
struct ProviderTextValue {
    value: u64,
    text: String,
}

fn route_from_response(body: ProviderResponse) -> Option<Route> {
    if body.status != "OK" {
        debug!(status = %body.status, "directions provider returned non-OK status");
        return None;
    }
    let leg = body.routes.first()?.legs.first()?;
    Some(Route {
        duration_seconds: leg.duration.value,
        distance_meters: leg.distance.value,
        duration_text: leg.duration.text.clone(),
        distance_text: leg.distance.text.clone(),
    })
}

/// HTTP implementation over the provider's directions endpoint.
pub struct HttpDirections {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpDirections {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl DirectionsProvider for HttpDirections {
    async fn directions(
        &self,
        origin: Coordinates,
        destination: Coordinates,
        mode: TravelMode,
    ) -> Option<Route> {
        let origin = format!("{},{}", origin.lat, origin.lng);
        let destination = format!("{},{}", destination.lat, destination.lng);

        let response = match self
            .client
            .get(&self.base_url)
            .query(&[
                ("origin", origin.as_str()),
                ("destination", destination.as_str()),
                ("mode", mode.as_str()),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                debug!(%err, "directions request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            debug!(status = %response.status(), "directions request rejected");
            return None;
        }

        match response.json::<ProviderResponse>().await {
            Ok(body) => route_from_response(body),
            Err(err) => {
                debug!(%err, "directions response body unreadable");
                None
            }
        }
    }
}

/// Provider that always fails. Used when no API key is configured: the
/// pipeline then runs with distance only and ETA unknown.
pub struct NullDirections;

#[async_trait]
impl DirectionsProvider for NullDirections {
    async fn directions(&self, _: Coordinates, _: Coordinates, _: TravelMode) -> Option<Route> {
        None
    }
}

/// Provider that returns a fixed route and counts calls. Test double.
pub struct StaticDirections {
    route: Route,
    calls: AtomicUsize,
}

impl StaticDirections {
    pub fn new(route: Route) -> Self {
        Self {
            route,
            calls: AtomicUsize::new(0),
        }
    }

    /// A provider answering with the given travel time.
    pub fn with_duration_minutes(minutes: u64) -> Self {
        Self::new(Route {
            duration_seconds: minutes * 60,
            distance_meters: minutes * 800,
            duration_text: format!("{minutes} mins"),
            distance_text: format!("{:.1} km", minutes as f64 * 0.8),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DirectionsProvider for StaticDirections {
    async fn directions(&self, _: Coordinates, _: Coordinates, _: TravelMode) -> Option<Route> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Some(self.route.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_body() -> &'static str {
        r#"{
            "status": "OK",
            "routes": [{
                "legs": [{
                    "duration": {"value": 1200, "text": "20 mins"},
                    "distance": {"value": 15000, "text": "15.0 km"}
                }]
            }]
        }"#
    }

    #[test]
    fn parses_first_leg_of_first_route() {
        let body: ProviderResponse = serde_json::from_str(ok_body()).unwrap();
        let route = route_from_response(body).unwrap();
        assert_eq!(route.duration_seconds, 1200);
        assert_eq!(route.distance_meters, 15000);
        assert_eq!(route.duration_text, "20 mins");
        assert!((route.duration_minutes() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn non_ok_status_maps_to_none() {
        let body: ProviderResponse =
            serde_json::from_str(r#"{"status":"ZERO_RESULTS","routes":[]}"#).unwrap();
        assert!(route_from_response(body).is_none());
    }

    #[test]
    fn missing_route_maps_to_none() {
        let body: ProviderResponse = serde_json::from_str(r#"{"status":"OK","routes":[]}"#).unwrap();
        assert!(route_from_response(body).is_none());
    }

    #[tokio::test]
    async fn static_provider_counts_calls() {
        let provider = StaticDirections::with_duration_minutes(20);
        let origin = Coordinates::new(0.0, 0.0);
        let destination = Coordinates::new(1.0, 1.0);

        let route = provider
            .directions(origin, destination, TravelMode::Driving)
            .await
            .unwrap();
        assert_eq!(route.duration_seconds, 1200);
        assert_eq!(provider.call_count(), 1);

        provider
            .directions(origin, destination, TravelMode::Driving)
            .await;
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn null_provider_always_fails() {
        let provider = NullDirections;
        assert!(provider
            .directions(
                Coordinates::new(0.0, 0.0),
                Coordinates::new(1.0, 1.0),
                TravelMode::Walking
            )
            .await
            .is_none());
    }
}
