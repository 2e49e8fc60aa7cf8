use async_trait::async_trait;
use log::{ debug, info };
use reqwest::Client as HttpClient;
use serde::Deserialize;

use super::analysis::AnalysisError;
use crate::models::chat::Coordinates;

pub const DEFAULT_GEOCODING_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";

#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeHit {
    pub coordinates: Coordinates,
    pub formatted_address: Option<String>,
}

/// Resolves a free-form address. `Ok(None)` means the address was understood
/// by the service but matched nothing.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, address: &str) -> Result<Option<GeocodeHit>, AnalysisError>;
}

#[derive(Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    results: Vec<GeocodeResult>,
    #[serde(default)]
    status: String,
}

#[derive(Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
    formatted_address: Option<String>,
}

#[derive(Deserialize)]
struct Geometry {
    location: Location,
}

#[derive(Deserialize)]
struct Location {
    lat: f64,
    lng: f64,
}

pub struct GoogleGeocoder {
    http: HttpClient,
    api_key: String,
    url: String,
    bias: Option<String>,
}

impl GoogleGeocoder {
    pub fn new(api_key: String, url: Option<String>, bias: Option<String>) -> Self {
        Self {
            http: HttpClient::new(),
            api_key,
            url: url.unwrap_or_else(|| DEFAULT_GEOCODING_URL.to_string()),
            bias: bias.filter(|b| !b.trim().is_empty()),
        }
    }

    /// Appends the bias region unless the address already names its city.
    pub fn biased_query(&self, address: &str) -> String {
        let address = address.trim();
        match &self.bias {
            Some(bias) => {
                let city = bias.split(',').next().unwrap_or(bias).trim().to_lowercase();
                if address.to_lowercase().contains(&city) {
                    address.to_string()
                } else {
                    format!("{}, {}", address, bias)
                }
            }
            None => address.to_string(),
        }
    }
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<GeocodeHit>, AnalysisError> {
        let query = self.biased_query(address);
        debug!("GoogleGeocoder::geocode() → '{}'", query);

        let resp = self.http
            .get(&self.url)
            .query(&[("address", query.as_str()), ("key", self.api_key.as_str())])
            .send().await?
            .error_for_status()?
            .json::<GeocodeResponse>().await?;

        match resp.status.as_str() {
            "OK" | "ZERO_RESULTS" | "" => {}
            other => {
                return Err(AnalysisError::Geocoder(format!("status {} for '{}'", other, query)));
            }
        }

        let hit = resp.results.into_iter().find_map(|r| {
            Coordinates::new(r.geometry.location.lat, r.geometry.location.lng).map(|coordinates| GeocodeHit {
                coordinates,
                formatted_address: r.formatted_address,
            })
        });
        if hit.is_none() {
            info!("No geocoding match for '{}'", query);
        }
        Ok(hit)
    }
}
