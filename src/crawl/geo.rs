use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;

use crate::{
    config::GeoConfig,
    error::AppError,
    models::{GeoApiResponse, GeoResponse, IpStackResponse, Location},
    utils::create_http_client,
};

/// External IP geolocation lookup
#[async_trait]
pub trait GeoProvider: Send + Sync {
    async fn check(&self, address: &str) -> Result<GeoResponse, AppError>;
}

/// Build a Location record from a geolocation response. Coordinates keep six
/// decimals so the same place always maps to the same record.
pub fn location_from_response(resp: &GeoResponse) -> Location {
    Location {
        country: resp.country.clone(),
        region: resp.region.clone(),
        city: resp.city.clone(),
        latitude: format!("{:.6}", resp.latitude),
        longitude: format!("{:.6}", resp.longitude),
    }
}

/// Pick the geolocation provider for the given configuration
pub fn provider_from_config(config: &GeoConfig) -> Result<Arc<dyn GeoProvider>, AppError> {
    let client = create_http_client(config.timeout)?;

    match &config.ipstack_key {
        Some(key) => {
            tracing::info!("Using ipstack for node geolocation");
            Ok(Arc::new(IpStackProvider::new(client, key, config.ipstack_https)))
        }
        None => {
            tracing::warn!("No ipstack key configured, falling back to ip-api.com for geolocation");
            Ok(Arc::new(IpApiProvider::new(client)))
        }
    }
}

/// Geolocation through the ipstack API
pub struct IpStackProvider {
    client: Client,
    access_key: String,
    base_url: String,
}

impl IpStackProvider {
    pub fn new(client: Client, access_key: &str, https: bool) -> Self {
        let scheme = if https { "https" } else { "http" };
        IpStackProvider {
            client,
            access_key: access_key.to_string(),
            base_url: format!("{}://api.ipstack.com", scheme),
        }
    }
}

/// Validate an ipstack body. Errors come back with a 200 status and
/// `success: false`.
fn parse_ipstack_response(resp: IpStackResponse) -> Result<GeoResponse, AppError> {
    if resp.success == Some(false) || resp.error.is_some() {
        let info = resp
            .error
            .and_then(|e| e.info)
            .unwrap_or_else(|| "unknown error".to_string());
        return Err(AppError::GeolocationError(format!("ipstack: {}", info)));
    }

    match (resp.latitude, resp.longitude) {
        (Some(latitude), Some(longitude)) => Ok(GeoResponse {
            country: resp.country_name.unwrap_or_default(),
            region: resp.region_name.unwrap_or_default(),
            city: resp.city.unwrap_or_default(),
            latitude,
            longitude,
        }),
        _ => Err(AppError::GeolocationError(
            "ipstack: response has no coordinates".to_string(),
        )),
    }
}

#[async_trait]
impl GeoProvider for IpStackProvider {
    async fn check(&self, address: &str) -> Result<GeoResponse, AppError> {
        let url = format!("{}/{}", self.base_url, address);

        let response = self
            .client
            .get(&url)
            .query(&[("access_key", self.access_key.as_str())])
            .send()
            .await
            .map_err(|e| AppError::RequestError(format!("ipstack request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::GeolocationError(format!(
                "ipstack returned error status: {}",
                response.status()
            )));
        }

        let body: IpStackResponse = response
            .json()
            .await
            .map_err(|e| AppError::JsonError(format!("Failed to parse ipstack response: {}", e)))?;

        parse_ipstack_response(body)
    }
}

/// Keyless geolocation through ip-api.com
pub struct IpApiProvider {
    client: Client,
}

impl IpApiProvider {
    pub fn new(client: Client) -> Self {
        IpApiProvider { client }
    }
}

fn parse_ip_api_response(resp: GeoApiResponse) -> Result<GeoResponse, AppError> {
    if resp.status != "success" {
        return Err(AppError::GeolocationError(format!(
            "ip-api: {}",
            resp.message.unwrap_or(resp.status)
        )));
    }

    match (resp.lat, resp.lon) {
        (Some(latitude), Some(longitude)) => Ok(GeoResponse {
            country: resp.country.unwrap_or_default(),
            region: resp.region_name.unwrap_or_default(),
            city: resp.city.unwrap_or_default(),
            latitude,
            longitude,
        }),
        _ => Err(AppError::GeolocationError(
            "ip-api: response has no coordinates".to_string(),
        )),
    }
}

#[async_trait]
impl GeoProvider for IpApiProvider {
    async fn check(&self, address: &str) -> Result<GeoResponse, AppError> {
        let response = self
            .client
            .get(format!("http://ip-api.com/json/{}", address))
            .send()
            .await
            .map_err(|e| AppError::RequestError(format!("Geo API request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::RequestError(format!(
                "Geo API returned error status: {}",
                response.status()
            )));
        }

        let body: GeoApiResponse = response
            .json()
            .await
            .map_err(|e| AppError::JsonError(format!("Failed to parse geo API response: {}", e)))?;

        parse_ip_api_response(body)
    }
}
