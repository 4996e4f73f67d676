//! Approximate location lookup

use crate::error::SosError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const UNKNOWN_CITY: &str = "Unknown Location";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub city: String,
}

impl Location {
    pub fn map_link(&self) -> String {
        format!("https://www.google.com/maps?q={},{}", self.latitude, self.longitude)
    }
}

/// Resolves the device's current location
#[async_trait]
pub trait Geolocator: Send + Sync {
    /// `None` when the location could not be resolved
    async fn locate(&self) -> Result<Option<Location>, SosError>;
}

/// Geolocation by public IP address through an ipinfo.io style endpoint
pub struct IpGeolocator {
    client: Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct IpInfo {
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    loc: Option<String>,
}

impl IpGeolocator {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SosError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SosError::Geolocation(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, url: url.into() })
    }
}

#[async_trait]
impl Geolocator for IpGeolocator {
    async fn locate(&self) -> Result<Option<Location>, SosError> {
        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(SosError::Geolocation(format!(
                "Geolocation lookup returned {}",
                response.status()
            )));
        }

        let info: IpInfo = response.json().await?;
        debug!("IP geolocation response: city={:?} loc={:?}", info.city, info.loc);
        Ok(parse_ip_info(info))
    }
}

fn parse_ip_info(info: IpInfo) -> Option<Location> {
    let loc = info.loc?;
    let (lat, lon) = loc.split_once(',')?;
    let latitude = lat.trim().parse::<f64>().ok()?;
    let longitude = lon.trim().parse::<f64>().ok()?;
    let city = info
        .city
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN_CITY.to_string());
    Some(Location { latitude, longitude, city })
}
