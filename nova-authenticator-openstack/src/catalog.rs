//! Service catalog returned with a Keystone v3 token.

use reqwest::Url;
use serde::Deserialize;

use crate::error::OpenStackError;

/// Catalog service type of the compute API.
pub const COMPUTE_SERVICE_TYPE: &str = "compute";

#[derive(Debug, Deserialize)]
struct TokenEnvelope {
    token: TokenBody,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    #[serde(default)]
    catalog: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<Endpoint>,
}

#[derive(Debug, Deserialize)]
struct Endpoint {
    interface: String,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    region_id: Option<String>,
    url: String,
}

impl Endpoint {
    fn in_region(&self, region: Option<&str>) -> bool {
        region.is_none_or(|region| {
            self.region_id.as_deref() == Some(region) || self.region.as_deref() == Some(region)
        })
    }
}

/// Picks the compute endpoint out of a token response body.
///
/// The first endpoint of the first `compute` service whose interface and
/// region match wins.
///
/// # Errors
///
/// Returns `OpenStackError::InvalidResponse` if the body is not a token
/// document or the endpoint URL cannot serve as a base, and
/// `OpenStackError::EndpointNotFound` if nothing matches.
pub fn compute_endpoint(
    body: &str,
    interface: &str,
    region: Option<&str>,
) -> Result<Url, OpenStackError> {
    let envelope: TokenEnvelope =
        serde_json::from_str(body).map_err(|e| OpenStackError::InvalidResponse {
            reason: e.to_string(),
        })?;

    let endpoint = envelope
        .token
        .catalog
        .iter()
        .filter(|entry| entry.service_type == COMPUTE_SERVICE_TYPE)
        .flat_map(|entry| &entry.endpoints)
        .find(|endpoint| endpoint.interface == interface && endpoint.in_region(region))
        .ok_or_else(|| OpenStackError::EndpointNotFound {
            interface: interface.to_string(),
            region: region.map(str::to_string),
        })?;

    let url = Url::parse(&endpoint.url).map_err(|e| OpenStackError::InvalidResponse {
        reason: format!("compute endpoint '{}': {e}", endpoint.url),
    })?;
    if url.cannot_be_a_base() {
        return Err(OpenStackError::InvalidResponse {
            reason: format!("compute endpoint '{}' is not a base URL", endpoint.url),
        });
    }

    Ok(url)
}
