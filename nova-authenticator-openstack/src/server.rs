//! Compute API server documents.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use nova_authenticator::{DirectoryError, Instance};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ServerEnvelope {
    server: Server,
}

#[derive(Debug, Deserialize)]
struct Server {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    tenant_id: String,
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
    status: String,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
    #[serde(rename = "accessIPv4", default)]
    access_ipv4: Option<String>,
    #[serde(rename = "accessIPv6", default)]
    access_ipv6: Option<String>,
    #[serde(default)]
    addresses: HashMap<String, Vec<NetworkAddress>>,
}

#[derive(Debug, Deserialize)]
struct NetworkAddress {
    #[serde(default)]
    addr: String,
}

impl From<Server> for Instance {
    fn from(server: Server) -> Self {
        let addresses: BTreeSet<String> = server
            .access_ipv4
            .into_iter()
            .chain(server.access_ipv6)
            .chain(
                server
                    .addresses
                    .into_values()
                    .flatten()
                    .map(|address| address.addr),
            )
            .filter(|addr| !addr.is_empty())
            .collect();

        Self {
            id: server.id,
            name: server.name,
            project_id: server.tenant_id,
            user_id: server.user_id,
            addresses,
            metadata: server.metadata,
            status: server.status,
            created: server.created,
            updated: server.updated,
        }
    }
}

/// Decodes a `GET /servers/{id}` response body.
///
/// Addresses are the union of the access addresses and every interface
/// address on every network, with empty entries dropped.
///
/// # Errors
///
/// Returns `DirectoryError::InvalidResponse` if the body is not a server
/// document.
pub fn parse_server(body: &str) -> Result<Instance, DirectoryError> {
    serde_json::from_str::<ServerEnvelope>(body)
        .map(|envelope| envelope.server.into())
        .map_err(|e| DirectoryError::InvalidResponse {
            reason: e.to_string(),
        })
}
