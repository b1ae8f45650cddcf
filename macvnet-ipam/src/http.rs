//! Allocator client over HTTP
//!
//! ```text
//! GET    {metadataUrl}/api/v1/namespaces/{ns}/pods/{name}
//! POST   {allocatorUrl}/v1/allocations
//! DELETE {allocatorUrl}/v1/allocations/{ns}/{name}
//! ```

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, error, info};

use macvnet_core::{AllocationResult, AllocatorConfig, Error, Result, WorkloadIdentity};

use crate::client::AllocatorClient;
use crate::pod::Pod;

/// Body of an allocation request
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AllocationRequest<'a> {
    namespace: &'a str,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    container_id: Option<&'a str>,
    networks: &'a [String],
}

/// Client for the pod metadata service and the allocator
#[derive(Debug, Clone)]
pub struct HttpAllocator {
    client: reqwest::Client,
    metadata_url: String,
    allocator_url: String,
    token: Option<String>,
    networks_annotation: String,
}

impl HttpAllocator {
    /// Create a client from the `allocator` configuration section
    ///
    /// # Errors
    /// Returns a configuration error if the token file cannot be read
    pub fn new(config: &AllocatorConfig) -> Result<Self> {
        let token = config.token_file.as_deref().map(read_token).transpose()?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("macvnet/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::InvalidConfig {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            metadata_url: config.metadata_url.trim_end_matches('/').to_string(),
            allocator_url: config.allocator_url.trim_end_matches('/').to_string(),
            token,
            networks_annotation: config.networks_annotation.clone(),
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl AllocatorClient for HttpAllocator {
    async fn lookup_pod_networks(&self, workload: &WorkloadIdentity) -> Result<Vec<String>> {
        let url = format!(
            "{}/api/v1/namespaces/{}/pods/{}",
            self.metadata_url, workload.namespace, workload.name
        );
        debug!(url = %url, "Fetching pod");

        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| Error::allocation("lookup", workload.to_string(), e))?;

        let pod: Pod = ensure_success(response, "lookup", workload)
            .await?
            .json()
            .await
            .map_err(|e| Error::allocation("lookup", workload.to_string(), e))?;

        let networks = pod.networks(&self.networks_annotation);
        debug!(
            pod = %workload,
            annotation = %self.networks_annotation,
            ?networks,
            "Found candidate networks"
        );

        Ok(networks)
    }

    async fn allocate(
        &self,
        workload: &WorkloadIdentity,
        networks: &[String],
    ) -> Result<AllocationResult> {
        let url = format!("{}/v1/allocations", self.allocator_url);
        let body = AllocationRequest {
            namespace: &workload.namespace,
            name: &workload.name,
            container_id: workload.infra_container_id.as_deref(),
            networks,
        };
        debug!(url = %url, pod = %workload, ?networks, "Requesting allocation");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::allocation("allocate", workload.to_string(), e))?;

        let allocation: AllocationResult = ensure_success(response, "allocate", workload)
            .await?
            .json()
            .await
            .map_err(|e| Error::allocation("allocate", workload.to_string(), e))?;

        info!(
            pod = %workload,
            network = %allocation.app_net,
            address = %allocation.ip_address,
            gateway = %allocation.gateway,
            vlan = allocation.vlan_id,
            "Allocated address"
        );

        Ok(allocation)
    }

    async fn release(&self, workload: &WorkloadIdentity) -> Result<()> {
        let url = format!(
            "{}/v1/allocations/{}/{}",
            self.allocator_url, workload.namespace, workload.name
        );
        debug!(url = %url, "Releasing allocation");

        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| Error::allocation("release", workload.to_string(), e))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(pod = %workload, "No allocation to release");
            return Ok(());
        }

        ensure_success(response, "release", workload).await?;
        info!(pod = %workload, "Released allocation");

        Ok(())
    }
}

async fn ensure_success(
    response: Response,
    operation: &str,
    workload: &WorkloadIdentity,
) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    error!(status = %status, body = %body, operation, pod = %workload, "Allocator request failed");

    Err(Error::allocation(
        operation,
        workload.to_string(),
        format!("{status} - {}", body.trim()),
    ))
}

fn read_token(path: &Path) -> Result<String> {
    let token = std::fs::read_to_string(path).map_err(|e| Error::InvalidConfig {
        message: format!("failed to read token file {}: {e}", path.display()),
    })?;
    Ok(token.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config() -> AllocatorConfig {
        AllocatorConfig {
            metadata_url: "https://10.96.0.1/".to_string(),
            allocator_url: "http://127.0.0.1:7080".to_string(),
            token_file: None,
            networks_annotation: "app_net".to_string(),
        }
    }

    #[test]
    fn test_base_urls_trimmed() {
        let client = HttpAllocator::new(&config()).unwrap();
        assert_eq!(client.metadata_url, "https://10.96.0.1");
        assert!(client.token.is_none());
    }

    #[test]
    fn test_token_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  secret-token  ").unwrap();

        let mut config = config();
        config.token_file = Some(file.path().to_path_buf());

        let client = HttpAllocator::new(&config).unwrap();
        assert_eq!(client.token.as_deref(), Some("secret-token"));
    }

    #[test]
    fn test_missing_token_file() {
        let mut config = config();
        config.token_file = Some("/nonexistent/token".into());

        assert!(matches!(
            HttpAllocator::new(&config),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_request_body() {
        let networks = vec!["app-a".to_string()];
        let body = AllocationRequest {
            namespace: "default",
            name: "web",
            container_id: None,
            networks: &networks,
        };

        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"namespace": "default", "name": "web", "networks": ["app-a"]})
        );
    }
}
