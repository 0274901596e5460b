//! Client for the cluster cleanup service (drain / uncordon)

use crate::error::{CollaboratorError, Result};
use crate::models::ManagedNode;
use anyhow::Context;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use url::Url;

#[derive(Debug, Serialize)]
struct NodeRequest<'a> {
    node_name: &'a str,
}

/// HTTP client for the service that drains and uncordons nodes
pub struct SchedulerClient {
    client: Client,
    base_url: Url,
}

impl SchedulerClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid cleanup service URL")?;

        Ok(Self { client, base_url })
    }

    /// Evacuate workloads from `node`
    pub async fn drain(&self, node: ManagedNode) -> Result<serde_json::Value> {
        self.post("drain", node).await
    }

    /// Mark `node` schedulable again
    pub async fn uncordon(&self, node: ManagedNode) -> Result<serde_json::Value> {
        self.post("uncordon", node).await
    }

    fn endpoint(&self, operation: &str) -> String {
        format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), operation)
    }

    async fn post(&self, operation: &str, node: ManagedNode) -> Result<serde_json::Value> {
        let response = self
            .client
            .post(self.endpoint(operation))
            .json(&NodeRequest {
                node_name: node.name(),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Status { status, body });
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use mockito::Matcher;

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let client = SchedulerClient::new("http://cleanup.local:8000/").unwrap();
        assert_eq!(client.endpoint("drain"), "http://cleanup.local:8000/drain");

        let client = SchedulerClient::new("http://cleanup.local:8000/api").unwrap();
        assert_eq!(client.endpoint("uncordon"), "http://cleanup.local:8000/api/uncordon");
    }

    #[tokio::test]
    async fn test_drain_posts_node_name() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/drain")
            .match_body(Matcher::Json(serde_json::json!({"node_name": "cillium3"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"drained"}"#)
            .create_async()
            .await;

        let client = SchedulerClient::new(&server.url()).unwrap();
        let response = client.drain(ManagedNode::A).await.unwrap();

        assert_eq!(response["status"], "drained");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_uncordon_failure_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/uncordon")
            .with_status(500)
            .with_body("kube api unavailable")
            .create_async()
            .await;

        let client = SchedulerClient::new(&server.url()).unwrap();
        let err = client.uncordon(ManagedNode::B).await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::Transient);
        assert!(err.to_string().contains("kube api unavailable"));
    }
}
