use crate::types::{DeploymentOperation, DeploymentRequest, DeploymentResult};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArmError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Resource manager returned {status} {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },
}

pub type ArmResult<T> = Result<T, ArmError>;

/// Submits deployments to a resource management control plane
#[async_trait]
pub trait DeploymentClient: Send + Sync {
    /// Submit the deployment; returns once the service has accepted it
    async fn begin_create_or_update(
        &self,
        request: &DeploymentRequest,
    ) -> ArmResult<DeploymentOperation>;

    /// Poll an accepted deployment until it reaches a terminal state
    async fn wait_for_completion(
        &self,
        operation: DeploymentOperation,
    ) -> ArmResult<DeploymentResult>;

    fn client_name(&self) -> &'static str;

    async fn create_or_update(&self, request: &DeploymentRequest) -> ArmResult<DeploymentResult> {
        let operation = self.begin_create_or_update(request).await?;
        self.wait_for_completion(operation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OutputValue, ProvisioningState};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockClient {
        polls: AtomicUsize,
    }

    #[async_trait]
    impl DeploymentClient for MockClient {
        async fn begin_create_or_update(
            &self,
            request: &DeploymentRequest,
        ) -> ArmResult<DeploymentOperation> {
            Ok(DeploymentOperation {
                url: format!("mock://{}/{}", request.resource_group, request.deployment_name),
                retry_after: None,
                result: DeploymentResult::new(ProvisioningState::Accepted),
            })
        }

        async fn wait_for_completion(
            &self,
            operation: DeploymentOperation,
        ) -> ArmResult<DeploymentResult> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(operation.url, "mock://rg/infrastructure-deployment");
            Ok(DeploymentResult::new(ProvisioningState::Succeeded)
                .with_output("url", OutputValue::new(serde_json::json!("http://example"))))
        }

        fn client_name(&self) -> &'static str {
            "mock"
        }
    }

    #[tokio::test]
    async fn test_create_or_update_waits_for_completion() {
        let client = MockClient {
            polls: AtomicUsize::new(0),
        };
        let request = DeploymentRequest::new("sub", "rg", serde_json::json!({}));

        let result = client.create_or_update(&request).await.unwrap();
        assert_eq!(result.provisioning_state, ProvisioningState::Succeeded);
        assert_eq!(result.outputs["url"].display_value(), "http://example");
        assert_eq!(client.polls.load(Ordering::SeqCst), 1);
        assert_eq!(client.client_name(), "mock");
    }

    #[test]
    fn test_api_error_display() {
        let err = ArmError::Api {
            status: 400,
            code: "InvalidTemplateDeployment".to_string(),
            message: "The template deployment is not valid".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Resource manager returned 400 InvalidTemplateDeployment: The template deployment is not valid"
        );
    }
}
