use crate::client::{ArmError, ArmResult, DeploymentClient};
use crate::config::ArmConfig;
use crate::credential::{AccessToken, TokenCredential};
use crate::types::{
    DeploymentMode, DeploymentOperation, DeploymentRequest, DeploymentResult, ErrorDetail,
    OutputValue, ProvisioningState,
};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Tokens this close to expiry are refreshed before use
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(300);

#[derive(Serialize)]
struct ArmDeploymentBody<'a> {
    properties: ArmDeploymentProperties<'a>,
}

#[derive(Serialize)]
struct ArmDeploymentProperties<'a> {
    mode: DeploymentMode,
    template: &'a serde_json::Value,
    parameters: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct ArmDeploymentResponse {
    id: Option<String>,
    name: Option<String>,
    #[serde(default)]
    properties: ArmDeploymentResponseProperties,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ArmDeploymentResponseProperties {
    provisioning_state: Option<String>,
    #[serde(default)]
    outputs: Option<BTreeMap<String, OutputValue>>,
    error: Option<ErrorDetail>,
}

#[derive(Deserialize)]
struct ArmErrorResponse {
    error: ErrorDetail,
}

/// Deployment client for the Azure Resource Manager REST API
pub struct ResourceManagerClient {
    http_client: reqwest::Client,
    endpoint: String,
    config: ArmConfig,
    credential: Arc<dyn TokenCredential>,
    cached_token: Mutex<Option<AccessToken>>,
}

impl ResourceManagerClient {
    pub fn new(config: ArmConfig, credential: Arc<dyn TokenCredential>) -> ArmResult<Self> {
        config
            .validate()
            .map_err(|message| ArmError::InvalidConfig { message })?;

        let endpoint = config.endpoint.trim_end_matches('/').to_string();

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ArmError::InvalidConfig {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http_client,
            endpoint,
            config,
            credential,
            cached_token: Mutex::new(None),
        })
    }

    pub fn deployment_url(&self, request: &DeploymentRequest) -> String {
        format!(
            "{}/subscriptions/{}/resourcegroups/{}/providers/Microsoft.Resources/deployments/{}",
            self.endpoint, request.subscription_id, request.resource_group, request.deployment_name
        )
    }

    fn build_request_body(request: &DeploymentRequest) -> ArmDeploymentBody<'_> {
        ArmDeploymentBody {
            properties: ArmDeploymentProperties {
                mode: request.mode,
                template: &request.template,
                parameters: request.wire_parameters(),
            },
        }
    }

    fn parse_response(response: ArmDeploymentResponse) -> DeploymentResult {
        let provisioning_state = response
            .properties
            .provisioning_state
            .map(ProvisioningState::from)
            .unwrap_or(ProvisioningState::Accepted);

        DeploymentResult {
            id: response.id,
            name: response.name,
            provisioning_state,
            outputs: response.properties.outputs.unwrap_or_default(),
            error: response.properties.error,
        }
    }

    fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
        headers
            .get(RETRY_AFTER)?
            .to_str()
            .ok()?
            .trim()
            .parse::<u64>()
            .ok()
            .map(Duration::from_secs)
    }

    fn map_send_error(e: reqwest::Error) -> ArmError {
        if e.is_timeout() {
            ArmError::ServiceUnavailable {
                message: "Request timeout".to_string(),
            }
        } else if e.is_connect() {
            ArmError::ServiceUnavailable {
                message: "Cannot connect to the resource manager".to_string(),
            }
        } else {
            ArmError::Network(e)
        }
    }

    fn map_error_status(status: reqwest::StatusCode, body: &str) -> ArmError {
        let detail = serde_json::from_str::<ArmErrorResponse>(body)
            .map(|response| response.error)
            .unwrap_or_else(|_| ErrorDetail {
                code: status
                    .canonical_reason()
                    .unwrap_or("Unknown")
                    .replace(' ', ""),
                message: body.to_string(),
                details: vec![],
            });

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return ArmError::Authentication {
                message: detail.to_string(),
            };
        }

        ArmError::Api {
            status: status.as_u16(),
            code: detail.code,
            message: detail.message,
        }
    }

    async fn read_deployment(
        response: reqwest::Response,
    ) -> ArmResult<(DeploymentResult, Option<Duration>)> {
        let status = response.status();
        let retry_after = Self::parse_retry_after(response.headers());

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = Self::map_error_status(status, &body);
            error!("Resource manager request failed: {}", err);
            return Err(err);
        }

        let body = response.text().await.map_err(ArmError::Network)?;
        let parsed: ArmDeploymentResponse = serde_json::from_str(&body)?;
        Ok((Self::parse_response(parsed), retry_after))
    }

    async fn bearer_token(&self) -> ArmResult<String> {
        let mut cached = self.cached_token.lock().await;
        if let Some(token) = cached.as_ref() {
            if !token.expires_within(TOKEN_REFRESH_MARGIN) {
                return Ok(token.token.clone());
            }
            debug!("Cached access token is close to expiry; refreshing");
        }

        let token = self
            .credential
            .get_token(&self.config.token_resource())
            .await?;
        let bearer = token.token.clone();
        *cached = Some(token);
        Ok(bearer)
    }

    async fn get_deployment(&self, url: &str) -> ArmResult<(DeploymentResult, Option<Duration>)> {
        let token = self.bearer_token().await?;
        let response = self
            .http_client
            .get(url)
            .query(&[("api-version", self.config.api_version.as_str())])
            .bearer_auth(token)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        Self::read_deployment(response).await
    }
}

#[async_trait]
impl DeploymentClient for ResourceManagerClient {
    async fn begin_create_or_update(
        &self,
        request: &DeploymentRequest,
    ) -> ArmResult<DeploymentOperation> {
        let url = self.deployment_url(request);
        debug!(
            "Submitting deployment {} ({:?}) to {}",
            request.deployment_name, request.mode, url
        );

        let token = self.bearer_token().await?;
        let body = Self::build_request_body(request);

        let response = self
            .http_client
            .put(&url)
            .query(&[("api-version", self.config.api_version.as_str())])
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        let (result, retry_after) = Self::read_deployment(response).await?;

        info!(
            "Deployment {} accepted with state {}",
            request.deployment_name, result.provisioning_state
        );

        Ok(DeploymentOperation {
            url,
            retry_after,
            result,
        })
    }

    async fn wait_for_completion(
        &self,
        mut operation: DeploymentOperation,
    ) -> ArmResult<DeploymentResult> {
        while !operation.is_done() {
            let delay = operation.retry_after.unwrap_or(self.config.poll_interval);
            debug!(
                "Deployment state {}; polling again in {:?}",
                operation.result.provisioning_state, delay
            );
            tokio::time::sleep(delay).await;

            let (result, retry_after) = self.get_deployment(&operation.url).await?;
            operation.result = result;
            operation.retry_after = retry_after;
        }

        info!(
            "Deployment reached terminal state {}",
            operation.result.provisioning_state
        );
        Ok(operation.result)
    }

    fn client_name(&self) -> &'static str {
        "azure-resource-manager"
    }
}
