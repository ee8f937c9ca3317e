use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Name used for every deployment submitted by the deployer
pub const DEFAULT_DEPLOYMENT_NAME: &str = "infrastructure-deployment";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeploymentMode {
    /// Only add or update the listed resources; leave everything else alone
    #[default]
    Incremental,
}

/// A deployment to submit to a resource group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRequest {
    pub subscription_id: String,
    pub resource_group: String,
    pub deployment_name: String,
    pub mode: DeploymentMode,
    pub template: serde_json::Value,
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl DeploymentRequest {
    pub fn new(
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        template: serde_json::Value,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            deployment_name: DEFAULT_DEPLOYMENT_NAME.to_string(),
            mode: DeploymentMode::Incremental,
            template,
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_deployment_name(mut self, deployment_name: impl Into<String>) -> Self {
        self.deployment_name = deployment_name.into();
        self
    }

    pub fn with_parameters(mut self, parameters: BTreeMap<String, serde_json::Value>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Parameters in the `{name: {"value": v}}` shape the control plane expects
    pub fn wire_parameters(&self) -> serde_json::Map<String, serde_json::Value> {
        self.parameters
            .iter()
            .map(|(name, value)| (name.clone(), serde_json::json!({ "value": value })))
            .collect()
    }
}

/// Provisioning state reported for a deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProvisioningState {
    Accepted,
    Running,
    Succeeded,
    Failed,
    Canceled,
    /// Any state this client does not know about, kept verbatim
    Other(String),
}

impl ProvisioningState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProvisioningState::Succeeded | ProvisioningState::Failed | ProvisioningState::Canceled
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProvisioningState::Succeeded)
    }

    pub fn as_str(&self) -> &str {
        match self {
            ProvisioningState::Accepted => "Accepted",
            ProvisioningState::Running => "Running",
            ProvisioningState::Succeeded => "Succeeded",
            ProvisioningState::Failed => "Failed",
            ProvisioningState::Canceled => "Canceled",
            ProvisioningState::Other(state) => state,
        }
    }
}

impl From<String> for ProvisioningState {
    fn from(state: String) -> Self {
        match state.to_ascii_lowercase().as_str() {
            "accepted" => ProvisioningState::Accepted,
            "running" => ProvisioningState::Running,
            "succeeded" => ProvisioningState::Succeeded,
            "failed" => ProvisioningState::Failed,
            "canceled" | "cancelled" => ProvisioningState::Canceled,
            _ => ProvisioningState::Other(state),
        }
    }
}

impl From<ProvisioningState> for String {
    fn from(state: ProvisioningState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared template output
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OutputValue {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub output_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl OutputValue {
    pub fn new(value: serde_json::Value) -> Self {
        Self {
            output_type: None,
            value: Some(value),
        }
    }

    /// Value as shown to a person: strings unquoted, `N/A` when absent
    pub fn display_value(&self) -> String {
        match &self.value {
            None | Some(serde_json::Value::Null) => "N/A".to_string(),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

/// Error detail attached to a failed deployment
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ErrorDetail {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<ErrorDetail>,
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        for detail in &self.details {
            write!(f, "; {}", detail)?;
        }
        Ok(())
    }
}

/// Deployment state as reported by the control plane
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeploymentResult {
    pub id: Option<String>,
    pub name: Option<String>,
    pub provisioning_state: ProvisioningState,
    pub outputs: BTreeMap<String, OutputValue>,
    pub error: Option<ErrorDetail>,
}

impl DeploymentResult {
    pub fn new(provisioning_state: ProvisioningState) -> Self {
        Self {
            id: None,
            name: None,
            provisioning_state,
            outputs: BTreeMap::new(),
            error: None,
        }
    }

    pub fn with_output(mut self, key: impl Into<String>, value: OutputValue) -> Self {
        self.outputs.insert(key.into(), value);
        self
    }

    pub fn with_error(mut self, error: ErrorDetail) -> Self {
        self.error = Some(error);
        self
    }
}

/// An accepted deployment that may still be running
#[derive(Debug, Clone)]
pub struct DeploymentOperation {
    /// Resource URL to poll
    pub url: String,
    /// Delay requested by the service before the next poll
    pub retry_after: Option<Duration>,
    /// Most recently observed state
    pub result: DeploymentResult,
}

impl DeploymentOperation {
    pub fn is_done(&self) -> bool {
        self.result.provisioning_state.is_terminal()
    }
}
