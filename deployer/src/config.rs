//! Deployment settings read once from the environment at startup.

use arm::DEFAULT_DEPLOYMENT_NAME;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub const RESOURCE_GROUP_VAR: &str = "AZURE_RESOURCE_GROUP";
pub const SUBSCRIPTION_ID_VAR: &str = "AZURE_SUBSCRIPTION_ID";
pub const TEMPLATE_FILE_VAR: &str = "BICEP_TEMPLATE_FILE";
pub const PARAMETERS_FILE_VAR: &str = "BICEP_PARAMETERS_FILE";
pub const ENDPOINT_VAR: &str = "AZURE_RESOURCE_MANAGER_ENDPOINT";
pub const ACCESS_TOKEN_VAR: &str = "AZURE_ACCESS_TOKEN";
pub const TENANT_ID_VAR: &str = "AZURE_TENANT_ID";

pub const DEFAULT_RESOURCE_GROUP: &str = "rg-agentic-waf";
pub const DEFAULT_TEMPLATE_FILE: &str = "infra/bicep/main.bicep";
pub const DEFAULT_PARAMETERS_FILE: &str = "infra/bicep/main.parameters.json";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} environment variable is required")]
    MissingVariable { name: &'static str },
}

impl ConfigError {
    /// What the user should do to fix the problem
    pub fn remediation(&self) -> String {
        match self {
            ConfigError::MissingVariable { name } if *name == SUBSCRIPTION_ID_VAR => {
                format!("Set it with: export {}=<your-subscription-id>", name)
            }
            ConfigError::MissingVariable { name } => {
                format!("Set it with: export {}=<value>", name)
            }
        }
    }
}

#[derive(Clone)]
pub struct DeployConfig {
    pub subscription_id: String,
    pub resource_group: String,
    pub template_file: PathBuf,
    pub parameters_file: PathBuf,
    pub deployment_name: String,
    /// Resource manager endpoint; `None` uses the public cloud
    pub endpoint: Option<String>,
    /// Pre-issued bearer token; `None` falls back to the Azure CLI login
    pub access_token: Option<String>,
    /// Tenant passed to the Azure CLI when requesting a token
    pub tenant_id: Option<String>,
}

impl fmt::Debug for DeployConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeployConfig")
            .field("subscription_id", &self.subscription_id)
            .field("resource_group", &self.resource_group)
            .field("template_file", &self.template_file)
            .field("parameters_file", &self.parameters_file)
            .field("deployment_name", &self.deployment_name)
            .field("endpoint", &self.endpoint)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}

impl DeployConfig {
    /// Read settings from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.is_empty());

        let subscription_id = get(SUBSCRIPTION_ID_VAR).ok_or(ConfigError::MissingVariable {
            name: SUBSCRIPTION_ID_VAR,
        })?;

        Ok(Self {
            subscription_id,
            resource_group: get(RESOURCE_GROUP_VAR)
                .unwrap_or_else(|| DEFAULT_RESOURCE_GROUP.to_string()),
            template_file: get(TEMPLATE_FILE_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMPLATE_FILE)),
            parameters_file: get(PARAMETERS_FILE_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PARAMETERS_FILE)),
            deployment_name: DEFAULT_DEPLOYMENT_NAME.to_string(),
            endpoint: get(ENDPOINT_VAR),
            access_token: get(ACCESS_TOKEN_VAR),
            tenant_id: get(TENANT_ID_VAR),
        })
    }

    pub fn with_resource_group(mut self, resource_group: impl Into<String>) -> Self {
        self.resource_group = resource_group.into();
        self
    }

    pub fn with_template_file(mut self, template_file: impl Into<PathBuf>) -> Self {
        self.template_file = template_file.into();
        self
    }

    pub fn with_parameters_file(mut self, parameters_file: impl Into<PathBuf>) -> Self {
        self.parameters_file = parameters_file.into();
        self
    }
}
