pub mod client;
pub mod config;
pub mod credential;
pub mod resource_manager;
pub mod types;

pub use client::{ArmError, ArmResult, DeploymentClient};
pub use config::ArmConfig;
pub use credential::{AccessToken, AzureCliCredential, StaticTokenCredential, TokenCredential};
pub use resource_manager::ResourceManagerClient;
pub use types::{
    DeploymentMode, DeploymentOperation, DeploymentRequest, DeploymentResult, ErrorDetail,
    OutputValue, ProvisioningState, DEFAULT_DEPLOYMENT_NAME,
};
