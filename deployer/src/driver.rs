//! Compile, submit, wait, report.
//!
//! The driver runs the whole deployment sequence once. Every step is fatal on
//! failure and nothing is retried here.

use crate::config::{ConfigError, DeployConfig};
use arm::{ArmError, DeploymentClient, DeploymentRequest, DeploymentResult};
use std::io::Write;
use template_builder::{load_parameters, ParameterValues, TemplateCompiler, TemplateError};
use thiserror::Error;
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum DriverError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("Deployment request failed: {0}")]
    Arm(#[from] ArmError),

    #[error("Deployment '{name}' finished with state {state}{}", detail_suffix(.detail))]
    DeploymentNotSucceeded {
        name: String,
        state: String,
        detail: Option<String>,
    },

    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail
        .as_deref()
        .map(|d| format!(": {}", d))
        .unwrap_or_default()
}

impl DriverError {
    /// Follow-up guidance printed after the error message
    pub fn remediation(&self) -> Option<String> {
        match self {
            DriverError::Config(err) => Some(err.remediation()),
            DriverError::Arm(ArmError::Authentication { .. }) => Some(
                "Sign in with 'az login' or set AZURE_ACCESS_TOKEN to a resource manager token"
                    .to_string(),
            ),
            DriverError::Template(TemplateError::ToolUnavailable { .. }) => Some(
                "Install the Azure CLI and run 'az bicep install', or pass an ARM JSON template"
                    .to_string(),
            ),
            _ => None,
        }
    }
}

pub type DriverResult<T> = Result<T, DriverError>;

pub struct DeploymentDriver<'a> {
    config: DeployConfig,
    compiler: &'a dyn TemplateCompiler,
    client: &'a dyn DeploymentClient,
}

impl<'a> DeploymentDriver<'a> {
    pub fn new(
        config: DeployConfig,
        compiler: &'a dyn TemplateCompiler,
        client: &'a dyn DeploymentClient,
    ) -> Self {
        Self {
            config,
            compiler,
            client,
        }
    }

    /// Incremental-mode request for the configured target
    pub fn build_request(
        &self,
        template: serde_json::Value,
        parameters: ParameterValues,
    ) -> DeploymentRequest {
        DeploymentRequest::new(
            self.config.subscription_id.clone(),
            self.config.resource_group.clone(),
            template,
        )
        .with_deployment_name(self.config.deployment_name.clone())
        .with_parameters(parameters)
    }

    /// Run the deployment, writing progress and the final summary to `out`
    pub async fn run<W: Write>(&self, out: &mut W) -> DriverResult<DeploymentResult> {
        writeln!(out, "Initializing Azure deployment...")?;

        let template_file = &self.config.template_file;
        writeln!(out, "Compiling {}...", template_file.display())?;
        let template = self.compiler.compile(template_file).await.map_err(|e| {
            error!("Template compilation failed: {}", e);
            e
        })?;

        let parameters = load_parameters(&self.config.parameters_file).await?;
        info!(
            "Loaded {} parameters from {}",
            parameters.len(),
            self.config.parameters_file.display()
        );

        let request = self.build_request(template, parameters);

        writeln!(
            out,
            "Starting deployment '{}' to resource group '{}'...",
            request.deployment_name, request.resource_group
        )?;
        out.flush()?;

        let operation = self.client.begin_create_or_update(&request).await?;

        writeln!(out, "Deployment started. Waiting for completion...")?;
        out.flush()?;

        let result = self.client.wait_for_completion(operation).await?;

        write_summary(out, &result)?;

        if !result.provisioning_state.is_success() {
            return Err(DriverError::DeploymentNotSucceeded {
                name: request.deployment_name,
                state: result.provisioning_state.to_string(),
                detail: result.error.as_ref().map(ToString::to_string),
            });
        }

        Ok(result)
    }
}

/// Terminal state plus one `  key: value` line per declared output
pub fn write_summary<W: Write>(out: &mut W, result: &DeploymentResult) -> std::io::Result<()> {
    let marker = if result.provisioning_state.is_success() {
        "✓"
    } else {
        "✗"
    };
    writeln!(
        out,
        "\n{} Deployment completed: {}",
        marker, result.provisioning_state
    )?;

    if !result.outputs.is_empty() {
        writeln!(out, "\nOutputs:")?;
        for (key, value) in &result.outputs {
            writeln!(out, "  {}: {}", key, value.display_value())?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arm::{ErrorDetail, OutputValue, ProvisioningState};
    use serde_json::json;

    #[test]
    fn test_summary_with_outputs() {
        let result = DeploymentResult::new(ProvisioningState::Succeeded)
            .with_output("url", OutputValue::new(json!("http://example")))
            .with_output("replicas", OutputValue::new(json!(3)))
            .with_output("secret", OutputValue::default());

        let mut out = Vec::new();
        write_summary(&mut out, &result).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("✓ Deployment completed: Succeeded"));
        assert!(text.contains("\nOutputs:\n"));
        assert!(text.contains("  url: http://example\n"));
        assert!(text.contains("  replicas: 3\n"));
        assert!(text.contains("  secret: N/A\n"));
    }

    #[test]
    fn test_summary_without_outputs() {
        let result = DeploymentResult::new(ProvisioningState::Failed);
        let mut out = Vec::new();
        write_summary(&mut out, &result).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("✗ Deployment completed: Failed"));
        assert!(!text.contains("Outputs:"));
    }

    #[test]
    fn test_not_succeeded_message() {
        let err = DriverError::DeploymentNotSucceeded {
            name: "infrastructure-deployment".to_string(),
            state: "Failed".to_string(),
            detail: Some(
                ErrorDetail {
                    code: "DeploymentFailed".to_string(),
                    message: "boom".to_string(),
                    details: vec![],
                }
                .to_string(),
            ),
        };
        assert_eq!(
            err.to_string(),
            "Deployment 'infrastructure-deployment' finished with state Failed: DeploymentFailed: boom"
        );

        let err = DriverError::DeploymentNotSucceeded {
            name: "infrastructure-deployment".to_string(),
            state: "Canceled".to_string(),
            detail: None,
        };
        assert_eq!(
            err.to_string(),
            "Deployment 'infrastructure-deployment' finished with state Canceled"
        );
    }

    #[test]
    fn test_remediation() {
        let err = DriverError::from(ConfigError::MissingVariable {
            name: crate::config::SUBSCRIPTION_ID_VAR,
        });
        assert!(err.to_string().contains("AZURE_SUBSCRIPTION_ID"));
        assert!(err.remediation().unwrap().contains("export AZURE_SUBSCRIPTION_ID"));

        let err = DriverError::from(TemplateError::CompilationFailed {
            stderr: "bad".to_string(),
        });
        assert!(err.remediation().is_none());
    }
}
