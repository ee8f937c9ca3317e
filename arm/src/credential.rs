//! Bearer token sources for the resource manager.

use crate::client::{ArmError, ArmResult};
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct AccessToken {
    pub token: String,
    /// `None` when the source does not report an expiry
    pub expires_on: Option<DateTime<Utc>>,
}

impl AccessToken {
    /// Whether the token expires within `margin` of now
    pub fn expires_within(&self, margin: Duration) -> bool {
        let Some(expires_on) = self.expires_on else {
            return false;
        };
        let margin = chrono::Duration::from_std(margin).unwrap_or(chrono::Duration::zero());
        expires_on - margin <= Utc::now()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

#[async_trait]
pub trait TokenCredential: Send + Sync {
    /// Obtain a token valid for `resource` (e.g. `https://management.azure.com/`)
    async fn get_token(&self, resource: &str) -> ArmResult<AccessToken>;
}

/// A pre-issued token, e.g. from `AZURE_ACCESS_TOKEN`
pub struct StaticTokenCredential {
    token: String,
}

impl StaticTokenCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenCredential for StaticTokenCredential {
    async fn get_token(&self, _resource: &str) -> ArmResult<AccessToken> {
        Ok(AccessToken {
            token: self.token.clone(),
            expires_on: None,
        })
    }
}

#[derive(Deserialize)]
struct CliTokenResponse {
    #[serde(rename = "accessToken")]
    access_token: String,
    /// Local time, e.g. `2026-10-18 13:45:00.000000`
    #[serde(rename = "expiresOn")]
    expires_on_local: Option<String>,
    /// Unix seconds; only reported by newer CLI releases
    #[serde(rename = "expires_on")]
    expires_on_unix: Option<i64>,
}

impl CliTokenResponse {
    fn expiry(&self) -> Option<DateTime<Utc>> {
        if let Some(seconds) = self.expires_on_unix {
            return Utc.timestamp_opt(seconds, 0).single();
        }
        let local = self.expires_on_local.as_deref()?;
        let naive = NaiveDateTime::parse_from_str(local, "%Y-%m-%d %H:%M:%S%.f").ok()?;
        Local
            .from_local_datetime(&naive)
            .single()
            .map(|time| time.with_timezone(&Utc))
    }
}

/// Uses the signed-in Azure CLI account
#[derive(Debug, Clone)]
pub struct AzureCliCredential {
    program: String,
    tenant_id: Option<String>,
}

impl Default for AzureCliCredential {
    fn default() -> Self {
        Self {
            program: "az".to_string(),
            tenant_id: None,
        }
    }
}

impl AzureCliCredential {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    fn build_args(&self, resource: &str) -> Vec<String> {
        let mut args = vec![
            "account".to_string(),
            "get-access-token".to_string(),
            "--output".to_string(),
            "json".to_string(),
            "--resource".to_string(),
            resource.to_string(),
        ];
        if let Some(tenant_id) = &self.tenant_id {
            args.push("--tenant".to_string());
            args.push(tenant_id.clone());
        }
        args
    }

    fn parse_token(stdout: &str) -> ArmResult<AccessToken> {
        let response: CliTokenResponse = serde_json::from_str(stdout)?;
        let expires_on = response.expiry();
        if expires_on.is_none() {
            warn!("Azure CLI token has no readable expiry");
        }
        Ok(AccessToken {
            token: response.access_token,
            expires_on,
        })
    }
}

#[async_trait]
impl TokenCredential for AzureCliCredential {
    async fn get_token(&self, resource: &str) -> ArmResult<AccessToken> {
        debug!("Requesting access token for {} from Azure CLI", resource);

        let output = Command::new(&self.program)
            .args(self.build_args(resource))
            .output()
            .await
            .map_err(|e| ArmError::Authentication {
                message: format!("Failed to run '{}': {}", self.program, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("Azure CLI token request failed: {}", stderr.trim());
            return Err(ArmError::Authentication {
                message: format!(
                    "Azure CLI could not issue a token ({}). Run 'az login' first.",
                    stderr.trim()
                ),
            });
        }

        Self::parse_token(&String::from_utf8_lossy(&output.stdout))
    }
}
