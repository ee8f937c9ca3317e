//! Bicep compilation through the Azure CLI.
//!
//! The compiler shells out to `az bicep build --file <path> --stdout` and
//! parses the ARM JSON document the tool writes to stdout. Templates that
//! are already ARM JSON (`*.json`) are read as-is.

use crate::{TemplateError, TemplateResult};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, error, info};

/// Turns a template file into a structured ARM template document
#[async_trait]
pub trait TemplateCompiler: Send + Sync {
    async fn compile(&self, template_path: &Path) -> TemplateResult<serde_json::Value>;

    fn compiler_name(&self) -> &'static str;
}

/// Compiles Bicep templates with an external build tool
#[derive(Debug, Clone)]
pub struct BicepCompiler {
    /// Program to invoke
    program: String,
    /// Arguments placed before `--file <path> --stdout`
    subcommand: Vec<String>,
    /// Read `*.json` templates directly instead of invoking the tool
    passthrough_json: bool,
}

impl Default for BicepCompiler {
    fn default() -> Self {
        Self {
            program: "az".to_string(),
            subcommand: vec!["bicep".to_string(), "build".to_string()],
            passthrough_json: true,
        }
    }
}

impl BicepCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different build program, e.g. the standalone `bicep` binary
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_subcommand<I, S>(mut self, subcommand: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subcommand = subcommand.into_iter().map(Into::into).collect();
        self
    }

    /// Always run the build tool, even for `*.json` templates
    pub fn without_json_passthrough(mut self) -> Self {
        self.passthrough_json = false;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Full argument list handed to the build program
    pub fn build_args(&self, template_path: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.subcommand.iter().map(OsString::from).collect();
        args.push("--file".into());
        args.push(template_path.as_os_str().to_owned());
        args.push("--stdout".into());
        args
    }

    fn is_json_template(&self, template_path: &Path) -> bool {
        self.passthrough_json
            && template_path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
    }

    async fn read_json_template(template_path: &Path) -> TemplateResult<serde_json::Value> {
        let contents =
            tokio::fs::read_to_string(template_path)
                .await
                .map_err(|source| TemplateError::Read {
                    path: template_path.to_path_buf(),
                    source,
                })?;
        parse_template(template_path, &contents)
    }

    async fn run_build_tool(&self, template_path: &Path) -> TemplateResult<serde_json::Value> {
        let args = self.build_args(template_path);
        debug!("Running {} {:?}", self.program, args);

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .await
            .map_err(|e| TemplateError::ToolUnavailable {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            error!(
                "{} exited with {} while compiling {}",
                self.program,
                output.status,
                template_path.display()
            );
            return Err(TemplateError::CompilationFailed { stderr });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_template(template_path, &stdout)
    }
}

fn parse_template(template_path: &Path, contents: &str) -> TemplateResult<serde_json::Value> {
    let document: serde_json::Value =
        serde_json::from_str(contents).map_err(|e| TemplateError::InvalidTemplate {
            path: template_path.to_path_buf(),
            reason: e.to_string(),
        })?;

    if !document.is_object() {
        return Err(TemplateError::InvalidTemplate {
            path: template_path.to_path_buf(),
            reason: "template must be a JSON object".to_string(),
        });
    }

    Ok(document)
}

#[async_trait]
impl TemplateCompiler for BicepCompiler {
    async fn compile(&self, template_path: &Path) -> TemplateResult<serde_json::Value> {
        let template = if self.is_json_template(template_path) {
            debug!("Reading ARM JSON template {}", template_path.display());
            Self::read_json_template(template_path).await?
        } else {
            self.run_build_tool(template_path).await?
        };

        info!("Compiled template {}", template_path.display());
        Ok(template)
    }

    fn compiler_name(&self) -> &'static str {
        "bicep"
    }
}
