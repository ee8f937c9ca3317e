use arm::{
    ArmConfig, AzureCliCredential, ResourceManagerClient, StaticTokenCredential, TokenCredential,
};
use clap::{Parser, Subcommand};
use deployer::{track_performance, DeployConfig, DeploymentDriver, DriverResult};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use template_builder::BicepCompiler;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "deployer")]
#[command(about = "Deploy Bicep infrastructure to Azure and track workflow performance")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile the Bicep template and deploy it to a resource group
    Deploy {
        /// Target resource group (overrides AZURE_RESOURCE_GROUP)
        #[arg(long)]
        resource_group: Option<String>,
        /// Template file (overrides BICEP_TEMPLATE_FILE)
        #[arg(long)]
        template: Option<PathBuf>,
        /// Parameters file (overrides BICEP_PARAMETERS_FILE)
        #[arg(long)]
        parameters: Option<PathBuf>,
    },
    /// Print the performance record of a workflow that started at the given time
    Track {
        /// Workflow start time in seconds since the Unix epoch
        #[arg(long, allow_negative_numbers = true)]
        start_time: f64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Deploy {
            resource_group,
            template,
            parameters,
        } => match deploy(resource_group, template, parameters).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("Deployment failed: {}", e);
                eprintln!("Error: {}", e);
                if let Some(remediation) = e.remediation() {
                    eprintln!("{}", remediation);
                }
                ExitCode::FAILURE
            }
        },
        Commands::Track { start_time } => match track(start_time) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: {}", e);
                ExitCode::FAILURE
            }
        },
    }
}

async fn deploy(
    resource_group: Option<String>,
    template: Option<PathBuf>,
    parameters: Option<PathBuf>,
) -> DriverResult<()> {
    let mut config = DeployConfig::from_env()?;
    if let Some(resource_group) = resource_group {
        config = config.with_resource_group(resource_group);
    }
    if let Some(template) = template {
        config = config.with_template_file(template);
    }
    if let Some(parameters) = parameters {
        config = config.with_parameters_file(parameters);
    }

    let credential: Arc<dyn TokenCredential> = match &config.access_token {
        Some(token) => Arc::new(StaticTokenCredential::new(token.clone())),
        None => {
            let mut cli = AzureCliCredential::new();
            if let Some(tenant_id) = &config.tenant_id {
                cli = cli.with_tenant_id(tenant_id.clone());
            }
            Arc::new(cli)
        }
    };

    let mut arm_config = ArmConfig::default();
    if let Some(endpoint) = &config.endpoint {
        arm_config = arm_config.with_endpoint(endpoint.clone());
    }

    info!(
        "Deploying {} to {}/{}",
        config.template_file.display(),
        config.subscription_id,
        config.resource_group
    );

    let client = ResourceManagerClient::new(arm_config, credential)?;
    let compiler = BicepCompiler::new();
    let driver = DeploymentDriver::new(config, &compiler, &client);

    let mut stdout = io::stdout().lock();
    driver.run(&mut stdout).await?;

    Ok(())
}

fn track(start_time: f64) -> Result<(), Box<dyn std::error::Error>> {
    let record = track_performance(start_time)?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
