//! Runs the compiled `deployer` binary with a controlled environment.

use mockito::Matcher;
use serde_json::json;
use std::path::Path;
use std::process::{Command, Output};

const DEPLOYMENT_PATH: &str = "/subscriptions/sub-123/resourcegroups/rg-test/providers/Microsoft.Resources/deployments/infrastructure-deployment";

fn deployer() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_deployer"));
    for var in [
        "AZURE_SUBSCRIPTION_ID",
        "AZURE_RESOURCE_GROUP",
        "BICEP_TEMPLATE_FILE",
        "BICEP_PARAMETERS_FILE",
        "AZURE_RESOURCE_MANAGER_ENDPOINT",
        "AZURE_ACCESS_TOKEN",
        "AZURE_TENANT_ID",
        "RUST_LOG",
    ] {
        command.env_remove(var);
    }
    command
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn write_file(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn deploy_command(endpoint: &str, template: &Path, parameters: &Path) -> Command {
    let mut command = deployer();
    command
        .arg("deploy")
        .env("AZURE_SUBSCRIPTION_ID", "sub-123")
        .env("AZURE_RESOURCE_GROUP", "rg-test")
        .env("BICEP_TEMPLATE_FILE", template)
        .env("BICEP_PARAMETERS_FILE", parameters)
        .env("AZURE_RESOURCE_MANAGER_ENDPOINT", endpoint)
        .env("AZURE_ACCESS_TOKEN", "test-token");
    command
}

#[test]
fn test_missing_subscription_exits_with_guidance() {
    let mut server = mockito::Server::new();
    let any_request = server
        .mock("PUT", Matcher::Any)
        .expect(0)
        .create();

    let output = deployer()
        .arg("deploy")
        .env("AZURE_RESOURCE_MANAGER_ENDPOINT", server.url())
        .env("AZURE_ACCESS_TOKEN", "test-token")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stderr = stderr_of(&output);
    assert!(stderr.contains("AZURE_SUBSCRIPTION_ID"));
    assert!(stderr.contains("export AZURE_SUBSCRIPTION_ID=<your-subscription-id>"));
    assert!(!stdout_of(&output).contains("Compiling"));
    any_request.assert();
}

#[test]
fn test_empty_subscription_is_rejected() {
    let output = deployer()
        .arg("deploy")
        .env("AZURE_SUBSCRIPTION_ID", "")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr_of(&output).contains("AZURE_SUBSCRIPTION_ID"));
}

#[test]
fn test_json_template_deploys_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let template = write_file(
        dir.path(),
        "azuredeploy.json",
        r#"{"contentVersion": "1.0.0.0", "resources": []}"#,
    );
    let parameters = write_file(
        dir.path(),
        "main.parameters.json",
        r#"{"parameters": {"environmentName": {"value": "dev"}}}"#,
    );

    let mut server = mockito::Server::new();
    let put = server
        .mock("PUT", DEPLOYMENT_PATH)
        .match_query(Matcher::UrlEncoded(
            "api-version".into(),
            "2021-04-01".into(),
        ))
        .match_header("authorization", "Bearer test-token")
        .match_body(Matcher::PartialJson(json!({
            "properties": {
                "mode": "Incremental",
                "template": {"contentVersion": "1.0.0.0"},
                "parameters": {"environmentName": {"value": "dev"}}
            }
        })))
        .with_status(200)
        .with_body(
            json!({
                "name": "infrastructure-deployment",
                "properties": {
                    "provisioningState": "Succeeded",
                    "outputs": {"url": {"type": "String", "value": "http://example"}}
                }
            })
            .to_string(),
        )
        .create();

    let output = deploy_command(&server.url(), &template, &parameters)
        .output()
        .unwrap();

    let stdout = stdout_of(&output);
    assert_eq!(
        output.status.code(),
        Some(0),
        "stdout: {}\nstderr: {}",
        stdout,
        stderr_of(&output)
    );
    assert!(stdout.contains("Succeeded"));
    assert!(stdout.contains("url: http://example"));
    put.assert();
}

#[test]
fn test_failed_deployment_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let template = write_file(dir.path(), "azuredeploy.json", r#"{"resources": []}"#);
    let parameters = write_file(dir.path(), "params.json", r#"{"parameters": {}}"#);

    let mut server = mockito::Server::new();
    let _put = server
        .mock("PUT", DEPLOYMENT_PATH)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            r#"{"properties": {"provisioningState": "Failed", "error": {"code": "DeploymentFailed", "message": "Quota exceeded"}}}"#,
        )
        .create();

    let output = deploy_command(&server.url(), &template, &parameters)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(stdout_of(&output).contains("Deployment completed: Failed"));
    assert!(stderr_of(&output).contains("Quota exceeded"));
}

#[cfg(unix)]
fn fake_az(dir: &Path, script: &str) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let bin = dir.join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    let az = write_file(&bin, "az", script);
    std::fs::set_permissions(&az, std::fs::Permissions::from_mode(0o755)).unwrap();
    bin
}

#[cfg(unix)]
#[test]
fn test_compilation_failure_exits_without_deploying() {
    let dir = tempfile::tempdir().unwrap();
    let bin = fake_az(
        dir.path(),
        "#!/bin/sh\necho 'main.bicep(2,5) : Error BCP018: Expected the \"=\" character at this location.' >&2\nexit 1\n",
    );
    let template = write_file(dir.path(), "main.bicep", "param location string\nresource");
    let parameters = write_file(dir.path(), "params.json", r#"{"parameters": {}}"#);

    let mut server = mockito::Server::new();
    let any_request = server.mock("PUT", Matcher::Any).expect(0).create();

    let output = deploy_command(&server.url(), &template, &parameters)
        .env("PATH", &bin)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr_of(&output).contains("Error BCP018"));
    assert!(!stdout_of(&output).contains("Starting deployment"));
    any_request.assert();
}

#[cfg(unix)]
#[test]
fn test_bicep_template_is_compiled_then_deployed() {
    let dir = tempfile::tempdir().unwrap();
    let bin = fake_az(
        dir.path(),
        "#!/bin/sh\necho '{\"contentVersion\": \"1.0.0.0\", \"resources\": [], \"metadata\": {\"compiledBy\": \"fake-az\"}}'\n",
    );
    let template = write_file(dir.path(), "main.bicep", "targetScope = 'resourceGroup'\n");
    let parameters = write_file(dir.path(), "params.json", r#"{"parameters": {}}"#);

    let mut server = mockito::Server::new();
    let put = server
        .mock("PUT", DEPLOYMENT_PATH)
        .match_query(Matcher::Any)
        .match_body(Matcher::PartialJson(json!({
            "properties": {"template": {"metadata": {"compiledBy": "fake-az"}}}
        })))
        .with_status(200)
        .with_body(r#"{"properties": {"provisioningState": "Succeeded"}}"#)
        .create();

    let output = deploy_command(&server.url(), &template, &parameters)
        .env("PATH", &bin)
        .output()
        .unwrap();

    assert_eq!(
        output.status.code(),
        Some(0),
        "stderr: {}",
        stderr_of(&output)
    );
    assert!(stdout_of(&output).contains("Deployment completed: Succeeded"));
    put.assert();
}

#[cfg(unix)]
#[test]
fn test_cli_token_is_requested_for_configured_tenant() {
    let dir = tempfile::tempdir().unwrap();
    let calls_log = dir.path().join("calls.log");
    let bin = fake_az(
        dir.path(),
        &format!(
            "#!/bin/sh\necho \"$@\" >> '{}'\necho '{{\"accessToken\": \"cli-token\", \"expiresOn\": \"2099-01-01 00:00:00.000000\"}}'\n",
            calls_log.display()
        ),
    );
    let template = write_file(dir.path(), "azuredeploy.json", r#"{"resources": []}"#);
    let parameters = write_file(dir.path(), "params.json", r#"{"parameters": {}}"#);

    let mut server = mockito::Server::new();
    let put = server
        .mock("PUT", DEPLOYMENT_PATH)
        .match_query(Matcher::Any)
        .match_header("authorization", "Bearer cli-token")
        .with_status(200)
        .with_body(r#"{"properties": {"provisioningState": "Succeeded"}}"#)
        .create();

    let output = deploy_command(&server.url(), &template, &parameters)
        .env_remove("AZURE_ACCESS_TOKEN")
        .env("AZURE_TENANT_ID", "tenant-1")
        .env("PATH", &bin)
        .output()
        .unwrap();

    assert_eq!(
        output.status.code(),
        Some(0),
        "stderr: {}",
        stderr_of(&output)
    );
    put.assert();

    let calls = std::fs::read_to_string(&calls_log).unwrap();
    assert_eq!(calls.lines().count(), 1);
    assert!(calls.contains("account get-access-token"));
    assert!(calls.contains("--tenant tenant-1"));
}

#[test]
fn test_track_prints_performance_record() {
    let start = chrono::Utc::now().timestamp() as f64 - 1.0;
    let output = deployer()
        .args(["track", "--start-time", &start.to_string()])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    let record: serde_json::Value = serde_json::from_str(&stdout_of(&output)).unwrap();
    assert_eq!(record["status"], "completed");
    assert_eq!(record["workflow_version"], "v1.0");
    assert_eq!(record["start_time"], json!(start));
    assert!(record["end_time"].as_f64().unwrap() >= start);
    assert!(record["total_execution_time_ms"].as_i64().unwrap() >= 0);
}

#[test]
fn test_track_rejects_non_numeric_start_time() {
    let output = deployer()
        .args(["track", "--start-time", "yesterday"])
        .output()
        .unwrap();

    assert!(!output.status.success());
}

#[test]
fn test_track_accepts_negative_start_time_in_both_spellings() {
    for args in [
        vec!["track", "--start-time", "-5"],
        vec!["track", "--start-time=-5"],
    ] {
        let output = deployer().args(&args).output().unwrap();

        assert_eq!(
            output.status.code(),
            Some(0),
            "args: {:?}\nstderr: {}",
            args,
            stderr_of(&output)
        );
        let record: serde_json::Value = serde_json::from_str(&stdout_of(&output)).unwrap();
        assert_eq!(record["start_time"], json!(-5.0));
    }
}

#[test]
fn test_track_rejects_future_start_time() {
    let start = chrono::Utc::now().timestamp() as f64 + 3600.0;
    let output = deployer()
        .args(["track", "--start-time", &start.to_string()])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr_of(&output).contains("later than end time"));
}
