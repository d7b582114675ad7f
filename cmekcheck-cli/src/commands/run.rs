//! `cmekcheck run` command handler

use std::io::Write;
use std::sync::Arc;

use tracing::info;

use cmekcheck_core::config::CmekCheckConfig;
use cmekcheck_core::naming::RandomIdGenerator;
use cmekcheck_core::types::IdentityContext;
use cmekcheck_key_hierarchy::RestKmsClient;
use cmekcheck_protected_secret::RestSecretManagerClient;
use cmekcheck_transport::{
    Credentials, ImpersonatedCredentials, RestTransport, SourceToken, build_client,
};
use cmekcheck_workflow::{CmekWorkflow, WorkflowReport};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};
use crate::outputs::TerraformOutputs;

/// Execute the `run` command.
pub async fn execute(
    args: RunArgs,
    mut config: CmekCheckConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    apply_run_args(&mut config, &args).await?;
    config.validate()?;
    let identity = config.identity()?;

    info!(
        project = identity.project_id.as_str(),
        target_account = identity.impersonate_service_account.as_str(),
        location = config.kms.location.as_str(),
        deadline_secs = config.retry.deadline_secs,
        "starting cmek provisioning workflow"
    );

    let transport = build_transport(&config, &identity).await?;
    let kms = Arc::new(RestKmsClient::new(
        transport.clone(),
        config.kms.endpoint.clone(),
    ));
    let secrets = Arc::new(RestSecretManagerClient::new(
        transport,
        config.secret_manager.endpoint.clone(),
    ));
    let ids = Arc::new(RandomIdGenerator::new(config.naming.suffix_len));

    let workflow = CmekWorkflow::from_clients(&config, identity, kms, secrets, ids);
    let report = workflow.run().await?;

    writer.render(&report)?;
    Ok(())
}

/// Apply `run` flags on top of the loaded configuration.
///
/// Terraform outputs are applied first so explicit flags win.
async fn apply_run_args(config: &mut CmekCheckConfig, args: &RunArgs) -> Result<(), CliError> {
    if let Some(path) = &args.terraform_outputs {
        let outputs = TerraformOutputs::load(path).await?;
        info!(path = %path.display(), "identity loaded from terraform outputs");
        config.identity.project_id = outputs.project_id;
        config.identity.impersonate_service_account = outputs.service_account_email;
    }
    if let Some(project_id) = &args.project_id {
        config.identity.project_id = project_id.clone();
    }
    if let Some(account) = &args.impersonate {
        config.identity.impersonate_service_account = account.clone();
    }
    if let Some(location) = &args.location {
        config.kms.location = location.clone();
    }
    if let Some(deadline_secs) = args.deadline_secs {
        config.retry.deadline_secs = deadline_secs;
    }
    Ok(())
}

/// Build the shared REST transport authenticated as the impersonated account.
async fn build_transport(
    config: &CmekCheckConfig,
    identity: &IdentityContext,
) -> Result<RestTransport, CliError> {
    let source = SourceToken::adc()
        .await
        .map_err(|e| CliError::Credentials(e.to_string()))?;
    let client = build_client(config.http.request_timeout())
        .map_err(|e| CliError::Credentials(e.to_string()))?;

    let credentials = Credentials::Impersonated(ImpersonatedCredentials::new(
        source,
        identity.impersonate_service_account.clone(),
        config.http.iam_credentials_endpoint.clone(),
        client.clone(),
        config.http.token_lifetime(),
    ));
    Ok(RestTransport::with_client(client, credentials))
}

impl Render for WorkflowReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "{} CMEK-protected secret provisioned (run {})",
            "OK".green().bold(),
            self.run_id
        )?;
        writeln!(w, "  Project:        {}", self.project_id)?;
        writeln!(w, "  Key ring:       {}", self.key_ring)?;
        writeln!(w, "  Crypto key:     {}", self.crypto_key)?;
        writeln!(w, "  Secret:         {}", self.secret)?;
        writeln!(w, "  Secret version: {}", self.secret_version)?;
        writeln!(w, "  Elapsed:        {} ms", self.elapsed_ms)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn report() -> WorkflowReport {
        WorkflowReport {
            run_id: Default::default(),
            project_id: "p".to_owned(),
            key_ring: "projects/p/locations/global/keyRings/kr-abc123".to_owned(),
            crypto_key: "projects/p/locations/global/keyRings/kr-abc123/cryptoKeys/key-xyz789"
                .to_owned(),
            secret: "projects/p/secrets/sec-qqq111".to_owned(),
            secret_version: "projects/p/secrets/sec-qqq111/versions/1".to_owned(),
            elapsed_ms: 3042,
        }
    }

    #[test]
    fn report_text_lists_every_resource() {
        let mut buffer = Vec::new();
        report().render_text(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("kr-abc123"));
        assert!(text.contains("cryptoKeys/key-xyz789"));
        assert!(text.contains("secrets/sec-qqq111/versions/1"));
        assert!(text.contains("3042 ms"));
    }

    #[tokio::test]
    async fn flags_override_config_identity() {
        let mut config = CmekCheckConfig::default();
        config.identity.project_id = "from-file".to_owned();
        let args = RunArgs {
            project_id: Some("from-flag".to_owned()),
            impersonate: Some("sa@from-flag.iam.gserviceaccount.com".to_owned()),
            deadline_secs: Some(30),
            location: Some("us-east1".to_owned()),
            ..Default::default()
        };
        apply_run_args(&mut config, &args).await.unwrap();

        let identity = config.identity().unwrap();
        assert_eq!(identity.project_id, "from-flag");
        assert_eq!(
            identity.impersonate_service_account,
            "sa@from-flag.iam.gserviceaccount.com"
        );
        assert_eq!(config.retry.deadline_secs, 30);
        assert_eq!(config.kms.location, "us-east1");
    }

    #[tokio::test]
    async fn flags_win_over_terraform_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outputs.json");
        std::fs::write(
            &path,
            r#"{"project_id": {"value": "tf-proj"}, "service_account_email": {"value": "sa@tf-proj.iam.gserviceaccount.com"}}"#,
        )
        .unwrap();

        let mut config = CmekCheckConfig::default();
        let args = RunArgs {
            project_id: Some("flag-proj".to_owned()),
            terraform_outputs: Some(path),
            ..Default::default()
        };
        apply_run_args(&mut config, &args).await.unwrap();

        assert_eq!(config.identity.project_id, "flag-proj");
        assert_eq!(
            config.identity.impersonate_service_account,
            "sa@tf-proj.iam.gserviceaccount.com"
        );
    }

    #[tokio::test]
    async fn missing_terraform_outputs_file_fails() {
        let mut config = CmekCheckConfig::default();
        let args = RunArgs {
            terraform_outputs: Some(PathBuf::from("/nonexistent/outputs.json")),
            ..Default::default()
        };
        let err = apply_run_args(&mut config, &args).await.unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn missing_identity_is_config_error() {
        let writer = OutputWriter::new(crate::cli::OutputFormat::Json);
        let err = execute(RunArgs::default(), CmekCheckConfig::default(), &writer)
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn out_of_range_deadline_is_config_error() {
        let writer = OutputWriter::new(crate::cli::OutputFormat::Json);
        let args = RunArgs {
            project_id: Some("p".to_owned()),
            impersonate: Some("sa@p.iam.gserviceaccount.com".to_owned()),
            deadline_secs: Some(0),
            ..Default::default()
        };
        let err = execute(args, CmekCheckConfig::default(), &writer)
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
