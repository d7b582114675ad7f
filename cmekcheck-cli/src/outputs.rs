//! `terraform output -json` parsing
//!
//! Accepts the native Terraform shape (`{"key": {"value": ..}}`) and a flat
//! `{"key": "value"}` map. Non-string values are rendered as JSON text.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;

use crate::error::CliError;

pub const PROJECT_ID_KEY: &str = "project_id";
pub const SERVICE_ACCOUNT_KEY: &str = "service_account_email";

/// Identity values exported by the test infrastructure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerraformOutputs {
    pub project_id: String,
    pub service_account_email: String,
}

impl TerraformOutputs {
    /// Reads and parses an outputs file.
    pub async fn load(path: &Path) -> Result<Self, CliError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            CliError::TerraformOutputs(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    pub fn parse(json: &str) -> Result<Self, CliError> {
        let raw: BTreeMap<String, Value> = serde_json::from_str(json)
            .map_err(|e| CliError::TerraformOutputs(format!("invalid JSON: {e}")))?;

        let values: BTreeMap<String, String> = raw
            .into_iter()
            .map(|(key, value)| (key, output_value(value)))
            .collect();

        Ok(Self {
            project_id: required(&values, PROJECT_ID_KEY)?,
            service_account_email: required(&values, SERVICE_ACCOUNT_KEY)?,
        })
    }
}

fn output_value(value: Value) -> String {
    let value = match value {
        Value::Object(mut map) if map.contains_key("value") => {
            map.remove("value").unwrap_or(Value::Null)
        }
        other => other,
    };
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn required(values: &BTreeMap<String, String>, key: &str) -> Result<String, CliError> {
    match values.get(key) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_owned()),
        _ => Err(CliError::TerraformOutputs(format!(
            "missing or empty output '{key}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_native_terraform_shape() {
        let json = r#"{
            "project_id": {"sensitive": false, "type": "string", "value": "ci-proj-1234"},
            "service_account_email": {"sensitive": false, "type": "string",
                "value": "ci-runner@ci-proj-1234.iam.gserviceaccount.com"},
            "unused": {"sensitive": false, "type": "number", "value": 3}
        }"#;
        let outputs = TerraformOutputs::parse(json).unwrap();
        assert_eq!(outputs.project_id, "ci-proj-1234");
        assert_eq!(
            outputs.service_account_email,
            "ci-runner@ci-proj-1234.iam.gserviceaccount.com"
        );
    }

    #[test]
    fn parses_flat_map() {
        let json = r#"{"project_id": "p", "service_account_email": "sa@p.iam.gserviceaccount.com"}"#;
        let outputs = TerraformOutputs::parse(json).unwrap();
        assert_eq!(outputs.project_id, "p");
    }

    #[test]
    fn missing_key_is_reported() {
        let err = TerraformOutputs::parse(r#"{"project_id": {"value": "p"}}"#).unwrap_err();
        assert!(err.to_string().contains("service_account_email"));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn empty_value_is_rejected() {
        let json = r#"{"project_id": {"value": "  "}, "service_account_email": {"value": "sa@p.iam.gserviceaccount.com"}}"#;
        let err = TerraformOutputs::parse(json).unwrap_err();
        assert!(err.to_string().contains("project_id"));
    }

    #[test]
    fn invalid_json_is_rejected() {
        assert!(TerraformOutputs::parse("not json").is_err());
    }

    #[tokio::test]
    async fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outputs.json");
        std::fs::write(
            &path,
            r#"{"project_id": {"value": "p"}, "service_account_email": {"value": "sa@p.iam.gserviceaccount.com"}}"#,
        )
        .unwrap();
        let outputs = TerraformOutputs::load(&path).await.unwrap();
        assert_eq!(outputs.service_account_email, "sa@p.iam.gserviceaccount.com");
    }

    #[tokio::test]
    async fn load_missing_file_fails() {
        let err = TerraformOutputs::load(Path::new("/nonexistent/outputs.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::TerraformOutputs(_)));
    }
}
