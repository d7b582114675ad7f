//! CLI-specific error types and exit code mapping

use cmekcheck_core::error::CmekCheckError;

/// CLI-specific error type.
///
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// Terraform outputs file could not be used.
    #[error("terraform outputs: {0}")]
    TerraformOutputs(String),

    /// Source credentials or HTTP client could not be set up.
    #[error("credentials error: {0}")]
    Credentials(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from the workflow crates.
    #[error("{0}")]
    Core(#[from] CmekCheckError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                         |
    /// |------|---------------------------------|
    /// | 0    | Success                         |
    /// | 1    | Workflow / general failure      |
    /// | 2    | Configuration error             |
    /// | 3    | Retry deadline exceeded         |
    /// | 10   | IO error                        |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::TerraformOutputs(_) => 2,
            Self::Io(_) => 10,
            Self::Core(err) => match err {
                CmekCheckError::Config(_) => 2,
                CmekCheckError::DeadlineExceeded { .. } => 3,
                CmekCheckError::Io(_) => 10,
                CmekCheckError::Api(_) | CmekCheckError::Provision(_) => 1,
            },
            Self::Credentials(_) | Self::JsonSerialize(_) => 1,
        }
    }
}
