//! cmekcheck CMEK 보호 시크릿 프로비저닝
//!
//! - [`secret_manager`]: Secret Manager 클라이언트 trait, REST 구현, 리소스 모델
//! - [`provisioner`]: 시크릿 + 버전 생성 단계
//! - [`error`]: [`ProtectedSecretError`]

pub mod error;
pub mod provisioner;
pub mod secret_manager;

pub use error::ProtectedSecretError;
pub use provisioner::{ProtectedSecret, ProtectedSecretProvisioner, random_payload};
pub use secret_manager::{
    AddSecretVersionRequest, CreateSecretRequest, RestSecretManagerClient, Secret,
    SecretManagerClient, SecretVersion,
};
