//! cmekcheck 키 계층 프로비저닝
//!
//! - [`kms`]: Cloud KMS 클라이언트 trait, REST 구현, 리소스 모델
//! - [`provisioner`]: 키 링 + 암호화 키 생성 단계
//! - [`error`]: [`KeyHierarchyError`]

pub mod error;
pub mod kms;
pub mod provisioner;

pub use error::KeyHierarchyError;
pub use kms::{
    CreateCryptoKeyRequest, CreateKeyRingRequest, CryptoKey, CryptoKeyVersion,
    KeyManagementClient, KeyRing, RestKmsClient,
};
pub use provisioner::{KeyHierarchy, KeyHierarchyProvisioner};
