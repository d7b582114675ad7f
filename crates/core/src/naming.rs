//! 리소스 ID 생성 및 검증
//!
//! 키 링, 암호화 키, 시크릿 ID는 `<prefix>-<suffix>` 형식의 무작위 값입니다.
//! 같은 프로젝트에서 여러 실행이 겹치더라도 이름 충돌을 피하는 유일한 장치이므로
//! suffix는 OS 난수원에서 뽑습니다.

use std::fmt;

use rand::Rng;
use rand::rngs::OsRng;

use crate::error::ProvisionError;

/// 리소스 ID 최대 길이 (KMS 키 링/키 ID 제한 기준)
pub const MAX_RESOURCE_ID_LEN: usize = 63;
/// 무작위 suffix 기본 길이
pub const DEFAULT_SUFFIX_LEN: usize = 6;
/// 무작위 suffix 최소 길이
pub const MIN_SUFFIX_LEN: usize = 6;
/// 무작위 suffix 최대 길이
pub const MAX_SUFFIX_LEN: usize = 20;

const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// 이름을 생성할 리소스 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// KMS 키 링
    KeyRing,
    /// KMS 암호화 키
    CryptoKey,
    /// Secret Manager 시크릿
    Secret,
}

impl ResourceKind {
    /// ID 접두어
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::KeyRing => "kr",
            Self::CryptoKey => "key",
            Self::Secret => "sec",
        }
    }

    /// 메트릭/로그용 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KeyRing => "key_ring",
            Self::CryptoKey => "crypto_key",
            Self::Secret => "secret",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 리소스 ID 생성기
///
/// 테스트에서는 고정된 이름을 돌려주는 구현으로 교체합니다.
pub trait IdGenerator: Send + Sync {
    /// 주어진 종류의 새 리소스 ID를 생성합니다.
    fn generate(&self, kind: ResourceKind) -> String;
}

/// OS 난수원 기반 ID 생성기
#[derive(Debug, Clone)]
pub struct RandomIdGenerator {
    suffix_len: usize,
}

impl RandomIdGenerator {
    /// suffix 길이를 지정하여 생성합니다. 범위를 벗어난 값은 경계로 고정됩니다.
    pub fn new(suffix_len: usize) -> Self {
        Self {
            suffix_len: suffix_len.clamp(MIN_SUFFIX_LEN, MAX_SUFFIX_LEN),
        }
    }
}

impl Default for RandomIdGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_SUFFIX_LEN)
    }
}

impl IdGenerator for RandomIdGenerator {
    fn generate(&self, kind: ResourceKind) -> String {
        let mut rng = OsRng;
        let suffix: String = (0..self.suffix_len)
            .map(|_| {
                let idx = rng.gen_range(0..SUFFIX_ALPHABET.len());
                char::from(SUFFIX_ALPHABET[idx])
            })
            .collect();
        format!("{}-{}", kind.prefix(), suffix)
    }
}

/// 리소스 ID를 검증합니다.
///
/// - 1-63자
/// - 소문자로 시작
/// - 소문자, 숫자, `-`만 허용
pub fn validate_resource_id(id: &str) -> Result<(), ProvisionError> {
    let invalid = |reason: String| ProvisionError::InvalidResourceId {
        id: id.to_owned(),
        reason,
    };

    if id.is_empty() || id.len() > MAX_RESOURCE_ID_LEN {
        return Err(invalid(format!(
            "length {} (must be 1-{MAX_RESOURCE_ID_LEN})",
            id.len()
        )));
    }
    if !id.starts_with(|c: char| c.is_ascii_lowercase()) {
        return Err(invalid("must start with a lowercase letter".to_owned()));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(invalid(
            "only lowercase letters, digits and '-' are allowed".to_owned(),
        ));
    }
    Ok(())
}
