//! 설정 관리 -- cmekcheck.toml 파싱 및 런타임 설정
//!
//! [`CmekCheckConfig`]는 모든 크레이트의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`CMEKCHECK_KMS_LOCATION=us-east1` 형식)
//! 3. 설정 파일 (`cmekcheck.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), cmekcheck_core::error::CmekCheckError> {
//! use cmekcheck_core::config::CmekCheckConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = CmekCheckConfig::load("cmekcheck.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = CmekCheckConfig::parse("[kms]\nlocation = \"europe-west1\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CmekCheckError, ConfigError};
use crate::naming::{MAX_SUFFIX_LEN, MIN_SUFFIX_LEN};
use crate::retry::Backoff;
use crate::status::StatusCode;
use crate::types::IdentityContext;

/// 시크릿 버전 payload 최대 크기 (Secret Manager 제한)
pub const MAX_PAYLOAD_LEN: usize = 64 * 1024;
const MAX_DEADLINE_SECS: u64 = 3600;
const MAX_REQUEST_TIMEOUT_SECS: u64 = 300;
const MIN_TOKEN_LIFETIME_SECS: u64 = 300;
const MAX_TOKEN_LIFETIME_SECS: u64 = 43_200;

/// cmekcheck 통합 설정
///
/// `cmekcheck.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 크레이트는 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CmekCheckConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 신원 설정 (외부 인프라 출력값)
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Cloud KMS 설정
    #[serde(default)]
    pub kms: KmsConfig,
    /// Secret Manager 설정
    #[serde(default)]
    pub secret_manager: SecretManagerConfig,
    /// 재시도 정책 설정
    #[serde(default)]
    pub retry: RetryConfig,
    /// HTTP 전송 설정
    #[serde(default)]
    pub http: HttpConfig,
    /// 리소스 이름 생성 설정
    #[serde(default)]
    pub naming: NamingConfig,
}

impl CmekCheckConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CmekCheckError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 설정 파일 없이 기본값 + 환경변수 오버라이드로 설정을 만듭니다.
    pub fn from_env() -> Result<Self, CmekCheckError> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, CmekCheckError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CmekCheckError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                CmekCheckError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, CmekCheckError> {
        toml::from_str(toml_str).map_err(|e| {
            CmekCheckError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `CMEKCHECK_{SECTION}_{FIELD}`
    /// 예: `CMEKCHECK_RETRY_DEADLINE_SECS=300`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "CMEKCHECK_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "CMEKCHECK_GENERAL_LOG_FORMAT");

        // Identity
        override_string(
            &mut self.identity.project_id,
            "CMEKCHECK_IDENTITY_PROJECT_ID",
        );
        override_string(
            &mut self.identity.impersonate_service_account,
            "CMEKCHECK_IDENTITY_IMPERSONATE_SERVICE_ACCOUNT",
        );

        // KMS
        override_string(&mut self.kms.endpoint, "CMEKCHECK_KMS_ENDPOINT");
        override_string(&mut self.kms.location, "CMEKCHECK_KMS_LOCATION");

        // Secret Manager
        override_string(
            &mut self.secret_manager.endpoint,
            "CMEKCHECK_SECRET_MANAGER_ENDPOINT",
        );
        override_parsed(
            &mut self.secret_manager.payload_len,
            "CMEKCHECK_SECRET_MANAGER_PAYLOAD_LEN",
        );

        // Retry
        override_parsed(
            &mut self.retry.transient_code,
            "CMEKCHECK_RETRY_TRANSIENT_CODE",
        );
        override_parsed(
            &mut self.retry.initial_delay_ms,
            "CMEKCHECK_RETRY_INITIAL_DELAY_MS",
        );
        override_parsed(&mut self.retry.max_delay_ms, "CMEKCHECK_RETRY_MAX_DELAY_MS");
        override_parsed(&mut self.retry.multiplier, "CMEKCHECK_RETRY_MULTIPLIER");
        override_parsed(
            &mut self.retry.deadline_secs,
            "CMEKCHECK_RETRY_DEADLINE_SECS",
        );

        // HTTP
        override_parsed(
            &mut self.http.request_timeout_secs,
            "CMEKCHECK_HTTP_REQUEST_TIMEOUT_SECS",
        );
        override_string(
            &mut self.http.iam_credentials_endpoint,
            "CMEKCHECK_HTTP_IAM_CREDENTIALS_ENDPOINT",
        );
        override_parsed(
            &mut self.http.token_lifetime_secs,
            "CMEKCHECK_HTTP_TOKEN_LIFETIME_SECS",
        );

        // Naming
        override_parsed(&mut self.naming.suffix_len, "CMEKCHECK_NAMING_SUFFIX_LEN");
    }

    /// 설정값의 유효성을 검증합니다.
    ///
    /// 신원 값은 CLI 인자로 채워질 수 있으므로 여기서 검증하지 않습니다.
    /// [`identity()`](Self::identity)가 별도로 검증합니다.
    pub fn validate(&self) -> Result<(), CmekCheckError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        validate_endpoint("kms.endpoint", &self.kms.endpoint)?;
        validate_endpoint("secret_manager.endpoint", &self.secret_manager.endpoint)?;
        validate_endpoint(
            "http.iam_credentials_endpoint",
            &self.http.iam_credentials_endpoint,
        )?;

        if self.kms.location.is_empty() || self.kms.location.contains('/') {
            return Err(invalid(
                "kms.location",
                "must be a non-empty location id without '/'".to_owned(),
            ));
        }

        if self.secret_manager.payload_len == 0 || self.secret_manager.payload_len > MAX_PAYLOAD_LEN
        {
            return Err(invalid(
                "secret_manager.payload_len",
                format!("must be 1-{MAX_PAYLOAD_LEN}"),
            ));
        }

        // 재시도 정책 검증
        if self.retry.transient_code == StatusCode::Ok {
            return Err(invalid(
                "retry.transient_code",
                "OK is not an error code".to_owned(),
            ));
        }
        if self.retry.initial_delay_ms == 0 {
            return Err(invalid(
                "retry.initial_delay_ms",
                "must be greater than 0".to_owned(),
            ));
        }
        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            return Err(invalid(
                "retry.max_delay_ms",
                "must be >= retry.initial_delay_ms".to_owned(),
            ));
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(invalid(
                "retry.multiplier",
                "must be a finite number >= 1.0".to_owned(),
            ));
        }
        if self.retry.deadline_secs == 0 || self.retry.deadline_secs > MAX_DEADLINE_SECS {
            return Err(invalid(
                "retry.deadline_secs",
                format!("must be 1-{MAX_DEADLINE_SECS}"),
            ));
        }

        // HTTP 검증
        if self.http.request_timeout_secs == 0
            || self.http.request_timeout_secs > MAX_REQUEST_TIMEOUT_SECS
        {
            return Err(invalid(
                "http.request_timeout_secs",
                format!("must be 1-{MAX_REQUEST_TIMEOUT_SECS}"),
            ));
        }
        if !(MIN_TOKEN_LIFETIME_SECS..=MAX_TOKEN_LIFETIME_SECS)
            .contains(&self.http.token_lifetime_secs)
        {
            return Err(invalid(
                "http.token_lifetime_secs",
                format!("must be {MIN_TOKEN_LIFETIME_SECS}-{MAX_TOKEN_LIFETIME_SECS}"),
            ));
        }

        if !(MIN_SUFFIX_LEN..=MAX_SUFFIX_LEN).contains(&self.naming.suffix_len) {
            return Err(invalid(
                "naming.suffix_len",
                format!("must be {MIN_SUFFIX_LEN}-{MAX_SUFFIX_LEN}"),
            ));
        }

        Ok(())
    }

    /// 신원 설정을 검증하여 [`IdentityContext`]로 변환합니다.
    pub fn identity(&self) -> Result<IdentityContext, CmekCheckError> {
        IdentityContext::new(
            self.identity.project_id.clone(),
            self.identity.impersonate_service_account.clone(),
        )
        .map_err(CmekCheckError::from)
    }
}

fn invalid(field: &str, reason: String) -> CmekCheckError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

fn validate_endpoint(field: &str, value: &str) -> Result<(), CmekCheckError> {
    if value.starts_with("https://") || value.starts_with("http://") {
        Ok(())
    } else {
        Err(invalid(field, "must start with http:// or https://".to_owned()))
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 신원 설정
///
/// 인프라 적용 후 출력되는 `project_id`, `service_account_email` 값입니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// 대상 프로젝트 ID
    pub project_id: String,
    /// 가장할 서비스 계정 이메일
    pub impersonate_service_account: String,
}

/// Cloud KMS 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KmsConfig {
    /// API 엔드포인트
    pub endpoint: String,
    /// 키 링 위치
    pub location: String,
}

impl Default for KmsConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://cloudkms.googleapis.com".to_owned(),
            location: "global".to_owned(),
        }
    }
}

/// Secret Manager 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretManagerConfig {
    /// API 엔드포인트
    pub endpoint: String,
    /// 시크릿 버전에 쓸 무작위 payload 크기 (바이트)
    pub payload_len: usize,
}

impl Default for SecretManagerConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://secretmanager.googleapis.com".to_owned(),
            payload_len: 1,
        }
    }
}

/// 재시도 정책 설정
///
/// 키 링 생성 단계에만 적용됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// 재시도할 상태 코드
    pub transient_code: StatusCode,
    /// 첫 재시도 대기 시간 (밀리초)
    pub initial_delay_ms: u64,
    /// 단일 대기 시간 상한 (밀리초)
    pub max_delay_ms: u64,
    /// 백오프 배수
    pub multiplier: f64,
    /// 단계 시작부터 포기까지의 시간 (초)
    pub deadline_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            transient_code: StatusCode::Unauthenticated,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            deadline_secs: 120,
        }
    }
}

impl RetryConfig {
    /// 백오프 스케줄
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.initial_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.multiplier,
        )
    }

    /// 재시도 예산
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

/// HTTP 전송 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// 요청 단위 타임아웃 (초)
    pub request_timeout_secs: u64,
    /// IAM Credentials API 엔드포인트
    pub iam_credentials_endpoint: String,
    /// 가장 토큰 수명 (초)
    pub token_lifetime_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            iam_credentials_endpoint: "https://iamcredentials.googleapis.com".to_owned(),
            token_lifetime_secs: 3600,
        }
    }
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn token_lifetime(&self) -> Duration {
        Duration::from_secs(self.token_lifetime_secs)
    }
}

/// 리소스 이름 생성 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    /// 무작위 suffix 길이
    pub suffix_len: usize,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            suffix_len: crate::naming::DEFAULT_SUFFIX_LEN,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_parsed<T: FromStr>(target: &mut T, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse env var, ignoring"
            ),
        }
    }
}
