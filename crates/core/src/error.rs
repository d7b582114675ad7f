//! 에러 타입 -- 도메인별 에러 정의

use std::fmt;

use crate::status::{HasStatusCode, StatusCode};

/// cmekcheck 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum CmekCheckError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 원격 API 호출 에러 (재시도 대상이 아니거나 재시도 없이 호출된 경우)
    #[error("api error: {0}")]
    Api(#[from] ApiError),

    /// 재시도 데드라인 초과
    #[error(
        "deadline exceeded for '{operation}' after {attempts} attempt(s) in {elapsed_ms}ms: {last}"
    )]
    DeadlineExceeded {
        /// 재시도한 작업 이름
        operation: String,
        /// 총 시도 횟수
        attempts: u32,
        /// 첫 시도부터 포기까지 걸린 시간 (밀리초)
        elapsed_ms: u64,
        /// 마지막으로 관찰된 에러
        last: ApiError,
    },

    /// 리소스 생성 결과 검증 에러
    #[error("provision error: {0}")]
    Provision(#[from] ProvisionError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CmekCheckError {
    /// 데드라인 초과로 인한 실패인지 확인합니다.
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, Self::DeadlineExceeded { .. })
    }
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// 필수 값 누락
    #[error("missing required value: {field}")]
    Missing { field: String },
}

/// 원격 API 에러
///
/// REST 응답이나 전송 계층 실패를 표준 상태 코드로 분류한 결과입니다.
/// 재시도 정책은 [`code`](ApiError::code)만 보고 판단합니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// 분류된 상태 코드
    pub code: StatusCode,
    /// 서비스가 돌려준 원본 메시지
    pub message: String,
    /// 실패한 작업 (예: `"kms.create_key_ring"`)
    pub operation: String,
}

impl ApiError {
    /// 새 API 에러를 생성합니다.
    pub fn new(code: StatusCode, operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            operation: operation.into(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed: code = {} desc = {}",
            self.operation, self.code, self.message
        )
    }
}

impl std::error::Error for ApiError {}

impl HasStatusCode for ApiError {
    fn status_code(&self) -> StatusCode {
        self.code
    }
}

/// 생성된 리소스 응답 검증 에러
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// 응답에 필수 필드가 없음
    #[error("{resource} response is missing field '{field}'")]
    MissingField {
        resource: &'static str,
        field: &'static str,
    },

    /// 생성된 시크릿의 CMEK 키가 요청한 키와 다름
    #[error("secret '{secret}' is bound to key '{actual}', expected '{expected}'")]
    CmekMismatch {
        secret: String,
        expected: String,
        actual: String,
    },

    /// 유효하지 않은 리소스 ID
    #[error("invalid resource id '{id}': {reason}")]
    InvalidResourceId { id: String, reason: String },
}
