//! 키 계층 프로비저너 에러 타입
//!
//! `From<KeyHierarchyError> for CmekCheckError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.

use std::time::Duration;

use cmekcheck_core::error::{ApiError, CmekCheckError, ProvisionError};
use cmekcheck_core::retry::RetryError;

/// 키 계층 프로비저닝 에러
#[derive(Debug, thiserror::Error)]
pub enum KeyHierarchyError {
    /// 키 링 생성이 재시도 데드라인 안에 성공하지 못함
    #[error("key ring creation gave up after {attempts} attempt(s) in {elapsed:?}: {last}")]
    KeyRingDeadline {
        /// 총 시도 횟수
        attempts: u32,
        /// 첫 시도부터 포기까지 걸린 시간
        elapsed: Duration,
        /// 마지막으로 관찰된 에러
        last: ApiError,
    },

    /// 재시도 대상이 아닌 KMS 에러
    #[error("kms error: {0}")]
    Api(#[from] ApiError),

    /// 응답 검증 또는 ID 검증 실패
    #[error(transparent)]
    Provision(#[from] ProvisionError),
}

impl From<RetryError<ApiError>> for KeyHierarchyError {
    fn from(err: RetryError<ApiError>) -> Self {
        match err {
            RetryError::DeadlineExceeded {
                attempts,
                elapsed,
                last,
            } => Self::KeyRingDeadline {
                attempts,
                elapsed,
                last,
            },
            RetryError::Fatal(err) => Self::Api(err),
        }
    }
}

impl From<KeyHierarchyError> for CmekCheckError {
    fn from(err: KeyHierarchyError) -> Self {
        match err {
            KeyHierarchyError::KeyRingDeadline {
                attempts,
                elapsed,
                last,
            } => CmekCheckError::DeadlineExceeded {
                operation: last.operation.clone(),
                attempts,
                elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                last,
            },
            KeyHierarchyError::Api(err) => CmekCheckError::Api(err),
            KeyHierarchyError::Provision(err) => CmekCheckError::Provision(err),
        }
    }
}
