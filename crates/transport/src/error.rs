//! 전송 계층 에러 타입
//!
//! [`TransportError`]는 HTTP 요청, 응답 해석, 자격 증명 획득 실패를 표현합니다.
//! 모든 변형은 [`StatusCode`]로 분류되며, 호출자는 [`TransportError::into_api_error`]로
//! 작업 이름을 붙여 [`ApiError`]로 변환합니다.

use cmekcheck_core::error::ApiError;
use cmekcheck_core::status::{HasStatusCode, StatusCode};

/// 전송 계층 에러
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// 가장 토큰 발급 실패
    #[error("transport: impersonate '{target}': {message}")]
    Impersonation {
        /// 가장 대상 서비스 계정
        target: String,
        /// 분류된 상태 코드
        code: StatusCode,
        /// 실패 사유
        message: String,
    },

    /// 원본 자격 증명(ADC) 획득 실패
    #[error("transport: source credentials: {0}")]
    SourceCredentials(String),

    /// 요청 전송 실패 (연결, TLS, 타임아웃)
    #[error("transport: POST {url}: {message}")]
    Request {
        url: String,
        code: StatusCode,
        message: String,
    },

    /// 서비스가 에러 응답을 반환
    #[error("{url} returned HTTP {http_status} ({code}): {message}")]
    Status {
        url: String,
        http_status: u16,
        code: StatusCode,
        message: String,
    },

    /// 응답 본문 해석 실패
    #[error("failed to decode response from {url}: {reason}")]
    Decode { url: String, reason: String },

    /// HTTP 클라이언트 생성 실패
    #[error("failed to build http client: {0}")]
    ClientBuild(String),
}

impl HasStatusCode for TransportError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Impersonation { code, .. }
            | Self::Request { code, .. }
            | Self::Status { code, .. } => *code,
            Self::SourceCredentials(_) => StatusCode::Unavailable,
            Self::Decode { .. } | Self::ClientBuild(_) => StatusCode::Internal,
        }
    }
}

impl TransportError {
    /// 작업 이름을 붙여 [`ApiError`]로 변환합니다.
    pub fn into_api_error(self, operation: &str) -> ApiError {
        let code = self.status_code();
        let message = match self {
            // 서비스 메시지만 남기고 URL은 operation으로 대체
            Self::Status { message, .. } => message,
            other => other.to_string(),
        };
        ApiError::new(code, operation, message)
    }

    pub(crate) fn from_send(url: &str, err: &reqwest::Error) -> Self {
        let code = if err.is_timeout() {
            StatusCode::DeadlineExceeded
        } else {
            StatusCode::Unavailable
        };
        Self::Request {
            url: url.to_owned(),
            code,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impersonation_error_keeps_code() {
        let err = TransportError::Impersonation {
            target: "sa@p.iam.gserviceaccount.com".to_owned(),
            code: StatusCode::Unauthenticated,
            message: "status code 403".to_owned(),
        };
        assert_eq!(err.status_code(), StatusCode::Unauthenticated);
        assert!(err.to_string().contains("impersonate"));
    }

    #[test]
    fn status_error_converts_with_service_message() {
        let err = TransportError::Status {
            url: "http://localhost/v1/x".to_owned(),
            http_status: 409,
            code: StatusCode::AlreadyExists,
            message: "KeyRing already exists".to_owned(),
        };
        let api = err.into_api_error("kms.create_key_ring");
        assert_eq!(api.code, StatusCode::AlreadyExists);
        assert_eq!(api.operation, "kms.create_key_ring");
        assert_eq!(api.message, "KeyRing already exists");
    }

    #[test]
    fn impersonation_error_converts_with_full_text() {
        let err = TransportError::Impersonation {
            target: "sa@p.iam.gserviceaccount.com".to_owned(),
            code: StatusCode::Unauthenticated,
            message: "status code 403".to_owned(),
        };
        let api = err.into_api_error("kms.create_key_ring");
        assert_eq!(api.code, StatusCode::Unauthenticated);
        assert!(api.message.contains("status code 403"));
    }

    #[test]
    fn decode_and_build_errors_are_internal() {
        let decode = TransportError::Decode {
            url: "u".to_owned(),
            reason: "eof".to_owned(),
        };
        assert_eq!(decode.status_code(), StatusCode::Internal);
        assert_eq!(
            TransportError::ClientBuild("tls".to_owned()).status_code(),
            StatusCode::Internal
        );
    }

    #[test]
    fn source_credential_errors_are_not_the_lag_code() {
        let err = TransportError::SourceCredentials("no ADC".to_owned());
        assert_ne!(err.status_code(), StatusCode::Unauthenticated);
    }
}
