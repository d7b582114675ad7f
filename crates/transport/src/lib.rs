//! cmekcheck Google REST 전송 계층
//!
//! - [`auth`]: 정적 토큰 / 서비스 계정 가장 자격 증명
//! - [`rest`]: 인증된 JSON `POST` 및 에러 응답 분류
//! - [`error`]: [`TransportError`] 및 [`ApiError`](cmekcheck_core::ApiError) 변환

pub mod auth;
pub mod error;
pub mod rest;

pub use auth::{CLOUD_PLATFORM_SCOPE, Credentials, ImpersonatedCredentials, SourceToken};
pub use error::TransportError;
pub use rest::{RestTransport, build_client, classify_error};
