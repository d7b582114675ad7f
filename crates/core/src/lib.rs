//! cmekcheck 공통 타입, trait, 에러, 설정
//!
//! 모든 크레이트가 공유하는 기반 계층입니다.
//!
//! - [`config`]: `cmekcheck.toml` 파싱 및 검증
//! - [`error`]: 최상위 에러 타입
//! - [`status`]: 표준 RPC 상태 코드
//! - [`retry`]: 데드라인 기반 재시도 실행기
//! - [`naming`]: 무작위 리소스 ID 생성
//! - [`pipeline`]: 워크플로 단계 trait
//! - [`metrics`]: 메트릭 이름 상수

pub mod config;
pub mod error;
pub mod metrics;
pub mod naming;
pub mod pipeline;
pub mod retry;
pub mod status;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ApiError, CmekCheckError, ConfigError, ProvisionError};

// 설정
pub use config::CmekCheckConfig;

// 재시도
pub use retry::{Backoff, ErrorClass, RetryError, RetryPolicy, RetryingInvoker};

// 상태 코드
pub use status::{HasStatusCode, StatusCode};

// 이름 생성
pub use naming::{IdGenerator, RandomIdGenerator, ResourceKind};

// 파이프라인 trait
pub use pipeline::Stage;

// 도메인 타입
pub use types::IdentityContext;
