//! 메트릭 상수 및 설명 등록
//!
//! 모든 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 크레이트는 이 상수를 사용하여 `metrics::counter!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! 전역 레코더가 설치되지 않은 경우 매크로 호출은 아무 일도 하지 않습니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `cmekcheck_`
//! - 접미어: `_total` (counter), `_seconds` (histogram)
//!
//! # 사용 예시
//!
//! ```ignore
//! use cmekcheck_core::metrics as m;
//!
//! metrics::counter!(m::RESOURCES_CREATED_TOTAL, m::LABEL_KIND => "key_ring").increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 작업 레이블 키 (예: kms.create_key_ring)
pub const LABEL_OPERATION: &str = "operation";

/// 리소스 종류 레이블 키 (key_ring, crypto_key, secret, secret_version)
pub const LABEL_KIND: &str = "kind";

/// 결과 레이블 키 (success, failure, deadline_exceeded)
pub const LABEL_RESULT: &str = "result";

// ─── 메트릭 ─────────────────────────────────────────────────────────

/// 재시도 횟수 (counter, label: operation)
pub const RETRY_ATTEMPTS_TOTAL: &str = "cmekcheck_retry_attempts_total";

/// 생성된 리소스 수 (counter, label: kind)
pub const RESOURCES_CREATED_TOTAL: &str = "cmekcheck_resources_created_total";

/// 워크플로 실행 수 (counter, label: result)
pub const WORKFLOW_RUNS_TOTAL: &str = "cmekcheck_workflow_runs_total";

/// 워크플로 소요 시간 (histogram, 초)
pub const WORKFLOW_DURATION_SECONDS: &str = "cmekcheck_workflow_duration_seconds";

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_histogram};

    describe_counter!(
        RETRY_ATTEMPTS_TOTAL,
        "Retries scheduled after a transient error, per operation"
    );
    describe_counter!(
        RESOURCES_CREATED_TOTAL,
        "Cloud resources created by the workflow, per kind"
    );
    describe_counter!(WORKFLOW_RUNS_TOTAL, "Completed workflow runs by result");
    describe_histogram!(
        WORKFLOW_DURATION_SECONDS,
        "End-to-end workflow duration in seconds"
    );
}
