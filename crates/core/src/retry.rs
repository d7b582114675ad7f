//! 데드라인 기반 재시도 -- 지정된 일시적 에러만 지수 백오프로 재시도
//!
//! [`RetryingInvoker`]는 단일 원격 호출을 반복 실행합니다.
//!
//! - 성공하면 즉시 결과를 반환합니다.
//! - [`RetryPolicy`]가 `Transient`로 분류한 에러는 백오프 후 재시도합니다.
//!   다음 시도 시각이 데드라인에 닿으면 마지막 에러와 함께
//!   [`RetryError::DeadlineExceeded`]를 반환합니다.
//! - 그 외 에러는 재시도 없이 [`RetryError::Fatal`]로 즉시 반환합니다.
//!
//! 시계와 sleep은 `tokio::time`을 사용하므로 테스트에서 시간을 멈출 수 있습니다.
//!
//! # 사용 예시
//! ```ignore
//! use cmekcheck_core::retry::{Backoff, RetryPolicy, RetryingInvoker};
//! use cmekcheck_core::status::StatusCode;
//!
//! let deadline = tokio::time::Instant::now() + Duration::from_secs(120);
//! let policy = RetryPolicy::on_code(StatusCode::Unauthenticated, Backoff::default(), deadline);
//! let key_ring = RetryingInvoker::new(policy)
//!     .invoke("kms.create_key_ring", || kms.create_key_ring(request.clone()))
//!     .await?;
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{ApiError, CmekCheckError};
use crate::metrics as m;
use crate::status::{HasStatusCode, StatusCode};

/// 에러 분류 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// 재시도 대상
    Transient,
    /// 즉시 전파
    Fatal,
}

/// 지수 백오프 스케줄
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// 첫 재시도 전 대기 시간
    pub initial: Duration,
    /// 단일 대기 시간 상한
    pub max: Duration,
    /// 재시도마다 곱하는 배수
    pub multiplier: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl Backoff {
    /// 새 백오프 스케줄을 생성합니다.
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        Self {
            initial,
            max,
            multiplier,
        }
    }

    /// 대기 시간 시퀀스를 반환합니다 (무한 iterator).
    ///
    /// `initial`에서 시작하여 `multiplier`배씩 증가하며 `max`에서 고정됩니다.
    pub fn delays(&self) -> BackoffDelays {
        BackoffDelays {
            next: self.initial.min(self.max),
            max: self.max,
            multiplier: self.multiplier,
        }
    }
}

/// [`Backoff::delays`]가 반환하는 iterator
#[derive(Debug, Clone)]
pub struct BackoffDelays {
    next: Duration,
    max: Duration,
    multiplier: f64,
}

impl Iterator for BackoffDelays {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next;
        let grown = current.as_secs_f64() * self.multiplier;
        self.next = if !grown.is_finite() || grown >= self.max.as_secs_f64() {
            self.max
        } else if grown <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(grown)
        };
        Some(current)
    }
}

type Classifier<E> = Arc<dyn Fn(&E) -> ErrorClass + Send + Sync>;

/// 재시도 정책 -- 에러 분류기, 백오프 스케줄, 절대 데드라인
pub struct RetryPolicy<E> {
    classify: Classifier<E>,
    backoff: Backoff,
    deadline: Instant,
}

impl<E: HasStatusCode + 'static> RetryPolicy<E> {
    /// 지정된 상태 코드 하나만 재시도하는 정책을 생성합니다.
    pub fn on_code(code: StatusCode, backoff: Backoff, deadline: Instant) -> Self {
        Self::with_classifier(
            move |err: &E| {
                if err.status_code() == code {
                    ErrorClass::Transient
                } else {
                    ErrorClass::Fatal
                }
            },
            backoff,
            deadline,
        )
    }
}

impl<E> RetryPolicy<E> {
    /// 임의의 분류 함수로 정책을 생성합니다.
    pub fn with_classifier<F>(classify: F, backoff: Backoff, deadline: Instant) -> Self
    where
        F: Fn(&E) -> ErrorClass + Send + Sync + 'static,
    {
        Self {
            classify: Arc::new(classify),
            backoff,
            deadline,
        }
    }

    /// 에러를 분류합니다.
    pub fn classify(&self, err: &E) -> ErrorClass {
        (self.classify)(err)
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            classify: Arc::clone(&self.classify),
            backoff: self.backoff,
            deadline: self.deadline,
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("backoff", &self.backoff)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

/// 재시도 실행 결과 에러
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// 데드라인 안에 성공하지 못함
    #[error("deadline exceeded after {attempts} attempt(s) in {elapsed:?}: {last}")]
    DeadlineExceeded {
        /// 총 시도 횟수
        attempts: u32,
        /// 첫 시도부터 포기까지 걸린 시간
        elapsed: Duration,
        /// 마지막으로 관찰된 에러
        last: E,
    },

    /// 재시도 대상이 아닌 에러
    #[error("{0}")]
    Fatal(E),
}

impl<E> RetryError<E> {
    /// 원인 에러를 꺼냅니다.
    pub fn into_inner(self) -> E {
        match self {
            Self::DeadlineExceeded { last, .. } => last,
            Self::Fatal(err) => err,
        }
    }
}

impl From<RetryError<ApiError>> for CmekCheckError {
    fn from(err: RetryError<ApiError>) -> Self {
        match err {
            RetryError::DeadlineExceeded {
                attempts,
                elapsed,
                last,
            } => CmekCheckError::DeadlineExceeded {
                operation: last.operation.clone(),
                attempts,
                elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                last,
            },
            RetryError::Fatal(err) => CmekCheckError::Api(err),
        }
    }
}

/// 데드라인 기반 재시도 실행기
#[derive(Debug, Clone)]
pub struct RetryingInvoker<E> {
    policy: RetryPolicy<E>,
}

impl<E: fmt::Display> RetryingInvoker<E> {
    /// 새 실행기를 생성합니다.
    pub fn new(policy: RetryPolicy<E>) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy<E> {
        &self.policy
    }

    /// 작업을 정책에 따라 실행합니다.
    ///
    /// 첫 시도는 항상 수행됩니다. 진행 중인 시도는 취소하지 않으며,
    /// 데드라인은 재시도 사이에서만 검사합니다.
    pub async fn invoke<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let started = Instant::now();
        let mut delays = self.policy.backoff.delays();
        let mut attempts: u32 = 0;

        loop {
            attempts = attempts.saturating_add(1);

            let err = match call().await {
                Ok(value) => {
                    if attempts > 1 {
                        debug!(operation, attempts, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if self.policy.classify(&err) == ErrorClass::Fatal {
                debug!(operation, attempts, error = %err, "non-retryable error");
                return Err(RetryError::Fatal(err));
            }

            let delay = delays.next().unwrap_or(self.policy.backoff.max);
            let next_start = Instant::now().checked_add(delay);
            if next_start.is_none_or(|at| at >= self.policy.deadline) {
                let elapsed = started.elapsed();
                warn!(
                    operation,
                    attempts,
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "retry deadline exceeded"
                );
                return Err(RetryError::DeadlineExceeded {
                    attempts,
                    elapsed,
                    last: err,
                });
            }

            warn!(
                operation,
                attempt = attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "transient error, retrying"
            );
            metrics::counter!(m::RETRY_ATTEMPTS_TOTAL, m::LABEL_OPERATION => operation.to_owned())
                .increment(1);

            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> ApiError {
        ApiError::new(
            StatusCode::Unauthenticated,
            "test.op",
            "transport: impersonate: status code 403",
        )
    }

    fn fatal() -> ApiError {
        ApiError::new(StatusCode::PermissionDenied, "test.op", "denied")
    }

    fn invoker(backoff: Backoff, budget: Duration) -> RetryingInvoker<ApiError> {
        RetryingInvoker::new(RetryPolicy::on_code(
            StatusCode::Unauthenticated,
            backoff,
            Instant::now() + budget,
        ))
    }

    #[test]
    fn backoff_doubles_until_cap() {
        let delays: Vec<u64> = Backoff::default()
            .delays()
            .take(8)
            .map(|d| d.as_secs())
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30, 30]);
    }

    #[test]
    fn backoff_initial_above_cap_is_clamped() {
        let backoff = Backoff::new(Duration::from_secs(60), Duration::from_secs(10), 2.0);
        let first = backoff.delays().next().unwrap();
        assert_eq!(first, Duration::from_secs(10));
    }

    #[test]
    fn backoff_huge_multiplier_stays_capped() {
        let backoff = Backoff::new(Duration::from_millis(1), Duration::from_secs(5), f64::MAX);
        for delay in backoff.delays().take(5) {
            assert!(delay <= Duration::from_secs(5));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn success_on_first_attempt_does_not_sleep() {
        let invoker = invoker(Backoff::default(), Duration::from_secs(120));
        let start = Instant::now();
        let value = invoker
            .invoke("test.op", || async { Ok::<_, ApiError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn one_transient_failure_then_success_retries_once() {
        let invoker = invoker(Backoff::default(), Duration::from_secs(120));
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let value = invoker
            .invoke("test.op", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { if n == 0 { Err(transient()) } else { Ok("ring") } }
            })
            .await
            .unwrap();

        assert_eq!(value, "ring");
        assert_eq!(calls.load(Ordering::SeqCst), 2, "exactly one retry");
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_error_is_returned_without_retry() {
        let invoker = invoker(Backoff::default(), Duration::from_secs(120));
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let err = invoker
            .invoke("test.op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(fatal()) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, RetryError::Fatal(ref e) if e.code == StatusCode::PermissionDenied));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_error_ignores_expired_deadline() {
        let invoker = invoker(Backoff::default(), Duration::ZERO);
        let err = invoker
            .invoke("test.op", || async { Err::<(), _>(fatal()) })
            .await
            .unwrap_err();
        assert!(matches!(err, RetryError::Fatal(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn always_transient_ends_with_deadline_exceeded() {
        let invoker = invoker(Backoff::default(), Duration::from_secs(120));
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let err = invoker
            .invoke("test.op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(transient()) }
            })
            .await
            .unwrap_err();

        match err {
            RetryError::DeadlineExceeded {
                attempts,
                elapsed,
                last,
            } => {
                assert_eq!(attempts, calls.load(Ordering::SeqCst));
                assert!(elapsed <= Duration::from_secs(120));
                assert_eq!(last.code, StatusCode::Unauthenticated);
            }
            RetryError::Fatal(e) => panic!("expected deadline exceeded, got fatal: {e}"),
        }
        // 1+2+4+8+16+30+30 = 91s, 다음 대기(30s)는 데드라인(120s)을 넘음
        assert_eq!(calls.load(Ordering::SeqCst), 8);
        assert_eq!(start.elapsed(), Duration::from_secs(91));
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_never_exceed_cap_and_attempts_never_start_after_deadline() {
        let schedules = [
            (Duration::from_millis(100), 2.0, Duration::from_millis(750), Duration::from_secs(5)),
            (Duration::from_secs(1), 3.0, Duration::from_secs(4), Duration::from_secs(30)),
            (Duration::from_millis(10), 1.5, Duration::from_millis(40), Duration::from_millis(500)),
            (Duration::from_secs(2), 2.0, Duration::from_secs(30), Duration::from_secs(2)),
        ];

        for (initial, multiplier, cap, budget) in schedules {
            let start = Instant::now();
            let deadline = start + budget;
            let policy = RetryPolicy::on_code(
                StatusCode::Unauthenticated,
                Backoff::new(initial, cap, multiplier),
                deadline,
            );
            let starts = Mutex::new(Vec::new());

            let result = RetryingInvoker::new(policy)
                .invoke("test.op", || {
                    starts.lock().unwrap().push(Instant::now());
                    async { Err::<(), _>(transient()) }
                })
                .await;
            assert!(matches!(result, Err(RetryError::DeadlineExceeded { .. })));

            let starts = starts.into_inner().unwrap();
            assert!(!starts.is_empty());
            for pair in starts.windows(2) {
                assert!(pair[1] - pair[0] <= cap, "gap exceeded cap");
            }
            for at in &starts {
                assert!(*at <= deadline, "attempt started after deadline");
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn injected_classifier_controls_retry() {
        let policy = RetryPolicy::with_classifier(
            |err: &String| {
                if err.starts_with("busy") {
                    ErrorClass::Transient
                } else {
                    ErrorClass::Fatal
                }
            },
            Backoff::new(Duration::from_millis(10), Duration::from_millis(10), 1.0),
            Instant::now() + Duration::from_secs(1),
        );
        let calls = AtomicU32::new(0);

        let value = RetryingInvoker::new(policy)
            .invoke("custom", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 3 {
                        Err(format!("busy #{n}"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 3);
    }

    #[test]
    fn retry_error_converts_to_top_level_deadline() {
        let err: CmekCheckError = RetryError::DeadlineExceeded {
            attempts: 3,
            elapsed: Duration::from_millis(2500),
            last: transient(),
        }
        .into();
        match err {
            CmekCheckError::DeadlineExceeded {
                operation,
                attempts,
                elapsed_ms,
                ..
            } => {
                assert_eq!(operation, "test.op");
                assert_eq!(attempts, 3);
                assert_eq!(elapsed_ms, 2500);
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn retry_error_fatal_converts_to_api() {
        let err: CmekCheckError = RetryError::Fatal(fatal()).into();
        assert!(matches!(err, CmekCheckError::Api(_)));
    }
}
