//! 파이프라인 trait -- 워크플로 단계 정의
//!
//! 각 프로비저너는 이전 단계의 출력을 입력으로 받는 [`Stage`]를 구현합니다.
//!
//! ```text
//! () ─▶ KeyHierarchy ─▶ CryptoKey ─▶ ProtectedSecret ─▶ ProtectedSecret
//! ```
//!
//! 단계는 순서대로 실행되며, 첫 에러에서 파이프라인 전체가 중단됩니다.
//! 이미 생성된 리소스는 되돌리지 않습니다.

use std::future::Future;

use crate::error::CmekCheckError;

/// 워크플로의 한 단계
///
/// # 구현 예시
/// ```ignore
/// impl Stage<()> for MyStage {
///     type Output = String;
///
///     fn name(&self) -> &str { "my-stage" }
///
///     async fn run(&self, _input: ()) -> Result<String, CmekCheckError> {
///         Ok("done".to_owned())
///     }
/// }
/// ```
pub trait Stage<I>: Send + Sync {
    /// 다음 단계로 넘기는 출력
    type Output: Send;

    /// 단계 이름 (로그용)
    fn name(&self) -> &str;

    /// 단계를 실행합니다.
    fn run(&self, input: I) -> impl Future<Output = Result<Self::Output, CmekCheckError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Double;

    impl Stage<u32> for Double {
        type Output = u32;

        fn name(&self) -> &str {
            "double"
        }

        async fn run(&self, input: u32) -> Result<u32, CmekCheckError> {
            Ok(input * 2)
        }
    }

    struct Fail;

    impl Stage<u32> for Fail {
        type Output = ();

        fn name(&self) -> &str {
            "fail"
        }

        async fn run(&self, _input: u32) -> Result<(), CmekCheckError> {
            Err(crate::error::ConfigError::Missing {
                field: "x".to_owned(),
            }
            .into())
        }
    }

    async fn chain<A, B>(a: &A, b: &B, input: u32) -> Result<B::Output, CmekCheckError>
    where
        A: Stage<u32, Output = u32>,
        B: Stage<u32>,
    {
        let mid = a.run(input).await?;
        b.run(mid).await
    }

    #[tokio::test]
    async fn stages_compose() {
        let out = chain(&Double, &Double, 3).await.unwrap();
        assert_eq!(out, 12);
        assert_eq!(Double.name(), "double");
    }

    #[tokio::test]
    async fn failing_stage_stops_chain() {
        let err = chain(&Double, &Fail, 3).await.unwrap_err();
        assert!(matches!(err, CmekCheckError::Config(_)));
    }
}
