//! CMEK 워크플로 -- 키 계층 생성 후 보호 시크릿 생성
//!
//! ```text
//! KeyHierarchyProvisioner ──CryptoKey──▶ ProtectedSecretProvisioner ──▶ WorkflowReport
//! ```
//!
//! 첫 에러에서 중단하며 이미 생성된 리소스는 정리하지 않습니다.
//! 모든 로그 이벤트는 `run_id` 필드를 가진 span 안에서 기록됩니다.

use std::sync::Arc;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

use cmekcheck_core::config::CmekCheckConfig;
use cmekcheck_core::error::CmekCheckError;
use cmekcheck_core::metrics as m;
use cmekcheck_core::naming::IdGenerator;
use cmekcheck_core::pipeline::Stage;
use cmekcheck_core::types::IdentityContext;
use cmekcheck_key_hierarchy::{
    CryptoKey, KeyHierarchy, KeyHierarchyProvisioner, KeyManagementClient,
};
use cmekcheck_protected_secret::{
    ProtectedSecret, ProtectedSecretProvisioner, SecretManagerClient,
};

/// 워크플로 실행 결과 (보고용)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowReport {
    pub run_id: Uuid,
    pub project_id: String,
    pub key_ring: String,
    pub crypto_key: String,
    pub secret: String,
    pub secret_version: String,
    pub elapsed_ms: u64,
}

/// 두 단계를 순서대로 실행하는 워크플로
pub struct CmekWorkflow<K, S> {
    identity: IdentityContext,
    key_stage: K,
    secret_stage: S,
}

impl<K, S> CmekWorkflow<K, S>
where
    K: Stage<(), Output = KeyHierarchy>,
    S: Stage<CryptoKey, Output = ProtectedSecret>,
{
    pub fn new(identity: IdentityContext, key_stage: K, secret_stage: S) -> Self {
        Self {
            identity,
            key_stage,
            secret_stage,
        }
    }

    pub fn identity(&self) -> &IdentityContext {
        &self.identity
    }

    /// 워크플로를 한 번 실행합니다.
    ///
    /// 성공/실패와 관계없이 소요 시간과 실행 결과 메트릭을 기록합니다.
    pub async fn run(&self) -> Result<WorkflowReport, CmekCheckError> {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "workflow",
            run_id = %run_id,
            project = self.identity.project_id.as_str(),
        );

        let started = Instant::now();
        let result = self.execute().instrument(span).await;
        let elapsed = started.elapsed();

        metrics::histogram!(m::WORKFLOW_DURATION_SECONDS).record(elapsed.as_secs_f64());
        let outcome = match &result {
            Ok(_) => "success",
            Err(err) if err.is_deadline_exceeded() => "deadline_exceeded",
            Err(_) => "failure",
        };
        metrics::counter!(m::WORKFLOW_RUNS_TOTAL, m::LABEL_RESULT => outcome).increment(1);

        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        match result {
            Ok((hierarchy, protected)) => {
                info!(run_id = %run_id, elapsed_ms, "workflow completed");
                Ok(WorkflowReport {
                    run_id,
                    project_id: self.identity.project_id.clone(),
                    key_ring: hierarchy.key_ring.name,
                    crypto_key: hierarchy.crypto_key.name,
                    secret: protected.secret.name,
                    secret_version: protected.version.name,
                    elapsed_ms,
                })
            }
            Err(err) => {
                error!(run_id = %run_id, elapsed_ms, error = %err, "workflow failed");
                Err(err)
            }
        }
    }

    async fn execute(&self) -> Result<(KeyHierarchy, ProtectedSecret), CmekCheckError> {
        let hierarchy = run_stage(&self.key_stage, ()).await?;
        let protected = run_stage(&self.secret_stage, hierarchy.crypto_key.clone()).await?;
        Ok((hierarchy, protected))
    }
}

impl<C, M> CmekWorkflow<KeyHierarchyProvisioner<C>, ProtectedSecretProvisioner<M>>
where
    C: KeyManagementClient,
    M: SecretManagerClient,
{
    /// 설정과 클라이언트로 기본 프로비저너 구성의 워크플로를 만듭니다.
    pub fn from_clients(
        config: &CmekCheckConfig,
        identity: IdentityContext,
        kms: Arc<C>,
        secrets: Arc<M>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        let key_stage = KeyHierarchyProvisioner::new(
            kms,
            identity.clone(),
            config.kms.location.clone(),
            config.retry.clone(),
            Arc::clone(&ids),
        );
        let secret_stage = ProtectedSecretProvisioner::new(
            secrets,
            identity.clone(),
            config.secret_manager.payload_len,
            ids,
        );
        Self::new(identity, key_stage, secret_stage)
    }
}

async fn run_stage<I, T: Stage<I>>(stage: &T, input: I) -> Result<T::Output, CmekCheckError> {
    info!(stage = stage.name(), "stage started");
    match stage.run(input).await {
        Ok(output) => {
            info!(stage = stage.name(), "stage completed");
            Ok(output)
        }
        Err(err) => {
            error!(stage = stage.name(), error = %err, "stage failed");
            Err(err)
        }
    }
}
