//! 도메인 타입 -- 워크플로 전역에서 사용되는 공통 타입
//!
//! 외부 인프라 협력자가 넘겨주는 신원 정보와 리소스 경로 규칙을 정의합니다.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// 신원 컨텍스트
///
/// 가장(impersonate)할 서비스 계정과 대상 프로젝트입니다.
/// 워크플로 실행 동안 변경되지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityContext {
    /// 대상 프로젝트 ID
    pub project_id: String,
    /// 가장할 서비스 계정 (예: `"tester@proj.iam.gserviceaccount.com"`)
    pub impersonate_service_account: String,
}

impl IdentityContext {
    /// 값을 검증하여 신원 컨텍스트를 생성합니다.
    pub fn new(
        project_id: impl Into<String>,
        impersonate_service_account: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let ctx = Self {
            project_id: project_id.into().trim().to_owned(),
            impersonate_service_account: impersonate_service_account.into().trim().to_owned(),
        };
        ctx.validate()?;
        Ok(ctx)
    }

    /// 값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project_id.is_empty() {
            return Err(ConfigError::Missing {
                field: "identity.project_id".to_owned(),
            });
        }
        if self.project_id.contains('/') {
            return Err(ConfigError::InvalidValue {
                field: "identity.project_id".to_owned(),
                reason: "must not contain '/'".to_owned(),
            });
        }
        if self.impersonate_service_account.is_empty() {
            return Err(ConfigError::Missing {
                field: "identity.impersonate_service_account".to_owned(),
            });
        }
        if !self.impersonate_service_account.contains('@') {
            return Err(ConfigError::InvalidValue {
                field: "identity.impersonate_service_account".to_owned(),
                reason: "must be a service account email".to_owned(),
            });
        }
        Ok(())
    }

    /// `projects/{project}`
    pub fn project_parent(&self) -> String {
        format!("projects/{}", self.project_id)
    }

    /// `projects/{project}/locations/{location}`
    pub fn location_parent(&self, location: &str) -> String {
        format!("projects/{}/locations/{}", self.project_id, location)
    }
}

impl fmt::Display for IdentityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} as {}",
            self.project_id, self.impersonate_service_account
        )
    }
}

/// 리소스 전체 이름의 마지막 세그먼트(ID)를 반환합니다.
///
/// `projects/p/locations/global/keyRings/kr-abc123` → `kr-abc123`
pub fn resource_id(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}
