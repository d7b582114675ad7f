//! cmekcheck 워크플로
//!
//! [`CmekWorkflow`]는 키 계층 단계와 보호 시크릿 단계를 순서대로 실행하고
//! [`WorkflowReport`]를 반환합니다.

pub mod workflow;

pub use workflow::{CmekWorkflow, WorkflowReport};
