//! 파이프라인 trait — 모듈 생명주기 정의
//!
//! 데몬은 [`Pipeline`]을 구현한 모듈을 start → (health_check)* → stop 순서로 관리합니다.

use std::future::Future;

use serde::Serialize;

use crate::error::OpsHubError;

/// 모듈 헬스 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum HealthStatus {
    /// 정상
    Healthy,
    /// 동작하지만 일부 기능 저하
    Degraded(String),
    /// 비정상
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 여부
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 비정상 여부
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

/// 모든 실행 모듈이 구현하는 생명주기 trait
///
/// `start`는 백그라운드 태스크를 스폰한 뒤 즉시 반환해야 하며,
/// `stop`은 스폰한 태스크가 모두 끝날 때까지 기다립니다.
pub trait Pipeline: Send {
    /// 모듈을 시작합니다.
    fn start(&mut self) -> impl Future<Output = Result<(), OpsHubError>> + Send;

    /// 모듈을 정지합니다 (graceful).
    fn stop(&mut self) -> impl Future<Output = Result<(), OpsHubError>> + Send;

    /// 현재 헬스 상태를 반환합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}
