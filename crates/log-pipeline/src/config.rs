//! 로그 파이프라인 설정
//!
//! [`PipelineConfig`]는 core의 [`OpsHubConfig`](opshub_core::config::OpsHubConfig)에서
//! 파이프라인이 쓰는 섹션(discovery, tail, storage, retention)만 모은 것입니다.
//!
//! # 사용 예시
//! ```ignore
//! use opshub_core::config::OpsHubConfig;
//! use opshub_log_pipeline::config::PipelineConfig;
//!
//! let core_config = OpsHubConfig::default();
//! let config = PipelineConfig::from_core(&core_config);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use opshub_core::config::OpsHubConfig;
use opshub_core::types::RetentionPolicy;

use crate::error::LogPipelineError;

/// 로그 파이프라인 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// 포함할 소스 이름 정규식 (부분 매칭)
    pub include_regex: String,
    /// 제외할 소스 이름 정규식 (부분 매칭)
    pub exclude_regex: String,
    /// 정지된 소스도 탐색할지 여부
    pub include_stopped: bool,
    /// Docker 소켓 경로 (비어 있으면 플랫폼 기본값)
    pub docker_socket: String,
    /// 시작 시 읽을 과거 라인 수
    pub backlog_lines: usize,
    /// 파일 싱크 루트 디렉토리
    pub log_dir: PathBuf,
    /// SQLite 데이터베이스 경로
    pub db_path: PathBuf,
    /// 저장소 명령 채널 용량
    pub store_channel_capacity: usize,
    /// 보존 정책
    pub retention: RetentionPolicy,
    /// 보존 정리 주기 (초)
    pub sweep_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_core(&OpsHubConfig::default())
    }
}

impl PipelineConfig {
    /// core 설정에서 파이프라인 설정을 생성합니다.
    pub fn from_core(core: &OpsHubConfig) -> Self {
        Self {
            include_regex: core.discovery.include_regex.clone(),
            exclude_regex: core.discovery.exclude_regex.clone(),
            include_stopped: core.discovery.include_stopped,
            docker_socket: core.discovery.docker_socket.clone(),
            backlog_lines: core.tail.backlog_lines,
            log_dir: PathBuf::from(&core.storage.log_dir),
            db_path: PathBuf::from(&core.storage.db_path),
            store_channel_capacity: core.storage.channel_capacity,
            retention: core.retention.policy(),
            sweep_interval_secs: core.retention.sweep_interval_secs,
        }
    }

    /// 보존 정리 주기
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), LogPipelineError> {
        const MAX_BACKLOG_LINES: usize = 100_000;

        if self.backlog_lines == 0 || self.backlog_lines > MAX_BACKLOG_LINES {
            return Err(LogPipelineError::Config {
                field: "backlog_lines".to_owned(),
                reason: format!("must be 1-{MAX_BACKLOG_LINES}"),
            });
        }

        if self.log_dir.as_os_str().is_empty() {
            return Err(LogPipelineError::Config {
                field: "log_dir".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }

        if self.db_path.as_os_str().is_empty() {
            return Err(LogPipelineError::Config {
                field: "db_path".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }

        if self.store_channel_capacity == 0 {
            return Err(LogPipelineError::Config {
                field: "store_channel_capacity".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if self.sweep_interval_secs == 0 {
            return Err(LogPipelineError::Config {
                field: "sweep_interval_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        regex::Regex::new(&self.include_regex)?;
        regex::Regex::new(&self.exclude_regex)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.backlog_lines, 100);
        assert_eq!(config.retention, RetentionPolicy::default());
        assert_eq!(config.sweep_interval(), Duration::from_secs(3600));
    }

    #[test]
    fn from_core_copies_sections() {
        let mut core = OpsHubConfig::default();
        core.discovery.include_regex = "^ollama".to_owned();
        core.tail.backlog_lines = 5;
        core.storage.log_dir = "/tmp/opshub-logs".to_owned();
        core.retention.active_days = 1;

        let config = PipelineConfig::from_core(&core);
        assert_eq!(config.include_regex, "^ollama");
        assert_eq!(config.backlog_lines, 5);
        assert_eq!(config.log_dir, PathBuf::from("/tmp/opshub-logs"));
        assert_eq!(config.retention.active_days, 1);
    }

    #[test]
    fn zero_backlog_rejected() {
        let config = PipelineConfig {
            backlog_lines: 0,
            ..PipelineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("backlog_lines"));
    }

    #[test]
    fn empty_paths_rejected() {
        let config = PipelineConfig {
            log_dir: PathBuf::new(),
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            db_path: PathBuf::new(),
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_regex_rejected() {
        let config = PipelineConfig {
            exclude_regex: "(".to_owned(),
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(LogPipelineError::Regex(_))
        ));
    }

    #[test]
    fn zero_sweep_interval_rejected() {
        let config = PipelineConfig {
            sweep_interval_secs: 0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
