//! 설정 관리 — opshub.toml 파싱 및 런타임 설정
//!
//! [`OpsHubConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`OPSHUB_DISCOVERY_INCLUDE_REGEX=^ollama` 형식)
//! 3. 설정 파일 (`opshub.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), opshub_core::error::OpsHubError> {
//! use opshub_core::config::OpsHubConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = OpsHubConfig::load("opshub.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = OpsHubConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, OpsHubError};
use crate::types::RetentionPolicy;

/// OpsHub 통합 설정
///
/// `opshub.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpsHubConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 소스 탐색 설정
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    /// tail 워커 설정
    #[serde(default)]
    pub tail: TailConfig,
    /// 저장소 설정
    #[serde(default)]
    pub storage: StorageConfig,
    /// 보존 정책 설정
    #[serde(default)]
    pub retention: RetentionConfig,
    /// 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl OpsHubConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, OpsHubError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, OpsHubError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                OpsHubError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                OpsHubError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, OpsHubError> {
        toml::from_str(toml_str).map_err(|e| {
            OpsHubError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `OPSHUB_{SECTION}_{FIELD}`
    /// 예: `OPSHUB_RETENTION_ACTIVE_DAYS=3`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "OPSHUB_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "OPSHUB_GENERAL_LOG_FORMAT");

        // Discovery
        override_string(
            &mut self.discovery.include_regex,
            "OPSHUB_DISCOVERY_INCLUDE_REGEX",
        );
        override_string(
            &mut self.discovery.exclude_regex,
            "OPSHUB_DISCOVERY_EXCLUDE_REGEX",
        );
        override_bool(
            &mut self.discovery.include_stopped,
            "OPSHUB_DISCOVERY_INCLUDE_STOPPED",
        );
        override_string(
            &mut self.discovery.docker_socket,
            "OPSHUB_DISCOVERY_DOCKER_SOCKET",
        );

        // Tail
        override_usize(&mut self.tail.backlog_lines, "OPSHUB_TAIL_BACKLOG_LINES");

        // Storage
        override_string(&mut self.storage.log_dir, "OPSHUB_STORAGE_LOG_DIR");
        override_string(&mut self.storage.db_path, "OPSHUB_STORAGE_DB_PATH");
        override_usize(
            &mut self.storage.channel_capacity,
            "OPSHUB_STORAGE_CHANNEL_CAPACITY",
        );

        // Retention
        override_u32(
            &mut self.retention.active_days,
            "OPSHUB_RETENTION_ACTIVE_DAYS",
        );
        override_u32(
            &mut self.retention.archive_days,
            "OPSHUB_RETENTION_ARCHIVE_DAYS",
        );
        override_u32(&mut self.retention.purge_days, "OPSHUB_RETENTION_PURGE_DAYS");
        override_u64(
            &mut self.retention.sweep_interval_secs,
            "OPSHUB_RETENTION_SWEEP_INTERVAL_SECS",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "OPSHUB_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "OPSHUB_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "OPSHUB_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    ///
    /// 보존 기간 순서(`active <= archive <= purge`)는 강제하지 않고 경고만 남깁니다.
    pub fn validate(&self) -> Result<(), OpsHubError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        // 정규식 검증
        validate_regex("discovery.include_regex", &self.discovery.include_regex)?;
        validate_regex("discovery.exclude_regex", &self.discovery.exclude_regex)?;

        if self.tail.backlog_lines == 0 {
            return Err(ConfigError::InvalidValue {
                field: "tail.backlog_lines".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.storage.log_dir.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "storage.log_dir".to_owned(),
                reason: "must not be empty".to_owned(),
            }
            .into());
        }

        if self.storage.db_path.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "storage.db_path".to_owned(),
                reason: "must not be empty".to_owned(),
            }
            .into());
        }

        if self.storage.channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "storage.channel_capacity".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.retention.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retention.sweep_interval_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        let policy = self.retention.policy();
        if !policy.is_ordered() {
            warn!(
                active_days = policy.active_days,
                archive_days = policy.archive_days,
                purge_days = policy.purge_days,
                "retention thresholds are not ordered (active <= archive <= purge), sweeps may be meaningless"
            );
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 소스 탐색 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// 포함할 소스 이름 정규식
    pub include_regex: String,
    /// 제외할 소스 이름 정규식 (기본값은 아무것도 제외하지 않음)
    pub exclude_regex: String,
    /// 정지된 소스도 포함할지 여부
    pub include_stopped: bool,
    /// Docker 소켓 경로 (비어 있으면 로컬 기본값)
    pub docker_socket: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            include_regex: ".*".to_owned(),
            exclude_regex: "^$".to_owned(),
            include_stopped: false,
            docker_socket: String::new(),
        }
    }
}

/// tail 워커 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TailConfig {
    /// 시작 시 읽을 과거 라인 수
    pub backlog_lines: usize,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self { backlog_lines: 100 }
    }
}

/// 저장소 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 파일 로그 루트 디렉토리
    pub log_dir: String,
    /// SQLite 데이터베이스 경로
    pub db_path: String,
    /// 저장소 명령 채널 용량
    pub channel_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            log_dir: "/data/logs".to_owned(),
            db_path: "/data/opshub.db".to_owned(),
            channel_capacity: 1024,
        }
    }
}

/// 보존 정책 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// 파일 로그 보존 기간 (일)
    pub active_days: u32,
    /// 저장소 레코드 보존 기간 (일)
    pub archive_days: u32,
    /// 성능 메트릭 보존 기간 (일)
    pub purge_days: u32,
    /// 정리 주기 (초)
    pub sweep_interval_secs: u64,
}

impl RetentionConfig {
    /// 보존 정책 값만 추출합니다.
    pub fn policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            active_days: self.active_days,
            archive_days: self.archive_days,
            purge_days: self.purge_days,
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        let policy = RetentionPolicy::default();
        Self {
            active_days: policy.active_days,
            archive_days: policy.archive_days,
            purge_days: policy.purge_days,
            sweep_interval_secs: 3600,
        }
    }
}

/// 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus 엔드포인트 활성화 여부
    pub enabled: bool,
    /// 수신 주소
    pub listen_addr: String,
    /// 수신 포트
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
        }
    }
}

fn validate_regex(field: &str, pattern: &str) -> Result<(), OpsHubError> {
    Regex::new(pattern).map_err(|e| ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: format!("invalid regex: {e}"),
    })?;
    Ok(())
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.to_lowercase().as_str() {
            "1" | "true" | "yes" => *target = true,
            "0" | "false" | "no" => *target = false,
            _ => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, env_key: &str, type_name: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse {type_name} from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    override_parsed(target, env_key, "usize");
}

fn override_u16(target: &mut u16, env_key: &str) {
    override_parsed(target, env_key, "u16");
}

fn override_u32(target: &mut u32, env_key: &str) {
    override_parsed(target, env_key, "u32");
}

fn override_u64(target: &mut u64, env_key: &str) {
    override_parsed(target, env_key, "u64");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn default_config_has_sane_values() {
        let config = OpsHubConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.discovery.include_regex, ".*");
        assert_eq!(config.discovery.exclude_regex, "^$");
        assert!(!config.discovery.include_stopped);
        assert_eq!(config.tail.backlog_lines, 100);
        assert_eq!(config.storage.log_dir, "/data/logs");
        assert_eq!(config.retention.policy(), RetentionPolicy::default());
        assert_eq!(config.retention.sweep_interval_secs, 3600);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn default_config_passes_validation() {
        OpsHubConfig::default().validate().unwrap();
    }

    #[test]
    fn from_str_empty_toml_uses_defaults() {
        let config = OpsHubConfig::parse("").unwrap();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.storage.db_path, "/data/opshub.db");
    }

    #[test]
    fn from_str_partial_toml_merges_with_defaults() {
        let toml = r#"
[general]
log_level = "debug"

[retention]
active_days = 3
"#;
        let config = OpsHubConfig::parse(toml).unwrap();
        assert_eq!(config.general.log_level, "debug");
        // log_format은 기본값 유지
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.retention.active_days, 3);
        assert_eq!(config.retention.archive_days, 30);
    }

    #[test]
    fn from_str_invalid_toml_returns_error() {
        let err = OpsHubConfig::parse("invalid = [[[toml").unwrap_err();
        assert!(matches!(
            err,
            OpsHubError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = OpsHubConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn validate_rejects_invalid_log_format() {
        let mut config = OpsHubConfig::default();
        config.general.log_format = "xml".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_format"));
    }

    #[test]
    fn validate_rejects_invalid_regex() {
        let mut config = OpsHubConfig::default();
        config.discovery.include_regex = "(unclosed".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("include_regex"));
    }

    #[test]
    fn validate_rejects_zero_backlog() {
        let mut config = OpsHubConfig::default();
        config.tail.backlog_lines = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("backlog_lines"));
    }

    #[test]
    fn validate_rejects_zero_sweep_interval() {
        let mut config = OpsHubConfig::default();
        config.retention.sweep_interval_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sweep_interval_secs"));
    }

    #[test]
    fn validate_accepts_unordered_retention() {
        let mut config = OpsHubConfig::default();
        config.retention.active_days = 60;
        config.retention.archive_days = 30;
        // 순서 위반은 경고만 남김
        config.validate().unwrap();
    }

    #[test]
    #[serial]
    fn env_override_string() {
        let mut val = "original".to_owned();
        // SAFETY: serial 테스트로 환경변수 조작이 다른 테스트와 겹치지 않습니다.
        unsafe { std::env::set_var("TEST_OPSHUB_STR", "overridden") };
        override_string(&mut val, "TEST_OPSHUB_STR");
        assert_eq!(val, "overridden");
        unsafe { std::env::remove_var("TEST_OPSHUB_STR") };
    }

    #[test]
    #[serial]
    fn env_override_bool_accepts_yes() {
        let mut val = false;
        // SAFETY: serial 테스트로 환경변수 조작이 다른 테스트와 겹치지 않습니다.
        unsafe { std::env::set_var("TEST_OPSHUB_BOOL", "yes") };
        override_bool(&mut val, "TEST_OPSHUB_BOOL");
        assert!(val);
        unsafe { std::env::remove_var("TEST_OPSHUB_BOOL") };
    }

    #[test]
    #[serial]
    fn env_override_bool_invalid_keeps_original() {
        let mut val = false;
        // SAFETY: serial 테스트로 환경변수 조작이 다른 테스트와 겹치지 않습니다.
        unsafe { std::env::set_var("TEST_OPSHUB_BOOL_BAD", "not-a-bool") };
        override_bool(&mut val, "TEST_OPSHUB_BOOL_BAD");
        assert!(!val);
        unsafe { std::env::remove_var("TEST_OPSHUB_BOOL_BAD") };
    }

    #[test]
    #[serial]
    fn env_override_u32_invalid_keeps_original() {
        let mut val = 7u32;
        // SAFETY: serial 테스트로 환경변수 조작이 다른 테스트와 겹치지 않습니다.
        unsafe { std::env::set_var("TEST_OPSHUB_U32_BAD", "-1") };
        override_u32(&mut val, "TEST_OPSHUB_U32_BAD");
        assert_eq!(val, 7);
        unsafe { std::env::remove_var("TEST_OPSHUB_U32_BAD") };
    }

    #[test]
    fn env_override_missing_var_keeps_original() {
        let mut val = "original".to_owned();
        override_string(&mut val, "TEST_OPSHUB_NONEXISTENT_12345");
        assert_eq!(val, "original");
    }

    #[test]
    fn config_serialize_roundtrip() {
        let config = OpsHubConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = OpsHubConfig::parse(&toml_str).unwrap();
        assert_eq!(config.general.log_level, parsed.general.log_level);
        assert_eq!(
            config.discovery.exclude_regex,
            parsed.discovery.exclude_regex
        );
        assert_eq!(config.retention.policy(), parsed.retention.policy());
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let err = OpsHubConfig::from_file("/nonexistent/path/opshub.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OpsHubError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
