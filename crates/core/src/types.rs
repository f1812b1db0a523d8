//! 도메인 타입 — 시스템 전역에서 사용되는 공통 타입
//!
//! 수집 대상 소스, 분류된 로그 엔트리, 세션 이벤트, 보존 정책 등
//! 모든 크레이트가 공유하는 데이터 구조를 정의합니다.

use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

use bytes::Bytes;
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// 엔트리 타임스탬프 형식 (ISO-8601, 로컬 시각, 마이크로초)
///
/// 사전식 비교가 시간 순서와 일치하므로 저장소의 정렬/범위 조건에 그대로 사용합니다.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// 로그 엔트리의 수집 채널 태그
pub const DOCKER_LOGS_ORIGIN: &str = "docker_logs";

/// 시각을 엔트리 타임스탬프 문자열로 변환합니다.
pub fn format_timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// 현재 로컬 시각의 타임스탬프 문자열
pub fn now_timestamp() -> String {
    format_timestamp(Local::now().naive_local())
}

/// 로그 심각도 레벨
///
/// 닫힌 집합이며, 어떤 패턴에도 매칭되지 않는 라인은 [`Level::Info`]가 됩니다.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    /// 치명적
    Critical,
    /// 에러
    Error,
    /// 경고
    Warning,
    /// 성공/완료
    Success,
    /// 정보성 (기본값)
    #[default]
    Info,
}

impl Level {
    /// 모든 레벨 (분류 우선순위와 무관한 표시 순서)
    pub const ALL: [Level; 5] = [
        Level::Critical,
        Level::Error,
        Level::Warning,
        Level::Success,
        Level::Info,
    ];

    /// 대문자 레벨명 (파일명과 저장소 컬럼에 사용)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::Error => "ERROR",
            Self::Warning => "WARNING",
            Self::Success => "SUCCESS",
            Self::Info => "INFO",
        }
    }

    /// 문자열에서 레벨을 파싱합니다.
    ///
    /// 대소문자를 구분하지 않습니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CRITICAL" | "CRIT" => Some(Self::Critical),
            "ERROR" | "ERR" => Some(Self::Error),
            "WARNING" | "WARN" => Some(Self::Warning),
            "SUCCESS" => Some(Self::Success),
            "INFO" => Some(Self::Info),
            _ => None,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 소스 유형
///
/// 이름에서 파생되며 메타데이터 추출 규칙을 결정합니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Open WebUI 컨테이너
    OpenWebUi,
    /// Ollama 컨테이너
    Ollama,
    /// 그 외
    #[default]
    Generic,
}

impl SourceKind {
    /// 소스 이름에서 유형을 판별합니다 (대소문자 무시, 부분 문자열 매칭).
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower.contains("openwebui") {
            Self::OpenWebUi
        } else if lower.contains("ollama") {
            Self::Ollama
        } else {
            Self::Generic
        }
    }

    /// 유형명
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenWebUi => "openwebui",
            Self::Ollama => "ollama",
            Self::Generic => "generic",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 수집 대상 소스
///
/// 탐색 시점에 생성되며 프로세스 수명 동안 변하지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// 고유 이름
    pub name: String,
    /// 런타임이 부여한 불투명 식별자 (컨테이너 ID)
    pub id: String,
    /// 이름에서 파생된 유형
    pub kind: SourceKind,
}

impl Source {
    /// 이름과 ID로 소스를 생성합니다. 유형은 이름에서 파생됩니다.
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        let name = name.into();
        let kind = SourceKind::from_name(&name);
        Self {
            name,
            id: id.into(),
            kind,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) kind={}",
            self.name,
            self.id.get(..12).unwrap_or(&self.id),
            self.kind,
        )
    }
}

/// 런타임이 나열한 소스 요약
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    /// 이름
    pub name: String,
    /// 식별자
    pub id: String,
    /// 상태 (running, exited 등)
    pub status: String,
}

/// 소스에서 읽은 원시 라인
///
/// 읽기 직후 분류 단계에서 소비되며 그대로 저장되지 않습니다.
#[derive(Debug, Clone)]
pub struct RawLine {
    /// 소스 이름
    pub source: String,
    /// 원시 바이트
    pub data: Bytes,
    /// 수신 시각
    pub received_at: SystemTime,
}

impl RawLine {
    /// 새 원시 라인을 생성합니다.
    pub fn new(source: impl Into<String>, data: Bytes) -> Self {
        Self {
            source: source.into(),
            data,
            received_at: SystemTime::now(),
        }
    }
}

/// 추출된 메타데이터 (키 순서 고정)
pub type Metadata = BTreeMap<String, String>;

/// 분류된 로그 엔트리 — 영속화 단위
///
/// 원시 라인 하나당 한 번 생성되고 이후 변경되지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedEntry {
    /// 처리 시각 (ISO-8601)
    pub timestamp: String,
    /// 소스 이름
    pub source_name: String,
    /// 소스 식별자
    pub source_id: String,
    /// 심각도
    pub level: Level,
    /// 원본 라인 텍스트
    pub message: String,
    /// 원본 라인 복사본
    pub raw_log: String,
    /// 수집 채널 태그
    pub origin: String,
    /// 추출된 메타데이터
    pub metadata: Metadata,
}

impl ClassifiedEntry {
    /// 소스와 라인으로 엔트리를 생성합니다.
    pub fn new(
        source: &Source,
        level: Level,
        line: &str,
        timestamp: String,
        metadata: Metadata,
    ) -> Self {
        Self {
            timestamp,
            source_name: source.name.clone(),
            source_id: source.id.clone(),
            level,
            message: line.to_owned(),
            raw_log: line.to_owned(),
            origin: DOCKER_LOGS_ORIGIN.to_owned(),
            metadata,
        }
    }
}

impl fmt::Display for ClassifiedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}][{}] {}",
            self.timestamp, self.level, self.source_name, self.message,
        )
    }
}

/// 사용자 활동 기록
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEvent {
    /// 기록 시각 (ISO-8601)
    pub timestamp: String,
    /// 사용자명
    pub username: String,
    /// 사용 모델 (있을 경우)
    pub model: Option<String>,
    /// 활동 (login 등)
    pub action: String,
    /// 원본 메타데이터
    pub metadata: Metadata,
}

impl SessionEvent {
    /// 로그인 메타데이터에서 세션 이벤트를 생성합니다.
    ///
    /// `action=login`과 `user`가 모두 있을 때만 `Some`을 반환합니다.
    pub fn login_from(metadata: &Metadata, timestamp: &str) -> Option<Self> {
        if metadata.get("action").map(String::as_str) != Some("login") {
            return None;
        }
        let username = metadata.get("user")?;
        Some(Self {
            timestamp: timestamp.to_owned(),
            username: username.clone(),
            model: metadata.get("model").cloned(),
            action: "login".to_owned(),
            metadata: metadata.clone(),
        })
    }
}

/// 보존 정책 (일 단위)
///
/// `active <= archive <= purge` 순서를 기대하지만 강제하지 않습니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// 파일 로그 보존 기간
    pub active_days: u32,
    /// 저장소 레코드 보존 기간
    pub archive_days: u32,
    /// 성능 메트릭 보존 기간
    pub purge_days: u32,
}

impl RetentionPolicy {
    /// 임계값 순서가 올바른지 확인합니다.
    pub fn is_ordered(&self) -> bool {
        self.active_days <= self.archive_days && self.archive_days <= self.purge_days
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            active_days: 7,
            archive_days: 30,
            purge_days: 90,
        }
    }
}

/// 성능 메트릭 레코드 (호스트/GPU 수집기가 기록)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetric {
    /// 기록 시각
    pub timestamp: String,
    /// 메트릭 분류 (cpu, gpu, memory 등)
    pub metric_type: String,
    /// 메트릭 이름
    pub metric_name: String,
    /// 값
    pub value: f64,
    /// 단위
    pub unit: Option<String>,
    /// 관련 컨테이너
    pub container_name: Option<String>,
}

/// 컨테이너 상태 스냅샷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerStatus {
    /// 기록 시각
    pub timestamp: String,
    /// 컨테이너 이름
    pub container_name: String,
    /// 컨테이너 ID
    pub container_id: String,
    /// 상태
    pub status: String,
    /// CPU 사용률 (%)
    pub cpu_percent: Option<f64>,
    /// 메모리 사용량 (MB)
    pub memory_usage_mb: Option<f64>,
}

/// 알림 레코드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    /// 저장소 ID (저장 전에는 0)
    pub id: i64,
    /// 생성 시각
    pub timestamp: String,
    /// 알림 종류
    pub alert_type: String,
    /// 심각도
    pub severity: String,
    /// 메시지
    pub message: String,
    /// 관련 컨테이너
    pub container_name: Option<String>,
    /// 해결 여부
    pub resolved: bool,
    /// 해결 시각
    pub resolved_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn level_default_is_info() {
        assert_eq!(Level::default(), Level::Info);
    }

    #[test]
    fn level_display_is_uppercase() {
        assert_eq!(Level::Critical.to_string(), "CRITICAL");
        assert_eq!(Level::Warning.to_string(), "WARNING");
        assert_eq!(Level::Info.to_string(), "INFO");
    }

    #[test]
    fn level_from_str_loose() {
        assert_eq!(Level::from_str_loose("error"), Some(Level::Error));
        assert_eq!(Level::from_str_loose(" Warning "), Some(Level::Warning));
        assert_eq!(Level::from_str_loose("warn"), Some(Level::Warning));
        assert_eq!(Level::from_str_loose("CRITICAL"), Some(Level::Critical));
        assert_eq!(Level::from_str_loose("all"), None);
    }

    #[test]
    fn level_serializes_uppercase() {
        let json = serde_json::to_string(&Level::Success).unwrap();
        assert_eq!(json, "\"SUCCESS\"");
    }

    #[test]
    fn source_kind_from_name() {
        assert_eq!(SourceKind::from_name("openwebui-1"), SourceKind::OpenWebUi);
        assert_eq!(SourceKind::from_name("My-OpenWebUI"), SourceKind::OpenWebUi);
        assert_eq!(SourceKind::from_name("ollama"), SourceKind::Ollama);
        assert_eq!(SourceKind::from_name("postgres"), SourceKind::Generic);
    }

    #[test]
    fn source_display_truncates_id() {
        let source = Source::new("ollama", "0123456789abcdef0123");
        assert_eq!(source.to_string(), "ollama (0123456789ab) kind=ollama");
    }

    #[test]
    fn source_display_keeps_short_or_multibyte_id_whole() {
        let short = Source::new("web", "abc");
        assert_eq!(short.to_string(), "web (abc) kind=generic");

        // 12번째 바이트가 'ä' 중간에 걸림
        let id = "abcdefghijkä-rest";
        let source = Source::new("web", id);
        assert_eq!(source.to_string(), format!("web ({id}) kind=generic"));
    }

    #[test]
    fn timestamp_format_is_sortable_iso() {
        let at = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_micro_opt(9, 5, 3, 42)
            .unwrap();
        assert_eq!(format_timestamp(at), "2024-01-15T09:05:03.000042");
    }

    #[test]
    fn classified_entry_copies_line_into_message_and_raw() {
        let source = Source::new("web", "abc");
        let entry = ClassifiedEntry::new(
            &source,
            Level::Info,
            "hello",
            "2024-01-15T00:00:00.000000".to_owned(),
            Metadata::new(),
        );
        assert_eq!(entry.message, "hello");
        assert_eq!(entry.raw_log, "hello");
        assert_eq!(entry.origin, DOCKER_LOGS_ORIGIN);
    }

    #[test]
    fn session_from_login_metadata() {
        let mut meta = Metadata::new();
        meta.insert("user".to_owned(), "alice".to_owned());
        meta.insert("action".to_owned(), "login".to_owned());
        let event = SessionEvent::login_from(&meta, "t").unwrap();
        assert_eq!(event.username, "alice");
        assert_eq!(event.action, "login");
        assert!(event.model.is_none());
    }

    #[test]
    fn session_requires_login_action_and_user() {
        let mut meta = Metadata::new();
        meta.insert("action".to_owned(), "login".to_owned());
        assert!(SessionEvent::login_from(&meta, "t").is_none());

        meta.insert("user".to_owned(), "bob".to_owned());
        meta.insert("action".to_owned(), "model_load".to_owned());
        assert!(SessionEvent::login_from(&meta, "t").is_none());
    }

    #[test]
    fn retention_policy_ordering() {
        assert!(RetentionPolicy::default().is_ordered());
        let bad = RetentionPolicy {
            active_days: 40,
            archive_days: 30,
            purge_days: 90,
        };
        assert!(!bad.is_ordered());
    }
}
