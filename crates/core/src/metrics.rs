//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`
//! 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `opshub_`
//! - 모듈명: `daemon_`, `log_pipeline_`, `retention_`
//! - 접미어: `_total` (counter), 없음 (gauge)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 로그 레벨 레이블 키 (CRITICAL, ERROR, WARNING, SUCCESS, INFO)
pub const LABEL_LEVEL: &str = "level";

/// 처리 단계 레이블 키 (sink, store, session)
pub const LABEL_STAGE: &str = "stage";

/// 보존 정리 대상 레이블 키 (files, records, metrics, alerts)
pub const LABEL_TARGET: &str = "target";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "opshub_daemon_build_info";

/// Daemon: 가동 시간 초 (gauge)
pub const DAEMON_UPTIME_SECONDS: &str = "opshub_daemon_uptime_seconds";

// ─── Log Pipeline 메트릭 ────────────────────────────────────────────

/// Log Pipeline: 처리된 라인 수 (counter, label: level)
pub const LOG_PIPELINE_LINES_PROCESSED_TOTAL: &str = "opshub_log_pipeline_lines_processed_total";

/// Log Pipeline: 디코딩 실패로 버려진 라인 수 (counter)
pub const LOG_PIPELINE_LINES_DROPPED_TOTAL: &str = "opshub_log_pipeline_lines_dropped_total";

/// Log Pipeline: 싱크/저장소 기록 실패 수 (counter, label: stage)
pub const LOG_PIPELINE_WRITE_FAILURES_TOTAL: &str = "opshub_log_pipeline_write_failures_total";

/// Log Pipeline: 기록된 세션 이벤트 수 (counter)
pub const LOG_PIPELINE_SESSIONS_TOTAL: &str = "opshub_log_pipeline_sessions_total";

/// Log Pipeline: 활성 tail 워커 수 (gauge)
pub const LOG_PIPELINE_ACTIVE_WORKERS: &str = "opshub_log_pipeline_active_workers";

// ─── Retention 메트릭 ───────────────────────────────────────────────

/// Retention: 완료된 정리 주기 수 (counter)
pub const RETENTION_SWEEPS_TOTAL: &str = "opshub_retention_sweeps_total";

/// Retention: 삭제된 항목 수 (counter, label: target)
pub const RETENTION_DELETED_TOTAL: &str = "opshub_retention_deleted_total";

/// Retention: 실패한 정리 단계 수 (counter, label: target)
pub const RETENTION_FAILURES_TOTAL: &str = "opshub_retention_failures_total";

/// 모든 메트릭의 설명을 등록합니다.
///
/// 레코더 설치 직후 한 번 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    describe_gauge!(DAEMON_BUILD_INFO, "Daemon build information");
    describe_gauge!(DAEMON_UPTIME_SECONDS, "Daemon uptime in seconds");
    describe_counter!(
        LOG_PIPELINE_LINES_PROCESSED_TOTAL,
        "Total log lines classified and written, by level"
    );
    describe_counter!(
        LOG_PIPELINE_LINES_DROPPED_TOTAL,
        "Total log lines dropped because they were not valid UTF-8"
    );
    describe_counter!(
        LOG_PIPELINE_WRITE_FAILURES_TOTAL,
        "Total failed sink/store writes, by stage"
    );
    describe_counter!(
        LOG_PIPELINE_SESSIONS_TOTAL,
        "Total user session events recorded"
    );
    describe_gauge!(
        LOG_PIPELINE_ACTIVE_WORKERS,
        "Number of tail workers currently following a source"
    );
    describe_counter!(RETENTION_SWEEPS_TOTAL, "Total retention sweeps run");
    describe_counter!(
        RETENTION_DELETED_TOTAL,
        "Total items deleted by retention, by target"
    );
    describe_counter!(
        RETENTION_FAILURES_TOTAL,
        "Total failed retention sub-steps, by target"
    );
}
