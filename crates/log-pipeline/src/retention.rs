//! 보존 정책 정리
//!
//! [`RetentionSweeper`]는 주기마다 세 단계를 수행합니다.
//!
//! 1. 소스 디렉토리의 `*.log` 중 수정 시각이 `now - active_days`보다 오래된 파일 삭제
//! 2. `now - archive_days` 이전 레코드와 `now - purge_days` 이전 메트릭 삭제
//! 3. `now - archive_days` 이전에 해결된 알림 삭제
//!
//! 단계별 실패는 기록만 하고 다음 단계와 다음 주기는 그대로 진행합니다.
//! 첫 정리는 시작 후 한 주기가 지나서 실행됩니다.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{Local, NaiveDateTime, TimeDelta};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use opshub_core::metrics as m;
use opshub_core::types::{RetentionPolicy, format_timestamp};

use crate::store::{PurgeCounts, StoreHandle};

const SECS_PER_DAY: u64 = 86_400;

/// 정리 한 번의 결과
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// 삭제된 파일 수
    pub files_deleted: usize,
    /// 삭제된 레코드 수 (단계 실패 시 `None`)
    pub records: Option<PurgeCounts>,
    /// 삭제된 메트릭 수
    pub metrics: Option<usize>,
    /// 삭제된 알림 수
    pub alerts: Option<usize>,
    /// 실패한 단계 (files, records, metrics, alerts)
    pub failures: Vec<&'static str>,
}

impl SweepReport {
    /// 모든 단계가 성공했는지 여부
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, target: &'static str) {
        metrics::counter!(m::RETENTION_FAILURES_TOTAL, m::LABEL_TARGET => target).increment(1);
        self.failures.push(target);
    }
}

/// 보존 정책 정리기
#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    log_root: PathBuf,
    store: StoreHandle,
    policy: RetentionPolicy,
    interval: Duration,
}

impl RetentionSweeper {
    /// 정리기를 생성합니다.
    pub fn new(
        log_root: impl Into<PathBuf>,
        store: StoreHandle,
        policy: RetentionPolicy,
        interval: Duration,
    ) -> Self {
        Self {
            log_root: log_root.into(),
            store,
            policy,
            interval,
        }
    }

    /// 보존 정책
    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// 정리를 한 번 수행합니다.
    pub async fn sweep_once(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let now = Local::now().naive_local();

        // 1. 파일
        let file_cutoff = SystemTime::now()
            .checked_sub(days(self.policy.active_days))
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let root = self.log_root.clone();
        match tokio::task::spawn_blocking(move || delete_stale_files(&root, file_cutoff)).await {
            Ok(Ok(sweep)) => {
                report.files_deleted = sweep.deleted;
                if sweep.errors > 0 {
                    report.fail("files");
                }
            }
            Ok(Err(e)) => {
                warn!(root = %self.log_root.display(), error = %e, "file retention failed");
                report.fail("files");
            }
            Err(e) => {
                warn!(error = %e, "file retention task failed");
                report.fail("files");
            }
        }

        // 2. 레코드, 메트릭
        let archive_cutoff = format_timestamp(record_cutoff(now, self.policy.archive_days));
        let purge_cutoff = format_timestamp(record_cutoff(now, self.policy.purge_days));

        match self.store.purge_records(archive_cutoff.clone()).await {
            Ok(counts) => report.records = Some(counts),
            Err(e) => {
                warn!(before = %archive_cutoff, error = %e, "record purge failed");
                report.fail("records");
            }
        }
        match self.store.purge_metrics(purge_cutoff.clone()).await {
            Ok(n) => report.metrics = Some(n),
            Err(e) => {
                warn!(before = %purge_cutoff, error = %e, "metric purge failed");
                report.fail("metrics");
            }
        }

        // 3. 해결된 알림
        match self.store.purge_resolved_alerts(archive_cutoff.clone()).await {
            Ok(n) => report.alerts = Some(n),
            Err(e) => {
                warn!(before = %archive_cutoff, error = %e, "alert purge failed");
                report.fail("alerts");
            }
        }

        metrics::counter!(m::RETENTION_SWEEPS_TOTAL).increment(1);
        for (target, n) in [
            ("files", report.files_deleted),
            ("records", report.records.map_or(0, |c| c.total())),
            ("metrics", report.metrics.unwrap_or(0)),
            ("alerts", report.alerts.unwrap_or(0)),
        ] {
            metrics::counter!(m::RETENTION_DELETED_TOTAL, m::LABEL_TARGET => target)
                .increment(n as u64);
        }

        report
    }

    /// 취소될 때까지 주기적으로 정리합니다.
    pub async fn run(self, cancel: CancellationToken) {
        let start = tokio::time::Instant::now() + self.interval;
        let mut ticker = tokio::time::interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.interval.as_secs(),
            active_days = self.policy.active_days,
            archive_days = self.policy.archive_days,
            purge_days = self.policy.purge_days,
            "retention sweeper started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.sweep_once().await;
                    info!(
                        files = report.files_deleted,
                        records = report.records.map_or(0, |c| c.total()),
                        metrics = report.metrics.unwrap_or(0),
                        alerts = report.alerts.unwrap_or(0),
                        failures = ?report.failures,
                        "retention sweep finished"
                    );
                }
            }
        }

        info!("retention sweeper stopped");
    }
}

fn days(n: u32) -> Duration {
    Duration::from_secs(u64::from(n) * SECS_PER_DAY)
}

/// `now - days`. 표현 범위를 넘으면 `NaiveDateTime::MIN` (아무것도 삭제하지 않음).
fn record_cutoff(now: NaiveDateTime, days: u32) -> NaiveDateTime {
    TimeDelta::try_days(i64::from(days))
        .and_then(|d| now.checked_sub_signed(d))
        .unwrap_or(NaiveDateTime::MIN)
}

/// 파일 정리 결과
#[derive(Debug, Default)]
struct FileSweep {
    deleted: usize,
    errors: usize,
}

/// `<root>/<source>/*.log` 중 `cutoff` 이전에 수정된 파일을 삭제합니다.
///
/// 개별 파일 실패는 세고 넘어갑니다. 루트가 없으면 아무것도 하지 않습니다.
fn delete_stale_files(root: &Path, cutoff: SystemTime) -> std::io::Result<FileSweep> {
    let mut sweep = FileSweep::default();
    if !root.exists() {
        return Ok(sweep);
    }

    for source_dir in std::fs::read_dir(root)? {
        let source_dir = source_dir?.path();
        if !source_dir.is_dir() {
            continue;
        }

        let entries = match std::fs::read_dir(&source_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %source_dir.display(), error = %e, "cannot read source directory");
                sweep.errors += 1;
                continue;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "log") {
                continue;
            }
            let modified = match entry.metadata().and_then(|meta| meta.modified()) {
                Ok(modified) => modified,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot stat log file");
                    sweep.errors += 1;
                    continue;
                }
            };
            if modified >= cutoff {
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    debug!(path = %path.display(), "deleted expired log file");
                    sweep.deleted += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot delete log file");
                    sweep.errors += 1;
                }
            }
        }
    }

    Ok(sweep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LogQuery, Store};
    use opshub_core::types::{ClassifiedEntry, Level, Metadata, PerformanceMetric, Source};

    fn policy(active: u32, archive: u32, purge: u32) -> RetentionPolicy {
        RetentionPolicy {
            active_days: active,
            archive_days: archive,
            purge_days: purge,
        }
    }

    fn touch(path: &Path, age: Duration) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let file = std::fs::File::create(path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    fn days_ago(n: i64) -> String {
        format_timestamp(Local::now().naive_local() - chrono::Duration::days(n))
    }

    #[tokio::test]
    async fn active_zero_removes_every_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("web/2024-01-15.log"), Duration::from_secs(1));
        touch(&dir.path().join("web/2024-01-15_ERROR.log"), Duration::from_secs(1));
        touch(&dir.path().join("db/2024-01-16.log"), Duration::from_secs(1));

        let (store, _task) = Store::open_in_memory(8).await.unwrap();
        let sweeper =
            RetentionSweeper::new(dir.path(), store, policy(0, 30, 90), Duration::from_secs(60));

        let report = sweeper.sweep_once().await;
        assert!(report.is_clean());
        assert_eq!(report.files_deleted, 3);
        assert!(!dir.path().join("web/2024-01-15.log").exists());
        assert!(!dir.path().join("db/2024-01-16.log").exists());
    }

    #[tokio::test]
    async fn fresh_and_foreign_files_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("web/2024-01-01.log");
        let fresh = dir.path().join("web/2024-01-15.log");
        let other = dir.path().join("web/notes.txt");
        touch(&old, days(10));
        touch(&fresh, Duration::from_secs(60));
        touch(&other, days(10));

        let (store, _task) = Store::open_in_memory(8).await.unwrap();
        let sweeper =
            RetentionSweeper::new(dir.path(), store, policy(7, 30, 90), Duration::from_secs(60));

        let report = sweeper.sweep_once().await;
        assert_eq!(report.files_deleted, 1);
        assert!(!old.exists());
        assert!(fresh.exists());
        assert!(other.exists());
    }

    #[tokio::test]
    async fn missing_root_is_not_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _task) = Store::open_in_memory(8).await.unwrap();
        let sweeper = RetentionSweeper::new(
            dir.path().join("absent"),
            store,
            RetentionPolicy::default(),
            Duration::from_secs(60),
        );
        let report = sweeper.sweep_once().await;
        assert!(report.is_clean());
        assert_eq!(report.files_deleted, 0);
    }

    #[tokio::test]
    async fn records_and_metrics_use_their_own_cutoffs() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _task) = Store::open_in_memory(8).await.unwrap();
        let source = Source::new("web", "abc");

        for (age, line) in [(40, "old"), (1, "new")] {
            store
                .append(ClassifiedEntry::new(
                    &source,
                    Level::Info,
                    line,
                    days_ago(age),
                    Metadata::new(),
                ))
                .await
                .unwrap();
        }
        // 30일 < 60일 < 90일: 레코드라면 지워지지만 메트릭은 남는다
        for age in [60, 120] {
            store
                .record_metric(PerformanceMetric {
                    timestamp: days_ago(age),
                    metric_type: "cpu".to_owned(),
                    metric_name: "usage".to_owned(),
                    value: 1.0,
                    unit: None,
                    container_name: None,
                })
                .await
                .unwrap();
        }

        let sweeper = RetentionSweeper::new(
            dir.path(),
            store.clone(),
            policy(7, 30, 90),
            Duration::from_secs(60),
        );
        let report = sweeper.sweep_once().await;

        assert_eq!(report.records.unwrap().logs, 1);
        assert_eq!(report.metrics, Some(1));
        let rows = store.query(LogQuery::new()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].message, "new");
        assert_eq!(store.stats().await.unwrap().performance_metrics, 1);
    }

    #[tokio::test]
    async fn store_failure_does_not_stop_file_step() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("web/2024-01-01.log"), days(10));

        let (store, task) = Store::open_in_memory(8).await.unwrap();
        store.shutdown().await.unwrap();
        task.await.unwrap();

        let sweeper =
            RetentionSweeper::new(dir.path(), store, policy(7, 30, 90), Duration::from_secs(60));
        let report = sweeper.sweep_once().await;

        assert_eq!(report.files_deleted, 1);
        assert_eq!(report.failures, vec!["records", "metrics", "alerts"]);
    }

    #[test]
    fn record_cutoff_saturates_instead_of_overflowing() {
        let now = Local::now().naive_local();
        assert_eq!(record_cutoff(now, u32::MAX), NaiveDateTime::MIN);
        assert_eq!(record_cutoff(now, 100_000_000), NaiveDateTime::MIN);
        assert_eq!(
            record_cutoff(now, 30),
            now - TimeDelta::try_days(30).unwrap()
        );
    }

    #[tokio::test]
    async fn keep_forever_policy_sweeps_without_deleting() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("web/2024-01-01.log");
        touch(&log, days(400));

        let (store, _task) = Store::open_in_memory(8).await.unwrap();
        store
            .append(ClassifiedEntry::new(
                &Source::new("web", "abc"),
                Level::Info,
                "ancient",
                "2000-01-01T00:00:00.000000".to_owned(),
                Metadata::new(),
            ))
            .await
            .unwrap();

        let sweeper = RetentionSweeper::new(
            dir.path(),
            store.clone(),
            policy(u32::MAX, u32::MAX, u32::MAX),
            Duration::from_secs(60),
        );
        let report = sweeper.sweep_once().await;

        assert!(report.is_clean(), "{:?}", report.failures);
        assert_eq!(report.files_deleted, 0);
        assert_eq!(report.records.unwrap().total(), 0);
        assert_eq!(report.metrics, Some(0));
        assert!(log.exists());
        assert_eq!(store.query(LogQuery::new()).await.unwrap().len(), 1);
    }

    async fn wait_until_gone(path: &Path, within: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + within;
        while tokio::time::Instant::now() < deadline {
            if !path.exists() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        !path.exists()
    }

    #[tokio::test]
    async fn run_waits_one_period_then_sweeps_until_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("web/a.log");
        touch(&first, Duration::from_secs(1));

        let (store, _task) = Store::open_in_memory(8).await.unwrap();
        let sweeper = RetentionSweeper::new(
            dir.path(),
            store,
            policy(0, 30, 90),
            Duration::from_millis(200),
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(sweeper.run(cancel.clone()));

        // 첫 정리는 한 주기가 지난 뒤
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(first.exists());
        assert!(wait_until_gone(&first, Duration::from_secs(2)).await);

        // 다음 주기도 계속 실행된다
        let second = dir.path().join("web/b.log");
        touch(&second, Duration::from_secs(1));
        assert!(wait_until_gone(&second, Duration::from_secs(2)).await);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn run_keeps_ticking_after_failed_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let (store, task) = Store::open_in_memory(8).await.unwrap();
        store.shutdown().await.unwrap();
        task.await.unwrap();

        let sweeper = RetentionSweeper::new(
            dir.path(),
            store,
            policy(0, 30, 90),
            Duration::from_millis(100),
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(sweeper.run(cancel.clone()));

        // 저장소가 닫혀 매 주기 records/metrics/alerts 단계가 실패한다
        let first = dir.path().join("web/a.log");
        touch(&first, Duration::from_secs(1));
        assert!(wait_until_gone(&first, Duration::from_secs(2)).await);

        let second = dir.path().join("web/b.log");
        touch(&second, Duration::from_secs(1));
        assert!(wait_until_gone(&second, Duration::from_secs(2)).await);

        cancel.cancel();
        handle.await.unwrap();
    }
}
