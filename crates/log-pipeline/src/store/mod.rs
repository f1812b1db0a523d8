//! 레코드 저장소 (SQLite)
//!
//! 커넥션은 블로킹 스레드에서 도는 actor 하나가 소유합니다. [`StoreHandle`]은
//! 명령을 bounded 채널로 보내고 oneshot 으로 결과를 받습니다. actor 는 명령을
//! 도착 순서대로 하나씩 처리하므로 쓰기 경로는 하나뿐이고, 조회는 먼저
//! 보낸 모든 쓰기를 봅니다.
//!
//! # 종료
//! 모든 핸들이 drop 되거나 [`StoreHandle::shutdown`]이 호출되면 actor 는
//! 이미 큐에 들어온 명령을 모두 처리한 뒤 종료합니다.

mod db;

use std::path::{Path, PathBuf};

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use opshub_core::types::{
    AlertRecord, ClassifiedEntry, ContainerStatus, Level, PerformanceMetric, SessionEvent,
    now_timestamp,
};

use crate::error::StoreError;

/// 조회 기본 최대 건수
pub const DEFAULT_QUERY_LIMIT: usize = 100;

/// 로그 조회 조건
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogQuery {
    /// 소스 이름 (`None` 또는 `"all"`이면 전체)
    pub source: Option<String>,
    /// 레벨
    pub level: Option<Level>,
    /// 최소 타임스탬프 (포함)
    pub since: Option<String>,
    /// 최대 건수
    pub limit: usize,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            source: None,
            level: None,
            since: None,
            limit: DEFAULT_QUERY_LIMIT,
        }
    }
}

impl LogQuery {
    /// 전체 조회 조건
    pub fn new() -> Self {
        Self::default()
    }

    /// 소스 필터
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// 레벨 필터
    pub fn level(mut self, level: Level) -> Self {
        self.level = Some(level);
        self
    }

    /// 최소 타임스탬프
    pub fn since(mut self, since: impl Into<String>) -> Self {
        self.since = Some(since.into());
        self
    }

    /// 최대 건수
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// 세션 조회 조건
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionQuery {
    /// 최소 타임스탬프 (포함)
    pub since: Option<String>,
    /// 사용자명
    pub username: Option<String>,
    /// 최대 건수
    pub limit: usize,
}

impl Default for SessionQuery {
    fn default() -> Self {
        Self {
            since: None,
            username: None,
            limit: DEFAULT_QUERY_LIMIT,
        }
    }
}

/// 알림 조회 조건
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertQuery {
    /// 심각도 (정확히 일치)
    pub severity: Option<String>,
    /// 해결 여부
    pub resolved: Option<bool>,
    /// 최소 생성 시각 (포함)
    pub since: Option<String>,
    /// 최대 건수
    pub limit: usize,
}

impl Default for AlertQuery {
    fn default() -> Self {
        Self {
            severity: None,
            resolved: None,
            since: None,
            limit: DEFAULT_QUERY_LIMIT,
        }
    }
}

/// `purge_records` 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeCounts {
    /// 삭제된 로그 수
    pub logs: usize,
    /// 삭제된 세션 수
    pub sessions: usize,
    /// 삭제된 컨테이너 상태 수
    pub container_status: usize,
}

impl PurgeCounts {
    /// 전체 삭제 건수
    pub fn total(&self) -> usize {
        self.logs + self.sessions + self.container_status
    }
}

/// 테이블별 행 수
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub logs: u64,
    pub user_sessions: u64,
    pub performance_metrics: u64,
    pub container_status: u64,
    pub alerts: u64,
    /// 가장 오래된 로그의 타임스탬프
    pub oldest_log: Option<String>,
}

type Job = Box<dyn FnOnce(&mut Connection) + Send>;

enum Command {
    Job(Job),
    Shutdown,
}

/// 저장소 진입점
pub struct Store;

impl Store {
    /// 파일 데이터베이스를 열고 actor 를 시작합니다.
    ///
    /// 부모 디렉토리가 없으면 생성합니다.
    pub async fn open(
        path: impl AsRef<Path>,
        capacity: usize,
    ) -> Result<(StoreHandle, JoinHandle<()>), StoreError> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let path_display = path.display().to_string();
        let conn = tokio::task::spawn_blocking(move || db::open(&path))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))??;
        tracing::info!(path = %path_display, "record store opened");
        Ok(Self::spawn(conn, capacity))
    }

    /// 인메모리 데이터베이스로 actor 를 시작합니다.
    pub async fn open_in_memory(
        capacity: usize,
    ) -> Result<(StoreHandle, JoinHandle<()>), StoreError> {
        let conn = tokio::task::spawn_blocking(db::open_in_memory)
            .await
            .map_err(|e| StoreError::Task(e.to_string()))??;
        Ok(Self::spawn(conn, capacity))
    }

    fn spawn(conn: Connection, capacity: usize) -> (StoreHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::task::spawn_blocking(move || run_actor(conn, rx));
        (StoreHandle { tx }, task)
    }
}

fn run_actor(mut conn: Connection, mut rx: mpsc::Receiver<Command>) {
    tracing::debug!("store actor started");
    while let Some(command) = rx.blocking_recv() {
        match command {
            Command::Job(job) => job(&mut conn),
            Command::Shutdown => {
                tracing::debug!("store shutdown requested, draining queued commands");
                rx.close();
            }
        }
    }
    tracing::info!("store actor stopped");
}

/// 저장소 핸들
///
/// 복제해서 여러 태스크가 함께 쓸 수 있습니다.
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<Command>,
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl StoreHandle {
    async fn call<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |conn| {
            let _ = reply_tx.send(f(conn));
        });
        self.tx
            .send(Command::Job(job))
            .await
            .map_err(|_| StoreError::Closed)?;
        reply_rx.await.map_err(|_| StoreError::Closed)?
    }

    /// 분류된 엔트리를 기록합니다.
    pub async fn append(&self, entry: ClassifiedEntry) -> Result<(), StoreError> {
        self.call(move |conn| db::insert_log(conn, &entry)).await
    }

    /// 세션 이벤트를 기록합니다.
    pub async fn append_session(&self, event: SessionEvent) -> Result<(), StoreError> {
        self.call(move |conn| db::insert_session(conn, &event)).await
    }

    /// 로그를 조회합니다. 최신순 (타임스탬프, id 내림차순).
    pub async fn query(&self, query: LogQuery) -> Result<Vec<ClassifiedEntry>, StoreError> {
        self.call(move |conn| db::query_logs(conn, &query)).await
    }

    /// 세션 이벤트를 조회합니다. 최신순.
    pub async fn sessions(&self, query: SessionQuery) -> Result<Vec<SessionEvent>, StoreError> {
        self.call(move |conn| db::query_sessions(conn, &query)).await
    }

    /// 성능 메트릭을 기록합니다.
    pub async fn record_metric(&self, metric: PerformanceMetric) -> Result<(), StoreError> {
        self.call(move |conn| db::insert_metric(conn, &metric)).await
    }

    /// 컨테이너 상태 스냅샷을 기록합니다.
    pub async fn record_container_status(
        &self,
        status: ContainerStatus,
    ) -> Result<(), StoreError> {
        self.call(move |conn| db::insert_container_status(conn, &status))
            .await
    }

    /// 알림을 생성하고 id 를 반환합니다.
    pub async fn create_alert(&self, alert: AlertRecord) -> Result<i64, StoreError> {
        self.call(move |conn| db::insert_alert(conn, &alert)).await
    }

    /// 알림을 현재 시각으로 해결 처리합니다.
    ///
    /// 미해결 알림이 없으면 `false`를 반환합니다.
    pub async fn resolve_alert(&self, id: i64) -> Result<bool, StoreError> {
        let resolved_at = now_timestamp();
        self.call(move |conn| db::resolve_alert(conn, id, &resolved_at))
            .await
    }

    /// 알림을 조회합니다. 최신순, `None` 조건은 적용하지 않습니다.
    pub async fn alerts(&self, query: AlertQuery) -> Result<Vec<AlertRecord>, StoreError> {
        self.call(move |conn| db::query_alerts(conn, &query)).await
    }

    /// 로그, 세션, 컨테이너 상태 중 `before`보다 오래된 레코드를 삭제합니다.
    pub async fn purge_records(&self, before: impl Into<String>) -> Result<PurgeCounts, StoreError> {
        let before = before.into();
        self.call(move |conn| db::purge_records(conn, &before)).await
    }

    /// `before`보다 오래된 성능 메트릭을 삭제합니다.
    pub async fn purge_metrics(&self, before: impl Into<String>) -> Result<usize, StoreError> {
        let before = before.into();
        self.call(move |conn| db::purge_metrics(conn, &before)).await
    }

    /// `before` 이전에 해결된 알림을 삭제합니다.
    pub async fn purge_resolved_alerts(
        &self,
        before: impl Into<String>,
    ) -> Result<usize, StoreError> {
        let before = before.into();
        self.call(move |conn| db::purge_resolved_alerts(conn, &before))
            .await
    }

    /// 테이블별 행 수
    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        self.call(|conn| db::stats(conn)).await
    }

    /// actor 에 종료를 요청합니다. 이미 큐에 있는 명령은 처리됩니다.
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        self.tx
            .send(Command::Shutdown)
            .await
            .map_err(|_| StoreError::Closed)
    }

    /// actor 가 종료되었는지 여부
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
