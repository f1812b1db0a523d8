//! 파이프라인 오케스트레이션 -- 탐색, tail 워커, 보존 정리, 저장소 생명주기
//!
//! [`LogPipeline`]은 core의 [`Pipeline`](opshub_core::pipeline::Pipeline) trait을 구현하여
//! `opshub-daemon`에서 start/stop/health_check 생명주기로 관리됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! start: discover -> Store::open -> TailWorker x N (tokio::spawn) -> RetentionSweeper
//! stop:  cancel -> join workers -> join sweeper -> store shutdown -> join store actor
//! ```

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use opshub_core::error::{OpsHubError, PipelineError};
use opshub_core::pipeline::{HealthStatus, Pipeline};
use opshub_core::types::{ClassifiedEntry, Level};

use crate::config::PipelineConfig;
use crate::discovery::{SourceFilter, discover};
use crate::error::{LogPipelineError, StoreError};
use crate::retention::RetentionSweeper;
use crate::runtime::SourceRuntime;
use crate::sink::LogSink;
use crate::store::{LogQuery, Store, StoreHandle};
use crate::tail::{LineProcessor, TailWorker, WorkerStatus};

/// 파이프라인 실행 상태
#[derive(Debug, Clone, PartialEq, Eq)]
enum PipelineState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// 실행 중인 워커
struct WorkerHandle {
    status: watch::Receiver<WorkerStatus>,
    task: JoinHandle<WorkerStatus>,
}

/// 로그 파이프라인
///
/// # 사용 예시
/// ```ignore
/// use std::sync::Arc;
/// use opshub_log_pipeline::{BollardRuntime, LogPipelineBuilder};
///
/// let runtime = Arc::new(BollardRuntime::connect_local()?);
/// let mut pipeline = LogPipelineBuilder::new()
///     .config(config)
///     .runtime(runtime)
///     .build()?;
///
/// pipeline.start().await?;
/// ```
pub struct LogPipeline<R: SourceRuntime> {
    /// 파이프라인 설정
    config: PipelineConfig,
    /// 현재 상태
    state: PipelineState,
    /// 컨테이너 런타임
    runtime: Arc<R>,
    /// 저장소 핸들 (실행 중에만 존재)
    store: Option<StoreHandle>,
    /// 저장소 actor 태스크
    store_task: Option<JoinHandle<()>>,
    /// 워커/정리기 공통 취소 토큰
    cancel: CancellationToken,
    /// 소스별 워커
    workers: Vec<WorkerHandle>,
    /// 보존 정리 태스크
    sweeper: Option<JoinHandle<()>>,
}

impl<R: SourceRuntime> LogPipeline<R> {
    /// 현재 상태를 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            PipelineState::Initialized => "initialized",
            PipelineState::Running => "running",
            PipelineState::Stopped => "stopped",
        }
    }

    /// 파이프라인 설정
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// 저장소 핸들. 실행 중일 때만 `Some`.
    pub fn store(&self) -> Option<StoreHandle> {
        self.store.clone()
    }

    /// tail 중인 소스 이름
    pub fn sources(&self) -> Vec<String> {
        self.workers
            .iter()
            .map(|w| w.status.borrow().source.clone())
            .collect()
    }

    /// 모든 워커 상태의 스냅샷
    pub fn worker_statuses(&self) -> Vec<WorkerStatus> {
        self.workers
            .iter()
            .map(|w| w.status.borrow().clone())
            .collect()
    }

    /// 저장된 로그를 최신순으로 조회합니다.
    ///
    /// `source`가 `None` 또는 `"all"`이면 전체 소스를 조회합니다.
    pub async fn get_logs(
        &self,
        source: Option<&str>,
        level: Option<Level>,
        limit: usize,
        since: Option<&str>,
    ) -> Result<Vec<ClassifiedEntry>, LogPipelineError> {
        let store = self.store.as_ref().ok_or(StoreError::Closed)?;
        let query = LogQuery {
            source: source.map(str::to_owned),
            level,
            since: since.map(str::to_owned),
            limit,
        };
        Ok(store.query(query).await?)
    }

    async fn open_store(&self) -> Result<(StoreHandle, JoinHandle<()>), LogPipelineError> {
        Ok(Store::open(&self.config.db_path, self.config.store_channel_capacity).await?)
    }

    fn spawn_workers(&mut self, names: &[String], store: &StoreHandle) {
        let processor = LineProcessor::new(LogSink::new(&self.config.log_dir), store.clone());

        for name in names {
            let (worker, status) = TailWorker::new(
                Arc::clone(&self.runtime),
                name.clone(),
                self.config.backlog_lines,
                processor.clone(),
                self.cancel.child_token(),
            );
            let task = tokio::spawn(worker.run());
            self.workers.push(WorkerHandle { status, task });
        }
    }

    fn spawn_sweeper(&mut self, store: &StoreHandle) {
        let sweeper = RetentionSweeper::new(
            &self.config.log_dir,
            store.clone(),
            self.config.retention,
            self.config.sweep_interval(),
        );
        self.sweeper = Some(tokio::spawn(sweeper.run(self.cancel.child_token())));
    }
}

impl<R: SourceRuntime> Pipeline for LogPipeline<R> {
    async fn start(&mut self) -> Result<(), OpsHubError> {
        if self.state == PipelineState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        info!("starting log pipeline");

        // 1. 런타임 연결 확인 후 소스 탐색
        self.runtime.ping().await?;
        let filter = SourceFilter::new(&self.config.include_regex, &self.config.exclude_regex)?;
        let names = discover(self.runtime.as_ref(), &filter, self.config.include_stopped).await?;
        if names.is_empty() {
            warn!("no sources matched the discovery filter");
        }

        // 2. 저장소
        let (store, store_task) = self.open_store().await?;

        // 3. 워커와 정리기
        self.cancel = CancellationToken::new();
        self.spawn_workers(&names, &store);
        self.spawn_sweeper(&store);

        self.store = Some(store);
        self.store_task = Some(store_task);
        self.state = PipelineState::Running;
        info!(sources = names.len(), names = ?names, "log pipeline started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), OpsHubError> {
        if self.state != PipelineState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        info!("stopping log pipeline");

        // 1. 워커/정리기 취소 후 완료 대기 (처리 중인 라인은 끝까지 기록됨)
        self.cancel.cancel();
        for worker in self.workers.drain(..) {
            let source = worker.status.borrow().source.clone();
            match worker.task.await {
                Ok(status) => info!(
                    source = %source,
                    state = status.state.as_str(),
                    processed = status.lines_processed,
                    "worker joined"
                ),
                Err(e) => warn!(source = %source, error = %e, "worker task failed"),
            }
        }
        if let Some(sweeper) = self.sweeper.take() {
            if let Err(e) = sweeper.await {
                warn!(error = %e, "retention task failed");
            }
        }

        // 2. 저장소 종료 (큐에 남은 명령은 모두 처리됨)
        if let Some(store) = self.store.take() {
            if let Err(e) = store.shutdown().await {
                warn!(error = %e, "store already closed");
            }
        }
        if let Some(task) = self.store_task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "store task failed");
            }
        }

        self.state = PipelineState::Stopped;
        info!("log pipeline stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            PipelineState::Running => {
                if self.store.as_ref().is_none_or(StoreHandle::is_closed) {
                    return HealthStatus::Unhealthy("record store is closed".to_owned());
                }
                if self.workers.is_empty() {
                    return HealthStatus::Degraded("no sources discovered".to_owned());
                }
                let idle: Vec<String> = self
                    .worker_statuses()
                    .into_iter()
                    .filter(|s| s.state.is_terminal())
                    .map(|s| format!("{} ({})", s.source, s.state.as_str()))
                    .collect();
                if idle.is_empty() {
                    HealthStatus::Healthy
                } else {
                    HealthStatus::Degraded(format!(
                        "{}/{} workers not tailing: {}",
                        idle.len(),
                        self.workers.len(),
                        idle.join(", ")
                    ))
                }
            }
            PipelineState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            PipelineState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// 로그 파이프라인 빌더
pub struct LogPipelineBuilder<R: SourceRuntime> {
    config: PipelineConfig,
    runtime: Option<Arc<R>>,
}

impl<R: SourceRuntime> LogPipelineBuilder<R> {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            runtime: None,
        }
    }

    /// 파이프라인 설정을 지정합니다.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// 컨테이너 런타임을 지정합니다 (필수).
    pub fn runtime(mut self, runtime: Arc<R>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// 파이프라인을 빌드합니다.
    pub fn build(self) -> Result<LogPipeline<R>, LogPipelineError> {
        self.config.validate()?;
        let runtime = self.runtime.ok_or_else(|| LogPipelineError::Config {
            field: "runtime".to_owned(),
            reason: "container runtime is required".to_owned(),
        })?;

        Ok(LogPipeline {
            config: self.config,
            state: PipelineState::Initialized,
            runtime,
            store: None,
            store_task: None,
            cancel: CancellationToken::new(),
            workers: Vec::new(),
            sweeper: None,
        })
    }
}

impl<R: SourceRuntime> Default for LogPipelineBuilder<R> {
    fn default() -> Self {
        Self::new()
    }
}
