//! 소스별 tail 워커와 라인 처리
//!
//! 워커 하나가 소스 하나를 담당합니다.
//!
//! ```text
//! Starting --resolve--> Backfill --backlog--> Following --stream end/cancel--> Stopped
//!     |
//!     +-- source not found --> Failed
//! ```
//!
//! 라인마다 분류 → 메타데이터 추출 → 파일 싱크 → 저장소 → (세션) 순서로 처리합니다.
//! 한 단계가 실패해도 기록하고 나머지 단계를 계속하며, 워커는 멈추지 않습니다.
//! 취소는 라인 사이에서만 확인하므로 처리 중인 라인은 항상 끝까지 기록됩니다.

use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use opshub_core::metrics as m;
use opshub_core::types::{ClassifiedEntry, Level, RawLine, SessionEvent, Source, now_timestamp};

use crate::classify::classify;
use crate::error::LogPipelineError;
use crate::extract::extract;
use crate::runtime::SourceRuntime;
use crate::sink::LogSink;
use crate::store::StoreHandle;

/// 워커 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// 소스 확인 중
    Starting,
    /// 과거 라인 처리 중
    Backfill,
    /// 실시간 스트림 처리 중
    Following,
    /// 정상 종료
    Stopped,
    /// 소스를 찾지 못해 종료
    Failed,
}

impl WorkerState {
    /// 상태명
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Backfill => "backfill",
            Self::Following => "following",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }

    /// 종료 상태 여부
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }
}

/// 워커 상태 스냅샷
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerStatus {
    /// 소스 이름
    pub source: String,
    /// 현재 상태
    pub state: WorkerState,
    /// 처리된 라인 수
    pub lines_processed: u64,
    /// UTF-8 이 아니어서 버린 라인 수
    pub lines_dropped: u64,
    /// 싱크/저장소 기록 실패 수
    pub write_failures: u64,
    /// 기록된 세션 이벤트 수
    pub sessions_recorded: u64,
    /// 마지막 에러
    pub last_error: Option<String>,
}

impl WorkerStatus {
    fn new(source: &str) -> Self {
        Self {
            source: source.to_owned(),
            state: WorkerState::Starting,
            lines_processed: 0,
            lines_dropped: 0,
            write_failures: 0,
            sessions_recorded: 0,
            last_error: None,
        }
    }
}

/// 라인 하나의 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    /// 빈 라인
    Skipped,
    /// 디코딩 실패로 버림
    Dropped,
    /// 처리됨
    Processed {
        /// 분류된 레벨
        level: Level,
        /// 실패한 기록 단계 수
        write_failures: u32,
        /// 세션 이벤트를 기록했는지 여부
        session_recorded: bool,
    },
}

/// 프레임을 라인으로 나눕니다. 줄 끝의 `\r`은 제거합니다.
pub fn split_lines(frame: &[u8]) -> impl Iterator<Item = &[u8]> {
    frame
        .split(|b| *b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
}

/// 라인 처리기 -- 분류, 추출, 파일 기록, 저장소 기록
#[derive(Debug, Clone)]
pub struct LineProcessor {
    sink: LogSink,
    store: StoreHandle,
}

impl LineProcessor {
    /// 싱크와 저장소로 처리기를 생성합니다.
    pub fn new(sink: LogSink, store: StoreHandle) -> Self {
        Self { sink, store }
    }

    /// 원시 라인 하나를 처리합니다.
    pub async fn process_line(&self, source: &Source, raw: &RawLine) -> LineOutcome {
        let line = match std::str::from_utf8(&raw.data) {
            Ok(line) => line,
            Err(e) => {
                let err = LogPipelineError::Decode {
                    source_name: source.name.clone(),
                    reason: e.to_string(),
                };
                warn!(error = %err, bytes = raw.data.len(), "dropping undecodable line");
                metrics::counter!(m::LOG_PIPELINE_LINES_DROPPED_TOTAL).increment(1);
                return LineOutcome::Dropped;
            }
        };
        if line.is_empty() {
            return LineOutcome::Skipped;
        }

        let level = classify(line);
        let metadata = extract(source.kind, line);
        let timestamp = now_timestamp();
        let mut write_failures = 0;

        if let Err(e) = self.sink.write(&source.name, level, &timestamp, line).await {
            write_failures += 1;
            record_failure(&source.name, "sink", &e);
        }

        let session = SessionEvent::login_from(&metadata, &timestamp);
        let entry = ClassifiedEntry::new(source, level, line, timestamp, metadata);
        if let Err(e) = self.store.append(entry).await {
            write_failures += 1;
            record_failure(&source.name, "store", &e.into());
        }

        let mut session_recorded = false;
        if let Some(event) = session {
            let username = event.username.clone();
            match self.store.append_session(event).await {
                Ok(()) => {
                    session_recorded = true;
                    metrics::counter!(m::LOG_PIPELINE_SESSIONS_TOTAL).increment(1);
                    debug!(source = %source.name, user = %username, "session recorded");
                }
                Err(e) => {
                    write_failures += 1;
                    record_failure(&source.name, "session", &e.into());
                }
            }
        }

        if let Ok(lag) = raw.received_at.elapsed() {
            debug!(source = %source.name, level = %level, lag_ms = lag.as_millis(), "line processed");
        }
        metrics::counter!(
            m::LOG_PIPELINE_LINES_PROCESSED_TOTAL,
            m::LABEL_LEVEL => level.as_str()
        )
        .increment(1);

        LineOutcome::Processed {
            level,
            write_failures,
            session_recorded,
        }
    }
}

fn record_failure(source_name: &str, stage: &'static str, err: &LogPipelineError) {
    warn!(source = %source_name, stage, error = %err, "failed to record line");
    metrics::counter!(m::LOG_PIPELINE_WRITE_FAILURES_TOTAL, m::LABEL_STAGE => stage).increment(1);
}

/// 소스 하나를 tail 하는 워커
pub struct TailWorker<R: SourceRuntime> {
    runtime: Arc<R>,
    source_name: String,
    backlog_lines: usize,
    processor: LineProcessor,
    status: watch::Sender<WorkerStatus>,
    cancel: CancellationToken,
}

impl<R: SourceRuntime> TailWorker<R> {
    /// 워커와 상태 수신측을 생성합니다.
    pub fn new(
        runtime: Arc<R>,
        source_name: impl Into<String>,
        backlog_lines: usize,
        processor: LineProcessor,
        cancel: CancellationToken,
    ) -> (Self, watch::Receiver<WorkerStatus>) {
        let source_name = source_name.into();
        let (status, status_rx) = watch::channel(WorkerStatus::new(&source_name));
        let worker = Self {
            runtime,
            source_name,
            backlog_lines,
            processor,
            status,
            cancel,
        };
        (worker, status_rx)
    }

    fn set_state(&self, state: WorkerState) {
        self.status.send_modify(|s| s.state = state);
    }

    /// 워커를 끝까지 실행하고 최종 상태를 반환합니다.
    pub async fn run(self) -> WorkerStatus {
        let source = match self.runtime.resolve(&self.source_name).await {
            Ok(source) => source,
            Err(e) => {
                warn!(source = %self.source_name, error = %e, "cannot tail source");
                self.status.send_modify(|s| {
                    s.state = WorkerState::Failed;
                    s.last_error = Some(e.to_string());
                });
                return self.status.borrow().clone();
            }
        };
        info!(source = %source, "tail worker started");

        if self.backfill(&source).await {
            self.follow(&source).await;
        }

        self.set_state(WorkerState::Stopped);
        let final_status = self.status.borrow().clone();
        info!(
            source = %source.name,
            processed = final_status.lines_processed,
            dropped = final_status.lines_dropped,
            failures = final_status.write_failures,
            "tail worker stopped"
        );
        final_status
    }

    /// 과거 라인을 처리합니다. 취소되면 `false`.
    async fn backfill(&self, source: &Source) -> bool {
        self.set_state(WorkerState::Backfill);

        let frames = match self.runtime.read_backlog(source, self.backlog_lines).await {
            Ok(frames) => frames,
            Err(e) => {
                warn!(source = %source.name, error = %e, "backlog read failed, following only");
                self.status.send_modify(|s| s.last_error = Some(e.to_string()));
                return !self.cancel.is_cancelled();
            }
        };

        debug!(source = %source.name, frames = frames.len(), "backfilling");
        for frame in &frames {
            if self.cancel.is_cancelled() {
                return false;
            }
            self.handle_frame(source, frame).await;
        }
        !self.cancel.is_cancelled()
    }

    async fn follow(&self, source: &Source) {
        self.set_state(WorkerState::Following);
        let since = chrono::Utc::now().timestamp();
        let mut stream = self.runtime.follow(source, since);

        metrics::gauge!(m::LOG_PIPELINE_ACTIVE_WORKERS).increment(1.0);
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(source = %source.name, "tail worker cancelled");
                    break;
                }
                next = stream.next() => match next {
                    Some(Ok(frame)) => self.handle_frame(source, &frame).await,
                    Some(Err(e)) => {
                        warn!(source = %source.name, error = %e, "log stream failed");
                        self.status.send_modify(|s| s.last_error = Some(e.to_string()));
                        break;
                    }
                    None => {
                        info!(source = %source.name, "log stream ended");
                        break;
                    }
                },
            }
        }
        metrics::gauge!(m::LOG_PIPELINE_ACTIVE_WORKERS).decrement(1.0);
    }

    async fn handle_frame(&self, source: &Source, frame: &Bytes) {
        for line in split_lines(frame) {
            let raw = RawLine::new(&source.name, frame.slice_ref(line));
            let outcome = self.processor.process_line(source, &raw).await;
            self.status.send_modify(|s| match outcome {
                LineOutcome::Skipped => {}
                LineOutcome::Dropped => s.lines_dropped += 1,
                LineOutcome::Processed {
                    write_failures,
                    session_recorded,
                    ..
                } => {
                    s.lines_processed += 1;
                    s.write_failures += u64::from(write_failures);
                    if session_recorded {
                        s.sessions_recorded += 1;
                    }
                }
            });
        }
    }
}
