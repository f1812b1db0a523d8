#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`classify`]: 키워드 기반 레벨 분류
//! - [`extract`]: 소스 유형별 메타데이터 추출
//! - [`sink`]: 소스/일/레벨별 로그 파일 기록
//! - [`store`]: SQLite 레코드 저장소 (단일 actor)
//! - [`runtime`]: 컨테이너 런타임 추상화 (Docker)
//! - [`discovery`]: include/exclude 패턴 기반 소스 탐색
//! - [`tail`]: 소스별 tail 워커와 라인 처리
//! - [`retention`]: 파일/레코드 보존 정리
//! - [`pipeline`]: 전체 오케스트레이션 (Pipeline trait 구현)
//! - [`config`]: 파이프라인 설정 (core 설정에서 파생)
//! - [`error`]: 도메인 에러 타입

pub mod classify;
pub mod config;
pub mod discovery;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod retention;
pub mod runtime;
pub mod sink;
pub mod store;
pub mod tail;

// --- 주요 타입 re-export ---

// 파이프라인
pub use pipeline::{LogPipeline, LogPipelineBuilder};

// 설정
pub use config::PipelineConfig;

// 에러
pub use error::{LogPipelineError, StoreError};

// 분류/추출
pub use classify::{Classifier, classify};
pub use extract::{MetadataExtractor, extract};

// 런타임
pub use runtime::{BollardRuntime, FrameStream, SourceRuntime};

// 탐색
pub use discovery::{SourceFilter, discover};

// 기록
pub use sink::LogSink;
pub use store::{AlertQuery, LogQuery, SessionQuery, Store, StoreHandle, StoreStats};

// 워커
pub use tail::{LineOutcome, LineProcessor, TailWorker, WorkerState, WorkerStatus};

// 보존
pub use retention::{RetentionSweeper, SweepReport};
