//! 로그 파이프라인 에러 타입
//!
//! [`LogPipelineError`]는 파이프라인 내부의 모든 에러를, [`StoreError`]는
//! 레코드 저장소 에러를 표현합니다. `From<LogPipelineError> for OpsHubError`
//! 변환이 구현되어 있어 상위 레이어에서 `?`로 전파할 수 있습니다.

use opshub_core::error::{OpsHubError, PipelineError, StorageError};

/// 로그 파이프라인 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum LogPipelineError {
    /// 소스를 찾을 수 없음 (런타임이 404 반환)
    #[error("source not found: {0}")]
    SourceNotFound(String),

    /// 컨테이너 런타임 API 에러
    #[error("runtime error: {0}")]
    Runtime(String),

    /// 컨테이너 런타임 연결 실패
    #[error("runtime connection error: {0}")]
    RuntimeConnection(String),

    /// 라인 디코딩 실패 (UTF-8 아님)
    #[error("decode error: source '{source_name}': {reason}")]
    Decode {
        /// 소스 이름
        source_name: String,
        /// 실패 사유
        reason: String,
    },

    /// 파일 경로로 쓸 수 없는 소스 이름
    #[error("invalid source name: '{0}'")]
    InvalidSourceName(String),

    /// 엔트리 타임스탬프 형식 오류
    #[error("invalid timestamp: '{0}'")]
    InvalidTimestamp(String),

    /// 저장소 에러
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

/// 레코드 저장소 에러
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// SQLite 에러
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// 메타데이터 직렬화 에러
    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),

    /// 저장소 actor 가 종료됨
    #[error("store is closed")]
    Closed,

    /// 저장된 값을 해석할 수 없음
    #[error("invalid value in column '{column}': {value}")]
    InvalidValue {
        /// 컬럼명
        column: String,
        /// 저장된 값
        value: String,
    },

    /// 블로킹 태스크 실패
    #[error("store task failed: {0}")]
    Task(String),
}

impl From<StoreError> for OpsHubError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Closed | StoreError::Task(_) => {
                OpsHubError::Storage(StorageError::Connection(err.to_string()))
            }
            _ => OpsHubError::Storage(StorageError::Query(err.to_string())),
        }
    }
}

impl From<LogPipelineError> for OpsHubError {
    fn from(err: LogPipelineError) -> Self {
        match err {
            LogPipelineError::Store(store) => store.into(),
            LogPipelineError::Io(io) => OpsHubError::Io(io),
            other => OpsHubError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_error_display() {
        let err = LogPipelineError::Decode {
            source_name: "ollama".to_owned(),
            reason: "invalid utf-8 sequence".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("ollama"));
        assert!(msg.contains("utf-8"));
    }

    #[test]
    fn converts_to_opshub_error() {
        let err = LogPipelineError::SourceNotFound("web".to_owned());
        let top: OpsHubError = err.into();
        assert!(matches!(top, OpsHubError::Pipeline(_)));
    }

    #[test]
    fn store_error_maps_to_storage() {
        let top: OpsHubError = LogPipelineError::Store(StoreError::Closed).into();
        assert!(matches!(
            top,
            OpsHubError::Storage(StorageError::Connection(_))
        ));

        let top: OpsHubError = StoreError::InvalidValue {
            column: "level".to_owned(),
            value: "LOUD".to_owned(),
        }
        .into();
        assert!(matches!(top, OpsHubError::Storage(StorageError::Query(_))));
    }

    #[test]
    fn io_error_passes_through() {
        let err = LogPipelineError::Io(std::io::Error::other("disk full"));
        let top: OpsHubError = err.into();
        assert!(matches!(top, OpsHubError::Io(_)));
    }
}
