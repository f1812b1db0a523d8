//! 일별 파일 싱크
//!
//! 소스별 디렉토리 아래에 날짜 파일 두 종류를 append 합니다.
//!
//! ```text
//! <root>/<source>/<YYYY-MM-DD>.log          "{timestamp} [{LEVEL}] {line}"
//! <root>/<source>/<YYYY-MM-DD>_<LEVEL>.log  "{timestamp} {line}"
//! ```
//!
//! 파일은 소스별로 분리되어 있고 소스당 워커는 하나뿐이므로 잠금이 없습니다.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use opshub_core::types::{Level, TIMESTAMP_FORMAT};

use crate::error::LogPipelineError;

/// 소스 이름을 디렉토리명으로 쓸 수 있는지 검증합니다.
///
/// 경로 구분자, NUL, `.`/`..` 자체만 거부합니다. `app..v2` 같은 Docker 이름은 허용됩니다.
pub fn validate_source_name(name: &str) -> Result<(), LogPipelineError> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(LogPipelineError::InvalidSourceName(name.to_owned()));
    }
    Ok(())
}

/// 일별 로그 파일 싱크
#[derive(Debug, Clone)]
pub struct LogSink {
    root: PathBuf,
}

impl LogSink {
    /// 루트 디렉토리로 싱크를 생성합니다. 디렉토리는 첫 기록 시 생성됩니다.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// 루트 디렉토리
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 소스 디렉토리 경로
    pub fn source_dir(&self, source_name: &str) -> Result<PathBuf, LogPipelineError> {
        validate_source_name(source_name)?;
        Ok(self.root.join(source_name))
    }

    /// 일별 통합 파일 경로
    pub fn daily_path(&self, source_name: &str, day: &str) -> Result<PathBuf, LogPipelineError> {
        Ok(self.source_dir(source_name)?.join(format!("{day}.log")))
    }

    /// 일별 레벨 파일 경로
    pub fn level_path(
        &self,
        source_name: &str,
        day: &str,
        level: Level,
    ) -> Result<PathBuf, LogPipelineError> {
        Ok(self
            .source_dir(source_name)?
            .join(format!("{day}_{}.log", level.as_str())))
    }

    /// 라인 하나를 통합 파일과 레벨 파일에 기록합니다.
    ///
    /// 날짜는 `timestamp`의 날짜 부분입니다.
    pub async fn write(
        &self,
        source_name: &str,
        level: Level,
        timestamp: &str,
        line: &str,
    ) -> Result<(), LogPipelineError> {
        let day = day_of(timestamp)?;
        let dir = self.source_dir(source_name)?;
        tokio::fs::create_dir_all(&dir).await?;

        append_line(
            &self.daily_path(source_name, &day)?,
            &format!("{timestamp} [{level}] {line}\n"),
        )
        .await?;
        append_line(
            &self.level_path(source_name, &day, level)?,
            &format!("{timestamp} {line}\n"),
        )
        .await?;

        Ok(())
    }
}

fn day_of(timestamp: &str) -> Result<String, LogPipelineError> {
    let at = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)
        .map_err(|_| LogPipelineError::InvalidTimestamp(timestamp.to_owned()))?;
    Ok(at.format("%Y-%m-%d").to_string())
}

async fn append_line(path: &Path, text: &str) -> Result<(), LogPipelineError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(text.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}
