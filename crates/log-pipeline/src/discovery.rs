//! 소스 탐색
//!
//! 런타임이 나열한 소스 중 include 패턴에 매칭되고 exclude 패턴에 매칭되지
//! 않는 이름만 남깁니다. 두 패턴 모두 부분 매칭(검색)입니다.
//! 탐색은 시작 시 한 번만 수행합니다.

use regex::Regex;

use crate::error::LogPipelineError;
use crate::runtime::SourceRuntime;

/// 기본 include 패턴 (전체)
pub const DEFAULT_INCLUDE: &str = ".*";
/// 기본 exclude 패턴 (빈 이름만)
pub const DEFAULT_EXCLUDE: &str = "^$";

/// 소스 이름 필터
#[derive(Debug, Clone)]
pub struct SourceFilter {
    include: Regex,
    exclude: Regex,
}

impl SourceFilter {
    /// 두 패턴을 컴파일하여 필터를 생성합니다.
    pub fn new(include: &str, exclude: &str) -> Result<Self, LogPipelineError> {
        Ok(Self {
            include: Regex::new(include)?,
            exclude: Regex::new(exclude)?,
        })
    }

    /// 이름이 필터를 통과하는지 여부
    pub fn matches(&self, name: &str) -> bool {
        self.include.is_match(name) && !self.exclude.is_match(name)
    }
}

impl Default for SourceFilter {
    fn default() -> Self {
        Self {
            include: Regex::new(DEFAULT_INCLUDE).expect("default include pattern is valid"),
            exclude: Regex::new(DEFAULT_EXCLUDE).expect("default exclude pattern is valid"),
        }
    }
}

/// 런타임에서 소스를 나열하고 필터를 통과한 이름을 반환합니다.
///
/// 순서는 런타임이 나열한 순서를 따릅니다.
pub async fn discover<R: SourceRuntime>(
    runtime: &R,
    filter: &SourceFilter,
    include_stopped: bool,
) -> Result<Vec<String>, LogPipelineError> {
    let listed = runtime.list_sources(include_stopped).await?;
    let total = listed.len();

    let names: Vec<String> = listed
        .into_iter()
        .map(|info| info.name)
        .filter(|name| filter.matches(name))
        .collect();

    tracing::debug!(
        listed = total,
        selected = names.len(),
        include_stopped,
        "source discovery finished"
    );
    Ok(names)
}
