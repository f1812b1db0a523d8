//! 로그 라인 레벨 분류
//!
//! 키워드 패턴을 고정된 우선순위(ERROR, CRITICAL, WARNING, SUCCESS, INFO)로
//! 평가하여 처음 매칭된 레벨을 반환합니다. 어떤 패턴에도 맞지 않으면
//! [`Level::Info`]입니다.
//!
//! ERROR 패턴이 `CRITICAL`/`FATAL`도 포함하고 먼저 평가되므로, 이 두 단어가
//! 들어간 라인은 ERROR가 됩니다. CRITICAL은 `PANIC`처럼 ERROR 패턴에 없는
//! 단어로만 도달합니다.

use std::sync::LazyLock;

use regex::Regex;

use opshub_core::types::Level;

/// (레벨, 패턴) -- 평가 순서대로
const LEVEL_PATTERNS: [(Level, &str); 5] = [
    (
        Level::Error,
        r"(?i)\b(ERROR|ERR|CRITICAL|FATAL|EXCEPTION|FAILED)\b",
    ),
    (Level::Critical, r"(?i)\b(CRITICAL|FATAL|PANIC)\b"),
    (Level::Warning, r"(?i)\b(WARN|WARNING|CAUTION)\b"),
    (
        Level::Success,
        r"(?i)\b(SUCCESS|OK|COMPLETED|FINISHED|DONE|✓|✅)\b",
    ),
    (Level::Info, r"(?i)\b(INFO|INFORMATION|DEBUG|TRACE)\b"),
];

static DEFAULT_CLASSIFIER: LazyLock<Classifier> = LazyLock::new(Classifier::new);

/// 레벨 분류기
///
/// 패턴은 생성 시 한 번만 컴파일합니다.
#[derive(Debug, Clone)]
pub struct Classifier {
    patterns: Vec<(Level, Regex)>,
}

impl Classifier {
    /// 기본 키워드 패턴으로 분류기를 생성합니다.
    pub fn new() -> Self {
        let patterns = LEVEL_PATTERNS
            .iter()
            .map(|(level, pattern)| {
                let re = Regex::new(pattern).expect("level patterns are valid");
                (*level, re)
            })
            .collect();
        Self { patterns }
    }

    /// 라인의 레벨을 판정합니다.
    pub fn classify(&self, line: &str) -> Level {
        self.patterns
            .iter()
            .find(|(_, re)| re.is_match(line))
            .map(|(level, _)| *level)
            .unwrap_or_default()
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

/// 기본 분류기로 라인의 레벨을 판정합니다.
pub fn classify(line: &str) -> Level {
    DEFAULT_CLASSIFIER.classify(line)
}
