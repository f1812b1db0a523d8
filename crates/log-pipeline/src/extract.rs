//! 소스 유형별 메타데이터 추출
//!
//! 유형마다 정해진 패턴을 목록 순서대로 모두 평가하고, 매칭된 캡처를
//! 메타데이터 필드로 기록합니다. 뒤 패턴이 같은 키를 쓰면 앞 값을 덮어씁니다.
//! 추출은 실패하지 않으며 같은 입력에 항상 같은 결과를 냅니다.

use std::sync::LazyLock;

use regex::Regex;

use opshub_core::types::{Metadata, SourceKind};

static DEFAULT_EXTRACTOR: LazyLock<MetadataExtractor> = LazyLock::new(MetadataExtractor::new);

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("metadata patterns are valid")
}

/// Open WebUI 로그 패턴
#[derive(Debug, Clone)]
struct OpenWebUiPatterns {
    user_login: Regex,
    model_usage: Regex,
    api_request: Regex,
}

/// Ollama 로그 패턴
#[derive(Debug, Clone)]
struct OllamaPatterns {
    model_loaded: Regex,
    inference: Regex,
    gpu_usage: Regex,
}

/// 메타데이터 추출기
///
/// 패턴은 생성 시 한 번만 컴파일합니다.
#[derive(Debug, Clone)]
pub struct MetadataExtractor {
    openwebui: OpenWebUiPatterns,
    ollama: OllamaPatterns,
}

impl MetadataExtractor {
    /// 기본 패턴으로 추출기를 생성합니다.
    pub fn new() -> Self {
        Self {
            openwebui: OpenWebUiPatterns {
                user_login: compile(r"(?i)user\s+(\w+)\s+(logged\s+in|authenticated)"),
                model_usage: compile(r"(?i)model[:\s]+(\w+)"),
                api_request: compile(r"(?i)(GET|POST|PUT|DELETE)\s+/api/"),
            },
            ollama: OllamaPatterns {
                model_loaded: compile(r"(?i)loaded\s+model[:\s]+(\w+)"),
                inference: compile(r"(?i)(generating|processing)\s+for\s+model[:\s]+(\w+)"),
                gpu_usage: compile(r"(?i)GPU\s+(\d+).*?(\d+)%"),
            },
        }
    }

    /// 라인에서 소스 유형에 맞는 메타데이터를 추출합니다.
    pub fn extract(&self, kind: SourceKind, line: &str) -> Metadata {
        let mut metadata = Metadata::new();
        match kind {
            SourceKind::OpenWebUi => self.extract_openwebui(line, &mut metadata),
            SourceKind::Ollama => self.extract_ollama(line, &mut metadata),
            SourceKind::Generic => {}
        }
        metadata
    }

    fn extract_openwebui(&self, line: &str, metadata: &mut Metadata) {
        let p = &self.openwebui;

        if let Some(caps) = p.user_login.captures(line) {
            set(metadata, "user", &caps[1]);
            set(metadata, "action", "login");
        }

        if let Some(caps) = p.model_usage.captures(line) {
            set(metadata, "model", &caps[1]);
        }

        if let Some(caps) = p.api_request.captures(line) {
            set(metadata, "method", &caps[1]);
            set(metadata, "endpoint", "api");
        }
    }

    fn extract_ollama(&self, line: &str, metadata: &mut Metadata) {
        let p = &self.ollama;

        if let Some(caps) = p.model_loaded.captures(line) {
            set(metadata, "model", &caps[1]);
            set(metadata, "action", "model_load");
        }

        if let Some(caps) = p.inference.captures(line) {
            set(metadata, "action", &caps[1]);
            set(metadata, "model", &caps[2]);
        }

        if let Some(caps) = p.gpu_usage.captures(line) {
            set(metadata, "gpu_id", &caps[1]);
            set(metadata, "gpu_usage", &caps[2]);
        }
    }
}

impl Default for MetadataExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn set(metadata: &mut Metadata, key: &str, value: &str) {
    metadata.insert(key.to_owned(), value.to_owned());
}

/// 기본 추출기로 메타데이터를 추출합니다.
pub fn extract(kind: SourceKind, line: &str) -> Metadata {
    DEFAULT_EXTRACTOR.extract(kind, line)
}
