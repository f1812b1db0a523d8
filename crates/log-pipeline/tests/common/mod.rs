//! 통합 테스트용 스크립트 런타임
//!
//! `opshub-daemon` 통합 테스트도 `#[path]`로 같은 파일을 사용합니다.

use std::collections::HashMap;
use std::sync::Mutex;

use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;

use opshub_core::types::{Source, SourceInfo};
use opshub_log_pipeline::{FrameStream, LogPipelineError, SourceRuntime};

type Feed = mpsc::UnboundedSender<Result<Bytes, LogPipelineError>>;
type FeedRx = mpsc::UnboundedReceiver<Result<Bytes, LogPipelineError>>;

/// 소스, backlog, live 스트림을 스크립트로 지정하는 런타임
#[derive(Default)]
pub struct ScriptedRuntime {
    sources: Vec<SourceInfo>,
    backlogs: HashMap<String, Vec<Bytes>>,
    live: Mutex<HashMap<String, FeedRx>>,
}

impl ScriptedRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(mut self, name: &str, frames: &[&str]) -> Self {
        let id = format!("{:064x}", self.sources.len() + 1);
        self.sources.push(SourceInfo {
            name: name.to_owned(),
            id,
            status: "running".to_owned(),
        });
        self.backlogs.insert(
            name.to_owned(),
            frames
                .iter()
                .map(|f| Bytes::copy_from_slice(f.as_bytes()))
                .collect(),
        );
        self
    }

    /// live 스트림을 연결합니다. 반환된 송신측이 drop 되면 스트림이 끝납니다.
    pub fn feed(&self, name: &str) -> Feed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.live.lock().unwrap().insert(name.to_owned(), rx);
        tx
    }
}

impl SourceRuntime for ScriptedRuntime {
    async fn list_sources(
        &self,
        include_stopped: bool,
    ) -> Result<Vec<SourceInfo>, LogPipelineError> {
        Ok(self
            .sources
            .iter()
            .filter(|s| include_stopped || s.status == "running")
            .cloned()
            .collect())
    }

    async fn resolve(&self, name: &str) -> Result<Source, LogPipelineError> {
        self.sources
            .iter()
            .find(|s| s.name == name)
            .map(|s| Source::new(&s.name, &s.id))
            .ok_or_else(|| LogPipelineError::SourceNotFound(name.to_owned()))
    }

    async fn read_backlog(
        &self,
        source: &Source,
        count: usize,
    ) -> Result<Vec<Bytes>, LogPipelineError> {
        let frames = self.backlogs.get(&source.name).cloned().unwrap_or_default();
        let skip = frames.len().saturating_sub(count);
        Ok(frames.into_iter().skip(skip).collect())
    }

    fn follow(&self, source: &Source, _since: i64) -> FrameStream {
        match self.live.lock().unwrap().remove(&source.name) {
            Some(rx) => futures::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })
            .boxed(),
            None => futures::stream::empty().boxed(),
        }
    }

    async fn ping(&self) -> Result<(), LogPipelineError> {
        Ok(())
    }
}
