//! Container runtime abstraction for testability.
//!
//! The [`SourceRuntime`] trait covers the four things the pipeline needs from
//! a container engine: listing sources, resolving a name, reading the recent
//! backlog and following the live log stream. Production code uses
//! [`BollardRuntime`]; tests use `MockRuntime`.
//!
//! ```text
//!   LogPipeline / TailWorker
//!            │
//!            ▼
//!    ┌──────────────┐
//!    │SourceRuntime │ (trait)
//!    └──────────────┘
//!        │      │
//!        ▼      ▼
//!   ┌───────┐ ┌──────┐
//!   │Bollard│ │ Mock │
//!   └───┬───┘ └──────┘
//!       ▼
//!   Docker Daemon
//! ```
//!
//! # Input Validation
//!
//! Names and IDs end up in Docker API URL paths, so they are checked first:
//! - IDs: 1-64 ASCII hex digits
//! - Names: 1-128 chars, `[A-Za-z0-9][A-Za-z0-9_.-]*`

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};

use opshub_core::types::{Source, SourceInfo};

use crate::error::LogPipelineError;

/// Stream of raw log frames from a followed source.
pub type FrameStream = BoxStream<'static, Result<Bytes, LogPipelineError>>;

/// Validates a container ID to prevent injection into API paths.
fn validate_container_id(id: &str) -> Result<(), LogPipelineError> {
    if id.is_empty() || id.len() > 64 {
        return Err(LogPipelineError::Runtime(format!(
            "invalid container ID: length {} (must be 1-64)",
            id.len()
        )));
    }
    if !id.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(LogPipelineError::Runtime(
            "invalid container ID: contains non-hex characters".to_owned(),
        ));
    }
    Ok(())
}

/// Validates a container name against Docker's naming rule.
fn validate_container_name(name: &str) -> Result<(), LogPipelineError> {
    let mut chars = name.chars();
    let first_ok = chars.next().is_some_and(|c| c.is_ascii_alphanumeric());
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if !first_ok || !rest_ok || name.len() > 128 {
        return Err(LogPipelineError::SourceNotFound(name.to_owned()));
    }
    Ok(())
}

/// Trait abstracting the container engine.
///
/// The trait is `Send + Sync + 'static` so one runtime can be shared by every
/// tail worker through an `Arc`.
///
/// # Error Handling
///
/// - **404 errors**: converted to `LogPipelineError::SourceNotFound`
/// - **Connection errors**: wrapped as `LogPipelineError::RuntimeConnection`
/// - **Other API failures**: wrapped as `LogPipelineError::Runtime`
pub trait SourceRuntime: Send + Sync + 'static {
    /// Lists sources. Stopped ones are included only when `include_stopped` is set.
    fn list_sources(
        &self,
        include_stopped: bool,
    ) -> impl Future<Output = Result<Vec<SourceInfo>, LogPipelineError>> + Send;

    /// Resolves a source by name.
    ///
    /// # Errors
    ///
    /// - `LogPipelineError::SourceNotFound`: no such source (404) or invalid name
    fn resolve(&self, name: &str)
    -> impl Future<Output = Result<Source, LogPipelineError>> + Send;

    /// Reads the last `count` log frames of a source (stdout and stderr).
    fn read_backlog(
        &self,
        source: &Source,
        count: usize,
    ) -> impl Future<Output = Result<Vec<Bytes>, LogPipelineError>> + Send;

    /// Follows the live log stream starting at `since` (unix seconds).
    ///
    /// The stream ends when the source stops.
    fn follow(&self, source: &Source, since: i64) -> FrameStream;

    /// Checks runtime connectivity.
    fn ping(&self) -> impl Future<Output = Result<(), LogPipelineError>> + Send;
}

fn is_not_found(err: &bollard::errors::Error) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

/// Production runtime using `bollard`.
///
/// # Connection Management
///
/// - Connection timeout: 120 seconds
/// - API version: default (auto-negotiated)
/// - Socket path: configurable (default: platform local socket)
pub struct BollardRuntime {
    docker: Arc<bollard::Docker>,
}

impl BollardRuntime {
    /// Connects to Docker using the default local socket.
    ///
    /// # Errors
    ///
    /// Returns `LogPipelineError::RuntimeConnection` if the connection fails.
    pub fn connect_local() -> Result<Self, LogPipelineError> {
        let docker = bollard::Docker::connect_with_local_defaults().map_err(|e| {
            LogPipelineError::RuntimeConnection(format!("failed to connect to docker: {e}"))
        })?;
        Ok(Self {
            docker: Arc::new(docker),
        })
    }

    /// Connects to Docker using a specific socket path.
    pub fn connect_with_socket(socket_path: &str) -> Result<Self, LogPipelineError> {
        let docker =
            bollard::Docker::connect_with_socket(socket_path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| {
                    LogPipelineError::RuntimeConnection(format!(
                        "failed to connect to docker at {socket_path}: {e}"
                    ))
                })?;
        Ok(Self {
            docker: Arc::new(docker),
        })
    }

    /// Connects to `socket_path`, or to the local default when it is empty.
    pub fn connect(socket_path: &str) -> Result<Self, LogPipelineError> {
        if socket_path.is_empty() {
            Self::connect_local()
        } else {
            Self::connect_with_socket(socket_path)
        }
    }
}

impl SourceRuntime for BollardRuntime {
    async fn list_sources(
        &self,
        include_stopped: bool,
    ) -> Result<Vec<SourceInfo>, LogPipelineError> {
        use bollard::container::ListContainersOptions;

        let options = ListContainersOptions::<String> {
            all: include_stopped,
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| LogPipelineError::Runtime(format!("list containers failed: {e}")))?;

        let sources = containers
            .into_iter()
            .map(|container| {
                let name = container
                    .names
                    .unwrap_or_default()
                    .first()
                    .map(|n| n.trim_start_matches('/').to_owned())
                    .unwrap_or_default();
                SourceInfo {
                    name,
                    id: container.id.unwrap_or_default(),
                    status: container.state.unwrap_or_default(),
                }
            })
            .filter(|info| !info.name.is_empty())
            .collect();

        Ok(sources)
    }

    async fn resolve(&self, name: &str) -> Result<Source, LogPipelineError> {
        validate_container_name(name)?;

        let details = self
            .docker
            .inspect_container(name, None)
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    LogPipelineError::SourceNotFound(name.to_owned())
                } else {
                    LogPipelineError::Runtime(format!("inspect '{name}' failed: {e}"))
                }
            })?;

        let id = details
            .id
            .ok_or_else(|| LogPipelineError::Runtime(format!("'{name}' has no container ID")))?;
        Ok(Source::new(name, id))
    }

    async fn read_backlog(
        &self,
        source: &Source,
        count: usize,
    ) -> Result<Vec<Bytes>, LogPipelineError> {
        use bollard::container::{LogOutput, LogsOptions};

        validate_container_id(&source.id)?;

        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: false,
            tail: count.to_string(),
            ..Default::default()
        };

        self.docker
            .logs(&source.id, Some(options))
            .map_ok(LogOutput::into_bytes)
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    LogPipelineError::SourceNotFound(source.name.clone())
                } else {
                    LogPipelineError::Runtime(format!("backlog of '{}' failed: {e}", source.name))
                }
            })
    }

    fn follow(&self, source: &Source, since: i64) -> FrameStream {
        use bollard::container::{LogOutput, LogsOptions};

        if let Err(e) = validate_container_id(&source.id) {
            return futures::stream::once(async move { Err(e) }).boxed();
        }

        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: true,
            since,
            tail: "all".to_owned(),
            ..Default::default()
        };

        let name = source.name.clone();
        self.docker
            .logs(&source.id, Some(options))
            .map(move |frame| {
                frame.map(LogOutput::into_bytes).map_err(|e| {
                    LogPipelineError::Runtime(format!("log stream of '{name}' failed: {e}"))
                })
            })
            .boxed()
    }

    async fn ping(&self) -> Result<(), LogPipelineError> {
        self.docker
            .ping()
            .await
            .map_err(|e| LogPipelineError::RuntimeConnection(format!("ping failed: {e}")))?;
        Ok(())
    }
}

/// 테스트용 Mock 런타임
///
/// 소스 목록, backlog, live 스트림을 미리 지정할 수 있습니다.
#[cfg(test)]
#[derive(Default)]
pub struct MockRuntime {
    /// list_sources 가 반환할 소스
    pub sources: Vec<SourceInfo>,
    /// 소스 이름별 backlog 프레임
    pub backlogs: std::collections::HashMap<String, Vec<Bytes>>,
    /// backlog 읽기를 실패시킬지 여부
    pub fail_backlog: bool,
    /// ping 을 실패시킬지 여부
    pub unreachable: bool,
    live: std::sync::Mutex<
        std::collections::HashMap<
            String,
            tokio::sync::mpsc::UnboundedReceiver<Result<Bytes, LogPipelineError>>,
        >,
    >,
}

#[cfg(test)]
impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// 실행 중인 소스를 추가합니다.
    pub fn with_source(self, name: &str) -> Self {
        self.with_source_status(name, "running")
    }

    /// 상태를 지정하여 소스를 추가합니다.
    pub fn with_source_status(mut self, name: &str, status: &str) -> Self {
        let id = format!("{:012x}", 0xabc000 + self.sources.len());
        self.sources.push(SourceInfo {
            name: name.to_owned(),
            id,
            status: status.to_owned(),
        });
        self
    }

    /// backlog 프레임을 지정합니다.
    pub fn with_backlog(mut self, name: &str, frames: &[&str]) -> Self {
        self.backlogs.insert(
            name.to_owned(),
            frames
                .iter()
                .map(|f| Bytes::copy_from_slice(f.as_bytes()))
                .collect(),
        );
        self
    }

    /// backlog 읽기가 실패하도록 설정합니다.
    pub fn with_failing_backlog(mut self) -> Self {
        self.fail_backlog = true;
        self
    }

    /// ping 이 실패하도록 설정합니다.
    pub fn with_unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    /// 소스의 live 스트림 송신측을 만듭니다. 송신측이 drop 되면 스트림이 끝납니다.
    pub fn live_feed(
        &self,
        name: &str,
    ) -> tokio::sync::mpsc::UnboundedSender<Result<Bytes, LogPipelineError>> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        self.live.lock().unwrap().insert(name.to_owned(), rx);
        tx
    }
}

#[cfg(test)]
impl SourceRuntime for MockRuntime {
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
        if self.fail_backlog {
            return Err(LogPipelineError::Runtime("mock backlog failure".to_owned()));
        }
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
        if self.unreachable {
            return Err(LogPipelineError::RuntimeConnection(
                "mock runtime unreachable".to_owned(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_id_validation() {
        assert!(validate_container_id("abc123def456").is_ok());
        assert!(validate_container_id("").is_err());
        assert!(validate_container_id("xyz").is_err());
        assert!(validate_container_id(&"a".repeat(65)).is_err());
    }

    #[test]
    fn container_name_validation() {
        assert!(validate_container_name("openwebui-1").is_ok());
        assert!(validate_container_name("ollama_gpu.0").is_ok());
        assert!(matches!(
            validate_container_name("../etc"),
            Err(LogPipelineError::SourceNotFound(_))
        ));
        assert!(validate_container_name("").is_err());
        assert!(validate_container_name("-lead").is_err());
        assert!(validate_container_name("a/b").is_err());
    }

    #[tokio::test]
    async fn mock_lists_running_only_by_default() {
        let runtime = MockRuntime::new()
            .with_source("web")
            .with_source_status("old", "exited");

        let running = runtime.list_sources(false).await.unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].name, "web");

        let all = runtime.list_sources(true).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn mock_resolve_not_found() {
        let runtime = MockRuntime::new();
        assert!(matches!(
            runtime.resolve("ghost").await,
            Err(LogPipelineError::SourceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn mock_backlog_honours_count() {
        let runtime = MockRuntime::new()
            .with_source("web")
            .with_backlog("web", &["a\n", "b\n", "c\n"]);
        let source = runtime.resolve("web").await.unwrap();

        let frames = runtime.read_backlog(&source, 2).await.unwrap();
        assert_eq!(frames, vec![Bytes::from("b\n"), Bytes::from("c\n")]);
    }

    #[tokio::test]
    async fn mock_follow_yields_fed_frames_then_ends() {
        let runtime = MockRuntime::new().with_source("web");
        let feed = runtime.live_feed("web");
        let source = runtime.resolve("web").await.unwrap();

        let mut stream = runtime.follow(&source, 0);
        feed.send(Ok(Bytes::from("hello\n"))).unwrap();
        drop(feed);

        assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from("hello\n"));
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn runtime_types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync + 'static>() {}
        assert_send_sync::<MockRuntime>();
        assert_send_sync::<BollardRuntime>();
    }
}
