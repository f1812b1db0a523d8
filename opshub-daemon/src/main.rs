use anyhow::Result;
use clap::Parser;

use opshub_daemon::cli::DaemonCli;
use opshub_daemon::logging;
use opshub_daemon::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    // 설정 로드 (파일 → 환경변수 → CLI 순으로 덮어쓴 뒤 한 번 검증)
    let config = cli
        .load_config()
        .await
        .map_err(|e| anyhow::anyhow!("failed to load config {}: {}", cli.config.display(), e))?;

    if cli.validate {
        println!("configuration OK: {}", cli.config.display());
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "opshub-daemon starting"
    );

    let mut orchestrator = Orchestrator::connect(config)?;
    orchestrator.run().await?;

    tracing::info!("opshub-daemon shut down");
    Ok(())
}
