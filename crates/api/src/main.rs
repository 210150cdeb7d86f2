use std::sync::Arc;

use anyhow::Context;

use restock_api::app::{build_app, services};
use restock_infra::RestockConfig;
use restock_infra::workers::{ConsumerWorker, ScanRunner};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    restock_observability::init();

    let config = RestockConfig::from_env().context("invalid configuration")?;
    tracing::info!(
        inventory_table = %config.inventory_table,
        frequency_table = %config.frequency_table,
        channel = %config.channel_name,
        "restock coordinator starting"
    );

    let listen_addr = config.listen_addr;
    let services = Arc::new(services::build_services(config)?);

    let consumer = ConsumerWorker::new(
        services.updater.clone(),
        services.channel.clone(),
        services.config.consumer_config(),
    )
    .spawn()
    .context("failed to spawn restock consumer")?;

    let scan_runner = match services.config.scan_interval {
        Some(interval) => {
            let runner = ScanRunner {
                interval,
                ..ScanRunner::default()
            };
            Some(
                runner
                    .spawn("scan-runner", services.coordinator.clone())
                    .context("failed to spawn scan runner")?,
            )
        }
        None => None,
    };

    let app = build_app(services);
    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("server error")?;

    // Worker shutdown joins threads; keep it off the async runtime.
    tokio::task::spawn_blocking(move || {
        consumer.shutdown();
        if let Some(runner) = scan_runner {
            runner.shutdown();
        }
    })
    .await?;

    tracing::info!("restock coordinator stopped");
    Ok(())
}
