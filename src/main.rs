use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use webhook_receiver::config::ReceiverConfig;
use webhook_receiver::server::WebhookReceiver;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "webhook_receiver=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ReceiverConfig::from_env().context("failed to load receiver configuration")?;
    let port = config.port;

    let mut receiver = WebhookReceiver::new(config)?;
    receiver.start(port).await?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    tracing::info!("shutdown signal received");
    receiver.stop().await;
    Ok(())
}
