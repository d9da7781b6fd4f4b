//! Frameshot lifecycle worker.
//!
//! Consumes upload notifications and conversion results, keeps request rows
//! up to date, enqueues conversion jobs and mails status changes.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use frameshot_events::EventMessage;
use frameshot_infra::dispatch::{OutboundDispatcher, SendGridMailer};
use frameshot_infra::queue::RedisStreamQueue;
use frameshot_infra::storage::S3UrlStorage;
use frameshot_infra::store::PostgresRequestStore;
use frameshot_infra::workers::QueueConsumer;
use frameshot_infra::{RequestLifecycle, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    frameshot_observability::init();

    let config = WorkerConfig::from_env().context("failed to load configuration")?;

    let store = PostgresRequestStore::connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;
    store.ensure_schema().await.context("failed to apply schema")?;

    let upload_queue = redis_queue(&config, &config.upload_queue).await?;
    let output_queue = redis_queue(&config, &config.conversion_output_queue).await?;
    let job_queue = redis_queue(&config, &config.conversion_job_queue).await?;

    let mailer = SendGridMailer::new(&config.sendgrid_api_key, &config.sendgrid_template_id);
    let dispatcher = OutboundDispatcher::new(job_queue, Arc::new(mailer));
    let storage = S3UrlStorage::new(&config.storage_bucket, &config.storage_region);

    let lifecycle = RequestLifecycle::new(Arc::new(store), Arc::new(dispatcher), Arc::new(storage));

    let handler = lifecycle.clone();
    let uploads = QueueConsumer::new(
        upload_queue,
        move |message: EventMessage| {
            let lifecycle = handler.clone();
            async move { lifecycle.handle_upload_notification(&message).await }
        },
        config.consumer_config("uploads"),
    )
    .spawn();

    let handler = lifecycle.clone();
    let outputs = QueueConsumer::new(
        output_queue,
        move |message: EventMessage| {
            let lifecycle = handler.clone();
            async move { lifecycle.handle_conversion_output(&message).await }
        },
        config.consumer_config("conversion-output"),
    )
    .spawn();

    info!("frameshot worker running");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("shutdown requested, finishing current batches");
    tokio::join!(uploads.shutdown(), outputs.shutdown());
    info!("frameshot worker stopped");
    Ok(())
}

async fn redis_queue(config: &WorkerConfig, stream: &str) -> anyhow::Result<Arc<RedisStreamQueue>> {
    let queue = RedisStreamQueue::connect(&config.redis_url, stream, config.consumer_name.as_str())
        .await
        .with_context(|| format!("failed to open queue {stream}"))?;
    Ok(Arc::new(queue))
}
