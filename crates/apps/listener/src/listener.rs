use crate::handlers::{enqueue_with_retry, handle_event};
use crate::minio::NotificationClient;
use crate::notification::parse_notification;
use app_state::AppSettings;
use color_eyre::eyre::Result;
use common_services::alert;
use reqwest::Client;
use sqlx::PgPool;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Listens to the configured bucket forever, reconnecting after every disconnect.
pub async fn start_listening(pool: PgPool, settings: AppSettings) {
    let client = NotificationClient::new(Client::new(), &settings.object_store);
    let delay = Duration::from_secs(settings.listener.reconnect_delay_seconds);

    loop {
        match run(&client, &pool, &settings).await {
            Ok(()) => warn!("Notification stream closed by the object store."),
            Err(e) => alert!("Listener lost its subscription: {:?}", e),
        }
        info!("Reconnecting in {}s", delay.as_secs());
        sleep(delay).await;
    }
}

/// Consumes one subscription until the stream ends or breaks.
async fn run(client: &NotificationClient, pool: &PgPool, settings: &AppSettings) -> Result<()> {
    let bucket = &settings.object_store.bucket;
    let mut stream = client.listen(bucket, &settings.listener.events).await?;
    info!("👁️ Listening for {:?} on bucket {}", settings.listener.events, bucket);

    while let Some(line) = stream.next_line().await? {
        let events = match parse_notification(&line) {
            Ok(events) => events,
            Err(e) => {
                warn!("Skipping unreadable notification {:?}: {:?}", line, e);
                continue;
            }
        };

        for event in events {
            let object = event.object.clone();
            // Reconnecting would not replay the event.
            let result = enqueue_with_retry(&settings.listener, &object, || {
                handle_event(pool, settings, event.clone())
            })
            .await;
            if let Err(e) = result {
                alert!(
                    "Dropped {} event for {}, run a backfill to recover it: {:?}",
                    event.event_name, object, e
                );
            }
        }
    }

    Ok(())
}
