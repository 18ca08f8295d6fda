use reqwest::Client;
use tokio::sync::mpsc;
use tracing::warn;

use super::Notification;

/// Spawns the background task that drains the notification queue and posts
/// each notification to every configured webhook URL. Grounded on
/// `original_source/notifications.py`'s dedicated queue-consumer thread
/// (there: an `apprise` multi-channel dispatch; here: plain webhook POSTs,
/// since no Rust Apprise binding exists in the corpus — see DESIGN.md).
/// Returns the sender half; `notify()` never awaits delivery.
pub fn spawn_webhook_dispatcher(urls: Vec<String>) -> mpsc::UnboundedSender<Notification> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();

    tokio::spawn(async move {
        let client = Client::new();
        while let Some(notification) = rx.recv().await {
            if urls.is_empty() {
                continue;
            }
            for url in &urls {
                if let Err(e) = client.post(url).json(&notification).send().await {
                    warn!("notification dispatch to {url} failed: {e}");
                }
            }
        }
    });

    tx
}
