pub mod sink;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tracing::{error, info, warn};

pub use sink::spawn_webhook_dispatcher;

/// Notification severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Operational events a strategy/trader/supervisor cycle can raise (spec
/// §7 "User-visible failures": skipped jumps, stuck-loss trades, failed
/// orders are logged at INFO/WARN and may fan out to notifications above
/// INFO).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum AlertType {
    BotStarted,
    BotStopped,
    /// A completed bridge transition (spec §4.3 ANCHORED).
    Jump {
        from: String,
        to: String,
        fill_price: Decimal,
    },
    /// A transition taken at negative score under the stuck-loss fallback
    /// (spec §4.2).
    StuckLossJump {
        from: String,
        to: String,
        loss_estimate_pct: Decimal,
    },
    /// A recovery purchase of the local-minimum coin with leftover bridge
    /// balance (spec §4.2 bridge-scout).
    BridgeScoutPurchase { coin: String },
    /// The buy leg of a transition was rejected (spec §4.3 BOUGHT failure).
    BuyLegFailed { from: String, to: String },
    /// The periodic last-10-trades progress report (spec §4.4).
    ProgressReport { table: String },
    Error { component: String, message: String },
}

impl AlertType {
    pub fn default_severity(&self) -> Severity {
        match self {
            AlertType::Error { .. } => Severity::Critical,
            AlertType::BuyLegFailed { .. } => Severity::Warning,
            AlertType::StuckLossJump { .. } => Severity::Warning,
            _ => Severity::Info,
        }
    }

    pub fn title(&self) -> String {
        match self {
            AlertType::BotStarted => "Bot Started".to_string(),
            AlertType::BotStopped => "Bot Stopped".to_string(),
            AlertType::Jump { from, to, .. } => format!("Jumped {from} -> {to}"),
            AlertType::StuckLossJump { from, to, .. } => format!("Stuck-loss jump {from} -> {to}"),
            AlertType::BridgeScoutPurchase { coin } => format!("Bridge-scout purchase: {coin}"),
            AlertType::BuyLegFailed { from, to } => format!("Buy leg failed: {from} -> {to}"),
            AlertType::ProgressReport { .. } => "Progress Report".to_string(),
            AlertType::Error { component, .. } => format!("Error in {component}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub alert_type: AlertType,
    pub acknowledged: bool,
}

impl Notification {
    pub fn new(alert_type: AlertType) -> Self {
        let severity = alert_type.default_severity();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            severity,
            alert_type,
            acknowledged: false,
        }
    }
}

/// In-memory ring buffer of recent notifications plus a queue-backed
/// dispatch to the configured webhook sink, so emitting a notification
/// never blocks the trading loop (spec §5: "notification emission must
/// never block the trading loop").
pub struct NotificationManager {
    notifications: Arc<RwLock<Vec<Notification>>>,
    sink_tx: Option<mpsc::UnboundedSender<Notification>>,
    max_notifications: usize,
}

impl NotificationManager {
    pub fn new(sink_tx: Option<mpsc::UnboundedSender<Notification>>) -> Self {
        Self {
            notifications: Arc::new(RwLock::new(Vec::new())),
            sink_tx,
            max_notifications: 500,
        }
    }

    pub async fn notify(&self, alert_type: AlertType) {
        let notification = Notification::new(alert_type);

        let title = notification.alert_type.title();
        match notification.severity {
            Severity::Critical => error!("{title}: {:?}", notification.alert_type),
            Severity::Warning => warn!("{title}: {:?}", notification.alert_type),
            Severity::Info => info!("{title}: {:?}", notification.alert_type),
        }

        let mut notifications = self.notifications.write().await;
        notifications.insert(0, notification.clone());
        if notifications.len() > self.max_notifications {
            notifications.truncate(self.max_notifications);
        }
        drop(notifications);

        if notification.severity != Severity::Info {
            if let Some(tx) = &self.sink_tx {
                let _ = tx.send(notification);
            }
        }
    }

    pub async fn get_recent(&self, limit: usize) -> Vec<Notification> {
        self.notifications.read().await.iter().take(limit).cloned().collect()
    }
}

impl Default for NotificationManager {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn severity_defaults() {
        let error = AlertType::Error {
            component: "store".to_string(),
            message: "disk full".to_string(),
        };
        assert_eq!(error.default_severity(), Severity::Critical);

        let jump = AlertType::Jump {
            from: "BTC".to_string(),
            to: "ETH".to_string(),
            fill_price: dec!(2500),
        };
        assert_eq!(jump.default_severity(), Severity::Info);
    }

    #[tokio::test]
    async fn ring_buffer_keeps_most_recent_first() {
        let manager = NotificationManager::new(None);
        manager.notify(AlertType::BotStarted).await;
        manager
            .notify(AlertType::BridgeScoutPurchase { coin: "ETH".to_string() })
            .await;

        let recent = manager.get_recent(10).await;
        assert_eq!(recent.len(), 2);
        assert!(matches!(recent[0].alert_type, AlertType::BridgeScoutPurchase { .. }));
    }
}
