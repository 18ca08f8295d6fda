use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// All recognized configuration options. Passed by reference into every
/// component constructor; there is no ambient/process-wide config state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub bridge: String,
    pub supported_coin_list: Vec<String>,
    pub current_coin_symbol: Option<String>,
    pub scout: ScoutConfig,
    pub loss: LossConfig,
    pub ratio_adjust_weight: u32,
    pub log_progress_after_hours: u64,
    pub strategy: String,
    pub enable_api: bool,
    pub api_port: u16,
    pub exchange: ExchangeConfig,
    pub notifications: NotificationConfig,
    pub database_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoutConfig {
    pub sleep_time_seconds: u64,
    pub multiplier: Decimal,
}

impl Default for ScoutConfig {
    fn default() -> Self {
        Self {
            sleep_time_seconds: 5,
            multiplier: dec!(5),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LossConfig {
    pub after_hours: u64,
    pub max_loss_percent: Decimal,
}

impl Default for LossConfig {
    fn default() -> Self {
        Self {
            after_hours: 0,
            max_loss_percent: dec!(5),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub api_key: String,
    pub api_secret: String,
    pub use_testnet: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub webhook_urls: Vec<String>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_urls: Vec::new(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bridge: "USDT".to_string(),
            supported_coin_list: vec!["BTC".to_string(), "ETH".to_string(), "BNB".to_string()],
            current_coin_symbol: None,
            scout: ScoutConfig::default(),
            loss: LossConfig::default(),
            ratio_adjust_weight: 10,
            log_progress_after_hours: 1,
            strategy: "default".to_string(),
            enable_api: false,
            api_port: 3000,
            exchange: ExchangeConfig {
                api_key: String::new(),
                api_secret: String::new(),
                use_testnet: false,
            },
            notifications: NotificationConfig::default(),
            database_path: "sqlite:./ratio_rotation.db".to_string(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.bridge.trim().is_empty() {
            errors.push("bridge must not be empty".to_string());
        }
        if self.supported_coin_list.len() < 2 {
            errors.push("supported_coin_list must name at least two alts".to_string());
        }
        if self.supported_coin_list.iter().any(|c| c == &self.bridge) {
            errors.push("bridge must not appear in supported_coin_list".to_string());
        }
        if self.scout.sleep_time_seconds == 0 {
            errors.push("scout.sleep_time_seconds must be > 0".to_string());
        }
        if self.ratio_adjust_weight == 0 {
            errors.push("ratio_adjust_weight must be >= 1".to_string());
        }
        if self.loss.max_loss_percent < Decimal::ZERO || self.loss.max_loss_percent > dec!(100) {
            errors.push("loss.max_loss_percent must be between 0 and 100".to_string());
        }
        if self.exchange.api_key.trim().is_empty() || self.exchange.api_secret.trim().is_empty() {
            errors.push("exchange credentials must be set".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
