use anyhow::Result;
use thiserror::Error;

use super::default_strategy::DefaultStrategy;
use super::ratio_adjust::RatioAdjustStrategy;
use super::{Strategy, StrategyContext};

/// Named strategy-resolution failure (spec §7: "unknown strategy -> fatal,
/// exit"). Grounded on the same `thiserror::Error` idiom as
/// `exchange::ExchangeError`.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("unknown strategy \"{0}\" (expected \"default\" or \"ratio_adjust\")")]
    Unknown(String),
}

/// Resolves `STRATEGY` by name to a constructor (spec §9 "registration is a
/// mapping from strategy name to constructor"). An unrecognized name is
/// fatal at boot (spec §7).
pub fn build_strategy(name: &str, ctx: StrategyContext) -> Result<Box<dyn Strategy>> {
    match name {
        "default" => Ok(Box::new(DefaultStrategy::new(ctx))),
        "ratio_adjust" => Ok(Box::new(RatioAdjustStrategy::new(ctx))),
        other => Err(StrategyError::Unknown(other.to_string()).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::notifications::NotificationManager;
    use crate::store::Store;
    use std::sync::Arc;

    #[tokio::test]
    async fn unknown_strategy_name_is_rejected() {
        let store = Arc::new(Store::connect_test().await.unwrap());
        let exchange: Arc<dyn crate::exchange::Exchange> = Arc::new(crate::test_support::FakeExchange::new());
        let config = Arc::new(AppConfig::default());
        let notifications = Arc::new(NotificationManager::default());
        let ctx = StrategyContext::new(store, exchange, config, notifications);

        let err = build_strategy("not-a-real-strategy", ctx).unwrap_err();
        assert!(err.to_string().contains("unknown strategy"));
    }
}
