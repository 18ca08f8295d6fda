use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Timelike, Utc};
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::{Strategy, StrategyContext};
use crate::ratio_book;

fn truncate_to_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    t.with_second(0).unwrap_or(t).with_nanosecond(0).unwrap_or(t)
}

/// EWMA-adjusting strategy variant (spec §4.1 warm init + periodic
/// re-anchor). Grounded on
/// `original_source/strategies/ratio_adjust_strategy.py`: seeds ratios from
/// `2*RATIO_ADJUST_WEIGHT` minutes of history, then re-anchors once per
/// minute using a wall-clock threshold (spec §9 Open Question: this cadence
/// can drift if the loop runs faster/slower than 1Hz; preserved as-is).
pub struct RatioAdjustStrategy {
    ctx: StrategyContext,
    reinit_threshold: RwLock<DateTime<Utc>>,
}

impl RatioAdjustStrategy {
    pub fn new(ctx: StrategyContext) -> Self {
        Self {
            ctx,
            reinit_threshold: RwLock::new(DateTime::<Utc>::MIN_UTC),
        }
    }
}

#[async_trait]
impl Strategy for RatioAdjustStrategy {
    async fn initialize(&self) -> Result<()> {
        warn!("CAUTION: the ratio_adjust strategy is still work in progress and can lead to losses! \
               Use it only if you know what you are doing, have done a lot of backtesting, and can live \
               with possible losses.");
        info!("ratio adjust weight: {}", self.ctx.config.ratio_adjust_weight);

        self.ctx.bootstrap_current_coin().await?;

        let coins = self.ctx.config.supported_coin_list.clone();
        let mut session = self.ctx.store.begin().await?;
        ratio_book::initialize_warm(
            &mut session,
            self.ctx.exchange.as_ref(),
            &self.ctx.bridge,
            &coins,
            self.ctx.config.ratio_adjust_weight,
        )
        .await?;
        session.commit().await?;

        let now = self.ctx.exchange.now().await;
        *self.reinit_threshold.write().await = truncate_to_minute(now);
        Ok(())
    }

    async fn scout(&self) -> Result<()> {
        if self.ctx.trader.failed_buy_order() {
            self.bridge_scout().await?;
        }

        let now = self.ctx.exchange.now().await;
        let threshold = *self.reinit_threshold.read().await;
        if now >= threshold {
            let mut session = self.ctx.store.begin().await?;
            ratio_book::reanchor(
                &mut session,
                self.ctx.exchange.as_ref(),
                &self.ctx.bridge,
                self.ctx.config.ratio_adjust_weight,
            )
            .await?;
            session.commit().await?;
            *self.reinit_threshold.write().await = truncate_to_minute(now) + Duration::minutes(1);
        }

        let Some(current) = self.ctx.store.get_current_coin().await? else {
            info!("scout: no current coin set, skipping cycle");
            return Ok(());
        };

        let market = self.ctx.bridge.market_symbol(&current.symbol);
        let Some(price) = self.ctx.exchange.get_sell_price(&market).await? else {
            info!("scout: skipping, current coin {market} not found");
            return Ok(());
        };

        self.ctx.jump_to_best_coin(&current.symbol, price).await
    }

    async fn bridge_scout(&self) -> Result<Option<String>> {
        let Some(current) = self.ctx.store.get_current_coin().await? else {
            return Ok(None);
        };

        let balance = self
            .ctx
            .exchange
            .get_currency_balance(&current.symbol, false)
            .await?;
        let min_notional = self
            .ctx
            .exchange
            .get_min_notional(&current.symbol, self.ctx.bridge.symbol())
            .await?;
        if balance > min_notional {
            // Already holding enough of the current coin; nothing to recover.
            return Ok(None);
        }

        let bought = self.ctx.bridge_scout_core().await?;
        if let Some(coin) = &bought {
            let now = self.ctx.exchange.now().await;
            self.ctx.store.set_current_coin(coin, now).await?;
            self.ctx.trader.clear_failed_buy_order();
        }
        Ok(bought)
    }
}
