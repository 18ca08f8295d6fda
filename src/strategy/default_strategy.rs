use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use super::{Strategy, StrategyContext};
use crate::ratio_book;

/// Baseline strategy variant (spec §4.1 "cold" initialization, §4.2 scout,
/// §4.1 post-jump reset using the buy-leg fill price). Grounded on
/// `original_source/auto_trader.py`'s base `scout`/`bridge_scout` shape,
/// without the EWMA re-anchoring `ratio_adjust` layers on top.
pub struct DefaultStrategy {
    ctx: StrategyContext,
}

impl DefaultStrategy {
    pub fn new(ctx: StrategyContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Strategy for DefaultStrategy {
    async fn initialize(&self) -> Result<()> {
        self.ctx.bootstrap_current_coin().await?;

        let mut session = self.ctx.store.begin().await?;
        ratio_book::initialize_cold(&mut session, self.ctx.exchange.as_ref(), &self.ctx.bridge).await?;
        session.commit().await?;
        Ok(())
    }

    async fn scout(&self) -> Result<()> {
        if self.ctx.trader.failed_buy_order() {
            self.bridge_scout().await?;
        }

        let Some(current) = self.ctx.store.get_current_coin().await? else {
            info!("scout: no current coin set, skipping cycle");
            return Ok(());
        };

        let market = self.ctx.bridge.market_symbol(&current.symbol);
        let Some(price) = self.ctx.exchange.get_ticker_price(&market).await? else {
            info!("scout: skipping, current coin {market} not found");
            return Ok(());
        };

        self.ctx.jump_to_best_coin(&current.symbol, price).await
    }

    async fn bridge_scout(&self) -> Result<Option<String>> {
        let bought = self.ctx.bridge_scout_core().await?;
        if let Some(coin) = &bought {
            let now = self.ctx.exchange.now().await;
            self.ctx.store.set_current_coin(coin, now).await?;
            self.ctx.trader.clear_failed_buy_order();
        }
        Ok(bought)
    }
}
