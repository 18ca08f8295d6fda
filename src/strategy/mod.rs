pub mod default_strategy;
pub mod ratio_adjust;
pub mod registry;

pub use registry::build_strategy;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rand::seq::SliceRandom;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::exchange::Exchange;
use crate::notifications::{AlertType, NotificationManager};
use crate::store::{PairFilter, Store};
use crate::trader::{AutoTrader, TransitionOutcome};
use crate::types::{Bridge, ScoutEntry};

/// Capability set a strategy variant implements (spec §9 "strategy
/// polymorphism"): ratio-book initialization, the per-cycle scout/jump
/// decision, and the bridge-scout recovery path.
#[async_trait]
pub trait Strategy: Send + Sync {
    async fn initialize(&self) -> Result<()>;
    async fn scout(&self) -> Result<()>;
    async fn bridge_scout(&self) -> Result<Option<String>>;
}

/// Shared dependencies and shared §4.2/§4.3 logic used by every strategy
/// variant (the baseline differs from `ratio_adjust` only in ratio-book
/// initialization/re-anchoring, per spec §2: "both share §4.1/§4.2/§4.3").
pub struct StrategyContext {
    pub store: Arc<Store>,
    pub exchange: Arc<dyn Exchange>,
    pub config: Arc<AppConfig>,
    pub notifications: Arc<NotificationManager>,
    pub trader: AutoTrader,
    pub bridge: Bridge,
}

impl StrategyContext {
    pub fn new(
        store: Arc<Store>,
        exchange: Arc<dyn Exchange>,
        config: Arc<AppConfig>,
        notifications: Arc<NotificationManager>,
    ) -> Self {
        let bridge = Bridge(config.bridge.clone());
        let trader = AutoTrader::new(store.clone(), exchange.clone(), config.clone());
        Self {
            store,
            exchange,
            config,
            notifications,
            trader,
            bridge,
        }
    }

    /// Bootstraps `CurrentCoin` once at startup (spec §3 CurrentCoin
    /// lifecycle): uses `CURRENT_COIN_SYMBOL` if configured, otherwise picks
    /// randomly from `SUPPORTED_COIN_LIST` and immediately buys it so there
    /// is something to rotate out of.
    pub async fn bootstrap_current_coin(&self) -> Result<()> {
        if self.store.get_current_coin().await?.is_some() {
            return Ok(());
        }

        let (symbol, needs_purchase) = match &self.config.current_coin_symbol {
            Some(symbol) if !symbol.is_empty() => (symbol.clone(), false),
            _ => {
                let symbol = self
                    .config
                    .supported_coin_list
                    .choose(&mut rand::thread_rng())
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("SUPPORTED_COIN_LIST is empty"))?;
                (symbol, true)
            }
        };

        info!("bootstrapping current coin: {symbol}");
        let now = self.exchange.now().await;
        self.store.set_current_coin(&symbol, now).await?;

        if needs_purchase {
            info!("purchasing {symbol} to begin trading");
            let market = self.bridge.market_symbol(&symbol);
            let limit_price = self.exchange.get_buy_price(&market).await?;
            self.exchange
                .buy_alt(&symbol, self.bridge.symbol(), limit_price)
                .await?;
        }

        Ok(())
    }

    /// Computes the fee-adjusted score (spec §4.2) for every outgoing pair
    /// from `coin`, logging a `ScoutEntry` for each candidate evaluated
    /// regardless of profitability. Returns `to_coin -> (score, remembered_ratio)`.
    pub async fn pair_scores(&self, coin: &str, coin_price: Decimal) -> Result<HashMap<String, (Decimal, Decimal)>> {
        let mut session = self.store.begin().await?;
        let pairs = session
            .list_pairs(PairFilter {
                from_coin: Some(coin),
                ratio_is_null: Some(false),
                enabled_endpoints_only: true,
            })
            .await?;

        let mut scores = HashMap::new();
        let now = Utc::now();

        for pair in pairs {
            let Some(remembered) = pair.ratio else { continue };

            let other_symbol = self.bridge.market_symbol(&pair.to_coin);
            let other_price = match self.exchange.get_ticker_price(&other_symbol).await {
                Ok(price) => price,
                Err(e) => {
                    warn!("scout: price lookup failed for {other_symbol}: {e}");
                    None
                }
            };

            let Some(other_price) = other_price else {
                info!("scout: skipping {coin}->{}, symbol {other_symbol} not found", pair.to_coin);
                continue;
            };

            session
                .insert_scout_entry(&ScoutEntry {
                    from_coin: coin.to_string(),
                    to_coin: pair.to_coin.clone(),
                    remembered_ratio: remembered,
                    current_coin_price: coin_price,
                    other_coin_price: other_price,
                    datetime: now,
                })
                .await?;

            let live_ratio = coin_price / other_price;
            let fee_total = self.exchange.get_fee(coin, self.bridge.symbol(), true).await?
                + self.exchange.get_fee(&pair.to_coin, self.bridge.symbol(), false).await?;
            let effective_live = live_ratio - fee_total * self.config.scout.multiplier * live_ratio;
            let score = effective_live - remembered;

            scores.insert(pair.to_coin.clone(), (score, remembered));
        }

        session.commit().await?;
        Ok(scores)
    }

    /// Selects the best outgoing jump and, if stuck-loss conditions allow,
    /// a fallback loss-taking jump (spec §4.2). Executes the chosen
    /// transition via `AutoTrader`.
    pub async fn jump_to_best_coin(&self, coin: &str, coin_price: Decimal) -> Result<()> {
        let scores = self.pair_scores(coin, coin_price).await?;

        let profitable = scores
            .iter()
            .filter(|(_, (score, _))| *score > Decimal::ZERO)
            .map(|(to, (score, _))| (to.clone(), *score));

        if let Some((best_to, best_score)) = argmax_by_symbol(profitable) {
            info!("will be jumping from {coin} to {best_to} (score={best_score})");
            self.execute_jump(coin, &best_to).await?;
            return Ok(());
        }

        self.maybe_take_stuck_loss(coin, &scores).await
    }

    async fn maybe_take_stuck_loss(&self, coin: &str, scores: &HashMap<String, (Decimal, Decimal)>) -> Result<()> {
        if self.config.loss.after_hours == 0 {
            return Ok(());
        }

        let Some(current) = self.store.get_current_coin().await? else {
            return Ok(());
        };
        let threshold = current.since + chrono::Duration::hours(self.config.loss.after_hours as i64);
        if Utc::now() < threshold {
            return Ok(());
        }

        info!("stuck for more than {} hours, checking if we can settle for a loss", self.config.loss.after_hours);
        let max_ratio_difference = (dec!(100) - self.config.loss.max_loss_percent) / dec!(100);

        let fallback = scores.iter().filter(|(_, (score, remembered))| {
            !remembered.is_zero() && (*score + *remembered) / *remembered >= max_ratio_difference
        });

        let fallback_candidates = fallback.map(|(to, (score, _))| (to.clone(), *score));
        if let Some((best_to, best_score)) = argmax_by_symbol(fallback_candidates) {
            let remembered = scores[&best_to].1;
            let loss_estimate = (Decimal::ONE - (best_score + remembered) / remembered) * dec!(100);
            info!("will trade at a LOSS from {coin} to {best_to}, estimated loss {loss_estimate}%");
            self.notifications
                .notify(AlertType::StuckLossJump {
                    from: coin.to_string(),
                    to: best_to.clone(),
                    loss_estimate_pct: loss_estimate,
                })
                .await;
            self.execute_jump(coin, &best_to).await?;
        } else if let Some((best_to, best_score)) = argmax_by_symbol(scores.iter().map(|(to, (score, _))| (to.clone(), *score))) {
            let remembered = scores[&best_to].1;
            let loss_estimate = (Decimal::ONE - (best_score + remembered) / remembered) * dec!(100);
            info!("loss is currently too great with pair {coin}->{best_to} at {loss_estimate}%");
        }

        Ok(())
    }

    async fn execute_jump(&self, from: &str, to: &str) -> Result<()> {
        match self.trader.transition_through_bridge(from, to).await? {
            TransitionOutcome::Anchored { to_coin, fill_price } => {
                self.notifications
                    .notify(AlertType::Jump {
                        from: from.to_string(),
                        to: to_coin,
                        fill_price,
                    })
                    .await;
            }
            TransitionOutcome::Aborted { state, reason } => {
                warn!("transition {from}->{to} aborted at {state:?}: {reason}");
            }
        }
        Ok(())
    }

    /// Recovery mode (spec §4.2 "Bridge scout"): buy the unique coin whose
    /// every outgoing ratio is negative (a local ratio minimum) with
    /// leftover bridge balance. At most one purchase per invocation.
    pub async fn bridge_scout_core(&self) -> Result<Option<String>> {
        let bridge_balance = self
            .exchange
            .get_currency_balance(self.bridge.symbol(), false)
            .await?;

        let enabled = {
            let mut session = self.store.begin().await?;
            let coins = session.list_enabled_coins().await?;
            session.commit().await?;
            coins
        };

        for coin in enabled {
            let symbol = self.bridge.market_symbol(&coin);
            let Some(price) = self.exchange.get_ticker_price(&symbol).await? else {
                continue;
            };

            let scores = self.pair_scores(&coin, price).await?;
            let is_local_minimum = !scores.is_empty() && scores.values().all(|(score, _)| *score <= Decimal::ZERO);

            if is_local_minimum {
                let min_notional = self.exchange.get_min_notional(&coin, self.bridge.symbol()).await?;
                if bridge_balance > min_notional {
                    info!("will be purchasing {coin} using bridge coin");
                    self.exchange.buy_alt(&coin, self.bridge.symbol(), None).await?;
                    self.notifications
                        .notify(AlertType::BridgeScoutPurchase { coin: coin.clone() })
                        .await;
                    return Ok(Some(coin));
                }
            }
        }

        Ok(None)
    }
}

/// Picks the candidate with the maximum score; ties broken by to-coin
/// symbol ascending (spec §4.2: "ties broken by arbitrary but deterministic
/// order").
fn argmax_by_symbol(candidates: impl Iterator<Item = (String, Decimal)>) -> Option<(String, Decimal)> {
    candidates
        .map(|(to, score)| (std::cmp::Reverse(score), to))
        .min()
        .map(|(std::cmp::Reverse(score), to)| (to, score))
}
